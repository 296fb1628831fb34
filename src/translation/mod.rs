/*!
 * Translation of text through the remote service.
 *
 * - `chunking`: boundary-aware splitting that never cuts a placeholder token
 * - `client`: one remote call with retry, backoff and error classification
 * - `cancellation`: run-wide cancel / finish / critical signals
 * - `core`: the sequential per-fragment chunk loop and placeholder reconciliation
 */

// Re-export main types for easier usage
pub use self::cancellation::RunSignals;
pub use self::chunking::{BoundaryKind, ChunkSplitter};
pub use self::client::{RetryPolicy, TranslationClient};
pub use self::core::{ChunkRun, ChunkStop, ChunkTranslator, Reconciled, reconcile};

// Submodules
pub mod cancellation;
pub mod chunking;
pub mod client;
pub mod core;
