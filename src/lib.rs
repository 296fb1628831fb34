/*!
 * # YADTwAI - Yet Another Document Translator with AI
 *
 * A Rust library for batch translation of documents through a remote
 * text-generation service.
 *
 * ## Features
 *
 * - Translate `.txt`, `.md`, `.docx`, `.html` and `.epub` inputs
 * - Keep images in place through opaque placeholder tokens
 * - Split long documents at paragraph, sentence or word boundaries
 * - Retry transient failures with exponential backoff
 * - Run many documents on a bounded worker pool, with graceful finishing,
 *   hard cancellation and outage detection
 * - Rebuild translated EPUBs with a consistent manifest, spine and navigation
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `placeholder`: Image placeholder tokens and image records
 * - `documents`: Input readers (text, HTML/XHTML, DOCX, EPUB fragments)
 * - `translation`: Chunk splitting, the retrying client and the chunk loop
 * - `providers`: Remote service clients (`gemini`) and a scripted `mock`
 * - `coordinator`: Task planning, the worker pool and per-book build state
 * - `epub`: Package parsing, navigation handling and archive reassembly
 * - `render`: Output renderers for single-file tasks
 * - `file_utils`: File system operations and output naming
 * - `app_controller`: Main application controller
 * - `language_utils`: ISO language code utilities
 * - `errors`: Custom error types for the application
 *
 * ## License
 *
 * This project is licensed under the MIT License
 */

// Global lints configuration
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod app_controller;
pub mod coordinator;
pub mod documents;
pub mod epub;
pub mod errors;
pub mod file_utils;
pub mod language_utils;
pub mod placeholder;
pub mod providers;
pub mod render;
pub mod translation;

// Re-export main types for easier usage
pub use app_config::{Config, OutputFormat};
pub use app_controller::Controller;
pub use coordinator::{Coordinator, Outcome, Plan, RunControl, RunSummary, plan_inputs};
pub use epub::{EpubReassembler, FragmentResult};
pub use errors::{AppError, DocumentError, EpubError, ErrorClass, ProviderError, TranslationError};
pub use language_utils::{get_language_name, language_codes_match, normalize_to_part2t};
pub use translation::{ChunkSplitter, ChunkTranslator, RunSignals, TranslationClient};
