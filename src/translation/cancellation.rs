/*!
 * Run-wide control signals.
 *
 * Three monotonic flags shared by every task of a run: `cancelled` (hard
 * stop), `finishing` (graceful drain) and `critical` (outage detected, which
 * drops queued work like `cancelled` but is reported differently). Suspension points
 * take a `&RunSignals` and check it at every tick.
 */

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::errors::TranslationError;

#[derive(Debug, Default)]
struct Flags {
    cancelled: AtomicBool,
    finishing: AtomicBool,
    critical: AtomicBool,
}

/// Cloneable handle to the shared flags
#[derive(Debug, Clone, Default)]
pub struct RunSignals {
    flags: Arc<Flags>,
}

impl RunSignals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hard stop: drop queued work, abort in-flight calls at their next check
    pub fn cancel(&self) {
        self.flags.cancelled.store(true, Ordering::SeqCst);
    }

    /// Graceful drain: finish the chunk in flight, admit nothing new
    pub fn finish(&self) {
        self.flags.finishing.store(true, Ordering::SeqCst);
    }

    /// Outage detected somewhere in the batch; work already running is left alone
    pub fn mark_critical(&self) {
        self.flags.critical.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flags.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_finishing(&self) -> bool {
        self.flags.finishing.load(Ordering::SeqCst)
    }

    pub fn is_critical(&self) -> bool {
        self.flags.critical.load(Ordering::SeqCst)
    }

    /// Queued work that has not started must be dropped
    pub fn halted(&self) -> bool {
        self.is_cancelled() || self.is_critical()
    }

    /// No new top-level work may be submitted
    pub fn admission_closed(&self) -> bool {
        self.halted() || self.is_finishing()
    }

    /// Fail with `Cancelled` if the hard-stop flag is set
    pub fn check(&self, context: &str) -> Result<(), TranslationError> {
        if self.is_cancelled() {
            Err(TranslationError::Cancelled(context.to_string()))
        } else {
            Ok(())
        }
    }

    /// Sleep `total` in `tick`-sized steps, aborting as soon as the run is cancelled
    pub async fn sleep(&self, total: Duration, tick: Duration, context: &str) -> Result<(), TranslationError> {
        let tick = if tick.is_zero() { Duration::from_millis(100) } else { tick };
        let deadline = tokio::time::Instant::now() + total;
        loop {
            self.check(context)?;
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(());
            }
            tokio::time::sleep((deadline - now).min(tick)).await;
        }
    }
}
