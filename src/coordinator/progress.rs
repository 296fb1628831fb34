/*!
 * Progress events and the final run summary.
 */

use log::trace;
use std::fmt;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use super::task::ErrorRecord;

/// How the run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Cancelled,
    /// Stopped early through the finishing flag; partial results were saved
    Finished,
    /// A service outage halted admission of new work
    Critical,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Finished => "finished early",
            Self::Critical => "stopped on critical error",
        };
        f.write_str(label)
    }
}

/// Final counts of a run
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub total_tasks: usize,
    pub success_count: usize,
    /// Never larger than `total_tasks - success_count`
    pub error_count: usize,
    pub errors: Vec<ErrorRecord>,
    /// Items that were written with a caveat, as `(origin, message)`
    pub warnings: Vec<(String, String)>,
    pub outcome: Outcome,
}

impl RunSummary {
    pub fn new(total_tasks: usize, success_count: usize, errors: Vec<ErrorRecord>, outcome: Outcome) -> Self {
        let error_count = errors.len().min(total_tasks.saturating_sub(success_count));
        Self {
            total_tasks,
            success_count,
            error_count,
            errors,
            warnings: Vec::new(),
            outcome,
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<(String, String)>) -> Self {
        self.warnings = warnings;
        self
    }

    /// Whether the process should report failure
    pub fn is_failure(&self) -> bool {
        self.outcome == Outcome::Critical || self.error_count > 0
    }
}

/// Events emitted while a run progresses
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    TotalTasks(usize),
    TaskFinished { processed: usize },
    Status(String),
    ChunkProgress { label: String, done: usize, total: usize },
    Finished(RunSummary),
}

pub type ProgressSender = UnboundedSender<ProgressEvent>;
pub type ProgressReceiver = UnboundedReceiver<ProgressEvent>;

pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    unbounded_channel()
}

/// Sends events when somebody listens
#[derive(Debug, Clone, Default)]
pub struct Reporter {
    sender: Option<ProgressSender>,
}

impl Reporter {
    pub fn new(sender: Option<ProgressSender>) -> Self {
        Self { sender }
    }

    pub fn send(&self, event: ProgressEvent) {
        if let Some(sender) = &self.sender {
            if sender.send(event).is_err() {
                trace!("Progress receiver dropped");
            }
        }
    }

    pub fn status(&self, message: impl Into<String>) {
        self.send(ProgressEvent::Status(message.into()));
    }
}
