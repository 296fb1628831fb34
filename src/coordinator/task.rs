/*!
 * Coordinator data model: tasks, per-book build state and error records.
 */

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::errors::{ErrorClass, TranslationError};
use crate::placeholder::ImageMap;

pub use crate::epub::{BuildMetadata, FragmentContent, FragmentResult};

/// What kind of document a single-file task reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SingleFileKind {
    Txt,
    Docx,
    Html,
    /// One XHTML document inside an EPUB
    EpubFragment,
}

/// One document translated on its own
#[derive(Debug, Clone, PartialEq)]
pub struct SingleFileTask {
    pub kind: SingleFileKind,
    /// The file itself, or the book for `EpubFragment`
    pub primary_path: PathBuf,
    /// Archive path of the fragment for `EpubFragment`
    pub secondary_path: Option<String>,
}

impl SingleFileTask {
    pub fn file(kind: SingleFileKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            primary_path: path.into(),
            secondary_path: None,
        }
    }

    pub fn fragment(book_path: impl Into<PathBuf>, fragment_path: impl Into<String>) -> Self {
        Self {
            kind: SingleFileKind::EpubFragment,
            primary_path: book_path.into(),
            secondary_path: Some(fragment_path.into()),
        }
    }

    /// Name used in logs, progress and error records
    pub fn label(&self) -> String {
        match &self.secondary_path {
            Some(fragment) => format!("{}:{}", file_label(&self.primary_path), fragment),
            None => file_label(&self.primary_path),
        }
    }
}

pub(crate) fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Unit of work run by the pool
#[derive(Debug, Clone, PartialEq)]
pub enum Task {
    SingleFile(SingleFileTask),
    EpubBuild { book_path: PathBuf },
}

/// A failure recorded for the final summary
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorRecord {
    pub origin: String,
    pub message: String,
    pub class: ErrorClass,
}

impl ErrorRecord {
    pub fn new(origin: impl Into<String>, message: impl Into<String>, class: ErrorClass) -> Self {
        Self {
            origin: origin.into(),
            message: message.into(),
            class,
        }
    }

    pub fn from_translation(origin: impl Into<String>, error: &TranslationError) -> Self {
        Self::new(origin, error.to_string(), error.class())
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.origin, self.class, self.message)
    }
}

/// Bookkeeping for one EPUB being rebuilt
///
/// Owned by the coordinator loop alone; workers only send results back.
#[derive(Debug, Clone, Default)]
pub struct BuildState {
    /// Fragments still in flight, only ever shrinks
    pub pending: BTreeSet<String>,
    /// Results in the book's reading order
    pub results: Vec<FragmentResult>,
    pub failed: bool,
    pub build_submitted: bool,
    pub fragment_error_count: usize,
    order: Vec<String>,
}

impl BuildState {
    pub fn new(fragment_paths: &[String]) -> Self {
        Self {
            pending: fragment_paths.iter().cloned().collect(),
            order: fragment_paths.to_vec(),
            ..Default::default()
        }
    }

    /// Record a finished fragment; returns false if it was not pending
    pub fn complete(&mut self, fragment_path: &str, result: Option<FragmentResult>) -> bool {
        if !self.pending.remove(fragment_path) {
            return false;
        }
        if let Some(result) = result {
            let position = self.position(&result.original_path);
            let index = self
                .results
                .iter()
                .position(|r| self.position(&r.original_path) > position)
                .unwrap_or(self.results.len());
            self.results.insert(index, result);
        }
        true
    }

    fn position(&self, path: &str) -> usize {
        self.order.iter().position(|p| p == path).unwrap_or(usize::MAX)
    }

    /// Every image referenced by the results
    pub fn combined_images(&self) -> ImageMap {
        self.results
            .iter()
            .flat_map(|r| r.images.iter().map(|(id, record)| (id.clone(), record.clone())))
            .collect()
    }

    /// The build may be submitted now
    pub fn ready(&self) -> bool {
        self.pending.is_empty() && !self.failed && !self.build_submitted
    }
}
