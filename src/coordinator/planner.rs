/*!
 * Task planning.
 *
 * Input paths (files or directories) become the work of a run: standalone
 * documents become single-file tasks, and EPUBs become either a rebuild plan
 * (output `epub`) or one single-file task per spine document.
 */

use log::{info, warn};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::task::{BuildMetadata, ErrorRecord, SingleFileKind, SingleFileTask, file_label};
use crate::app_config::OutputFormat;
use crate::epub::package::Package;
use crate::errors::ErrorClass;
use crate::file_utils::FileManager;

/// Extensions picked up when walking a directory
pub const INPUT_EXTENSIONS: &[&str] = &["txt", "md", "docx", "epub", "html", "htm", "xhtml"];

/// Fragments of one book and what the rebuild needs to know about it
#[derive(Debug, Clone, PartialEq)]
pub struct BookPlan {
    pub fragment_paths: Vec<String>,
    pub build_metadata: BuildMetadata,
}

/// Everything a run will do
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    pub files: Vec<SingleFileTask>,
    pub books: BTreeMap<PathBuf, BookPlan>,
    /// Inputs that could not be planned
    pub rejected: Vec<ErrorRecord>,
}

impl Plan {
    /// Number of tasks the run will execute, builds included
    pub fn task_count(&self) -> usize {
        self.files.len()
            + self
                .books
                .values()
                .map(|book| book.fragment_paths.len() + 1)
                .sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.books.is_empty()
    }
}

fn kind_for(path: &Path) -> Option<SingleFileKind> {
    let ext = path.extension()?.to_string_lossy().to_lowercase();
    match ext.as_str() {
        "txt" | "md" => Some(SingleFileKind::Txt),
        "docx" => Some(SingleFileKind::Docx),
        "html" | "htm" | "xhtml" => Some(SingleFileKind::Html),
        _ => None,
    }
}

fn is_epub(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case("epub"))
}

/// Expand directories into the files they contain
fn expand_inputs(inputs: &[PathBuf], rejected: &mut Vec<ErrorRecord>) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for input in inputs {
        if FileManager::dir_exists(input) {
            match FileManager::find_files(input, INPUT_EXTENSIONS) {
                Ok(found) => files.extend(found),
                Err(e) => rejected.push(ErrorRecord::new(
                    input.display().to_string(),
                    format!("{:#}", e),
                    ErrorClass::Io,
                )),
            }
        } else if FileManager::file_exists(input) {
            files.push(input.clone());
        } else {
            rejected.push(ErrorRecord::new(
                input.display().to_string(),
                "input not found",
                ErrorClass::Io,
            ));
        }
    }
    files
}

/// Build the plan for `inputs` written as `format`
pub fn plan_inputs(inputs: &[PathBuf], format: OutputFormat) -> Plan {
    let mut plan = Plan::default();
    let files = expand_inputs(inputs, &mut plan.rejected);

    for path in files {
        if is_epub(&path) {
            match Package::open(&path) {
                Ok(package) => {
                    let fragment_paths = package.spine_documents();
                    if fragment_paths.is_empty() {
                        warn!("{}: spine lists no content documents", path.display());
                    }
                    if format == OutputFormat::Epub {
                        plan.books.insert(
                            path.clone(),
                            BookPlan {
                                fragment_paths,
                                build_metadata: package.build_metadata(),
                            },
                        );
                    } else {
                        plan.files.extend(
                            fragment_paths
                                .into_iter()
                                .map(|fragment| SingleFileTask::fragment(path.clone(), fragment)),
                        );
                    }
                }
                Err(e) => plan.rejected.push(ErrorRecord::new(
                    file_label(&path),
                    e.to_string(),
                    ErrorClass::StructuralEpub,
                )),
            }
        } else if let Some(kind) = kind_for(&path) {
            plan.files.push(SingleFileTask::file(kind, path));
        } else {
            warn!("Skipping unsupported input {}", path.display());
        }
    }

    info!(
        "Planned {} file task(s), {} book(s), {} rejected input(s)",
        plan.files.len(),
        plan.books.len(),
        plan.rejected.len()
    );
    plan
}
