/*!
 * Batch coordination.
 *
 * A run takes a `Plan` and executes it on a bounded `WorkerPool`:
 * - single-file tasks are read, translated, rendered and written on their own
 * - EPUB fragments are translated into `FragmentResult`s that go back to the
 *   run loop, which keeps one `BuildState` per book
 * - once every fragment of a book is back, the loop submits its build task
 *
 * The run loop is the only owner of the build states. Workers report through
 * their return values and the progress channel.
 */

use log::{debug, error, info, warn};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::app_config::{Config, OutputFormat};
use crate::documents::{self, Extracted, ImageMode};
use crate::epub::{EpubReassembler, MetadataOverrides, paths};
use crate::errors::{DocumentError, ErrorClass, TranslationError};
use crate::file_utils::FileManager;
use crate::language_utils;
use crate::render::RendererRegistry;
use crate::translation::{ChunkStop, ChunkTranslator, RunSignals};

pub mod planner;
pub mod pool;
pub mod progress;
pub mod task;

pub use self::planner::{BookPlan, INPUT_EXTENSIONS, Plan, plan_inputs};
pub use self::pool::WorkerPool;
pub use self::progress::{
    Outcome, ProgressEvent, ProgressReceiver, ProgressSender, Reporter, RunSummary, progress_channel,
};
pub use self::task::{
    BuildMetadata, BuildState, ErrorRecord, FragmentContent, FragmentResult, SingleFileKind,
    SingleFileTask, Task,
};

use self::task::file_label;

const FINISHING_SKIP: &str = "skipped: finishing";

/// Cloneable handle that stops a run from outside
#[derive(Debug, Clone)]
pub struct RunControl {
    signals: RunSignals,
}

impl RunControl {
    /// Hard stop
    pub fn cancel(&self) {
        warn!("Cancellation requested");
        self.signals.cancel();
    }

    /// Let running chunks finish, save what is done and admit nothing new
    pub fn finish(&self) {
        info!("Finishing requested, saving partial results");
        self.signals.finish();
    }

    pub fn is_cancelled(&self) -> bool {
        self.signals.is_cancelled()
    }

    pub fn is_finishing(&self) -> bool {
        self.signals.is_finishing()
    }

    pub fn signals(&self) -> &RunSignals {
        &self.signals
    }
}

/// What a pool task hands back to the run loop
#[derive(Debug)]
enum Completion {
    File {
        label: String,
        outcome: Result<Option<PathBuf>, ErrorRecord>,
    },
    Fragment {
        book: PathBuf,
        fragment: String,
        result: Option<FragmentResult>,
        error: Option<ErrorRecord>,
        succeeded: bool,
    },
    Build {
        book: PathBuf,
        outcome: Result<PathBuf, ErrorRecord>,
    },
    /// Dropped from the queue after the run halted
    NotStarted {
        label: String,
        fragment: Option<(PathBuf, String)>,
    },
}

/// Runs plans against one translator
pub struct Coordinator {
    translator: ChunkTranslator,
    renderers: RendererRegistry,
    output_format: OutputFormat,
    output_dir: PathBuf,
    concurrency: usize,
    overrides: MetadataOverrides,
}

impl Coordinator {
    pub fn new(translator: ChunkTranslator, config: &Config, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            translator,
            renderers: RendererRegistry::with_defaults(),
            output_format: config.output_format,
            output_dir: output_dir.into(),
            concurrency: config.concurrency.max(1),
            overrides: MetadataOverrides {
                title: None,
                language: Some(language_utils::language_tag(&config.target_language)),
            },
        }
    }

    pub fn with_renderers(mut self, renderers: RendererRegistry) -> Self {
        self.renderers = renderers;
        self
    }

    pub fn with_overrides(mut self, overrides: MetadataOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn output_format(&self) -> OutputFormat {
        self.output_format
    }

    /// Handle for cancelling or finishing the run from another task
    pub fn control(&self) -> RunControl {
        RunControl {
            signals: self.translator.client().signals().clone(),
        }
    }

    /// Execute `plan` and return its summary
    ///
    /// The summary is also sent as the last progress event.
    pub async fn run(&self, plan: Plan, progress: Option<ProgressSender>) -> RunSummary {
        let reporter = Reporter::new(progress);
        let signals = self.translator.client().signals().clone();
        let total = plan.task_count() + plan.rejected.len();
        reporter.send(ProgressEvent::TotalTasks(total));

        let mut errors: Vec<ErrorRecord> = plan.rejected.clone();
        for record in &errors {
            error!("{}", record);
        }
        let mut warnings: Vec<(String, String)> = Vec::new();
        let mut success = 0usize;
        let mut processed = plan.rejected.len();

        let temp_dir = match tempfile::Builder::new().prefix("yadtwai-").tempdir() {
            Ok(dir) => dir,
            Err(e) => {
                errors.push(ErrorRecord::new("run", format!("cannot create temp dir: {}", e), ErrorClass::Io));
                let summary = RunSummary::new(total, 0, errors, Outcome::Completed);
                reporter.send(ProgressEvent::Finished(summary.clone()));
                return summary;
            }
        };

        let worker = Arc::new(Worker {
            translator: self.translator.clone(),
            renderers: self.renderers.clone(),
            output_format: self.output_format,
            output_dir: self.output_dir.clone(),
            temp_dir: temp_dir.path().to_path_buf(),
            reassembler: EpubReassembler::with_overrides(self.overrides.clone()),
            reporter: reporter.clone(),
            signals: signals.clone(),
        });
        let mut pool: WorkerPool<Completion> = WorkerPool::new(self.concurrency, signals.clone());
        let mut states: BTreeMap<PathBuf, BuildState> = BTreeMap::new();
        let mut metadata: BTreeMap<PathBuf, BuildMetadata> = BTreeMap::new();

        info!(
            "Starting run: {} task(s), {} worker(s), output {}",
            total,
            pool.size(),
            self.output_format
        );

        for task in plan.files {
            let label = task.label();
            let worker = worker.clone();
            pool.submit(
                async move {
                    let label = task.label();
                    let outcome = worker.translate_file(&task).await;
                    Completion::File { label, outcome }
                },
                move || Completion::NotStarted { label, fragment: None },
            );
        }

        for (book, book_plan) in plan.books {
            for fragment in &book_plan.fragment_paths {
                let label = format!("{}:{}", file_label(&book), fragment);
                let on_halt = (book.clone(), fragment.clone());
                let worker = worker.clone();
                let book = book.clone();
                let fragment = fragment.clone();
                pool.submit(
                    async move { worker.translate_fragment(book, fragment).await },
                    move || Completion::NotStarted {
                        label,
                        fragment: Some(on_halt),
                    },
                );
            }
            states.insert(book.clone(), BuildState::new(&book_plan.fragment_paths));
            metadata.insert(book, book_plan.build_metadata);
        }

        // Books without content documents are ready right away
        let empty_books: Vec<PathBuf> = states
            .iter()
            .filter(|(_, state)| state.ready())
            .map(|(book, _)| book.clone())
            .collect();
        for book in empty_books {
            submit_build(&mut pool, &worker, &mut states, &metadata, &book);
        }

        while let Some(joined) = pool.next().await {
            processed += 1;
            reporter.send(ProgressEvent::TaskFinished { processed });

            let completion = match joined {
                Ok(completion) => completion,
                Err(e) => {
                    error!("Worker task failed: {}", e);
                    errors.push(ErrorRecord::new("worker", e.to_string(), ErrorClass::Io));
                    continue;
                }
            };

            match completion {
                Completion::File { label, outcome } => match outcome {
                    Ok(_) => success += 1,
                    Err(record) => {
                        debug!("{} failed", label);
                        errors.push(record);
                    }
                },
                Completion::Fragment {
                    book,
                    fragment,
                    result,
                    error,
                    succeeded,
                } => {
                    if succeeded {
                        success += 1;
                    }
                    let Some(state) = states.get_mut(&book) else {
                        continue;
                    };
                    if let Some(warning) = result.as_ref().and_then(|r| r.warning.clone()) {
                        warnings.push((format!("{}:{}", file_label(&book), fragment), warning));
                    }
                    // A fragment without even its original bytes leaves a hole in the book
                    if result.as_ref().is_none_or(|r| r.content.is_none()) {
                        state.failed = true;
                    }
                    if let Some(record) = error {
                        state.fragment_error_count += 1;
                        if record.class == ErrorClass::Cancelled {
                            state.failed = true;
                        }
                        errors.push(record);
                    }
                    state.complete(&fragment, result);
                    if state.ready() && !signals.halted() {
                        submit_build(&mut pool, &worker, &mut states, &metadata, &book);
                    }
                }
                Completion::Build { book, outcome } => match outcome {
                    Ok(path) => {
                        success += 1;
                        let fragment_errors = states.get(&book).map(|s| s.fragment_error_count).unwrap_or(0);
                        if fragment_errors > 0 {
                            warn!(
                                "{} written with {} fragment error(s): {}",
                                file_label(&book),
                                fragment_errors,
                                path.display()
                            );
                        }
                    }
                    Err(record) => errors.push(record),
                },
                Completion::NotStarted { label, fragment } => {
                    debug!("{} not started, run halted", label);
                    if let Some((book, fragment)) = fragment {
                        if let Some(state) = states.get_mut(&book) {
                            state.failed = true;
                            state.complete(&fragment, None);
                        }
                    }
                }
            }
        }

        for (book, state) in &states {
            if state.build_submitted {
                continue;
            }
            let (reason, class) = if signals.is_cancelled() {
                ("EPUB build not run: run cancelled", ErrorClass::Cancelled)
            } else if signals.is_critical() {
                ("EPUB build not run: service outage", ErrorClass::Fatal)
            } else if state.failed && state.pending.is_empty() {
                ("EPUB build not run: a fragment produced no content", ErrorClass::Io)
            } else {
                ("EPUB build not run: fragments missing", ErrorClass::Cancelled)
            };
            let record = ErrorRecord::new(file_label(book), reason, class);
            error!("{}", record);
            errors.push(record);
        }

        let outcome = if signals.is_cancelled() {
            Outcome::Cancelled
        } else if signals.is_critical() {
            Outcome::Critical
        } else if signals.is_finishing() {
            Outcome::Finished
        } else {
            Outcome::Completed
        };

        let summary = RunSummary::new(total, success, errors, outcome).with_warnings(warnings);
        info!(
            "Run {}: {} of {} task(s) succeeded, {} error(s)",
            summary.outcome, summary.success_count, summary.total_tasks, summary.error_count
        );
        reporter.send(ProgressEvent::Finished(summary.clone()));
        summary
    }
}

fn submit_build(
    pool: &mut WorkerPool<Completion>,
    worker: &Arc<Worker>,
    states: &mut BTreeMap<PathBuf, BuildState>,
    metadata: &BTreeMap<PathBuf, BuildMetadata>,
    book: &Path,
) {
    let Some(state) = states.get_mut(book) else {
        return;
    };
    state.build_submitted = true;
    let results = state.results.clone();
    let meta = metadata.get(book).cloned().unwrap_or_default();
    let worker = worker.clone();
    let book = book.to_path_buf();
    let label = file_label(&book);
    debug!("Submitting build of {} ({} fragment(s))", label, results.len());
    pool.submit(
        async move {
            let outcome = worker.build(&book, results, meta).await;
            Completion::Build { book, outcome }
        },
        move || Completion::NotStarted { label, fragment: None },
    );
}

/// Per-run state shared by every pool task
struct Worker {
    translator: ChunkTranslator,
    renderers: RendererRegistry,
    output_format: OutputFormat,
    output_dir: PathBuf,
    temp_dir: PathBuf,
    reassembler: EpubReassembler,
    reporter: Reporter,
    signals: RunSignals,
}

impl Worker {
    /// Halt admission when `error` means the service is down
    fn escalate(&self, label: &str, error: &TranslationError) {
        if error.is_outage() && !self.signals.is_critical() {
            error!("{}: service outage, no new work will start: {}", label, error);
            self.signals.mark_critical();
        }
    }

    fn fail(&self, label: &str, error: &TranslationError) -> ErrorRecord {
        self.escalate(label, error);
        let record = ErrorRecord::from_translation(label, error);
        if error.is_cancelled() {
            debug!("{}", record);
        } else {
            error!("{}", record);
        }
        record
    }

    fn chunk_progress(&self, label: &str) -> impl FnMut(usize, usize) + Send + 'static {
        let reporter = self.reporter.clone();
        let label = label.to_string();
        move |done, total| {
            reporter.send(ProgressEvent::ChunkProgress {
                label: label.clone(),
                done,
                total,
            })
        }
    }

    fn read(&self, task: &SingleFileTask) -> Result<Extracted, DocumentError> {
        match (task.kind, &task.secondary_path) {
            (SingleFileKind::EpubFragment, Some(fragment)) => documents::read_epub_fragment(
                &task.primary_path,
                fragment,
                &ImageMode::Save(self.temp_dir.clone()),
            )
            .map(|(extracted, _)| extracted),
            (SingleFileKind::EpubFragment, None) => Err(DocumentError::Unsupported(
                "fragment task without a fragment path".to_string(),
            )),
            _ => documents::read_file(&task.primary_path, &self.temp_dir),
        }
    }

    async fn translate_file(&self, task: &SingleFileTask) -> Result<Option<PathBuf>, ErrorRecord> {
        let label = task.label();
        if self.signals.is_finishing() {
            return Err(ErrorRecord::new(label, FINISHING_SKIP, ErrorClass::Cancelled));
        }
        if !self.renderers.supports(self.output_format) {
            return Err(ErrorRecord::new(
                label,
                format!("no renderer for output format '{}'", self.output_format),
                ErrorClass::Io,
            ));
        }

        self.reporter.status(format!("Reading {}", label));
        let extracted = self
            .read(task)
            .map_err(|e| ErrorRecord::new(&label, e.to_string(), ErrorClass::Io))?;
        for warning in &extracted.warnings {
            warn!("{}: {}", label, warning);
        }
        if extracted.text.trim().is_empty() {
            info!("{}: no text to translate", label);
            return Ok(None);
        }

        let run = self
            .translator
            .translate_text(&extracted.text, &label, self.chunk_progress(&label))
            .await
            .map_err(|e| self.fail(&label, &e))?;
        match &run.stop {
            ChunkStop::Completed => {}
            ChunkStop::Finishing => warn!(
                "{}: saving {} of {} chunk(s), run is finishing",
                label,
                run.translated.len(),
                run.total
            ),
            ChunkStop::Failed(e) => return Err(self.fail(&label, e)),
        }

        let separator = if self.output_format.joins_with_blank_line() && run.total > 1 {
            "\n\n"
        } else {
            "\n"
        };
        let text = run.joined(separator);

        let name_source = match &task.secondary_path {
            Some(fragment) => PathBuf::from(paths::file_name(fragment)),
            None => task.primary_path.clone(),
        };
        let title = file_label(&name_source);
        let bytes = self
            .renderers
            .render(self.output_format, &text, &extracted.images, &title)
            .map_err(|e| ErrorRecord::new(&label, e.to_string(), ErrorClass::Io))?;
        let output = FileManager::generate_output_path(&name_source, &self.output_dir, self.output_format.extension());
        FileManager::write_bytes(&output, &bytes)
            .map_err(|e| ErrorRecord::new(&label, format!("{:#}", e), ErrorClass::Io))?;
        info!("{} -> {}", label, output.display());
        Ok(Some(output))
    }

    async fn translate_fragment(&self, book: PathBuf, fragment: String) -> Completion {
        let label = format!("{}:{}", file_label(&book), fragment);
        let done = |result: Option<FragmentResult>, error: Option<ErrorRecord>, succeeded: bool| {
            Completion::Fragment {
                book: book.clone(),
                fragment: fragment.clone(),
                result,
                error,
                succeeded,
            }
        };

        let (extracted, raw) = match documents::read_epub_fragment(&book, &fragment, &ImageMode::Rebuild) {
            Ok(read) => read,
            Err(e) => {
                let record = ErrorRecord::new(&label, e.to_string(), ErrorClass::Io);
                error!("{}", record);
                return done(None, Some(record), false);
            }
        };
        for warning in &extracted.warnings {
            warn!("{}: {}", label, warning);
        }

        if self.signals.is_finishing() {
            let result = FragmentResult::original(&fragment, raw, Some("skipped (finishing)".to_string()));
            return done(Some(result), None, false);
        }
        if extracted.text.trim().is_empty() {
            debug!("{}: no text, keeping original", label);
            let result = FragmentResult::original(&fragment, raw, Some("no text to translate".to_string()));
            return done(Some(result), None, true);
        }

        let run = match self
            .translator
            .translate_text(&extracted.text, &label, self.chunk_progress(&label))
            .await
        {
            Ok(run) => run,
            Err(e) => return done(None, Some(self.fail(&label, &e)), false),
        };

        let drift = (!run.warnings.is_empty()).then(|| run.warnings.join("; "));
        match &run.stop {
            ChunkStop::Completed => {
                let result = FragmentResult::translated(&fragment, run.joined("\n"), extracted.images)
                    .with_warning(drift);
                done(Some(result), None, true)
            }
            ChunkStop::Finishing => {
                let warning = format!(
                    "partial: {} of {} chunk(s) translated (finishing)",
                    run.translated.len(),
                    run.total
                );
                warn!("{}: {}", label, warning);
                let result = FragmentResult::translated(&fragment, run.joined("\n"), extracted.images)
                    .with_warning(Some(warning));
                done(Some(result), None, true)
            }
            ChunkStop::Failed(e) if run.translated.is_empty() => {
                let record = self.fail(&label, e);
                let result = FragmentResult::original(
                    &fragment,
                    raw,
                    Some(format!("translation failed, original kept: {}", e)),
                );
                done(Some(result), Some(record), false)
            }
            ChunkStop::Failed(e) => {
                self.escalate(&label, e);
                let warning = format!(
                    "partial: {} of {} chunk(s) translated, then {}",
                    run.translated.len(),
                    run.total,
                    e
                );
                warn!("{}: {}", label, warning);
                let result = FragmentResult::translated(&fragment, run.joined("\n"), extracted.images)
                    .with_warning(Some(warning));
                done(Some(result), None, true)
            }
        }
    }

    async fn build(
        &self,
        book: &Path,
        results: Vec<FragmentResult>,
        metadata: BuildMetadata,
    ) -> Result<PathBuf, ErrorRecord> {
        let label = file_label(book);
        self.reporter.status(format!("Building {}", label));

        let reassembler = self.reassembler.clone();
        let source = book.to_path_buf();
        let bytes = tokio::task::spawn_blocking(move || reassembler.rebuild(&source, &results, &metadata))
            .await
            .map_err(|e| ErrorRecord::new(&label, e.to_string(), ErrorClass::Io))?
            .map_err(|e| {
                let record = ErrorRecord::new(&label, e.to_string(), ErrorClass::StructuralEpub);
                error!("{}", record);
                record
            })?;

        let output = FileManager::generate_output_path(book, &self.output_dir, OutputFormat::Epub.extension());
        FileManager::write_bytes(&output, &bytes)
            .map_err(|e| ErrorRecord::new(&label, format!("{:#}", e), ErrorClass::Io))?;
        info!("{} -> {}", label, output.display());
        Ok(output)
    }
}
