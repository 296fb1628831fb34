use anyhow::{Context, Result, anyhow};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::app_config::Config;
use crate::coordinator::{
    Coordinator, Outcome, ProgressEvent, ProgressReceiver, RunControl, RunSummary, plan_inputs,
    progress_channel,
};
use crate::file_utils::FileManager;
use crate::language_utils;
use crate::providers::Provider;
use crate::providers::gemini::Gemini;
use crate::translation::{ChunkTranslator, RunSignals, TranslationClient};

// @module: Application controller for batch document translation

/// Main application controller
pub struct Controller {
    // @field: App configuration
    config: Config,
    // @field: Where translated files are written
    output_dir: PathBuf,
    coordinator: Coordinator,
}

impl Controller {
    // @method: Create a controller talking to the configured remote service
    pub fn with_config(config: Config, output_dir: impl Into<PathBuf>) -> Result<Self> {
        let provider = Gemini::new(
            config.api_key.clone(),
            config.endpoint.clone(),
            config.model.id.clone(),
            config.request_timeout(),
            config.proxy.as_deref(),
        )
        .context("Failed to create the service client")?;
        Ok(Self::with_provider(config, output_dir, Arc::new(provider)))
    }

    // @method: Create a controller around any provider
    pub fn with_provider(config: Config, output_dir: impl Into<PathBuf>, provider: Arc<dyn Provider>) -> Self {
        let output_dir = output_dir.into();
        let client = TranslationClient::from_config(provider, &config, RunSignals::new());
        let translator = ChunkTranslator::new(client, &config);
        let coordinator = Coordinator::new(translator, &config, output_dir.clone());
        Self {
            config,
            output_dir,
            coordinator,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Handle used to finish or cancel the run, e.g. from a signal handler
    pub fn control(&self) -> RunControl {
        self.coordinator.control()
    }

    /// Translate every supported document found in `inputs`
    pub async fn run(&self, inputs: &[PathBuf]) -> Result<RunSummary> {
        let start_time = Instant::now();
        FileManager::ensure_dir(&self.output_dir)?;

        let plan = plan_inputs(inputs, self.config.output_format);
        if plan.is_empty() && plan.rejected.is_empty() {
            return Err(anyhow!("No supported documents found in {:?}", inputs));
        }

        let language = language_utils::get_language_name(&self.config.target_language)
            .unwrap_or_else(|_| self.config.target_language.clone());
        info!(
            "🚀 YADTwAI: {} -> {} ({} output)",
            self.config.model.id, language, self.config.output_format
        );

        let (sender, receiver) = progress_channel();
        let display = tokio::spawn(Self::show_progress(receiver));
        let summary = self.coordinator.run(plan, Some(sender)).await;
        if let Err(e) = display.await {
            warn!("Progress display stopped: {}", e);
        }

        Self::log_summary(&summary, start_time.elapsed());
        Ok(summary)
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} tasks ({percent}%) {msg} {eta}")
            .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%) {msg}"))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░")
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("  {spinner:.cyan} {msg} chunk {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }

    // @consumes: Progress events until the run reports its summary
    async fn show_progress(mut receiver: ProgressReceiver) {
        let multi_progress = MultiProgress::new();
        let total_bar = multi_progress.add(ProgressBar::new(0));
        total_bar.set_style(Self::bar_style());
        total_bar.enable_steady_tick(Duration::from_millis(120));
        let mut spinners: HashMap<String, ProgressBar> = HashMap::new();

        while let Some(event) = receiver.recv().await {
            match event {
                ProgressEvent::TotalTasks(total) => total_bar.set_length(total as u64),
                ProgressEvent::TaskFinished { processed } => total_bar.set_position(processed as u64),
                ProgressEvent::Status(message) => total_bar.set_message(message),
                ProgressEvent::ChunkProgress { label, done, total } => {
                    if total <= 1 {
                        continue;
                    }
                    let spinner = spinners.entry(label.clone()).or_insert_with(|| {
                        let spinner = multi_progress.add(ProgressBar::new(total as u64));
                        spinner.set_style(Self::spinner_style());
                        spinner.set_message(label);
                        spinner
                    });
                    spinner.set_position(done as u64);
                    if done >= total {
                        spinner.finish_and_clear();
                    }
                }
                ProgressEvent::Finished(_) => break,
            }
            spinners.retain(|_, spinner| !spinner.is_finished());
        }

        for spinner in spinners.values() {
            spinner.finish_and_clear();
        }
        total_bar.finish_and_clear();
    }

    fn log_summary(summary: &RunSummary, elapsed: Duration) {
        for record in &summary.errors {
            error!("{}", record);
        }
        for (origin, warning) in &summary.warnings {
            warn!("{}: {}", origin, warning);
        }
        let message = format!(
            "Run {} in {}: {} of {} task(s) succeeded, {} failed",
            summary.outcome,
            Self::format_duration(elapsed),
            summary.success_count,
            summary.total_tasks,
            summary.error_count
        );
        match summary.outcome {
            Outcome::Completed if summary.error_count == 0 => info!("{}", message),
            Outcome::Critical => error!("{}", message),
            _ => warn!("{}", message),
        }
    }

    // @returns: Human-readable duration
    fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.as_secs();
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}.{:03}s", seconds, duration.subsec_millis())
        }
    }
}
