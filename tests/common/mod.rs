/*!
 * Common test utilities for the yadtwai test suite
 */

#![allow(dead_code)]

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use yadtwai::app_config::{ChunkingConfig, Config, OutputFormat, RetryConfig};
use yadtwai::coordinator::Coordinator;
use yadtwai::providers::mock::MockProvider;
use yadtwai::translation::{ChunkTranslator, RunSignals, TranslationClient};

pub mod epub_fixture;

/// Route crate logs through the test harness; `RUST_LOG` picks the level
pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Creates a test file with the given content in the specified directory
pub fn create_test_file(dir: &Path, filename: &str, content: &str) -> Result<PathBuf> {
    let file_path = dir.join(filename);
    fs::write(&file_path, content)?;
    Ok(file_path)
}

/// Config whose prompt is the bare chunk, so echo-style mocks see only the text
pub fn test_config(format: OutputFormat) -> Config {
    Config {
        api_key: "test-key".to_string(),
        prompt_template: "{text}".to_string(),
        output_format: format,
        concurrency: 2,
        chunking: ChunkingConfig {
            enabled: true,
            limit: 60,
            window: 10,
            min_chunk_size: 20,
        },
        retry: RetryConfig {
            max_attempts: 3,
            base_delay_secs: 1.0,
            tick_ms: 100,
        },
        ..Config::default()
    }
}

/// Stand-in translation: marks every non-empty line
pub fn fake_translate(prompt: &str) -> String {
    prompt
        .lines()
        .map(|line| {
            if line.trim().is_empty() || line.starts_with("<||img_placeholder_") {
                line.to_string()
            } else {
                format!("{} [ru]", line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Mock provider that answers with `fake_translate`
pub fn translating_mock() -> MockProvider {
    MockProvider::working().with_responder(fake_translate)
}

/// Chunk translator over `provider` with fresh signals
pub fn translator(provider: MockProvider, config: &Config) -> (ChunkTranslator, RunSignals) {
    let signals = RunSignals::new();
    let client = TranslationClient::from_config(Arc::new(provider), config, signals.clone());
    (ChunkTranslator::new(client, config), signals)
}

/// Coordinator writing into `output_dir`
pub fn coordinator(provider: MockProvider, config: &Config, output_dir: &Path) -> (Coordinator, RunSignals) {
    init_test_logging();
    let (translator, signals) = translator(provider, config);
    (Coordinator::new(translator, config, output_dir), signals)
}

/// `count` paragraphs, each long enough to become its own chunk under `test_config`
pub fn paragraphs(count: usize) -> String {
    (1..=count)
        .map(|i| format!("Paragraph number {} talks about the weather in some detail.", i))
        .collect::<Vec<_>>()
        .join("\n\n")
}
