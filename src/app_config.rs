use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::time::Duration;

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// API key for the generation service
    #[serde(default)]
    pub api_key: String,

    /// Service endpoint URL (empty means the public default)
    #[serde(default)]
    pub endpoint: String,

    /// Model in use
    #[serde(default)]
    pub model: ModelConfig,

    /// Target language code (ISO)
    #[serde(default = "default_target_language")]
    pub target_language: String,

    /// Prompt template; `{text}` is replaced by the chunk
    #[serde(default = "default_prompt_template")]
    pub prompt_template: String,

    /// Temperature parameter for text generation
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Output format for translated documents
    #[serde(default)]
    pub output_format: OutputFormat,

    /// Size of the worker pool
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Chunking settings
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Retry policy for remote calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Delay between two chunks of the same fragment, in seconds
    #[serde(default)]
    pub chunk_delay_secs: f64,

    /// Overall per-call timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Outbound proxy (`http://`, `https://`, `socks5://`, `socks5h://` or bare `host:port`)
    #[serde(default)]
    pub proxy: Option<String>,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Model description, fixed per model id
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ModelConfig {
    // @field: Model identifier as the service knows it
    #[serde(default = "default_model_id")]
    pub id: String,

    // @field: Requests per minute allowed by the service tier
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,

    // @field: Whether long inputs should be chunked for this model
    #[serde(default = "default_true")]
    pub needs_chunking: bool,

    // @field: Fixed pause after every successful call, in seconds
    #[serde(default)]
    pub post_request_delay_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            id: default_model_id(),
            requests_per_minute: default_requests_per_minute(),
            needs_chunking: true,
            post_request_delay_secs: 0,
        }
    }
}

impl ModelConfig {
    /// Known model presets
    pub fn preset(id: &str) -> Option<Self> {
        let (rpm, needs_chunking, delay) = match id {
            "models/gemini-2.5-flash-preview-04-17" => (10, true, 0),
            "models/gemini-2.5-pro-exp-03-25" => (5, true, 60),
            "models/gemini-2.0-flash" => (15, true, 0),
            "models/gemini-2.0-flash-lite" => (30, true, 0),
            "models/gemini-1.5-flash" => (15, false, 0),
            "models/gemini-1.5-pro" => (2, true, 60),
            _ => return None,
        };
        Some(Self {
            id: id.to_string(),
            requests_per_minute: rpm,
            needs_chunking,
            post_request_delay_secs: delay,
        })
    }

    pub fn post_request_delay(&self) -> Duration {
        Duration::from_secs(self.post_request_delay_secs)
    }

    /// Concurrency that stays within the model's rate budget
    pub fn suggested_concurrency(&self) -> usize {
        (self.requests_per_minute as usize).clamp(1, 8)
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(anyhow!("Model id must not be empty"));
        }
        if self.requests_per_minute == 0 {
            return Err(anyhow!("Model {} must allow at least one request per minute", self.id));
        }
        Ok(())
    }
}

/// Chunk splitting settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChunkingConfig {
    /// Split long inputs at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Characters per chunk before splitting kicks in
    #[serde(default = "default_chunk_limit")]
    pub limit: usize,

    /// Characters searched around the ideal cut
    #[serde(default = "default_chunk_window")]
    pub window: usize,

    /// Smallest chunk the splitter may produce
    #[serde(default = "default_min_chunk_size")]
    pub min_chunk_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            limit: default_chunk_limit(),
            window: default_chunk_window(),
            min_chunk_size: default_min_chunk_size(),
        }
    }
}

/// Retry policy for remote calls
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts per call
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff base in seconds, doubled on each retry
    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: f64,

    /// Sleep granularity for cancellation checks, in milliseconds
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_secs: default_base_delay_secs(),
            tick_ms: default_tick_ms(),
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_secs_f64(self.base_delay_secs.max(0.0))
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

/// Output format for translated documents
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Txt,
    Md,
    Docx,
    Epub,
    Fb2,
    Html,
}

impl OutputFormat {
    // @returns: File extension without dot
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Txt => "txt",
            Self::Md => "md",
            Self::Docx => "docx",
            Self::Epub => "epub",
            Self::Fb2 => "fb2",
            Self::Html => "html",
        }
    }

    /// Whether chunk results are joined with blank lines
    pub fn joins_with_blank_line(&self) -> bool {
        matches!(self, Self::Txt | Self::Md)
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().trim_start_matches('.') {
            "txt" => Ok(Self::Txt),
            "md" => Ok(Self::Md),
            "docx" => Ok(Self::Docx),
            "epub" => Ok(Self::Epub),
            "fb2" => Ok(Self::Fb2),
            "html" => Ok(Self::Html),
            _ => Err(anyhow!("Invalid output format: {}", s)),
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            Self::Error => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }
}

fn default_concurrency() -> usize {
    4
}

fn default_chunk_limit() -> usize {
    900_000
}

fn default_chunk_window() -> usize {
    500
}

fn default_min_chunk_size() -> usize {
    500
}

fn default_request_timeout_secs() -> u64 {
    600
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_secs() -> f64 {
    25.0 // doubled on each retry
}

fn default_tick_ms() -> u64 {
    1000
}

fn default_temperature() -> f32 {
    1.0
}

fn default_requests_per_minute() -> u32 {
    10
}

fn default_true() -> bool {
    true
}

fn default_model_id() -> String {
    "models/gemini-2.0-flash".to_string()
}

fn default_target_language() -> String {
    "ru".to_string()
}

fn default_prompt_template() -> String {
    "Translate the following text into {target_language}. Keep paragraph structure and Markdown-style markup. \
Copy every token of the form <||img_placeholder_...||> unchanged and in place. Output only the translation.\n\n{text}"
        .to_string()
}

impl Config {
    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        self.model.validate()?;

        let _target_name = crate::language_utils::get_language_name(&self.target_language)?;

        if !self.prompt_template.contains("{text}") {
            return Err(anyhow!("Prompt template must contain the {{text}} placeholder"));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(anyhow!("Temperature must be between 0.0 and 2.0, got {}", self.temperature));
        }

        if self.concurrency == 0 {
            return Err(anyhow!("Concurrency must be at least 1"));
        }

        if self.chunking.min_chunk_size == 0 || self.chunking.limit <= self.chunking.min_chunk_size {
            return Err(anyhow!(
                "Chunk limit ({}) must exceed the minimum chunk size ({}), which must be positive",
                self.chunking.limit,
                self.chunking.min_chunk_size
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(anyhow!("Retry attempts must be at least 1"));
        }

        if self.chunk_delay_secs < 0.0 || self.retry.base_delay_secs < 0.0 {
            return Err(anyhow!("Delays must not be negative"));
        }

        if let Some(proxy) = self.proxy.as_deref().filter(|p| !p.trim().is_empty()) {
            let normalized = crate::providers::gemini::normalize_proxy_url(proxy);
            let parsed = url::Url::parse(&normalized)
                .map_err(|e| anyhow!("Invalid proxy URL '{}': {}", proxy, e))?;
            if !matches!(parsed.scheme(), "http" | "https" | "socks5" | "socks5h") {
                return Err(anyhow!("Unsupported proxy scheme: {}", parsed.scheme()));
            }
            if parsed.host_str().is_none() {
                return Err(anyhow!("Proxy URL has no host: {}", proxy));
            }
        }

        Ok(())
    }

    /// Build the prompt for one chunk
    pub fn render_prompt(&self, chunk: &str) -> String {
        let language = crate::language_utils::get_language_name(&self.target_language)
            .unwrap_or_else(|_| self.target_language.clone());
        self.prompt_template
            .replace("{target_language}", &language)
            .replace("{text}", chunk)
    }

    pub fn chunk_delay(&self) -> Duration {
        Duration::from_secs_f64(self.chunk_delay_secs.max(0.0))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Chunking is applied only when enabled and the model wants it
    pub fn chunking_active(&self) -> bool {
        self.chunking.enabled && self.model.needs_chunking
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            api_key: String::new(),
            endpoint: String::new(),
            model: ModelConfig::default(),
            target_language: default_target_language(),
            prompt_template: default_prompt_template(),
            temperature: default_temperature(),
            output_format: OutputFormat::default(),
            concurrency: default_concurrency(),
            chunking: ChunkingConfig::default(),
            retry: RetryConfig::default(),
            chunk_delay_secs: 0.0,
            request_timeout_secs: default_request_timeout_secs(),
            proxy: None,
            log_level: LogLevel::default(),
        }
    }
}
