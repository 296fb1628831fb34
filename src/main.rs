// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result, anyhow};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, error, info, warn};
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use yadtwai::Controller;
use yadtwai::app_config::{self, Config, ModelConfig, OutputFormat};
use yadtwai::coordinator::RunControl;

/// CLI Wrapper for OutputFormat to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliOutputFormat {
    Txt,
    Md,
    Docx,
    Epub,
    Fb2,
    Html,
}

impl From<CliOutputFormat> for OutputFormat {
    fn from(cli_format: CliOutputFormat) -> Self {
        match cli_format {
            CliOutputFormat::Txt => OutputFormat::Txt,
            CliOutputFormat::Md => OutputFormat::Md,
            CliOutputFormat::Docx => OutputFormat::Docx,
            CliOutputFormat::Epub => OutputFormat::Epub,
            CliOutputFormat::Fb2 => OutputFormat::Fb2,
            CliOutputFormat::Html => OutputFormat::Html,
        }
    }
}

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Translate documents (default command)
    Translate(TranslateArgs),

    /// Generate shell completions for yadtwai
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Debug, Clone)]
struct TranslateArgs {
    /// Input documents or directories (.txt, .md, .docx, .html, .epub)
    #[arg(value_name = "INPUT")]
    inputs: Vec<PathBuf>,

    /// Output directory (default: next to the first input)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum)]
    format: Option<CliOutputFormat>,

    /// Model id to use for translation
    #[arg(short, long)]
    model: Option<String>,

    /// Target language code (e.g., 'ru', 'es', 'fr')
    #[arg(short, long)]
    target_language: Option<String>,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json")]
    config_path: String,

    /// Number of documents translated at once
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// Proxy URL (http, https, socks5, socks5h or bare host:port)
    #[arg(long)]
    proxy: Option<String>,

    /// Send every document as a single chunk
    #[arg(long)]
    no_chunking: bool,

    /// API key for the service
    #[arg(long, env = "YADTWAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,
}

/// YADTwAI - Yet Another Document Translator with AI
///
/// Translates books and documents through a remote text-generation service,
/// keeping images in place and rebuilding EPUBs.
#[derive(Parser, Debug)]
#[command(name = "yadtwai")]
#[command(version)]
#[command(about = "AI-powered document translation tool")]
#[command(args_conflicts_with_subcommands = true)]
#[command(long_about = "YADTwAI translates .txt, .md, .docx, .html and .epub documents with a remote AI service.

EXAMPLES:
    yadtwai book.epub -f epub                   # Rebuild a translated EPUB
    yadtwai notes.docx -f md -t de              # Translate to German Markdown
    yadtwai -j 8 -o out/ ~/books/               # Translate a whole directory
    yadtwai --proxy socks5h://127.0.0.1:9050 a.txt
    yadtwai completions bash > yadtwai.bash     # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. You can specify a different
    config file with --config-path. If the config file doesn't exist, a default one
    will be created automatically.

STOPPING:
    Press Ctrl-C once to finish: chunks in flight complete and partial results
    are saved. Press it again to cancel immediately.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    translate: TranslateArgs,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        log::set_boxed_logger(Box::new(CustomLogger { level: LevelFilter::Trace }))?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: Emoji for log level
    fn get_emoji_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "❌",
            Level::Warn => "🚧",
            Level::Info => " ",
            Level::Debug => "🔍",
            Level::Trace => "📋",
        }
    }

    // @returns: ANSI colour code for log level
    fn get_color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "1;31",
            Level::Warn => "1;33",
            Level::Info => "1;32",
            Level::Debug => "1;36",
            Level::Trace => "1;35",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level && metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let _ = writeln!(
                std::io::stderr(),
                "\x1B[{}m{} {} {}\x1B[0m",
                Self::get_color_for_level(record.level()),
                now,
                Self::get_emoji_for_level(record.level()),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = CustomLogger::init(LevelFilter::Info) {
        eprintln!("Failed to initialise logging: {}", e);
    }

    let cli = CommandLineOptions::parse();
    let result = match cli.command {
        Some(Commands::Completions { shell }) => {
            let mut cmd = CommandLineOptions::command();
            generate(shell, &mut cmd, "yadtwai", &mut std::io::stdout());
            Ok(true)
        }
        Some(Commands::Translate(args)) => run_translate(args).await,
        None => run_translate(cli.translate).await,
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

// @loads: Configuration from disk, creating a default file when missing
fn load_config(config_path: &str) -> Result<Config> {
    if Path::new(config_path).exists() {
        let file = File::open(config_path).context(format!("Failed to open config file: {}", config_path))?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader).context(format!("Failed to parse config file: {}", config_path))
    } else {
        warn!("Config file not found at '{}', creating default config.", config_path);
        let config = Config::default();
        let config_json =
            serde_json::to_string_pretty(&config).context("Failed to serialize default config to JSON")?;
        std::fs::write(config_path, config_json)
            .context(format!("Failed to write default config to file: {}", config_path))?;
        Ok(config)
    }
}

// @applies: Command line values over the loaded configuration
fn apply_overrides(config: &mut Config, options: &TranslateArgs) {
    if let Some(format) = &options.format {
        config.output_format = format.clone().into();
    }
    if let Some(model) = &options.model {
        config.model = ModelConfig::preset(model).unwrap_or_else(|| ModelConfig {
            id: model.clone(),
            ..config.model.clone()
        });
    }
    if let Some(target_lang) = &options.target_language {
        config.target_language = target_lang.clone();
    }
    if let Some(concurrency) = options.concurrency {
        config.concurrency = concurrency;
    }
    if let Some(proxy) = &options.proxy {
        config.proxy = Some(proxy.clone());
    }
    if options.no_chunking {
        config.chunking.enabled = false;
    }
    if let Some(api_key) = &options.api_key {
        config.api_key = api_key.clone();
    }
    if let Some(log_level) = &options.log_level {
        config.log_level = log_level.clone().into();
    }
}

fn default_output_dir(inputs: &[PathBuf]) -> PathBuf {
    match inputs.first() {
        Some(first) if first.is_dir() => first.clone(),
        Some(first) => first
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
        None => PathBuf::from("."),
    }
}

// @wires: Ctrl-C once to finish, twice to cancel
fn install_interrupt_handler(control: RunControl) {
    tokio::spawn(async move {
        let mut presses = 0;
        while tokio::signal::ctrl_c().await.is_ok() {
            presses += 1;
            if presses == 1 {
                warn!("Interrupted: finishing chunks in flight, press Ctrl-C again to cancel");
                control.finish();
            } else {
                control.cancel();
                break;
            }
        }
    });
}

/// Returns whether the run succeeded
async fn run_translate(options: TranslateArgs) -> Result<bool> {
    if let Some(cmd_log_level) = &options.log_level {
        let level: app_config::LogLevel = cmd_log_level.clone().into();
        log::set_max_level(level.to_level_filter());
    }

    if options.inputs.is_empty() {
        return Err(anyhow!("At least one INPUT is required"));
    }

    let mut config = load_config(&options.config_path)?;
    apply_overrides(&mut config, &options);
    config.validate().context("Configuration validation failed")?;

    if options.log_level.is_none() {
        log::set_max_level(config.log_level.to_level_filter());
    }
    if config.api_key.trim().is_empty() {
        warn!("No API key configured; set api_key in the config, --api-key or YADTWAI_API_KEY");
    }

    let output_dir = options.output_dir.clone().unwrap_or_else(|| default_output_dir(&options.inputs));
    let controller = Controller::with_config(config, output_dir)?;
    install_interrupt_handler(controller.control());

    let summary = controller.run(&options.inputs).await?;
    if !summary.is_failure() {
        info!("Success");
    }
    Ok(!summary.is_failure())
}
