/*!
 * Tests for configuration loading and validation
 */

use std::str::FromStr;

use yadtwai::app_config::{Config, ModelConfig, OutputFormat};

use crate::common::test_config;

#[test]
fn test_default_config_shouldBeValid() {
    let config = Config::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.target_language, "ru");
    assert_eq!(config.retry.max_attempts, 3);
    assert!(config.prompt_template.contains("{text}"));
}

#[test]
fn test_deserialize_partialJson_shouldFillDefaults() {
    let json = r#"{ "api_key": "k", "target_language": "de", "output_format": "epub", "concurrency": 3 }"#;
    let config: Config = serde_json::from_str(json).unwrap();
    assert_eq!(config.api_key, "k");
    assert_eq!(config.output_format, OutputFormat::Epub);
    assert_eq!(config.concurrency, 3);
    assert_eq!(config.chunking, Config::default().chunking);
    assert!(config.validate().is_ok());
}

#[test]
fn test_validate_withBadValues_shouldFail() {
    let mut config = test_config(OutputFormat::Txt);
    config.concurrency = 0;
    assert!(config.validate().is_err());

    let mut config = test_config(OutputFormat::Txt);
    config.prompt_template = "Translate this".to_string();
    assert!(config.validate().is_err());

    let mut config = test_config(OutputFormat::Txt);
    config.target_language = "xx-not-a-language".to_string();
    assert!(config.validate().is_err());

    let mut config = test_config(OutputFormat::Txt);
    config.chunking.min_chunk_size = config.chunking.limit;
    assert!(config.validate().is_err());

    let mut config = test_config(OutputFormat::Txt);
    config.retry.max_attempts = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_proxy_shouldAcceptKnownSchemesOnly() {
    let mut config = test_config(OutputFormat::Txt);
    for proxy in ["http://127.0.0.1:8080", "socks5://localhost:1080", "socks5h://proxy:9050", "10.0.0.1:3128"] {
        config.proxy = Some(proxy.to_string());
        assert!(config.validate().is_ok(), "{} should be accepted", proxy);
    }
    config.proxy = Some("ftp://example.com:21".to_string());
    assert!(config.validate().is_err());
}

#[test]
fn test_renderPrompt_shouldSubstituteLanguageAndText() {
    let mut config = Config::default();
    config.prompt_template = "Into {target_language}: {text}".to_string();
    config.target_language = "fr".to_string();
    assert_eq!(config.render_prompt("bonjour?"), "Into French: bonjour?");
}

#[test]
fn test_outputFormat_fromStr_shouldAcceptDotsAndCase() {
    assert_eq!(OutputFormat::from_str("EPUB").unwrap(), OutputFormat::Epub);
    assert_eq!(OutputFormat::from_str(".md").unwrap(), OutputFormat::Md);
    assert!(OutputFormat::from_str("pdf").is_err());
    assert!(OutputFormat::Txt.joins_with_blank_line());
    assert!(!OutputFormat::Html.joins_with_blank_line());
}

#[test]
fn test_modelPreset_shouldCarryRateAndChunking() {
    let flash = ModelConfig::preset("models/gemini-1.5-flash").unwrap();
    assert!(!flash.needs_chunking);
    let pro = ModelConfig::preset("models/gemini-1.5-pro").unwrap();
    assert_eq!(pro.post_request_delay_secs, 60);
    assert!(ModelConfig::preset("models/unknown").is_none());
}

#[test]
fn test_chunkingActive_shouldRequireModelSupport() {
    let mut config = Config::default();
    assert!(config.chunking_active());
    config.model.needs_chunking = false;
    assert!(!config.chunking_active());
}
