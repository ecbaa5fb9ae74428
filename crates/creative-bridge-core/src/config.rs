use serde::Deserialize;
use validator::{Validate, ValidationErrors};

use crate::validation::DEFAULT_SNIPPET_DOMAIN;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("toml parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("validation error: {0}")]
    Invalid(#[from] ValidationErrors),
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoggingConfig {
    pub level: log::LevelFilter,
}

fn default_snippet_domain() -> String {
    DEFAULT_SNIPPET_DOMAIN.to_string()
}

fn default_fetch_timeout_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SnippetProviderConfig {
    #[serde(default = "default_snippet_domain")]
    #[validate(length(min = 1))]
    pub domain: String,
    #[serde(default = "default_fetch_timeout_ms")]
    #[validate(range(min = 1, max = 300_000))]
    pub fetch_timeout_ms: u64,
}

impl Default for SnippetProviderConfig {
    fn default() -> Self {
        Self {
            domain: default_snippet_domain(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
        }
    }
}

fn default_page_size() -> usize {
    100
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ProcessingConfig {
    #[serde(default = "default_page_size")]
    #[validate(range(min = 1, max = 1000))]
    pub page_size: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct DspConfig {
    #[serde(default)]
    #[validate(length(min = 1))]
    pub default_advertiser_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AppConfig {
    #[validate(nested)]
    pub logging: LoggingConfig,
    #[serde(default)]
    #[validate(nested)]
    pub snippet_provider: SnippetProviderConfig,
    #[serde(default)]
    #[validate(nested)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    #[validate(nested)]
    pub dsp: DspConfig,
}

impl AppConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, SettingsError> {
        let cfg: AppConfig = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_config_parses_valid_levels() {
        let cases = [
            ("off", log::LevelFilter::Off),
            ("error", log::LevelFilter::Error),
            ("warn", log::LevelFilter::Warn),
            ("info", log::LevelFilter::Info),
            ("debug", log::LevelFilter::Debug),
            ("trace", log::LevelFilter::Trace),
        ];
        for (lvl, expected) in cases {
            let toml_str = format!("[logging]\nlevel = \"{}\"\n", lvl);
            let cfg = AppConfig::from_toml_str(&toml_str).expect("should parse valid config");
            assert_eq!(cfg.logging.level, expected);
        }
    }

    #[test]
    fn app_config_fills_section_defaults() {
        let cfg = AppConfig::from_toml_str("[logging]\nlevel = \"info\"\n").unwrap();
        assert_eq!(cfg.snippet_provider.domain, "snippet.kargo.com");
        assert_eq!(cfg.snippet_provider.fetch_timeout_ms, 30_000);
        assert_eq!(cfg.processing.page_size, 100);
        assert!(cfg.dsp.default_advertiser_id.is_none());
    }

    #[test]
    fn app_config_reads_every_section() {
        let toml_str = r#"
[logging]
level = "debug"

[snippet_provider]
domain = "snippets.test"
fetch_timeout_ms = 250

[processing]
page_size = 20

[dsp]
default_advertiser_id = "ADV-42"
"#;
        let cfg = AppConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(cfg.snippet_provider.domain, "snippets.test");
        assert_eq!(cfg.snippet_provider.fetch_timeout_ms, 250);
        assert_eq!(cfg.processing.page_size, 20);
        assert_eq!(cfg.dsp.default_advertiser_id.as_deref(), Some("ADV-42"));
    }

    #[test]
    fn app_config_rejects_invalid_level() {
        let toml_str = "[logging]\nlevel = \"verbose\"\n";
        let err = AppConfig::from_toml_str(toml_str).err().expect("should error");
        assert!(matches!(err, SettingsError::Parse(_)));
        assert!(err.to_string().contains("toml parse error"));
    }

    #[test]
    fn app_config_validates_ranges_and_lengths() {
        let zero_timeout = "[logging]\nlevel = \"info\"\n[snippet_provider]\nfetch_timeout_ms = 0\n";
        let err = AppConfig::from_toml_str(zero_timeout).err().expect("should error");
        assert!(matches!(err, SettingsError::Invalid(_)));

        let empty_domain = "[logging]\nlevel = \"info\"\n[snippet_provider]\ndomain = \"\"\n";
        assert!(AppConfig::from_toml_str(empty_domain).is_err());

        let empty_advertiser = "[logging]\nlevel = \"info\"\n[dsp]\ndefault_advertiser_id = \"\"\n";
        // error originates from validator; don't rely on exact text
        let err = AppConfig::from_toml_str(empty_advertiser).err().expect("should error");
        assert!(err.to_string().to_lowercase().contains("valid"));
    }
}
