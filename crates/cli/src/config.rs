//! Process configuration, read once from the environment at startup.

use std::path::PathBuf;

use {secrecy::Secret, thiserror::Error};

use codeglass_completion::{DEFAULT_API_BASE, DEFAULT_MODEL};

pub const DEFAULT_SESSIONS_DIR: &str = "./sessions";
pub const DEFAULT_OCR_LANGUAGES: &str = "eng+rus";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
}

/// Runtime settings. There are no command-line flags; the process is
/// configured entirely through the environment (after a `.env` pass).
#[derive(Debug)]
pub struct Config {
    pub telegram_token: Secret<String>,
    pub deepseek_api_key: Secret<String>,
    pub model: String,
    pub api_base: String,
    pub sessions_dir: PathBuf,
    pub ocr_languages: String,
    pub json_logs: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// An unset or empty required variable fails fast rather than surfacing
    /// as a per-message runtime error later.
    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| {
            get(name)
                .filter(|value| !value.is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        Ok(Self {
            telegram_token: Secret::new(required("TELEGRAM_BOT_TOKEN")?),
            deepseek_api_key: Secret::new(required("DEEPSEEK_API_KEY")?),
            model: get("DEEPSEEK_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_base: get("DEEPSEEK_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            sessions_dir: get("CODEGLASS_SESSIONS_DIR")
                .map_or_else(|| PathBuf::from(DEFAULT_SESSIONS_DIR), PathBuf::from),
            ocr_languages: get("CODEGLASS_OCR_LANGUAGES")
                .unwrap_or_else(|| DEFAULT_OCR_LANGUAGES.to_string()),
            json_logs: get("CODEGLASS_JSON_LOGS").is_some(),
        })
    }
}
