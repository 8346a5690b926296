use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::billing::registry::ModelId;
use crate::generation::cache_manager::CacheSettings;

/// Application configuration loaded from environment variables.
/// Fails at startup on malformed values or when no LLM provider key is set.
#[derive(Debug, Clone)]
pub struct Config {
    /// Without a database the service runs on in-memory stores.
    pub database_url: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub port: u16,
    pub rust_log: String,
    pub lock_wait_timeout: Duration,
    pub generation_timeout: Duration,
    pub default_model: ModelId,
    pub signup_bonus_credits: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let config = Config {
            database_url: optional_env("DATABASE_URL"),
            anthropic_api_key: optional_env("ANTHROPIC_API_KEY"),
            openai_api_key: optional_env("OPENAI_API_KEY"),
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            lock_wait_timeout: Duration::from_secs(parse_env("LOCK_WAIT_TIMEOUT_SECS", 120)?),
            generation_timeout: Duration::from_secs(parse_env("GENERATION_TIMEOUT_SECS", 180)?),
            default_model: match optional_env("DEFAULT_MODEL") {
                Some(raw) => raw
                    .parse()
                    .with_context(|| format!("DEFAULT_MODEL '{raw}' is not a known model"))?,
                None => ModelId::Gpt41Mini,
            },
            signup_bonus_credits: parse_env("SIGNUP_BONUS_CREDITS", 0)?,
        };

        if config.anthropic_api_key.is_none() && config.openai_api_key.is_none() {
            bail!("Set at least one of ANTHROPIC_API_KEY or OPENAI_API_KEY");
        }
        Ok(config)
    }

    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            lock_wait_timeout: self.lock_wait_timeout,
            generation_timeout: self.generation_timeout,
            default_model: self.default_model,
        }
    }
}

/// Unset and blank both count as absent.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid number, got '{raw}'")),
        None => Ok(default),
    }
}
