use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::generation::generator::GenerationPolicy;
use crate::llm_client::{DEFAULT_BASE_URL, DEFAULT_MODEL};

/// Application configuration loaded from environment variables.
///
/// A missing `OPENAI_API_KEY` is not a startup error: the service boots and
/// reports a configuration error on each generation request instead.
#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_model: String,
    pub port: u16,
    pub rust_log: String,
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    pub backoff_step: Duration,
    pub generation_deadline: Option<Duration>,
    /// Inclusive bounds on the project description, in characters.
    pub min_input_chars: usize,
    pub max_input_chars: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let max_attempts: u32 = parse_or(&var, "GENERATION_MAX_ATTEMPTS", 3)?;
        let min_input_chars = parse_or(&var, "PITCH_MIN_CHARS", 10)?;
        let max_input_chars = parse_or(&var, "PITCH_MAX_CHARS", 2000)?;
        if min_input_chars > max_input_chars {
            anyhow::bail!("PITCH_MIN_CHARS ({min_input_chars}) exceeds PITCH_MAX_CHARS ({max_input_chars})");
        }

        Ok(Config {
            openai_api_key: lookup("OPENAI_API_KEY"),
            openai_base_url: var("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            openai_model: var("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            port: parse_or(&var, "PORT", 8082)?,
            rust_log: var("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            max_attempts: max_attempts.max(1),
            attempt_timeout: Duration::from_secs(parse_or(
                &var,
                "GENERATION_ATTEMPT_TIMEOUT_SECS",
                25,
            )?),
            backoff_step: Duration::from_millis(parse_or(&var, "GENERATION_BACKOFF_MS", 1000)?),
            generation_deadline: var("GENERATION_DEADLINE_SECS")
                .map(|v| parse_value::<u64>("GENERATION_DEADLINE_SECS", &v))
                .transpose()?
                .map(Duration::from_secs),
            min_input_chars,
            max_input_chars,
        })
    }

    pub fn generation_policy(&self) -> GenerationPolicy {
        GenerationPolicy {
            max_attempts: self.max_attempts,
            attempt_timeout: self.attempt_timeout,
            backoff_step: self.backoff_step,
            deadline: self.generation_deadline,
        }
    }
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(value) => parse_value(key, &value),
        None => Ok(default),
    }
}

fn parse_value<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse::<T>()
        .with_context(|| format!("{key} must be a valid number, got '{value}'"))
}
