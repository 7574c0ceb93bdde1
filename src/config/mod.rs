//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing.
//! Sensitive values wrapped in secrecy::SecretString to prevent log leaks.

use secrecy::SecretString;

use crate::error::{Error, Result};

const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_INSTRUCTION: &str = "You are a helpful assistant. Respond briefly and directly.";

#[derive(Debug)]
pub struct Config {
    pub anthropic_api_key: SecretString,
    pub model: String,
    pub instruction: String,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            anthropic_api_key: SecretString::from(required_var("ANTHROPIC_API_KEY")?),
            model: std::env::var("AGENT_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            instruction: std::env::var("AGENT_INSTRUCTION")
                .unwrap_or_else(|_| DEFAULT_INSTRUCTION.to_string()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}
