use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    /// JSON file backing the persistent store. In-memory when unset.
    pub storage_path: Option<PathBuf>,
    pub request_timeout: Duration,
    pub strict_storage_errors: bool,
    pub api_base_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            storage_path: std::env::var("STORAGE_PATH")
                .ok()
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
            request_timeout: Duration::from_millis(
                std::env::var("REQUEST_TIMEOUT_MS")
                    .unwrap_or_else(|_| "5000".to_string())
                    .parse::<u64>()
                    .context("REQUEST_TIMEOUT_MS must be a whole number of milliseconds")?,
            ),
            strict_storage_errors: parse_bool(
                &std::env::var("STRICT_STORAGE_ERRORS").unwrap_or_else(|_| "false".to_string()),
            )
            .context("STRICT_STORAGE_ERRORS must be true or false")?,
            api_base_url: require_env("API_BASE_URL")?,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => bail!("unrecognized boolean `{other}`"),
    }
}
