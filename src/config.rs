use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

/// Application configuration, loaded from environment variables / .env.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Bind address for the HTTP server.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// OMDb API key. Required, no default.
    pub omdb_api_key: String,

    /// Base URL of the OMDb API.
    #[serde(default = "default_omdb_base_url")]
    pub omdb_base_url: String,

    /// Per-request timeout for calls to the movie API, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Maximum number of detail lookups in flight at once (1 = sequential).
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Maximum number of search hits to fetch details for (0 = no cap).
    #[serde(default)]
    pub max_results: usize,

    /// How long shutdown waits for an active search before forcing it, in seconds.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    /// Optional HTTP proxy for outbound API calls.
    #[serde(default)]
    pub proxy: Option<String>,
}

fn default_bind() -> String {
    "0.0.0.0:3000".to_string()
}
fn default_omdb_base_url() -> String {
    "https://www.omdbapi.com/".to_string()
}
fn default_request_timeout_secs() -> u64 {
    20
}
fn default_max_concurrent() -> usize {
    4
}
fn default_shutdown_grace_secs() -> u64 {
    10
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env if present; it may not exist
        let _ = dotenvy::dotenv();

        let config = envy::from_env::<AppConfig>()
            .context("Failed to load config from environment (is OMDB_API_KEY set?)")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.omdb_api_key.trim().is_empty() {
            anyhow::bail!("OMDB_API_KEY must not be empty");
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}
