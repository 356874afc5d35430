use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

#[derive(Clone)]
pub struct Config {
    pub github_app_id: u64,
    pub github_private_key: String,
    pub github_webhook_secret: String,
    pub openai_api_key: String,
    pub port: u16,
    /// Directory for persistent state (SQLite database).
    /// Defaults to current working directory.
    pub state_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let github_app_id = env::var("GITHUB_APP_ID")
            .context("GITHUB_APP_ID environment variable is required")?
            .parse::<u64>()
            .context("GITHUB_APP_ID must be a valid number")?;

        let github_private_key = env::var("GITHUB_PRIVATE_KEY")
            .context("GITHUB_PRIVATE_KEY environment variable is required")?
            .replace("\\n", "\n");

        let github_webhook_secret = env::var("GITHUB_WEBHOOK_SECRET")
            .context("GITHUB_WEBHOOK_SECRET environment variable is required")?;

        let openai_api_key = env::var("OPENAI_API_KEY")
            .context("OPENAI_API_KEY environment variable is required")?;

        let port = parse_port(env::var("PORT").ok())?;

        let state_dir = env::var("STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));

        Ok(Config {
            github_app_id,
            github_private_key,
            github_webhook_secret,
            openai_api_key,
            port,
            state_dir,
        })
    }
}

/// Parse PORT from an optional string value, defaulting to 3000.
pub fn parse_port(value: Option<String>) -> Result<u16> {
    value
        .unwrap_or_else(|| "3000".to_string())
        .parse::<u16>()
        .context("PORT must be a valid number")
}
