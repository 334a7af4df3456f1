use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct BackofficeConfig {
    pub database_url: String,
    /// Identifiers (emails or usernames) granted admin access
    pub admin_identifiers: Vec<String>,
    /// Wall-clock ceiling for a single batch commit, in seconds
    pub batch_timeout_secs: u64,
}

impl BackofficeConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            admin_identifiers: env::var("ADMIN_IDENTIFIERS")
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            batch_timeout_secs: env::var("BATCH_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("BATCH_TIMEOUT_SECS must be a valid number")?,
        })
    }
}
