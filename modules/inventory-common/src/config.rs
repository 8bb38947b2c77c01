use std::env;

use tracing::info;

use crate::error::{InventoryError, Result};

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Dgraph
    pub dgraph_endpoint: String,
    pub dgraph_access_token: Option<String>,
    pub dgraph_timeout_secs: u64,

    // Query policy
    pub public_queries: bool,
}

impl Config {
    /// Load configuration from environment variables.
    /// Every variable has a default; malformed values are reported, not defaulted.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            dgraph_endpoint: env::var("DGRAPH_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:8080".to_string())
                .trim_end_matches('/')
                .to_string(),
            dgraph_access_token: env::var("DGRAPH_ACCESS_TOKEN")
                .ok()
                .filter(|t| !t.is_empty()),
            dgraph_timeout_secs: parse_env("DGRAPH_TIMEOUT_SECS", 30)?,
            public_queries: parse_env("INVENTORY_PUBLIC_QUERIES", true)?,
        })
    }

    /// Log the effective configuration with secrets masked.
    pub fn log_redacted(&self) {
        info!(
            dgraph_endpoint = %self.dgraph_endpoint,
            dgraph_access_token = if self.dgraph_access_token.is_some() { "***" } else { "<unset>" },
            dgraph_timeout_secs = self.dgraph_timeout_secs,
            public_queries = self.public_queries,
            "Configuration loaded"
        );
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| InventoryError::Config(format!("{key} has an invalid value: {raw}"))),
        _ => Ok(default),
    }
}
