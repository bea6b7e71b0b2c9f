//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! The host init data is referenced by env-var name in the config and
//! resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::sync::{IdentityFallback, SyncConfig};
use crate::types::DeskError;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub session: SessionConfig,
    pub gateway: GatewayConfig,
    pub sync: SyncSection,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    pub name: String,
    pub currency: String,
    /// Env var holding the host init data (absent outside the host).
    pub init_data_env: String,
    /// Chat bot that referral links point at.
    #[serde(default = "default_bot_username")]
    pub bot_username: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_transactions_limit")]
    pub transactions_limit: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncSection {
    pub identity_timeout_ms: u64,
    pub min_dwell_ms: u64,
    /// `"decline"` or `"proceed_anonymous"`.
    #[serde(default)]
    pub identity_fallback: IdentityFallback,
}

fn default_bot_username() -> String {
    "exchangeali_bot".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_transactions_limit() -> u32 {
    50
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse and validate configuration text.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), DeskError> {
        if self.gateway.base_url.trim().is_empty() {
            return Err(DeskError::Config("gateway.base_url is empty".into()));
        }
        if self.gateway.transactions_limit == 0 {
            return Err(DeskError::Config("gateway.transactions_limit must be > 0".into()));
        }
        if self.sync.identity_timeout_ms == 0 {
            return Err(DeskError::Config("sync.identity_timeout_ms must be > 0".into()));
        }
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// Controller settings derived from the `[sync]` and `[gateway]` sections.
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            identity_timeout: Duration::from_millis(self.sync.identity_timeout_ms),
            min_dwell: Duration::from_millis(self.sync.min_dwell_ms),
            fallback: self.sync.identity_fallback,
            transactions_limit: self.gateway.transactions_limit,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway.request_timeout_secs)
    }
}
