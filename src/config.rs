// HTTP client configuration for the backing service

use anyhow::{Context, Result};
use std::env;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Initialization error: {0}")]
    InitError(String),
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    // Pre-authenticated session token, sent as a bearer credential
    pub api_token: Option<String>,
    pub timeout_ms: u64,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3333".to_string(),
            api_token: None,
            timeout_ms: 10_000,
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ClientConfig {
    pub const BASE_URL_VAR: &'static str = "BOOKING_API_BASE_URL";
    pub const TOKEN_VAR: &'static str = "BOOKING_API_TOKEN";
    pub const TIMEOUT_VAR: &'static str = "BOOKING_API_TIMEOUT_MS";
    pub const USER_AGENT_VAR: &'static str = "BOOKING_API_USER_AGENT";

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    // Split out so tests don't have to touch the process environment
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let base_url = lookup(Self::BASE_URL_VAR)
            .with_context(|| format!("{} must be set", Self::BASE_URL_VAR))?;

        let timeout_ms = match lookup(Self::TIMEOUT_VAR) {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("{} must be a number of milliseconds", Self::TIMEOUT_VAR))?,
            None => defaults.timeout_ms,
        };

        let config = Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: lookup(Self::TOKEN_VAR).filter(|token| !token.is_empty()),
            timeout_ms,
            user_agent: lookup(Self::USER_AGENT_VAR).unwrap_or(defaults.user_agent),
        };

        config.validate().context("invalid backing service configuration")?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ClientError::ConfigError(format!(
                "base_url must be an http(s) URL, got '{}'",
                self.base_url
            )));
        }
        if self.timeout_ms == 0 {
            return Err(ClientError::ConfigError(
                "timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
