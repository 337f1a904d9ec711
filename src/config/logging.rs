//! # Logging Configuration
//!
//! Explicit logging setup for the operator binaries. `RUST_LOG`, when set,
//! takes precedence over `LOG_LEVEL`.

use super::controller::{env_var_or_default_bool, env_var_or_default_str};
use anyhow::Result;
use std::str::FromStr;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "text" | "pretty" | "plain" => Ok(LogFormat::Text),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE)
    pub level: String,
    pub format: LogFormat,
    /// Enable color in text format logs
    pub color: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: crate::constants::DEFAULT_LOG_LEVEL.to_string(),
            format: LogFormat::Json,
            color: false,
        }
    }
}

impl LogConfig {
    #[must_use]
    pub fn from_env() -> Self {
        use crate::constants::*;
        Self {
            level: env_var_or_default_str("LOG_LEVEL", DEFAULT_LOG_LEVEL),
            format: env_var_or_default_str("LOG_FORMAT", DEFAULT_LOG_FORMAT)
                .parse()
                .unwrap_or_default(),
            color: env_var_or_default_bool("LOG_ENABLE_COLOR", false),
        }
    }

    /// Failed unwrap attempts are expected when a document lists several
    /// master keys, so they are only loud at debug verbosity and above.
    #[must_use]
    pub fn log_unwrap_failures(&self) -> bool {
        matches!(self.level.to_ascii_lowercase().as_str(), "debug" | "trace")
    }

    /// Filter directives for this configuration.
    #[must_use]
    pub fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let level = self.level.to_ascii_lowercase();
            EnvFilter::new(format!("{level},kube_runtime=warn,hyper=warn,tower=warn"))
        })
    }

    /// Install the global tracing subscriber.
    ///
    /// # Errors
    ///
    /// Fails when a global subscriber is already installed.
    pub fn init(&self) -> Result<()> {
        let builder = tracing_subscriber::fmt().with_env_filter(self.filter());
        match self.format {
            LogFormat::Json => builder.json().try_init(),
            LogFormat::Text => builder.with_ansi(self.color).try_init(),
        }
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {e}"))
    }
}
