//! # Controller Configuration
//!
//! Operator-level settings loaded from environment variables.

use super::logging::LogConfig;
use crate::sops::{EngineOptions, IntegrityMode};
use anyhow::Result;
use std::time::Duration;

/// Operator-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Delay before retrying a SopsSecret whose pass failed (minutes)
    pub requeue_decrypt_after_minutes: u64,
    /// Fibonacci backoff lower bound for API errors (minutes)
    pub backoff_min_minutes: u64,
    /// Fibonacci backoff upper bound for API errors (minutes)
    pub backoff_max_minutes: u64,
    /// Port of the metrics and probe server
    pub metrics_port: u16,
    /// How long to wait for the probe server to bind (seconds)
    pub server_startup_timeout_secs: u64,
    /// Readiness poll interval while waiting for the probe server (milliseconds)
    pub server_poll_interval_ms: u64,
    /// Namespace where the operator is deployed (key secret lookup)
    pub controller_namespace: String,
    /// Name of the secret holding PGP private keys and age identities
    pub sops_private_key_secret_name: String,
    /// Whether a MAC mismatch fails decryption
    pub integrity_mode: IntegrityMode,
    /// Maximum number of SopsSecrets reconciled concurrently
    pub max_concurrent_reconciliations: u16,
    /// Logging setup
    pub log: LogConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            requeue_decrypt_after_minutes: DEFAULT_REQUEUE_DECRYPT_AFTER_MINUTES,
            backoff_min_minutes: DEFAULT_BACKOFF_MIN_MINUTES,
            backoff_max_minutes: DEFAULT_BACKOFF_MAX_MINUTES,
            metrics_port: DEFAULT_METRICS_PORT,
            server_startup_timeout_secs: DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
            server_poll_interval_ms: DEFAULT_SERVER_POLL_INTERVAL_MS,
            controller_namespace: DEFAULT_CONTROLLER_NAMESPACE.to_string(),
            sops_private_key_secret_name: DEFAULT_SOPS_PRIVATE_KEY_SECRET_NAME.to_string(),
            integrity_mode: IntegrityMode::Relaxed,
            max_concurrent_reconciliations: DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            log: LogConfig::default(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    ///
    /// # Errors
    ///
    /// Fails when `SOPS_INTEGRITY_MODE` is set to something other than
    /// `relaxed` or `strict`, the same values the `--integrity-mode` flag accepts.
    pub fn from_env() -> Result<Self> {
        use crate::constants::*;
        Ok(Self {
            requeue_decrypt_after_minutes: env_var_or_default(
                "REQUEUE_DECRYPT_AFTER_MINUTES",
                DEFAULT_REQUEUE_DECRYPT_AFTER_MINUTES,
            ),
            backoff_min_minutes: env_var_or_default("BACKOFF_MIN_MINUTES", DEFAULT_BACKOFF_MIN_MINUTES),
            backoff_max_minutes: env_var_or_default("BACKOFF_MAX_MINUTES", DEFAULT_BACKOFF_MAX_MINUTES),
            metrics_port: env_var_or_default("METRICS_PORT", DEFAULT_METRICS_PORT),
            server_startup_timeout_secs: env_var_or_default(
                "SERVER_STARTUP_TIMEOUT_SECS",
                DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
            ),
            server_poll_interval_ms: env_var_or_default(
                "SERVER_POLL_INTERVAL_MS",
                DEFAULT_SERVER_POLL_INTERVAL_MS,
            ),
            controller_namespace: env_var_or_default_str("POD_NAMESPACE", DEFAULT_CONTROLLER_NAMESPACE),
            sops_private_key_secret_name: env_var_or_default_str(
                "SOPS_PRIVATE_KEY_SECRET_NAME",
                DEFAULT_SOPS_PRIVATE_KEY_SECRET_NAME,
            ),
            integrity_mode: parse_or_default(
                "SOPS_INTEGRITY_MODE",
                std::env::var("SOPS_INTEGRITY_MODE").ok(),
                IntegrityMode::Relaxed,
            )?,
            max_concurrent_reconciliations: env_var_or_default(
                "MAX_CONCURRENT_RECONCILIATIONS",
                DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            ),
            log: LogConfig::from_env(),
        })
    }

    /// Delay before a failed pass is retried
    #[must_use]
    pub fn requeue_duration(&self) -> Duration {
        Duration::from_secs(self.requeue_decrypt_after_minutes.saturating_mul(60))
    }

    #[must_use]
    pub fn server_startup_timeout(&self) -> Duration {
        Duration::from_secs(self.server_startup_timeout_secs)
    }

    #[must_use]
    pub fn server_poll_interval(&self) -> Duration {
        Duration::from_millis(self.server_poll_interval_ms)
    }

    /// Options for the decryption engine
    #[must_use]
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            integrity: self.integrity_mode,
            log_unwrap_failures: self.log.log_unwrap_failures(),
        }
    }
}

/// Read environment variable or return default value
pub(crate) fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T
where
    <T as std::str::FromStr>::Err: std::fmt::Debug,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parse a raw environment value, rejecting anything that does not parse
pub(crate) fn parse_or_default<T>(key: &str, raw: Option<String>, default: T) -> Result<T>
where
    T: std::str::FromStr,
    <T as std::str::FromStr>::Err: std::fmt::Display,
{
    match raw.filter(|v| !v.trim().is_empty()) {
        Some(value) => value
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid value for {key}: {e}")),
        None => Ok(default),
    }
}

/// Read environment variable as boolean or return default
pub(crate) fn env_var_or_default_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| {
            let v_lower = v.to_lowercase();
            v_lower == "true" || v_lower == "1" || v_lower == "yes" || v_lower == "on"
        })
        .unwrap_or(default)
}

/// Read environment variable as string or return default
pub(crate) fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.requeue_decrypt_after_minutes, 5);
        assert_eq!(config.requeue_duration(), Duration::from_secs(300));
        assert_eq!(config.metrics_port, 5000);
        assert_eq!(config.integrity_mode, IntegrityMode::Relaxed);
        assert_eq!(config.controller_namespace, "sops-secrets-operator-system");
    }

    #[test]
    fn test_env_var_or_default_falls_back_on_garbage() {
        assert_eq!(env_var_or_default("SOPS_OPERATOR_TEST_UNSET_VAR", 7u64), 7);
        assert!(env_var_or_default_bool("SOPS_OPERATOR_TEST_UNSET_VAR", true));
        assert_eq!(env_var_or_default_str("SOPS_OPERATOR_TEST_UNSET_VAR", "x"), "x");
    }

    #[test]
    fn test_invalid_integrity_mode_is_rejected() {
        let mode = |raw: Option<&str>| {
            parse_or_default("SOPS_INTEGRITY_MODE", raw.map(str::to_string), IntegrityMode::Relaxed)
        };
        assert_eq!(mode(None).unwrap(), IntegrityMode::Relaxed);
        assert_eq!(mode(Some("")).unwrap(), IntegrityMode::Relaxed);
        assert_eq!(mode(Some("STRICT")).unwrap(), IntegrityMode::Strict);
        let err = mode(Some("paranoid")).unwrap_err();
        assert!(err.to_string().contains("SOPS_INTEGRITY_MODE"));
    }

    #[test]
    fn test_engine_options_follow_config() {
        let config = ControllerConfig {
            integrity_mode: IntegrityMode::Strict,
            ..ControllerConfig::default()
        };
        assert_eq!(config.engine_options().integrity, IntegrityMode::Strict);
    }
}
