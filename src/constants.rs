//! # Constants
//!
//! Shared constants used throughout the operator.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Default delay before retrying a SopsSecret whose pass failed (minutes)
pub const DEFAULT_REQUEUE_DECRYPT_AFTER_MINUTES: u64 = 5;

/// Default Fibonacci backoff lower bound for API errors (minutes)
pub const DEFAULT_BACKOFF_MIN_MINUTES: u64 = 1;

/// Default Fibonacci backoff upper bound for API errors (minutes)
pub const DEFAULT_BACKOFF_MAX_MINUTES: u64 = 10;

/// Default namespace the operator runs in (key secret lookup)
pub const DEFAULT_CONTROLLER_NAMESPACE: &str = "sops-secrets-operator-system";

/// Default name of the secret holding PGP keys and age identities
pub const DEFAULT_SOPS_PRIVATE_KEY_SECRET_NAME: &str = "sops-private-keys";

/// Default maximum number of SopsSecrets reconciled at once
pub const DEFAULT_MAX_CONCURRENT_RECONCILIATIONS: u16 = 10;

/// Default log level
pub const DEFAULT_LOG_LEVEL: &str = "INFO";

/// Default log format (`json` or `text`)
pub const DEFAULT_LOG_FORMAT: &str = "json";

/// Field manager used for status patches
pub const FIELD_MANAGER: &str = "sops-secrets-operator";
