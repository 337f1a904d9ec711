//! # Types
//!
//! Core types for the reconciler.

use crate::config::ControllerConfig;
use crate::controller::backoff::FibonacciBackoff;
use crate::sops::DecryptionEngine;
use kube::Client;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors handed back to the runtime's error policy.
///
/// Per-template failures never end up here: they are turned into a status
/// message and a delayed requeue inside the pass.
#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
    #[error("SopsSecret is missing metadata.{0}")]
    MissingMetadata(&'static str),
    #[error("Failed to serialize SopsSecret: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Why the next pass of a resource was scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    /// Fixed delay after a failed pass (decryption, ownership, store errors)
    FailureDelay,
    /// Fibonacci backoff after an error returned to the runtime
    ErrorBackoff,
}

impl TriggerSource {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerSource::FailureDelay => "failure-delay",
            TriggerSource::ErrorBackoff => "error-backoff",
        }
    }
}

/// Backoff state for a specific resource
/// Tracks error count and backoff calculator for progressive retries
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
}

impl BackoffState {
    #[must_use]
    pub fn new(min_minutes: u64, max_minutes: u64) -> Self {
        Self {
            backoff: FibonacciBackoff::new(min_minutes, max_minutes),
            error_count: 0,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count = self.error_count.saturating_add(1);
    }

    pub fn reset(&mut self) {
        self.error_count = 0;
        self.backoff.reset();
    }
}

/// Shared context of every reconciliation pass.
#[derive(Clone)]
pub struct Reconciler {
    pub client: Client,
    pub engine: Arc<DecryptionEngine>,
    pub config: ControllerConfig,
    // Keyed by namespace/name; only touched by the error policy and on success
    pub backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("engine", &self.engine)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    #[must_use]
    pub fn new(client: Client, engine: DecryptionEngine, config: ControllerConfig) -> Self {
        Self {
            client,
            engine: Arc::new(engine),
            config,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Backoff delay for the next retry of `resource_key`, recording the error.
    ///
    /// Returns `(seconds, error_count)`.
    pub fn next_error_backoff(&self, resource_key: &str) -> Option<(u64, u32)> {
        let mut states = self.backoff_states.lock().ok()?;
        let state = states.entry(resource_key.to_string()).or_insert_with(|| {
            BackoffState::new(self.config.backoff_min_minutes, self.config.backoff_max_minutes)
        });
        state.increment_error();
        Some((state.backoff.next_backoff_seconds(), state.error_count))
    }

    /// Forget the backoff of `resource_key` after a pass that reached the store.
    pub fn reset_backoff(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states.remove(resource_key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_state_counts_and_resets() {
        let mut state = BackoffState::new(1, 10);
        state.increment_error();
        state.increment_error();
        assert_eq!(state.error_count, 2);
        assert_eq!(state.backoff.next_backoff_seconds(), 60);
        state.reset();
        assert_eq!(state.error_count, 0);
        assert_eq!(state.backoff.next_backoff_seconds(), 60);
    }

    #[test]
    fn test_trigger_source_labels() {
        assert_eq!(TriggerSource::FailureDelay.as_str(), "failure-delay");
        assert_eq!(TriggerSource::ErrorBackoff.as_str(), "error-backoff");
    }
}
