//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ```rust
//! use sops_secrets_operator::prelude::*;
//! ```

// CRD types
pub use crate::crd::*;

// Decryption engine and key unwrapping
pub use crate::sops::{
    DecryptError, DecryptionEngine, EngineOptions, Format, IntegrityMode, KeyProvider, KeyUnwrapper,
    Keyring, MasterKey, UnwrapError,
};

// Reconciler types
pub use crate::controller::reconciler::{
    converge, reconcile, ConvergenceError, PassOutcome, Reconciler, ReconcilerError, SecretStore,
    StoreError,
};

// Config types
pub use crate::config::{ControllerConfig, LogConfig, LogFormat};
