//! # Reconciler
//!
//! Core reconciliation logic for `SopsSecret` resources.
//!
//! The reconciler:
//! - Watches `SopsSecret` resources across all namespaces, and the `Secret`s they own
//! - Decrypts each resource as a whole JSON document
//! - Renders one desired `Secret` per template
//! - Creates missing secrets and updates drifted ones it is allowed to manage
//! - Reports a single status message per pass
//!
//! ## Reconciliation Flow
//!
//! 1. Fetch the raw resource, including the root `sops` block
//! 2. Stop when `spec.suspend` is set
//! 3. Decrypt the resource
//! 4. For every template, in order: render, look up, check ownership, diff, apply
//! 5. Write the status message and schedule the next pass

pub mod convergence;
pub mod diff;
pub mod ownership;
pub mod reconcile;
pub mod render;
pub mod status;
pub mod store;
pub mod types;

pub use convergence::{converge, ConvergenceError, PassOutcome, PassSummary};
pub use reconcile::reconcile;
pub use render::{render_secret, secret_type, RenderError};
pub use store::{KubeSecretStore, SecretStore, StoreError};
pub use types::{BackoffState, Reconciler, ReconcilerError, TriggerSource};
