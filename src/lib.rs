//! SOPS Secrets Operator Library
//!
//! Decrypts SOPS-encrypted `SopsSecret` resources and keeps the Kubernetes
//! `Secret`s they declare in sync.
//! Tests are included in the module files and under `tests/`.
//!
//! ## Quick Start
//!
//! ```rust
//! use sops_secrets_operator::prelude::*;
//! ```
//!
//! This brings commonly used types and traits into scope. For more specific imports,
//! use the individual modules.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod prelude;
pub mod runtime;
pub mod sops;
