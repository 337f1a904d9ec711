//! # Controller
//!
//! Core controller modules for the SOPS secrets operator.
//!
//! - `backoff`: Fibonacci backoff for API errors handed to the runtime
//! - `reconciler`: convergence of `SopsSecret` resources into child secrets
//! - `server`: HTTP server for metrics and health checks

pub mod backoff;
pub mod reconciler;
pub mod server;
