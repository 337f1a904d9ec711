//! # Runtime
//!
//! Controller start-up and the watch loop.
//!
//! - `initialization`: logging, metrics, probe server, client, key material
//! - `watch_loop`: the `kube-runtime` controller over `SopsSecret` and owned `Secret`s
//! - `error_policy`: backoff for errors returned by the reconciler

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;
