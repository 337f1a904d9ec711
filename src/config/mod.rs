//! # Configuration
//!
//! - `controller`: operator settings from environment variables
//! - `logging`: tracing subscriber setup

pub mod controller;
pub mod logging;

pub use controller::ControllerConfig;
pub use logging::{LogConfig, LogFormat};
