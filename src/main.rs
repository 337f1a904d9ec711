//! # SOPS Secrets Operator
//!
//! A Kubernetes operator that decrypts SOPS-encrypted `SopsSecret` resources
//! into native Kubernetes `Secret`s.
//!
//! ## Overview
//!
//! 1. **Watching SopsSecrets** - Monitors `SopsSecret` resources in all namespaces
//! 2. **In-process decryption** - Decrypts each resource with the PGP and age keys
//!    loaded from the operator namespace
//! 3. **Child secrets** - Creates one `Secret` per template and keeps it in sync
//! 4. **Ownership** - Never touches a `Secret` it does not control, unless the
//!    secret is annotated `sopssecret/managed: "true"`
//!
//! ## Features
//!
//! - **Prometheus metrics**: Exposes metrics for monitoring and observability
//! - **Health probes**: HTTP endpoints for liveness and readiness checks
//! - **Relaxed integrity**: The aggregate MAC is only enforced with `--integrity-mode strict`

use anyhow::Result;
use clap::Parser;
use sops_secrets_operator::config::ControllerConfig;
use sops_secrets_operator::runtime::{initialization::initialize, watch_loop::run_watch_loop};
use sops_secrets_operator::sops::IntegrityMode;

/// SOPS Secrets Operator
///
/// Flags override the matching environment variables.
#[derive(Debug, Parser)]
#[command(name = "sops-secrets-operator", version, about)]
struct Args {
    /// Minutes to wait before retrying a SopsSecret whose pass failed
    #[arg(long = "requeue-decrypt-after", env = "REQUEUE_DECRYPT_AFTER_MINUTES")]
    requeue_decrypt_after: Option<u64>,

    /// Port of the metrics and probe server
    #[arg(long, env = "METRICS_PORT")]
    metrics_port: Option<u16>,

    /// MAC verification: relaxed (default) or strict
    #[arg(long, env = "SOPS_INTEGRITY_MODE")]
    integrity_mode: Option<IntegrityMode>,
}

impl Args {
    fn apply(self, mut config: ControllerConfig) -> ControllerConfig {
        if let Some(minutes) = self.requeue_decrypt_after {
            config.requeue_decrypt_after_minutes = minutes;
        }
        if let Some(port) = self.metrics_port {
            config.metrics_port = port;
        }
        if let Some(mode) = self.integrity_mode {
            config.integrity_mode = mode;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = args.apply(ControllerConfig::from_env()?);

    let init_result = initialize(config).await?;

    run_watch_loop(
        init_result.sops_secrets,
        init_result.reconciler,
        init_result.server_state,
    )
    .await
}
