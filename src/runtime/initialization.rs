//! # Initialization
//!
//! Operator start-up: rustls setup, tracing, metrics, probe server,
//! Kubernetes client, key material and the reconciler context.

use crate::config::ControllerConfig;
use crate::controller::reconciler::Reconciler;
use crate::controller::server::{start_server, ServerState};
use crate::crd::SopsSecret;
use crate::observability;
use crate::sops::{keys::load_keyring, DecryptionEngine};
use anyhow::{Context, Result};
use kube::{api::Api, Client};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Everything the watch loop needs
pub struct InitializationResult {
    pub client: Client,
    /// API for the SopsSecret CRD across all namespaces
    pub sops_secrets: Api<SopsSecret>,
    pub reconciler: Arc<Reconciler>,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("server_ready", &self.server_state.ready())
            .field("reconciler", &self.reconciler)
            .finish_non_exhaustive()
    }
}

/// Initialize the operator runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - HTTP server startup
/// - Kubernetes client creation
/// - Key material loading and reconciler setup
pub async fn initialize(config: ControllerConfig) -> Result<InitializationResult> {
    // Must happen before any TLS connection is made
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        debug!("rustls crypto provider already installed");
    }

    config.log.init()?;

    info!("Starting SOPS Secrets Operator");
    info!(
        "Build info: datetime={}, git_hash={}",
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );
    info!(
        requeue_minutes = config.requeue_decrypt_after_minutes,
        integrity = %config.integrity_mode,
        concurrency = config.max_concurrent_reconciliations,
        "Operator configuration loaded"
    );

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::new());
    let server_state_clone = Arc::clone(&server_state);
    let server_port = config.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });
    wait_for_server_ready(&server_state, &server_handle, &config).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    let sops_secrets: Api<SopsSecret> = Api::all(client.clone());

    let keyring = load_keyring(
        &client,
        &config.controller_namespace,
        &config.sops_private_key_secret_name,
    )
    .await;
    if keyring.is_empty() {
        warn!("⚠️  No key unwrappers configured, every SopsSecret will fail to decrypt");
    } else {
        info!("Key unwrappers available for: {:?}", keyring.providers());
    }
    let engine = DecryptionEngine::new(Arc::new(keyring), config.engine_options());

    let reconciler = Arc::new(Reconciler::new(client.clone(), engine, config));

    info!("Operator initialized, starting watch loop...");
    Ok(InitializationResult {
        client,
        sops_secrets,
        reconciler,
        server_state,
    })
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
    config: &ControllerConfig,
) -> Result<()> {
    let startup_timeout = config.server_startup_timeout();
    let poll_interval = config.server_poll_interval();
    let start_time = std::time::Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if server_state.ready() {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }
}
