//! # debug-sops
//!
//! Decrypts a local SOPS file with the operator's own engine and prints the
//! plaintext to stdout. Useful to check that the keys mounted into the
//! operator can open a document before it is applied to the cluster.
//!
//! ```bash
//! debug-sops secret.enc.yaml --pgp-key-file private.asc
//! debug-sops sopssecret.json --age-key-file keys.txt --integrity-mode strict
//! SOPS_AGE_KEY_FILE=keys.txt debug-sops app.env --format dotenv
//! ```
//!
//! **SECURITY**: plaintext only ever goes to stdout, never to disk.

use anyhow::{Context, Result};
use clap::Parser;
use sops_secrets_operator::config::{LogConfig, LogFormat};
use sops_secrets_operator::sops::keys::{build_keyring, KeyEnvironment, KeyMaterial};
use sops_secrets_operator::sops::{DecryptionEngine, EngineOptions, Format, IntegrityMode};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "debug-sops", about = "Decrypt a SOPS file with the operator's engine")]
struct Args {
    /// Encrypted file to decrypt
    file: PathBuf,

    /// Document format (json, yaml, dotenv, binary); inferred from the extension when omitted
    #[arg(long)]
    format: Option<String>,

    /// Armored PGP private key to import into an ephemeral keyring (repeatable)
    #[arg(long = "pgp-key-file")]
    pgp_key_files: Vec<PathBuf>,

    /// File with age identities (repeatable)
    #[arg(long = "age-key-file")]
    age_key_files: Vec<PathBuf>,

    /// MAC verification: relaxed (default) or strict
    #[arg(long, default_value = "relaxed")]
    integrity_mode: IntegrityMode,

    /// Log level
    #[arg(long, default_value = "WARN", env = "LOG_LEVEL")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    LogConfig {
        level: args.log_level.clone(),
        format: LogFormat::Text,
        color: false,
    }
    .init()?;

    let mut material = KeyMaterial::default();
    for path in args.pgp_key_files.iter().chain(&args.age_key_files) {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read key file {}", path.display()))?;
        if !material.add(&path.display().to_string(), &content) {
            anyhow::bail!("{} holds neither a PGP private key nor an age identity", path.display());
        }
    }
    let keyring = build_keyring(material, &KeyEnvironment::from_env());
    info!("Key unwrappers available for: {:?}", keyring.providers());

    let format = args
        .format
        .as_deref()
        .map_or_else(|| Format::from_path(&args.file), Format::from_name);
    let data = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("Failed to read {}", args.file.display()))?;

    let engine = DecryptionEngine::new(
        Arc::new(keyring),
        EngineOptions {
            integrity: args.integrity_mode,
            log_unwrap_failures: true,
        },
    );
    let plain = engine
        .decrypt(&data, format)
        .await
        .with_context(|| format!("Failed to decrypt {} as {}", args.file.display(), format))?;

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&plain)?;
    stdout.flush()?;
    Ok(())
}
