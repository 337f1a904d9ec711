//! # CRD Generator
//!
//! Prints the `SopsSecret` CustomResourceDefinition as YAML.
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/sopssecret.yaml
//! cargo run --bin crdgen | kubectl apply -f -
//! ```
//!
//! The generated CRD includes the status subresource and the root-level
//! `sops` block with unknown fields preserved.

use anyhow::{Context, Result};
use sops_secrets_operator::crd::sops_secret_crd;

fn main() -> Result<()> {
    let yaml = serde_yaml::to_string(&sops_secret_crd()).context("Failed to serialize CRD to YAML")?;
    print!("{yaml}");
    Ok(())
}
