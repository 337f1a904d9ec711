//! # age Unwrapper
//!
//! Unwraps age-wrapped data keys through the `age` binary. Identities are
//! written once to a private temporary file, or an existing identity file
//! (`SOPS_AGE_KEY_FILE`) is used as-is.

use super::process;
use super::{DataKey, KeyProvider, KeyUnwrapper, MasterKey, UnwrapError};
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::sync::OnceCell;
use tracing::{debug, warn};
use zeroize::Zeroizing;

pub struct AgeUnwrapper {
    identities: Vec<Zeroizing<String>>,
    existing_file: Option<PathBuf>,
    identity_file: OnceCell<PathBuf>,
}

impl AgeUnwrapper {
    /// Unwrapper over in-memory `AGE-SECRET-KEY-...` identities.
    #[must_use]
    pub fn with_identities(identities: Vec<Zeroizing<String>>) -> Self {
        Self {
            identities,
            existing_file: None,
            identity_file: OnceCell::new(),
        }
    }

    /// Unwrapper over an identity file already on disk.
    #[must_use]
    pub fn with_identity_file(path: PathBuf) -> Self {
        Self {
            identities: Vec::new(),
            existing_file: Some(path),
            identity_file: OnceCell::new(),
        }
    }

    async fn identity_path(&self) -> Result<PathBuf, UnwrapError> {
        if let Some(path) = &self.existing_file {
            return Ok(path.clone());
        }
        if self.identities.is_empty() {
            return Err(UnwrapError::NoKeyMaterial(KeyProvider::Age));
        }
        let path = self
            .identity_file
            .get_or_try_init(|| write_identities(&self.identities))
            .await?;
        Ok(path.clone())
    }
}

impl fmt::Debug for AgeUnwrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgeUnwrapper")
            .field("identities", &format!("<{} identities>", self.identities.len()))
            .field("existing_file", &self.existing_file)
            .finish_non_exhaustive()
    }
}

impl Drop for AgeUnwrapper {
    fn drop(&mut self) {
        if let Some(path) = self.identity_file.get() {
            if let Err(e) = std::fs::remove_file(path) {
                warn!("Failed to remove temporary age identity file {}: {}", path.display(), e);
            }
        }
    }
}

async fn write_identities(identities: &[Zeroizing<String>]) -> Result<PathBuf, UnwrapError> {
    use tokio::io::AsyncWriteExt;

    let path = std::env::temp_dir().join(format!("sops-age-identities-{}.txt", uuid::Uuid::new_v4()));
    let mut contents = Zeroizing::new(String::new());
    for identity in identities {
        contents.push_str(identity.trim());
        contents.push('\n');
    }

    let mut file = create_private_file(&path)
        .await
        .map_err(|e| UnwrapError::Failed(format!("failed to create age identity file: {e}")))?;
    let written = async {
        file.write_all(contents.as_bytes()).await?;
        file.flush().await
    }
    .await;
    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&path).await;
        return Err(UnwrapError::Failed(format!("failed to write age identity file: {e}")));
    }
    debug!("Wrote {} age identities to {}", identities.len(), path.display());
    Ok(path)
}

/// Owner-only file that must not exist yet; the mode is set at creation.
#[cfg(unix)]
async fn create_private_file(path: &Path) -> std::io::Result<tokio::fs::File> {
    tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)
        .await
}

#[cfg(not(unix))]
async fn create_private_file(path: &Path) -> std::io::Result<tokio::fs::File> {
    tokio::fs::OpenOptions::new().write(true).create_new(true).open(path).await
}

#[async_trait]
impl KeyUnwrapper for AgeUnwrapper {
    async fn unwrap_key(&self, key: &MasterKey) -> Result<DataKey, UnwrapError> {
        if key.provider != KeyProvider::Age {
            return Err(UnwrapError::Unsupported(key.provider));
        }
        let identity = self.identity_path().await?;
        let age = process::locate("age")?;
        let plaintext = process::run(
            &age,
            [
                std::ffi::OsStr::new("--decrypt"),
                std::ffi::OsStr::new("-i"),
                identity.as_os_str(),
            ],
            &[],
            key.wrapped.as_bytes(),
        )
        .await?;
        Ok(Zeroizing::new(plaintext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_without_identities_reports_missing_material() {
        let unwrapper = AgeUnwrapper::with_identities(Vec::new());
        let key = MasterKey::new(KeyProvider::Age, "age1abc", "-----BEGIN AGE ENCRYPTED FILE-----");
        assert!(matches!(
            unwrapper.unwrap_key(&key).await,
            Err(UnwrapError::NoKeyMaterial(KeyProvider::Age))
        ));
    }

    #[tokio::test]
    async fn test_identity_file_is_written_once_and_removed() {
        let unwrapper = AgeUnwrapper::with_identities(vec![Zeroizing::new(
            "AGE-SECRET-KEY-1EXAMPLE".to_string(),
        )]);
        let first = unwrapper.identity_path().await.unwrap();
        let second = unwrapper.identity_path().await.unwrap();
        assert_eq!(first, second);
        let contents = tokio::fs::read_to_string(&first).await.unwrap();
        assert_eq!(contents, "AGE-SECRET-KEY-1EXAMPLE\n");

        drop(unwrapper);
        assert!(!first.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_identity_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let unwrapper = AgeUnwrapper::with_identities(vec![Zeroizing::new(
            "AGE-SECRET-KEY-1EXAMPLE".to_string(),
        )]);
        let path = unwrapper.identity_path().await.unwrap();
        let mode = tokio::fs::metadata(&path).await.unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_existing_path_is_never_reused() {
        let path = std::env::temp_dir().join(format!("sops-age-identities-{}.txt", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, "someone else").await.unwrap();
        assert!(create_private_file(&path).await.is_err());
        tokio::fs::remove_file(&path).await.unwrap();
    }
}
