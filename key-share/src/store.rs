//! Durable storage for encrypted shares and their metadata sidecars, §4.6/§6.
//!
//! This crate only ever writes the encrypted [`Envelope`] wire format —
//! sealing and opening it against a passphrase or KMS is the caller's job
//! (typically the key-share store's owner, who holds the passphrase or KMS
//! client). That keeps plaintext key material out of this module entirely.

use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::envelope::Envelope;
use crate::metadata::CeremonyMetadata;

const SHARE_FILE_MODE: u32 = 0o600;
const METADATA_FILE_MODE: u32 = 0o644;

#[async_trait]
pub trait KeyShareStore: Send + Sync {
    async fn save_share(&self, ceremony_id: &str, envelope: &Envelope) -> Result<(), StorageError>;
    async fn load_share(&self, ceremony_id: &str) -> Result<Envelope, StorageError>;
    async fn save_metadata(
        &self,
        ceremony_id: &str,
        metadata: &CeremonyMetadata,
    ) -> Result<(), StorageError>;
    async fn load_metadata(&self, ceremony_id: &str) -> Result<CeremonyMetadata, StorageError>;
    async fn exists(&self, ceremony_id: &str) -> bool;
}

/// Filesystem-backed [`KeyShareStore`]: one directory per ceremony under
/// `root`, holding `share.json` (0600) and `ceremony.json` (0644).
pub struct FsKeyShareStore {
    root: PathBuf,
}

impl FsKeyShareStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsKeyShareStore { root: root.into() }
    }

    fn ceremony_dir(&self, ceremony_id: &str) -> PathBuf {
        self.root.join(ceremony_id)
    }

    async fn write_with_mode(path: &Path, bytes: &[u8], mode: u32) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, bytes).await?;
        let mut perms = tokio::fs::metadata(path).await?.permissions();
        perms.set_mode(mode);
        tokio::fs::set_permissions(path, perms).await?;
        Ok(())
    }
}

#[async_trait]
impl KeyShareStore for FsKeyShareStore {
    #[instrument(skip(self, envelope), fields(ceremony_id))]
    async fn save_share(&self, ceremony_id: &str, envelope: &Envelope) -> Result<(), StorageError> {
        let path = self.ceremony_dir(ceremony_id).join("share.json");
        let bytes = serde_json::to_vec_pretty(envelope)?;
        Self::write_with_mode(&path, &bytes, SHARE_FILE_MODE).await?;
        debug!(path = %path.display(), "persisted encrypted key share");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn load_share(&self, ceremony_id: &str) -> Result<Envelope, StorageError> {
        let path = self.ceremony_dir(ceremony_id).join("share.json");
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| StorageError::NotFound(path.display().to_string(), e))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    #[instrument(skip(self, metadata), fields(ceremony_id))]
    async fn save_metadata(
        &self,
        ceremony_id: &str,
        metadata: &CeremonyMetadata,
    ) -> Result<(), StorageError> {
        let path = self.ceremony_dir(ceremony_id).join("ceremony.json");
        let bytes = serde_json::to_vec_pretty(metadata)?;
        Self::write_with_mode(&path, &bytes, METADATA_FILE_MODE).await?;
        debug!(path = %path.display(), "persisted ceremony metadata");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn load_metadata(&self, ceremony_id: &str) -> Result<CeremonyMetadata, StorageError> {
        let path = self.ceremony_dir(ceremony_id).join("ceremony.json");
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| StorageError::NotFound(path.display().to_string(), e))?;
        Ok(CeremonyMetadata::from_json(std::str::from_utf8(&bytes).map_err(|_| {
            StorageError::Corrupt("ceremony.json is not valid UTF-8".to_string())
        })?)?)
    }

    async fn exists(&self, ceremony_id: &str) -> bool {
        tokio::fs::try_exists(self.ceremony_dir(ceremony_id).join("share.json"))
            .await
            .unwrap_or(false)
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("key share not found at {0}: {1}")]
    NotFound(String, #[source] io::Error),
    #[error("storage I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("stored data is corrupt: {0}")]
    Corrupt(String),
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
}
