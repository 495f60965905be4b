//! Content-addressed proof storage on the local filesystem.

use super::{ProofError, ProofFormat, ProofStore};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tracing::debug;

/// URL prefix under which stored proofs are served.
pub const PUBLIC_PREFIX: &str = "/uploads";

#[derive(Debug, Clone)]
pub struct FsProofStore {
    root: PathBuf,
    max_bytes: usize,
}

impl FsProofStore {
    pub fn new(root: impl Into<PathBuf>, max_bytes: usize) -> Self {
        Self {
            root: root.into(),
            max_bytes,
        }
    }
}

#[async_trait]
impl ProofStore for FsProofStore {
    /// Write the proof as `<sha256>.<ext>` and return `/uploads/<sha256>.<ext>`.
    ///
    /// Identical uploads map to the same file.
    async fn store_payment_proof(&self, bytes: &[u8]) -> Result<String, ProofError> {
        if bytes.is_empty() {
            return Err(ProofError::Empty);
        }
        if bytes.len() > self.max_bytes {
            return Err(ProofError::TooLarge {
                size: bytes.len(),
                limit: self.max_bytes,
            });
        }
        let format = ProofFormat::sniff(bytes).ok_or(ProofError::UnsupportedFormat)?;

        let hash = hex::encode(Sha256::digest(bytes));
        let file_name = format!("{}.{}", hash, format.extension());

        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.root.join(&file_name);
        if tokio::fs::try_exists(&path).await? {
            debug!(file = %file_name, "Payment proof already stored");
        } else {
            tokio::fs::write(&path, bytes).await?;
            debug!(file = %file_name, size = bytes.len(), "Payment proof stored");
        }

        Ok(format!("{}/{}", PUBLIC_PREFIX, file_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];

    #[tokio::test]
    async fn test_stores_by_content_hash() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsProofStore::new(temp_dir.path().join("uploads"), 1024);

        let first = store.store_payment_proof(PNG).await.unwrap();
        let second = store.store_payment_proof(PNG).await.unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with("/uploads/"));
        assert!(first.ends_with(".png"));

        let name = first.trim_start_matches("/uploads/");
        let on_disk = std::fs::read(temp_dir.path().join("uploads").join(name)).unwrap();
        assert_eq!(on_disk, PNG);
    }

    #[tokio::test]
    async fn test_rejects_bad_input() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsProofStore::new(temp_dir.path(), 8);

        assert!(matches!(
            store.store_payment_proof(&[]).await,
            Err(ProofError::Empty)
        ));
        assert!(matches!(
            store.store_payment_proof(PNG).await,
            Err(ProofError::TooLarge { size: 12, limit: 8 })
        ));
        assert!(matches!(
            store.store_payment_proof(b"plain").await,
            Err(ProofError::UnsupportedFormat)
        ));
    }
}
