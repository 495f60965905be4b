//! Blob storage for payment proofs.

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

pub mod fs;

pub use fs::FsProofStore;

#[derive(Debug, Error)]
pub enum ProofError {
    #[error("payment proof is empty")]
    Empty,
    #[error("payment proof is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },
    #[error("unsupported payment proof format")]
    UnsupportedFormat,
    #[error("proof storage failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Stores proof bytes and returns an opaque reference the trade record keeps.
#[async_trait]
pub trait ProofStore: Send + Sync + fmt::Debug {
    async fn store_payment_proof(&self, bytes: &[u8]) -> Result<String, ProofError>;
}

/// Accepted proof formats, detected from the leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProofFormat {
    Jpeg,
    Png,
    Gif,
    Pdf,
}

impl ProofFormat {
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(ProofFormat::Jpeg)
        } else if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
            Some(ProofFormat::Png)
        } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            Some(ProofFormat::Gif)
        } else if bytes.starts_with(b"%PDF-") {
            Some(ProofFormat::Pdf)
        } else {
            None
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ProofFormat::Jpeg => "jpg",
            ProofFormat::Png => "png",
            ProofFormat::Gif => "gif",
            ProofFormat::Pdf => "pdf",
        }
    }
}
