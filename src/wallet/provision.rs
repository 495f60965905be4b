//! On-chain custody collaborator.

use crate::domain::{Asset, UserId};
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

/// External custody backend that owns keys and hands out deposit addresses.
///
/// The ledger never generates or stores key material; it records only the address.
#[async_trait]
pub trait WalletProvisioner: Send + Sync + fmt::Debug {
    /// Create (or look up) the deposit address of `user` for `asset`.
    async fn provision(&self, user: &UserId, asset: Asset) -> Result<String, ProvisionError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProvisionError {
    #[error("custody backend unavailable: {0}")]
    Unavailable(String),
    #[error("custody backend rejected request: {0}")]
    Rejected(String),
}

/// Provisioner used when no custody backend is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredProvisioner;

#[async_trait]
impl WalletProvisioner for UnconfiguredProvisioner {
    async fn provision(&self, _user: &UserId, asset: Asset) -> Result<String, ProvisionError> {
        Err(ProvisionError::Unavailable(format!(
            "no custody backend configured for {}",
            asset
        )))
    }
}
