//! Directory backed by the `advertisements` table the advertisement service maintains.

use super::AdvertisementDirectory;
use crate::db::Repository;
use crate::domain::AdvertisementSnapshot;
use crate::error::LedgerError;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct SqliteDirectory {
    repo: Arc<Repository>,
}

impl SqliteDirectory {
    pub fn new(repo: Arc<Repository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl AdvertisementDirectory for SqliteDirectory {
    async fn get_active_advertisement(
        &self,
        id: &str,
    ) -> Result<Option<AdvertisementSnapshot>, LedgerError> {
        let Some(ad) = self.repo.get_active_advertisement(id).await? else {
            return Ok(None);
        };
        // Rows come from another service; do not trust them blindly.
        if let Err(e) = ad.validate() {
            warn!(advertisement_id = id, error = %e, "Ignoring advertisement with invalid terms");
            return Ok(None);
        }
        Ok(Some(ad))
    }
}
