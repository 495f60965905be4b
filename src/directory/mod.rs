//! Advertisement directory: where the trade engine looks up live advertisement terms.

use crate::domain::AdvertisementSnapshot;
use crate::error::LedgerError;
use async_trait::async_trait;
use std::fmt;

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryDirectory;
pub use sqlite::SqliteDirectory;

/// Read-only view of the advertisement service.
///
/// Only ACTIVE advertisements are ever returned; an inactive or unknown id yields `None`.
#[async_trait]
pub trait AdvertisementDirectory: Send + Sync + fmt::Debug {
    async fn get_active_advertisement(
        &self,
        id: &str,
    ) -> Result<Option<AdvertisementSnapshot>, LedgerError>;
}
