//! In-memory directory for tests and local runs.

use super::AdvertisementDirectory;
use crate::domain::AdvertisementSnapshot;
use crate::error::LedgerError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    ads: RwLock<HashMap<String, (AdvertisementSnapshot, bool)>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an active advertisement.
    pub fn with_advertisement(self, ad: AdvertisementSnapshot) -> Self {
        self.insert(ad);
        self
    }

    /// Insert or replace an advertisement and mark it active.
    pub fn insert(&self, ad: AdvertisementSnapshot) {
        let mut ads = self.ads.write().unwrap_or_else(|e| e.into_inner());
        ads.insert(ad.advertisement_id.clone(), (ad, true));
    }

    /// Mark an advertisement inactive. Returns false if it is unknown.
    pub fn deactivate(&self, id: &str) -> bool {
        let mut ads = self.ads.write().unwrap_or_else(|e| e.into_inner());
        match ads.get_mut(id) {
            Some((_, active)) => {
                *active = false;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl AdvertisementDirectory for InMemoryDirectory {
    async fn get_active_advertisement(
        &self,
        id: &str,
    ) -> Result<Option<AdvertisementSnapshot>, LedgerError> {
        let ads = self.ads.read().unwrap_or_else(|e| e.into_inner());
        Ok(ads
            .get(id)
            .filter(|(_, active)| *active)
            .map(|(ad, _)| ad.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Asset, Decimal, TradeType, UserId};

    fn ad(id: &str) -> AdvertisementSnapshot {
        AdvertisementSnapshot::new(
            id,
            Asset::Btc,
            TradeType::Sell,
            Decimal::from(45000),
            Decimal::from(100),
            Decimal::from(10000),
            UserId::new("owner"),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_inactive_ads_are_hidden() {
        let dir = InMemoryDirectory::new().with_advertisement(ad("ad-1"));
        assert!(dir.get_active_advertisement("ad-1").await.unwrap().is_some());
        assert!(dir.get_active_advertisement("ad-2").await.unwrap().is_none());

        assert!(dir.deactivate("ad-1"));
        assert!(dir.get_active_advertisement("ad-1").await.unwrap().is_none());
        assert!(!dir.deactivate("ad-2"));
    }
}
