//! Per-balance mutual exclusion.

use crate::domain::BalanceKey;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per balance, created on first use.
#[derive(Debug, Default)]
pub struct BalanceLocks {
    slots: Mutex<HashMap<BalanceKey, Arc<AsyncMutex<()>>>>,
}

impl BalanceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &BalanceKey) -> Arc<AsyncMutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.entry(key.clone()).or_default().clone()
    }

    /// Lock every balance in `keys`, always in ascending key order.
    ///
    /// Two operations touching the same pair of balances in opposite directions take the
    /// locks in the same order, so they cannot deadlock. Duplicates are locked once.
    pub async fn acquire(&self, keys: &[BalanceKey]) -> Vec<OwnedMutexGuard<()>> {
        let mut ordered: Vec<&BalanceKey> = keys.iter().collect();
        ordered.sort();
        ordered.dedup();

        let mut guards = Vec::with_capacity(ordered.len());
        for key in ordered {
            guards.push(self.slot(key).lock_owned().await);
        }
        guards
    }
}
