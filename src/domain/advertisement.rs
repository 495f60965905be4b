//! Frozen advertisement terms captured when a trade is opened.

use super::{Asset, Decimal, TradeType, UserId};
use crate::error::ValidationError;
use serde::{Deserialize, Serialize};

/// Read-only copy of an advertisement's terms.
///
/// A trade keeps its own snapshot, so later edits or deletion of the live advertisement
/// never change an in-flight trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvertisementSnapshot {
    pub advertisement_id: String,
    pub asset: Asset,
    pub trade_type: TradeType,
    /// Fiat per one unit of asset.
    pub rate: Decimal,
    pub min_limit: Decimal,
    pub max_limit: Decimal,
    pub owner_id: UserId,
}

impl AdvertisementSnapshot {
    /// Build a snapshot, rejecting terms that could never back a valid trade.
    pub fn new(
        advertisement_id: impl Into<String>,
        asset: Asset,
        trade_type: TradeType,
        rate: Decimal,
        min_limit: Decimal,
        max_limit: Decimal,
        owner_id: UserId,
    ) -> Result<Self, ValidationError> {
        let snapshot = Self {
            advertisement_id: advertisement_id.into(),
            asset,
            trade_type,
            rate,
            min_limit,
            max_limit,
            owner_id,
        };
        snapshot.validate()?;
        Ok(snapshot)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.rate.is_positive() {
            return Err(ValidationError::InvalidAdvertisement(
                "rate must be positive".into(),
            ));
        }
        if !self.min_limit.is_positive() {
            return Err(ValidationError::InvalidAdvertisement(
                "minLimit must be positive".into(),
            ));
        }
        if self.min_limit >= self.max_limit {
            return Err(ValidationError::InvalidAdvertisement(format!(
                "minLimit {} must be below maxLimit {}",
                self.min_limit, self.max_limit
            )));
        }
        Ok(())
    }

    /// Whether `fiat_amount` lies within `[min_limit, max_limit]`.
    pub fn accepts(&self, fiat_amount: Decimal) -> bool {
        fiat_amount >= self.min_limit && fiat_amount <= self.max_limit
    }

    /// Asset units bought by `fiat_amount` at the frozen rate, truncated to ledger scale.
    pub fn asset_amount_for(&self, fiat_amount: Decimal) -> Result<Decimal, ValidationError> {
        fiat_amount
            .checked_div(self.rate)
            .map(|d| d.round_down(self.asset.scale()))
            .ok_or(ValidationError::Overflow("asset amount"))
    }

    /// Resolve (buyer, seller) for a trade opened by `initiator`.
    pub fn parties(&self, initiator: &UserId) -> (UserId, UserId) {
        match self.trade_type {
            TradeType::Sell => (initiator.clone(), self.owner_id.clone()),
            TradeType::Buy => (self.owner_id.clone(), initiator.clone()),
        }
    }
}
