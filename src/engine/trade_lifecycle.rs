//! Trade lifecycle: open, payment proof, release, dispute, cancel.

use crate::db::{Pagination, Repository, TradeUpdate};
use crate::directory::AdvertisementDirectory;
use crate::domain::{
    AdvertisementSnapshot, BalanceKey, Decimal, EntryKind, TimeMs, Trade, TradeAction, TradeId,
    TradeStatus, TradeType, UserId,
};
use crate::error::{LedgerError, ValidationError};
use crate::wallet::{LedgerUnit, WalletService};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

/// How seller funds are secured while a trade is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EscrowMode {
    /// Seller balance is checked at open (SELL ads only) and moved at release.
    #[default]
    Advisory,
    /// Seller balance is moved into the escrow account at open.
    Reserve,
}

impl EscrowMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscrowMode::Advisory => "advisory",
            EscrowMode::Reserve => "reserve",
        }
    }
}

impl fmt::Display for EscrowMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EscrowMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "advisory" => Ok(EscrowMode::Advisory),
            "reserve" => Ok(EscrowMode::Reserve),
            other => Err(format!("unknown escrow mode: {}", other)),
        }
    }
}

/// Drives trades through their state machine and settles them through the wallet service.
pub struct TradeEngine {
    wallet: Arc<WalletService>,
    escrow_mode: EscrowMode,
}

impl TradeEngine {
    pub fn new(wallet: Arc<WalletService>, escrow_mode: EscrowMode) -> Self {
        Self {
            wallet,
            escrow_mode,
        }
    }

    pub fn escrow_mode(&self) -> EscrowMode {
        self.escrow_mode
    }

    fn repo(&self) -> &Repository {
        self.wallet.repo()
    }

    /// Open a trade against an active advertisement.
    ///
    /// # Errors
    /// `InvalidAmountRange` if `fiat_amount` is outside the advertisement limits,
    /// `SelfTradeForbidden` if `initiator` owns the advertisement,
    /// `InsufficientSellerBalance` if the seller cannot cover the asset amount.
    pub async fn open(
        &self,
        ad: &AdvertisementSnapshot,
        initiator: &UserId,
        fiat_amount: Decimal,
    ) -> Result<Trade, LedgerError> {
        ad.validate()?;
        if initiator == &ad.owner_id {
            return Err(ValidationError::SelfTradeForbidden.into());
        }
        if !ad.accepts(fiat_amount) {
            return Err(ValidationError::InvalidAmountRange {
                amount: fiat_amount,
                min: ad.min_limit,
                max: ad.max_limit,
            }
            .into());
        }

        let asset_amount = ad.asset_amount_for(fiat_amount)?;
        if !asset_amount.is_positive() {
            return Err(ValidationError::NonPositive {
                field: "assetAmount",
            }
            .into());
        }

        let (buyer_id, seller_id) = ad.parties(initiator);
        let now = TimeMs::now();
        let mut trade = Trade {
            id: TradeId::new_v4(),
            advertisement: ad.clone(),
            buyer_id,
            seller_id,
            fiat_amount,
            asset_amount,
            status: TradeStatus::Pending,
            payment_proof_ref: None,
            dispute_reason: None,
            escrow_held: false,
            version: 1,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };

        match self.escrow_mode {
            EscrowMode::Advisory => {
                if ad.trade_type == TradeType::Sell {
                    let available = self.wallet.get_balance(&trade.seller_id, ad.asset).await?;
                    if available < asset_amount {
                        warn!(
                            advertisement_id = %ad.advertisement_id,
                            seller = %trade.seller_id,
                            available = %available,
                            required = %asset_amount,
                            "Trade rejected, seller balance too low"
                        );
                        return Err(LedgerError::InsufficientSellerBalance {
                            seller: trade.seller_id.clone(),
                            asset: ad.asset,
                            available,
                            required: asset_amount,
                        });
                    }
                }
                let mut conn = self.repo().pool().acquire().await?;
                Repository::insert_trade(&mut conn, &trade).await?;
            }
            EscrowMode::Reserve => {
                trade.escrow_held = true;
                let mut unit = self
                    .wallet
                    .begin_unit(&[
                        BalanceKey::new(trade.seller_id.clone(), ad.asset),
                        BalanceKey::new(UserId::escrow(), ad.asset),
                    ])
                    .await?;
                Repository::insert_trade(unit.conn(), &trade).await?;
                unit.hold(
                    &trade.seller_id,
                    ad.asset,
                    asset_amount,
                    &trade.id.to_string(),
                )
                .await
                .map_err(LedgerError::into_seller_shortfall)?;
                unit.commit().await?;
            }
        }

        info!(
            trade_id = %trade.id,
            advertisement_id = %ad.advertisement_id,
            buyer = %trade.buyer_id,
            seller = %trade.seller_id,
            fiat_amount = %fiat_amount,
            asset_amount = %asset_amount,
            asset = %ad.asset,
            escrow_held = trade.escrow_held,
            "Trade opened"
        );
        Ok(trade)
    }

    /// Look up an advertisement in the directory and open a trade against it.
    ///
    /// # Errors
    /// `NotFound` if the advertisement is unknown or inactive, otherwise as [`TradeEngine::open`].
    pub async fn open_from_directory(
        &self,
        directory: &dyn AdvertisementDirectory,
        advertisement_id: &str,
        initiator: &UserId,
        fiat_amount: Decimal,
    ) -> Result<Trade, LedgerError> {
        let ad = directory
            .get_active_advertisement(advertisement_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("advertisement {}", advertisement_id)))?;
        self.open(&ad, initiator, fiat_amount).await
    }

    /// Buyer attaches proof of the fiat payment. PENDING → PAID.
    ///
    /// # Errors
    /// `NotFound`, `Unauthorized` for anyone but the buyer, `InvalidStateTransition`.
    pub async fn submit_payment_proof(
        &self,
        id: TradeId,
        actor: &UserId,
        proof_ref: impl Into<String>,
    ) -> Result<Trade, LedgerError> {
        let trade = self.load(id).await?;
        let next = self.check(&trade, actor, TradeAction::SubmitPaymentProof)?;

        let update = TradeUpdate {
            payment_proof_ref: Some(proof_ref.into()),
            ..TradeUpdate::status(next)
        };
        self.transition(trade, TradeAction::SubmitPaymentProof, update)
            .await
    }

    /// Seller confirms the fiat arrived. PAID → COMPLETED, and the asset moves to the buyer
    /// in the same transaction.
    ///
    /// # Errors
    /// `NotFound`, `Unauthorized` for anyone but the seller, `InvalidStateTransition`,
    /// `InsufficientSellerBalance` if the seller no longer holds the asset amount.
    pub async fn release(&self, id: TradeId, actor: &UserId) -> Result<Trade, LedgerError> {
        let trade = self.load(id).await?;
        let next = self.check(&trade, actor, TradeAction::Release)?;
        let asset = trade.advertisement.asset;
        let reference = trade.id.to_string();

        let payer = if trade.escrow_held {
            UserId::escrow()
        } else {
            trade.seller_id.clone()
        };
        let mut unit = self
            .wallet
            .begin_unit(&[
                BalanceKey::new(payer, asset),
                BalanceKey::new(trade.buyer_id.clone(), asset),
            ])
            .await?;

        let now = unit.now();
        let update = TradeUpdate {
            completed_at: Some(now),
            ..TradeUpdate::status(next)
        };
        if !Self::transition_in(&mut unit, &trade, &update).await? {
            drop(unit);
            return Err(self.lost_race(trade.id, TradeAction::Release).await);
        }

        let settled = if trade.escrow_held {
            unit.release_hold(&trade.buyer_id, asset, trade.asset_amount, &reference)
                .await
        } else {
            unit.move_funds(
                &BalanceKey::new(trade.seller_id.clone(), asset),
                &BalanceKey::new(trade.buyer_id.clone(), asset),
                trade.asset_amount,
                EntryKind::Withdrawal,
                EntryKind::Deposit,
                &reference,
            )
            .await
        };
        if let Err(e) = settled {
            warn!(trade_id = %trade.id, seller = %trade.seller_id, error = %e, "Release rejected");
            return Err(e.into_seller_shortfall());
        }
        unit.commit().await?;

        info!(
            trade_id = %trade.id,
            seller = %trade.seller_id,
            buyer = %trade.buyer_id,
            asset = %asset,
            amount = %trade.asset_amount,
            "Trade released"
        );
        Ok(advance(trade, &update, now))
    }

    /// Either party escalates the trade. PENDING | PAID → DISPUTED. Held funds stay held.
    ///
    /// # Errors
    /// `Validation` for an empty reason, `NotFound`, `Unauthorized`, `InvalidStateTransition`.
    pub async fn dispute(
        &self,
        id: TradeId,
        actor: &UserId,
        reason: &str,
    ) -> Result<Trade, LedgerError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ValidationError::Other("dispute reason is required".into()).into());
        }

        let trade = self.load(id).await?;
        let next = self.check(&trade, actor, TradeAction::Dispute)?;

        let update = TradeUpdate {
            dispute_reason: Some(reason.to_string()),
            ..TradeUpdate::status(next)
        };
        self.transition(trade, TradeAction::Dispute, update).await
    }

    /// Either party abandons the trade before payment. PENDING → CANCELLED.
    ///
    /// # Errors
    /// `NotFound`, `Unauthorized`, `InvalidStateTransition`.
    pub async fn cancel(&self, id: TradeId, actor: &UserId) -> Result<Trade, LedgerError> {
        let trade = self.load(id).await?;
        let next = self.check(&trade, actor, TradeAction::Cancel)?;
        let update = TradeUpdate::status(next);

        if !trade.escrow_held {
            return self.transition(trade, TradeAction::Cancel, update).await;
        }

        let asset = trade.advertisement.asset;
        let mut unit = self
            .wallet
            .begin_unit(&[
                BalanceKey::new(UserId::escrow(), asset),
                BalanceKey::new(trade.seller_id.clone(), asset),
            ])
            .await?;
        let now = unit.now();
        if !Self::transition_in(&mut unit, &trade, &update).await? {
            drop(unit);
            return Err(self.lost_race(trade.id, TradeAction::Cancel).await);
        }
        unit.release_hold(
            &trade.seller_id,
            asset,
            trade.asset_amount,
            &trade.id.to_string(),
        )
        .await?;
        unit.commit().await?;

        info!(
            trade_id = %trade.id,
            actor = %actor,
            refunded = %trade.asset_amount,
            "Trade cancelled"
        );
        Ok(advance(trade, &update, now))
    }

    /// A trade, visible to its parties only.
    ///
    /// # Errors
    /// `NotFound`, `Unauthorized` for non-parties.
    pub async fn get_trade(&self, id: TradeId, viewer: &UserId) -> Result<Trade, LedgerError> {
        let trade = self.load(id).await?;
        if !trade.is_party(viewer) {
            return Err(LedgerError::Unauthorized {
                actor: viewer.clone(),
                action: "view",
                trade_id: id,
            });
        }
        Ok(trade)
    }

    /// Trades where `user` is buyer or seller, newest first, with the total count.
    ///
    /// # Errors
    /// Returns `StorageUnavailable` on storage failure.
    pub async fn list_trades(
        &self,
        user: &UserId,
        page: Pagination,
    ) -> Result<(Vec<Trade>, i64), LedgerError> {
        Ok(self.repo().list_trades_for_user(user, page).await?)
    }

    async fn load(&self, id: TradeId) -> Result<Trade, LedgerError> {
        self.repo()
            .get_trade(id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("trade {}", id)))
    }

    fn check(
        &self,
        trade: &Trade,
        actor: &UserId,
        action: TradeAction,
    ) -> Result<TradeStatus, LedgerError> {
        trade.authorize(actor, action)?;
        trade.status.apply(action).inspect_err(|e| {
            warn!(trade_id = %trade.id, actor = %actor, error = %e, "Trade transition rejected");
        })
    }

    /// Status-only transition outside any ledger unit.
    async fn transition(
        &self,
        trade: Trade,
        action: TradeAction,
        update: TradeUpdate,
    ) -> Result<Trade, LedgerError> {
        let now = TimeMs::now();
        let mut conn = self.repo().pool().acquire().await?;
        let applied = Repository::transition_trade(
            &mut conn,
            trade.id,
            trade.version,
            trade.status,
            &update,
            now,
        )
        .await?;
        drop(conn);
        if !applied {
            return Err(self.lost_race(trade.id, action).await);
        }

        info!(
            trade_id = %trade.id,
            from = %trade.status,
            to = %update.status,
            "Trade transitioned"
        );
        Ok(advance(trade, &update, now))
    }

    /// Status transition as the first write of a ledger unit. Returns false if the trade
    /// moved since it was loaded.
    async fn transition_in(
        unit: &mut LedgerUnit,
        trade: &Trade,
        update: &TradeUpdate,
    ) -> Result<bool, LedgerError> {
        let now = unit.now();
        Ok(Repository::transition_trade(
            unit.conn(),
            trade.id,
            trade.version,
            trade.status,
            update,
            now,
        )
        .await?)
    }

    /// Error for a guarded update that matched no row: someone else moved the trade first.
    async fn lost_race(&self, id: TradeId, action: TradeAction) -> LedgerError {
        let current = match self.load(id).await {
            Ok(trade) => trade,
            Err(e) => return e,
        };
        warn!(
            trade_id = %id,
            status = %current.status,
            action = action.as_str(),
            "Lost trade transition race"
        );
        match current.status.apply(action) {
            Err(e) => e,
            Ok(_) => LedgerError::Conflict(format!("trade {}", id)),
        }
    }
}

fn advance(mut trade: Trade, update: &TradeUpdate, now: TimeMs) -> Trade {
    trade.status = update.status;
    if let Some(proof) = &update.payment_proof_ref {
        trade.payment_proof_ref = Some(proof.clone());
    }
    if let Some(reason) = &update.dispute_reason {
        trade.dispute_reason = Some(reason.clone());
    }
    if update.completed_at.is_some() {
        trade.completed_at = update.completed_at;
    }
    trade.version += 1;
    trade.updated_at = now;
    trade
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escrow_mode_parse() {
        assert_eq!("advisory".parse::<EscrowMode>().unwrap(), EscrowMode::Advisory);
        assert_eq!(" Reserve ".parse::<EscrowMode>().unwrap(), EscrowMode::Reserve);
        assert!("hold".parse::<EscrowMode>().is_err());
        assert_eq!(EscrowMode::default(), EscrowMode::Advisory);
    }
}
