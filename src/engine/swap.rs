//! Internal asset swaps at a platform rate.

use crate::db::{Pagination, Repository};
use crate::domain::{Asset, BalanceKey, Decimal, EntryKind, Swap, SwapId, SwapStatus, UserId};
use crate::error::{LedgerError, ValidationError};
use crate::wallet::WalletService;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Price of a pair and what a given amount converts to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapQuote {
    pub from_asset: Asset,
    pub to_asset: Asset,
    pub from_amount: Decimal,
    pub to_amount: Decimal,
    pub rate: Decimal,
}

/// Platform rates, derived from a single BTC/USDT price.
#[derive(Debug, Clone, Copy)]
pub struct RateQuoter {
    btc_usdt: Decimal,
}

impl RateQuoter {
    pub fn new(btc_usdt: Decimal) -> Result<Self, ValidationError> {
        if !btc_usdt.is_positive() {
            return Err(ValidationError::NonPositive { field: "rate" });
        }
        Ok(Self { btc_usdt })
    }

    /// Units of `to` received per unit of `from`.
    pub fn rate(&self, from: Asset, to: Asset) -> Result<Decimal, ValidationError> {
        match (from, to) {
            (Asset::Btc, Asset::Usdt) => Ok(self.btc_usdt),
            (Asset::Usdt, Asset::Btc) => Decimal::one()
                .checked_div(self.btc_usdt)
                .ok_or(ValidationError::Overflow("rate")),
            (same, _) => Err(ValidationError::SameAsset(same)),
        }
    }

    pub fn quote(
        &self,
        from: Asset,
        to: Asset,
        from_amount: Decimal,
    ) -> Result<SwapQuote, ValidationError> {
        let rate = self.rate(from, to)?;
        Ok(SwapQuote {
            from_asset: from,
            to_asset: to,
            from_amount,
            to_amount: convert(from_amount, rate, to)?,
            rate,
        })
    }
}

fn convert(from_amount: Decimal, rate: Decimal, to: Asset) -> Result<Decimal, ValidationError> {
    from_amount
        .checked_mul(rate)
        .map(|d| d.round_down(to.scale()))
        .ok_or(ValidationError::Overflow("swap amount"))
}

pub struct SwapEngine {
    wallet: Arc<WalletService>,
}

impl SwapEngine {
    pub fn new(wallet: Arc<WalletService>) -> Self {
        Self { wallet }
    }

    /// Exchange `from_amount` of `from` for `from_amount × rate` of `to`.
    ///
    /// Debit, credit and the COMPLETED swap record commit together. If the debit is
    /// rejected nothing is stored. If the credit fails after the debit, the debit is rolled
    /// back and the swap is recorded as FAILED.
    ///
    /// # Errors
    /// `Validation` for same-asset pairs or non-positive amounts, `InsufficientBalance` if
    /// the user cannot cover `from_amount`.
    pub async fn execute_swap(
        &self,
        user: &UserId,
        from: Asset,
        to: Asset,
        from_amount: Decimal,
        rate: Decimal,
    ) -> Result<Swap, LedgerError> {
        if from == to {
            return Err(ValidationError::SameAsset(from).into());
        }
        if !from_amount.is_positive() {
            return Err(ValidationError::NonPositive { field: "fromAmount" }.into());
        }
        if from_amount.scale() > from.scale() {
            return Err(ValidationError::ExcessPrecision {
                asset: from,
                scale: from.scale(),
            }
            .into());
        }
        if !rate.is_positive() {
            return Err(ValidationError::NonPositive { field: "rate" }.into());
        }
        let to_amount = convert(from_amount, rate, to)?;
        if !to_amount.is_positive() {
            return Err(ValidationError::NonPositive { field: "toAmount" }.into());
        }

        let from_key = BalanceKey::new(user.clone(), from);
        let to_key = BalanceKey::new(user.clone(), to);
        let mut unit = self
            .wallet
            .begin_unit(&[from_key.clone(), to_key.clone()])
            .await?;

        let mut swap = Swap {
            id: SwapId::new_v4(),
            user_id: user.clone(),
            from_asset: from,
            to_asset: to,
            from_amount,
            to_amount,
            rate,
            status: SwapStatus::Completed,
            created_at: unit.now(),
        };
        let reference = swap.id.to_string();

        unit.adjust(&from_key, -from_amount, EntryKind::SwapDebit, &reference)
            .await?;

        let credited = match unit
            .adjust(&to_key, to_amount, EntryKind::SwapCredit, &reference)
            .await
        {
            Ok(_) => Repository::insert_swap(unit.conn(), &swap)
                .await
                .map_err(LedgerError::from),
            Err(e) => Err(e),
        };
        if let Err(e) = credited {
            drop(unit);
            swap.status = SwapStatus::Failed;
            warn!(
                swap_id = %swap.id,
                user = %user,
                error = %e,
                "Swap credit failed, debit rolled back"
            );
            self.record_failed(&swap).await;
            return Err(e);
        }
        unit.commit().await?;

        info!(
            swap_id = %swap.id,
            user = %user,
            from = %from,
            to = %to,
            from_amount = %from_amount,
            to_amount = %to_amount,
            rate = %rate,
            "Swap completed"
        );
        Ok(swap)
    }

    /// Quote at the platform rate and execute.
    ///
    /// # Errors
    /// As [`SwapEngine::execute_swap`].
    pub async fn swap_at_platform_rate(
        &self,
        quoter: &RateQuoter,
        user: &UserId,
        from: Asset,
        to: Asset,
        from_amount: Decimal,
    ) -> Result<Swap, LedgerError> {
        let rate = quoter.rate(from, to)?;
        self.execute_swap(user, from, to, from_amount, rate).await
    }

    /// Swaps of a user, newest first, with the total count.
    ///
    /// # Errors
    /// Returns `StorageUnavailable` on storage failure.
    pub async fn list_swaps(
        &self,
        user: &UserId,
        page: Pagination,
    ) -> Result<(Vec<Swap>, i64), LedgerError> {
        Ok(self.wallet.repo().list_swaps(user, page).await?)
    }

    async fn record_failed(&self, swap: &Swap) {
        let stored = async {
            let mut conn = self.wallet.repo().pool().acquire().await?;
            Repository::insert_swap(&mut conn, swap).await
        }
        .await;
        if let Err(e) = stored {
            error!(swap_id = %swap.id, error = %e, "Could not record failed swap");
        }
    }
}
