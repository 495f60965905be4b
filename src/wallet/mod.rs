//! Wallet service: the only component allowed to mutate balances.
//!
//! Every mutation runs inside a [`LedgerUnit`]: the balances it touches are locked in key
//! order, then all balance updates and their ledger entries are written in one SQLite
//! transaction. Callers that must persist their own rows atomically with the ledger
//! (trade settlement, swaps) write them through [`LedgerUnit::conn`] before committing.

pub mod locks;
pub mod provision;

pub use locks::BalanceLocks;
pub use provision::{ProvisionError, UnconfiguredProvisioner, WalletProvisioner};

use crate::db::{Pagination, Repository};
use crate::domain::{
    Asset, Balance, BalanceAudit, BalanceKey, Decimal, EntryKind, LedgerEntry, TimeMs, UserId,
};
use crate::error::{LedgerError, ValidationError};
use serde::Serialize;
use sqlx::sqlite::{Sqlite, SqliteConnection};
use sqlx::Transaction;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

/// The two entries written by a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferReceipt {
    pub debit: LedgerEntry,
    pub credit: LedgerEntry,
}

impl TransferReceipt {
    pub fn from_balance(&self) -> Decimal {
        self.debit.resulting_balance
    }

    pub fn to_balance(&self) -> Decimal {
        self.credit.resulting_balance
    }
}

pub struct WalletService {
    repo: Arc<Repository>,
    locks: BalanceLocks,
}

impl WalletService {
    pub fn new(repo: Arc<Repository>) -> Self {
        Self {
            repo,
            locks: BalanceLocks::new(),
        }
    }

    pub fn repo(&self) -> &Arc<Repository> {
        &self.repo
    }

    /// Lock `keys` and open a transaction over them.
    ///
    /// # Errors
    /// Returns `StorageUnavailable` if the transaction cannot be started.
    pub async fn begin_unit(&self, keys: &[BalanceKey]) -> Result<LedgerUnit, LedgerError> {
        let guards = self.locks.acquire(keys).await;
        let now = TimeMs::now();
        let mut tx = self.repo.begin().await?;

        let mut balances = BTreeMap::new();
        for key in keys {
            if balances.contains_key(key) {
                continue;
            }
            let balance = Repository::ensure_balance(&mut tx, key, now).await?;
            balances.insert(key.clone(), balance);
        }

        Ok(LedgerUnit {
            tx,
            balances,
            entries: Vec::new(),
            now,
            _guards: guards,
        })
    }

    /// Current amount of a balance; zero if it was never touched.
    ///
    /// # Errors
    /// Returns `StorageUnavailable` on storage failure.
    pub async fn get_balance(&self, user: &UserId, asset: Asset) -> Result<Decimal, LedgerError> {
        let key = BalanceKey::new(user.clone(), asset);
        Ok(self
            .repo
            .get_balance(&key)
            .await?
            .map(|b| b.amount)
            .unwrap_or_default())
    }

    /// Amounts of every supported asset for a user.
    ///
    /// # Errors
    /// Returns `StorageUnavailable` on storage failure.
    pub async fn balances(&self, user: &UserId) -> Result<Vec<(Asset, Decimal)>, LedgerError> {
        let mut out = Vec::with_capacity(Asset::ALL.len());
        for asset in Asset::ALL {
            out.push((asset, self.get_balance(user, asset).await?));
        }
        Ok(out)
    }

    /// Move `amount` of `asset` from one user to another.
    ///
    /// Writes a WITHDRAWAL entry on the sender and a DEPOSIT entry on the receiver, both
    /// tagged with `reference_id`, or nothing at all.
    ///
    /// # Errors
    /// `Validation` for a non-positive amount or a self-transfer, `InsufficientBalance` if
    /// the sender cannot cover it.
    pub async fn transfer(
        &self,
        from: &UserId,
        to: &UserId,
        asset: Asset,
        amount: Decimal,
        reference_id: &str,
    ) -> Result<TransferReceipt, LedgerError> {
        let from_key = BalanceKey::new(from.clone(), asset);
        let to_key = BalanceKey::new(to.clone(), asset);

        let mut unit = self.begin_unit(&[from_key.clone(), to_key.clone()]).await?;
        let receipt = unit
            .move_funds(
                &from_key,
                &to_key,
                amount,
                EntryKind::Withdrawal,
                EntryKind::Deposit,
                reference_id,
            )
            .await?;
        unit.commit().await?;

        info!(
            from = %from,
            to = %to,
            asset = %asset,
            amount = %amount,
            reference_id,
            "Transfer applied"
        );
        Ok(receipt)
    }

    /// Apply a single signed change to one balance.
    ///
    /// # Errors
    /// `Validation` for a zero delta, `InsufficientBalance` if the result would be negative.
    pub async fn adjust_single(
        &self,
        user: &UserId,
        asset: Asset,
        delta: Decimal,
        kind: EntryKind,
        reference_id: &str,
    ) -> Result<LedgerEntry, LedgerError> {
        let key = BalanceKey::new(user.clone(), asset);
        let mut unit = self.begin_unit(std::slice::from_ref(&key)).await?;
        let entry = unit.adjust(&key, delta, kind, reference_id).await?;
        unit.commit().await?;
        Ok(entry)
    }

    /// Ledger entries of one balance, newest first.
    ///
    /// # Errors
    /// Returns `StorageUnavailable` on storage failure.
    pub async fn entries(
        &self,
        user: &UserId,
        asset: Asset,
        page: Pagination,
    ) -> Result<(Vec<LedgerEntry>, i64), LedgerError> {
        Ok(self.repo.list_entries(user, asset, page).await?)
    }

    /// Compare a balance against the sum of its ledger entries.
    ///
    /// # Errors
    /// Returns `StorageUnavailable` on storage failure.
    pub async fn audit(&self, user: &UserId, asset: Asset) -> Result<BalanceAudit, LedgerError> {
        let key = BalanceKey::new(user.clone(), asset);
        match self.repo.get_balance(&key).await? {
            Some(balance) => self.audit_balance(balance).await,
            None => Ok(BalanceAudit {
                user_id: user.clone(),
                asset,
                amount: Decimal::zero(),
                ledger_sum: Decimal::zero(),
                entry_count: 0,
            }),
        }
    }

    /// Audit every balance row.
    ///
    /// # Errors
    /// Returns `StorageUnavailable` on storage failure.
    pub async fn audit_all(&self) -> Result<Vec<BalanceAudit>, LedgerError> {
        let mut audits = Vec::new();
        for balance in self.repo.list_all_balances().await? {
            audits.push(self.audit_balance(balance).await?);
        }
        Ok(audits)
    }

    async fn audit_balance(&self, balance: Balance) -> Result<BalanceAudit, LedgerError> {
        let deltas = self.repo.balance_deltas(balance.id).await?;
        let audit = BalanceAudit {
            user_id: balance.user_id,
            asset: balance.asset,
            amount: balance.amount,
            entry_count: deltas.len() as i64,
            ledger_sum: deltas.into_iter().sum(),
        };
        if !audit.is_consistent() {
            warn!(
                user = %audit.user_id,
                asset = %audit.asset,
                amount = %audit.amount,
                ledger_sum = %audit.ledger_sum,
                "Balance does not match its ledger"
            );
        }
        Ok(audit)
    }

    /// Make sure the custody backend has issued a deposit address for every asset.
    ///
    /// Also creates the zero balances so the user shows up in wallet listings.
    ///
    /// # Errors
    /// `CollaboratorUnavailable` if the provisioner fails, `StorageUnavailable` on storage
    /// failure.
    pub async fn ensure_provisioned(
        &self,
        user: &UserId,
        provisioner: &dyn WalletProvisioner,
    ) -> Result<BTreeMap<Asset, String>, LedgerError> {
        let mut addresses = self.repo.wallet_addresses(user).await?;

        for asset in Asset::ALL {
            if addresses.contains_key(&asset) {
                continue;
            }
            let address = provisioner
                .provision(user, asset)
                .await
                .map_err(|e| LedgerError::CollaboratorUnavailable(e.to_string()))?;
            self.repo.insert_wallet_address(user, asset, &address).await?;
            info!(user = %user, asset = %asset, "Deposit address provisioned");
        }

        let keys: Vec<BalanceKey> = Asset::ALL
            .iter()
            .map(|a| BalanceKey::new(user.clone(), *a))
            .collect();
        self.begin_unit(&keys).await?.commit().await?;

        addresses = self.repo.wallet_addresses(user).await?;
        Ok(addresses)
    }
}

/// Locked balances plus an open transaction. Dropping it without [`commit`] rolls back
/// every write made through it.
///
/// [`commit`]: LedgerUnit::commit
pub struct LedgerUnit {
    tx: Transaction<'static, Sqlite>,
    balances: BTreeMap<BalanceKey, Balance>,
    entries: Vec<LedgerEntry>,
    now: TimeMs,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl LedgerUnit {
    /// Connection inside the unit's transaction, for rows that must commit together with
    /// the ledger.
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    /// Timestamp stamped on every write of this unit.
    pub fn now(&self) -> TimeMs {
        self.now
    }

    pub fn balance(&self, key: &BalanceKey) -> Option<Decimal> {
        self.balances.get(key).map(|b| b.amount)
    }

    /// Entries written so far, in write order.
    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// Apply a signed change to one locked balance.
    ///
    /// # Errors
    /// `Validation` for a zero delta, `InsufficientBalance` if the result would be negative,
    /// `Conflict` if the row was changed outside the wallet service.
    pub async fn adjust(
        &mut self,
        key: &BalanceKey,
        delta: Decimal,
        kind: EntryKind,
        reference_id: &str,
    ) -> Result<LedgerEntry, LedgerError> {
        if delta.is_zero() {
            return Err(ValidationError::NonPositive { field: "amount" }.into());
        }
        if delta.scale() > key.asset.scale() {
            return Err(ValidationError::ExcessPrecision {
                asset: key.asset,
                scale: key.asset.scale(),
            }
            .into());
        }

        let balance = self
            .balances
            .get(key)
            .cloned()
            .ok_or_else(|| LedgerError::Conflict(format!("balance {} is not locked", key)))?;

        let resulting = balance
            .amount
            .checked_add(delta)
            .ok_or(ValidationError::Overflow("balance"))?;
        if resulting.is_negative() {
            return Err(LedgerError::InsufficientBalance {
                user: key.user.clone(),
                asset: key.asset,
                available: balance.amount,
                required: delta.abs(),
            });
        }

        let entry =
            Repository::apply_delta(&mut self.tx, &balance, delta, kind, reference_id, self.now)
                .await?
                .ok_or_else(|| LedgerError::Conflict(format!("balance {}", key)))?;

        debug!(
            balance = %key,
            delta = %delta,
            resulting = %entry.resulting_balance,
            kind = %kind,
            reference_id,
            "Ledger entry written"
        );

        self.balances.insert(
            key.clone(),
            Balance {
                amount: entry.resulting_balance,
                version: balance.version + 1,
                ..balance
            },
        );
        self.entries.push(entry.clone());
        Ok(entry)
    }

    /// Debit `from` and credit `to` by the same positive amount.
    ///
    /// # Errors
    /// See [`LedgerUnit::adjust`]; self-moves are rejected.
    pub async fn move_funds(
        &mut self,
        from: &BalanceKey,
        to: &BalanceKey,
        amount: Decimal,
        debit_kind: EntryKind,
        credit_kind: EntryKind,
        reference_id: &str,
    ) -> Result<TransferReceipt, LedgerError> {
        if !amount.is_positive() {
            return Err(ValidationError::NonPositive { field: "amount" }.into());
        }
        if from == to {
            return Err(ValidationError::SelfTransfer.into());
        }

        let debit = self.adjust(from, -amount, debit_kind, reference_id).await?;
        let credit = self.adjust(to, amount, credit_kind, reference_id).await?;
        Ok(TransferReceipt { debit, credit })
    }

    /// Reserve `amount` of a seller's funds in the platform escrow account.
    ///
    /// # Errors
    /// `InsufficientBalance` if the seller cannot cover it.
    pub async fn hold(
        &mut self,
        seller: &UserId,
        asset: Asset,
        amount: Decimal,
        reference_id: &str,
    ) -> Result<TransferReceipt, LedgerError> {
        self.move_funds(
            &BalanceKey::new(seller.clone(), asset),
            &BalanceKey::new(UserId::escrow(), asset),
            amount,
            EntryKind::EscrowHold,
            EntryKind::EscrowHold,
            reference_id,
        )
        .await
    }

    /// Pay a held amount out of escrow to `recipient`.
    ///
    /// # Errors
    /// `InsufficientBalance` if escrow does not hold enough, which means the hold was never
    /// made.
    pub async fn release_hold(
        &mut self,
        recipient: &UserId,
        asset: Asset,
        amount: Decimal,
        reference_id: &str,
    ) -> Result<TransferReceipt, LedgerError> {
        self.move_funds(
            &BalanceKey::new(UserId::escrow(), asset),
            &BalanceKey::new(recipient.clone(), asset),
            amount,
            EntryKind::EscrowRelease,
            EntryKind::EscrowRelease,
            reference_id,
        )
        .await
    }

    /// Commit all writes and release the balance locks.
    ///
    /// # Errors
    /// Returns `StorageUnavailable` if the commit fails; nothing is applied then.
    pub async fn commit(self) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.tx.commit().await?;
        Ok(self.entries)
    }
}
