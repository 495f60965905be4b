//! Balances and their append-only ledger entries.

use super::{Asset, Decimal, TimeMs, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity of one balance: a (user, asset) pair.
///
/// The derived `Ord` is the lock-acquisition order used by the wallet service.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BalanceKey {
    pub user: UserId,
    pub asset: Asset,
}

impl BalanceKey {
    pub fn new(user: UserId, asset: Asset) -> Self {
        Self { user, asset }
    }
}

impl fmt::Display for BalanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user, self.asset)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    pub id: i64,
    pub user_id: UserId,
    pub asset: Asset,
    pub amount: Decimal,
    pub version: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryKind {
    Deposit,
    Withdrawal,
    EscrowHold,
    EscrowRelease,
    SwapDebit,
    SwapCredit,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Deposit => "DEPOSIT",
            EntryKind::Withdrawal => "WITHDRAWAL",
            EntryKind::EscrowHold => "ESCROW_HOLD",
            EntryKind::EscrowRelease => "ESCROW_RELEASE",
            EntryKind::SwapDebit => "SWAP_DEBIT",
            EntryKind::SwapCredit => "SWAP_CREDIT",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEPOSIT" => Ok(EntryKind::Deposit),
            "WITHDRAWAL" => Ok(EntryKind::Withdrawal),
            "ESCROW_HOLD" => Ok(EntryKind::EscrowHold),
            "ESCROW_RELEASE" => Ok(EntryKind::EscrowRelease),
            "SWAP_DEBIT" => Ok(EntryKind::SwapDebit),
            "SWAP_CREDIT" => Ok(EntryKind::SwapCredit),
            other => Err(format!("unknown ledger entry kind: {}", other)),
        }
    }
}

/// Immutable record of one balance mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: i64,
    pub balance_id: i64,
    pub user_id: UserId,
    pub asset: Asset,
    /// Signed change applied to the balance.
    pub delta: Decimal,
    pub resulting_balance: Decimal,
    pub kind: EntryKind,
    /// Trade, swap or seeding id the mutation belongs to.
    pub reference_id: String,
    pub created_at: TimeMs,
}

/// Result of a balance audit: the stored amount against the sum of its entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceAudit {
    pub user_id: UserId,
    pub asset: Asset,
    pub amount: Decimal,
    pub ledger_sum: Decimal,
    pub entry_count: i64,
}

impl BalanceAudit {
    pub fn is_consistent(&self) -> bool {
        self.amount == self.ledger_sum
    }
}
