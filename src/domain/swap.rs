//! Asset-to-asset swap record.

use super::{Asset, Decimal, TimeMs, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SwapId(pub Uuid);

impl SwapId {
    pub fn new_v4() -> Self {
        SwapId(Uuid::new_v4())
    }
}

impl fmt::Display for SwapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SwapStatus {
    Pending,
    Completed,
    /// The credit leg failed after the debit; the debit was rolled back.
    Failed,
}

impl SwapStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwapStatus::Pending => "PENDING",
            SwapStatus::Completed => "COMPLETED",
            SwapStatus::Failed => "FAILED",
        }
    }
}

impl FromStr for SwapStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(SwapStatus::Pending),
            "COMPLETED" => Ok(SwapStatus::Completed),
            "FAILED" => Ok(SwapStatus::Failed),
            other => Err(format!("unknown swap status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Swap {
    pub id: SwapId,
    pub user_id: UserId,
    pub from_asset: Asset,
    pub to_asset: Asset,
    pub from_amount: Decimal,
    /// `from_amount * rate`, truncated to ledger scale.
    pub to_amount: Decimal,
    pub rate: Decimal,
    pub status: SwapStatus,
    pub created_at: TimeMs,
}
