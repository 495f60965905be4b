//! Trade record and its state machine.

use super::{AdvertisementSnapshot, Decimal, TimeMs, UserId};
use crate::error::LedgerError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TradeId(pub Uuid);

impl TradeId {
    pub fn new_v4() -> Self {
        TradeId(Uuid::new_v4())
    }
}

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TradeId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(TradeId)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeStatus {
    Pending,
    Paid,
    Completed,
    Disputed,
    Cancelled,
}

/// Requests that move a trade between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeAction {
    SubmitPaymentProof,
    Release,
    Dispute,
    Cancel,
}

impl TradeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeAction::SubmitPaymentProof => "submit payment proof for",
            TradeAction::Release => "release",
            TradeAction::Dispute => "dispute",
            TradeAction::Cancel => "cancel",
        }
    }
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Pending => "PENDING",
            TradeStatus::Paid => "PAID",
            TradeStatus::Completed => "COMPLETED",
            TradeStatus::Disputed => "DISPUTED",
            TradeStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TradeStatus::Completed | TradeStatus::Disputed | TradeStatus::Cancelled
        )
    }

    /// The transition table. Every state change of a trade goes through here.
    pub fn apply(self, action: TradeAction) -> Result<TradeStatus, LedgerError> {
        use TradeAction::*;
        use TradeStatus::*;

        match (self, action) {
            (Pending, SubmitPaymentProof) => Ok(Paid),
            (Paid, Release) => Ok(Completed),
            (Pending | Paid, Dispute) => Ok(Disputed),
            (Pending, Cancel) => Ok(Cancelled),
            (from, action) => Err(LedgerError::InvalidStateTransition {
                from,
                action: action.as_str(),
            }),
        }
    }
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TradeStatus::Pending),
            "PAID" => Ok(TradeStatus::Paid),
            "COMPLETED" => Ok(TradeStatus::Completed),
            "DISPUTED" => Ok(TradeStatus::Disputed),
            "CANCELLED" => Ok(TradeStatus::Cancelled),
            other => Err(format!("unknown trade status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub id: TradeId,
    pub advertisement: AdvertisementSnapshot,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub fiat_amount: Decimal,
    /// `fiat_amount / advertisement.rate`, frozen at open.
    pub asset_amount: Decimal,
    pub status: TradeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_proof_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispute_reason: Option<String>,
    /// Seller funds were moved to the escrow account at open.
    pub escrow_held: bool,
    pub version: i64,
    pub created_at: TimeMs,
    pub updated_at: TimeMs,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<TimeMs>,
}

impl Trade {
    pub fn is_party(&self, user: &UserId) -> bool {
        &self.buyer_id == user || &self.seller_id == user
    }

    /// Check that `actor` may perform `action`, independent of the current status.
    pub fn authorize(&self, actor: &UserId, action: TradeAction) -> Result<(), LedgerError> {
        let allowed = match action {
            TradeAction::SubmitPaymentProof => &self.buyer_id == actor,
            TradeAction::Release => &self.seller_id == actor,
            TradeAction::Dispute | TradeAction::Cancel => self.is_party(actor),
        };
        if allowed {
            Ok(())
        } else {
            Err(LedgerError::Unauthorized {
                actor: actor.clone(),
                action: action.as_str(),
                trade_id: self.id,
            })
        }
    }
}
