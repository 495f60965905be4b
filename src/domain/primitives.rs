//! Domain primitives: TimeMs, UserId, Asset, TradeType.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::LEDGER_SCALE;

/// Time in milliseconds since Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeMs(pub i64);

impl TimeMs {
    /// Create a TimeMs from milliseconds.
    pub fn new(ms: i64) -> Self {
        TimeMs(ms)
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        TimeMs(chrono::Utc::now().timestamp_millis())
    }

    /// Get the underlying milliseconds value.
    pub fn as_ms(&self) -> i64 {
        self.0
    }
}

/// Opaque user identifier supplied by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    /// Prefix reserved for platform-owned accounts.
    pub const SYSTEM_PREFIX: &'static str = "system:";

    pub fn new(id: impl Into<String>) -> Self {
        UserId(id.into())
    }

    /// Platform account that holds reserved trade funds.
    pub fn escrow() -> Self {
        UserId(format!("{}escrow", Self::SYSTEM_PREFIX))
    }

    pub fn is_system(&self) -> bool {
        self.0.starts_with(Self::SYSTEM_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The two assets the ledger custodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Asset {
    Btc,
    Usdt,
}

impl Asset {
    pub const ALL: [Asset; 2] = [Asset::Btc, Asset::Usdt];

    pub fn as_str(&self) -> &'static str {
        match self {
            Asset::Btc => "BTC",
            Asset::Usdt => "USDT",
        }
    }

    /// Fractional digits stored for this asset.
    pub fn scale(&self) -> u32 {
        LEDGER_SCALE
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown asset symbol: {0}")]
pub struct UnknownAsset(pub String);

impl FromStr for Asset {
    type Err = UnknownAsset;

    /// Case-insensitive: path segments like `/wallets/btc` are accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BTC" => Ok(Asset::Btc),
            "USDT" => Ok(Asset::Usdt),
            _ => Err(UnknownAsset(s.to_string())),
        }
    }
}

/// Direction of an advertisement from the owner's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeType {
    /// Owner buys the asset; the counterparty sells.
    Buy,
    /// Owner sells the asset; the counterparty buys.
    Sell,
}

impl TradeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeType::Buy => "BUY",
            TradeType::Sell => "SELL",
        }
    }
}

impl fmt::Display for TradeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUY" => Ok(TradeType::Buy),
            "SELL" => Ok(TradeType::Sell),
            other => Err(format!("unknown trade type: {}", other)),
        }
    }
}
