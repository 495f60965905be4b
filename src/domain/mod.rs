//! Domain types for the escrow ledger.
//!
//! This module provides:
//! - Lossless numeric handling via Decimal wrapper
//! - Domain primitives: TimeMs, UserId, Asset, TradeType
//! - Advertisement snapshots, trades and their state machine, swaps
//! - Balances and ledger entries

pub mod advertisement;
pub mod decimal;
pub mod ledger;
pub mod primitives;
pub mod swap;
pub mod trade;

pub use advertisement::AdvertisementSnapshot;
pub use decimal::{Decimal, LEDGER_SCALE};
pub use ledger::{Balance, BalanceAudit, BalanceKey, EntryKind, LedgerEntry};
pub use primitives::{Asset, TimeMs, TradeType, UnknownAsset, UserId};
pub use swap::{Swap, SwapId, SwapStatus};
pub use trade::{Trade, TradeAction, TradeId, TradeStatus};
