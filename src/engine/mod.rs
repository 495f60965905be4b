//! Trade and swap engines. Neither touches balances directly; both go through the wallet
//! service's ledger units.

pub mod swap;
pub mod trade_lifecycle;

pub use swap::{RateQuoter, SwapEngine, SwapQuote};
pub use trade_lifecycle::{EscrowMode, TradeEngine};
