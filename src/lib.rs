pub mod api;
pub mod config;
pub mod db;
pub mod directory;
pub mod domain;
pub mod engine;
pub mod error;
pub mod proof;
pub mod wallet;

pub use config::Config;
pub use db::{init_db, Repository};
pub use directory::{AdvertisementDirectory, InMemoryDirectory, SqliteDirectory};
pub use domain::{
    AdvertisementSnapshot, Asset, Decimal, EntryKind, LedgerEntry, Swap, SwapStatus, TimeMs,
    Trade, TradeId, TradeStatus, TradeType, UserId,
};
pub use engine::{EscrowMode, RateQuoter, SwapEngine, TradeEngine};
pub use error::{AppError, ErrorKind, LedgerError, ValidationError};
pub use proof::{FsProofStore, ProofStore};
pub use wallet::{WalletProvisioner, WalletService};
