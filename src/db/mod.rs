//! Database module for SQLite operations.
//!
//! This module provides:
//! - Database initialization and migrations
//! - SQLite pragma configuration
//! - Repository layer: ledger primitives, trades, swaps and collaborator-owned rows

pub mod migrations;
pub mod repo;

pub use migrations::init_db;
pub use repo::{Pagination, Repository, TradeUpdate};
