//! Repository layer for database operations.
//!
//! This module provides the `Repository` struct for all database operations.
//! Methods are organized across submodules by table:
//! - `balances.rs` - Balance rows and ledger entries
//! - `trades.rs` - Trade rows and guarded status updates
//! - `swaps.rs` - Swap rows
//! - `directory.rs` - Advertisement terms and provisioned wallet addresses
//!
//! Mutating ledger primitives take a `&mut SqliteConnection` so callers can group several
//! of them into one transaction. Reads go through the pool.

mod balances;
mod directory;
mod swaps;
mod trades;

pub use trades::TradeUpdate;

use crate::domain::{Asset, Decimal, TimeMs, UserId};
use crate::error::ValidationError;
use sqlx::sqlite::{Sqlite, SqlitePool, SqliteRow};
use sqlx::{Row, Transaction};
use std::str::FromStr;

/// Page request for history listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// 1-based page number.
    pub page: u32,
    pub limit: u32,
}

impl Pagination {
    pub const DEFAULT_LIMIT: u32 = 20;
    pub const MAX_LIMIT: u32 = 100;

    pub fn new(page: u32, limit: u32) -> Self {
        Self { page, limit }
    }

    /// Build a page request from optional query values, applying defaults and bounds.
    pub fn checked(page: Option<u32>, limit: Option<u32>) -> Result<Self, ValidationError> {
        let page = page.unwrap_or(1);
        let limit = limit.unwrap_or(Self::DEFAULT_LIMIT);
        if page < 1 {
            return Err(ValidationError::Other("page must be at least 1".into()));
        }
        if !(1..=Self::MAX_LIMIT).contains(&limit) {
            return Err(ValidationError::Other(format!(
                "limit must be between 1 and {}",
                Self::MAX_LIMIT
            )));
        }
        Ok(Self { page, limit })
    }

    /// Number of pages needed for `total` rows.
    pub fn pages(&self, total: i64) -> i64 {
        let limit = self.limit.max(1) as i64;
        (total + limit - 1) / limit
    }

    pub fn offset(&self) -> i64 {
        (self.page.saturating_sub(1) as i64) * self.limit as i64
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(1, Self::DEFAULT_LIMIT)
    }
}

/// Repository for database operations.
#[derive(Debug)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Open a transaction. Dropping it without commit rolls everything back.
    ///
    /// # Errors
    /// Returns an error if no connection can be acquired.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
        self.pool.begin().await
    }
}

fn decode_err(column: &str, value: &str, reason: impl std::fmt::Display) -> sqlx::Error {
    sqlx::Error::Decode(format!("column {column}: cannot decode {value:?}: {reason}").into())
}

/// Read a decimal stored as canonical text. Corrupt values are an error, never zero.
pub(crate) fn decimal_column(row: &SqliteRow, column: &str) -> Result<Decimal, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    Decimal::from_str(&raw).map_err(|e| decode_err(column, &raw, e))
}

pub(crate) fn asset_column(row: &SqliteRow, column: &str) -> Result<Asset, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    Asset::from_str(&raw).map_err(|e| decode_err(column, &raw, e))
}

pub(crate) fn parsed_column<T>(row: &SqliteRow, column: &str) -> Result<T, sqlx::Error>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw: String = row.try_get(column)?;
    raw.parse::<T>().map_err(|e| decode_err(column, &raw, e))
}

pub(crate) fn user_column(row: &SqliteRow, column: &str) -> Result<UserId, sqlx::Error> {
    Ok(UserId::new(row.try_get::<String, _>(column)?))
}

pub(crate) fn time_column(row: &SqliteRow, column: &str) -> Result<TimeMs, sqlx::Error> {
    Ok(TimeMs::new(row.try_get::<i64, _>(column)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_offset() {
        assert_eq!(Pagination::new(1, 20).offset(), 0);
        assert_eq!(Pagination::new(3, 20).offset(), 40);
        assert_eq!(Pagination::new(0, 20).offset(), 0);
    }

    #[test]
    fn test_pagination_bounds() {
        assert_eq!(Pagination::checked(None, None).unwrap(), Pagination::default());
        assert!(Pagination::checked(Some(0), None).is_err());
        assert!(Pagination::checked(None, Some(0)).is_err());
        assert!(Pagination::checked(None, Some(101)).is_err());
        assert_eq!(Pagination::checked(Some(2), Some(100)).unwrap().limit, 100);

        let page = Pagination::new(1, 20);
        assert_eq!(page.pages(0), 0);
        assert_eq!(page.pages(20), 1);
        assert_eq!(page.pages(21), 2);
    }
}
