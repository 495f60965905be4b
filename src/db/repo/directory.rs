//! Rows owned by external collaborators: advertisement terms and custody addresses.

use super::{asset_column, decimal_column, parsed_column, user_column, Repository};
use crate::domain::{AdvertisementSnapshot, Asset, TimeMs, TradeType, UserId};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::collections::BTreeMap;

fn snapshot_from_row(row: &SqliteRow) -> Result<AdvertisementSnapshot, sqlx::Error> {
    Ok(AdvertisementSnapshot {
        advertisement_id: row.try_get("id")?,
        asset: asset_column(row, "asset")?,
        trade_type: parsed_column::<TradeType>(row, "trade_type")?,
        rate: decimal_column(row, "rate")?,
        min_limit: decimal_column(row, "min_limit")?,
        max_limit: decimal_column(row, "max_limit")?,
        owner_id: user_column(row, "owner_id")?,
    })
}

impl Repository {
    /// Insert or replace an advertisement's terms and status.
    ///
    /// The advertisement service owns this table; the ledger only reads it.
    ///
    /// # Errors
    /// Returns an error if the upsert fails.
    pub async fn upsert_advertisement(
        &self,
        ad: &AdvertisementSnapshot,
        active: bool,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO advertisements (
                id, owner_id, asset, trade_type, rate, min_limit, max_limit, status, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                owner_id = excluded.owner_id,
                asset = excluded.asset,
                trade_type = excluded.trade_type,
                rate = excluded.rate,
                min_limit = excluded.min_limit,
                max_limit = excluded.max_limit,
                status = excluded.status,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(ad.advertisement_id.as_str())
        .bind(ad.owner_id.as_str())
        .bind(ad.asset.as_str())
        .bind(ad.trade_type.as_str())
        .bind(ad.rate.to_canonical_string())
        .bind(ad.min_limit.to_canonical_string())
        .bind(ad.max_limit.to_canonical_string())
        .bind(if active { "ACTIVE" } else { "INACTIVE" })
        .bind(TimeMs::now().as_ms())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Terms of an advertisement, only if it is ACTIVE.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get_active_advertisement(
        &self,
        id: &str,
    ) -> Result<Option<AdvertisementSnapshot>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT id, owner_id, asset, trade_type, rate, min_limit, max_limit
            FROM advertisements
            WHERE id = ? AND status = 'ACTIVE'
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(snapshot_from_row).transpose()
    }

    /// Deposit addresses recorded for a user, keyed by asset.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn wallet_addresses(
        &self,
        user: &UserId,
    ) -> Result<BTreeMap<Asset, String>, sqlx::Error> {
        let rows = sqlx::query("SELECT asset, address FROM wallet_addresses WHERE user_id = ?")
            .bind(user.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| -> Result<(Asset, String), sqlx::Error> {
                Ok((asset_column(row, "asset")?, row.try_get("address")?))
            })
            .collect()
    }

    /// Record a provisioned deposit address. The first address recorded wins.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn insert_wallet_address(
        &self,
        user: &UserId,
        asset: Asset,
        address: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO wallet_addresses (user_id, asset, address, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(user_id, asset) DO NOTHING
            "#,
        )
        .bind(user.as_str())
        .bind(asset.as_str())
        .bind(address)
        .bind(TimeMs::now().as_ms())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
