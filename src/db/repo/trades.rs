//! Trade rows.

use super::{
    asset_column, decimal_column, parsed_column, time_column, user_column, Pagination, Repository,
};
use crate::domain::{AdvertisementSnapshot, TimeMs, Trade, TradeId, TradeStatus, TradeType, UserId};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;

const TRADE_COLUMNS: &str = r#"
    id, advertisement_id, asset, trade_type, rate, min_limit, max_limit, owner_id,
    buyer_id, seller_id, fiat_amount, asset_amount, status, payment_proof_ref,
    dispute_reason, escrow_held, version, created_at, updated_at, completed_at
"#;

/// Fields written by a status transition. `None` leaves the stored value alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeUpdate {
    pub status: TradeStatus,
    pub payment_proof_ref: Option<String>,
    pub dispute_reason: Option<String>,
    pub completed_at: Option<TimeMs>,
}

impl TradeUpdate {
    pub fn status(status: TradeStatus) -> Self {
        Self {
            status,
            payment_proof_ref: None,
            dispute_reason: None,
            completed_at: None,
        }
    }
}

fn trade_from_row(row: &SqliteRow) -> Result<Trade, sqlx::Error> {
    let advertisement = AdvertisementSnapshot {
        advertisement_id: row.try_get("advertisement_id")?,
        asset: asset_column(row, "asset")?,
        trade_type: parsed_column::<TradeType>(row, "trade_type")?,
        rate: decimal_column(row, "rate")?,
        min_limit: decimal_column(row, "min_limit")?,
        max_limit: decimal_column(row, "max_limit")?,
        owner_id: user_column(row, "owner_id")?,
    };

    Ok(Trade {
        id: parsed_column::<TradeId>(row, "id")?,
        advertisement,
        buyer_id: user_column(row, "buyer_id")?,
        seller_id: user_column(row, "seller_id")?,
        fiat_amount: decimal_column(row, "fiat_amount")?,
        asset_amount: decimal_column(row, "asset_amount")?,
        status: parsed_column::<TradeStatus>(row, "status")?,
        payment_proof_ref: row.try_get("payment_proof_ref")?,
        dispute_reason: row.try_get("dispute_reason")?,
        escrow_held: row.try_get::<i64, _>("escrow_held")? != 0,
        version: row.try_get("version")?,
        created_at: time_column(row, "created_at")?,
        updated_at: time_column(row, "updated_at")?,
        completed_at: row.try_get::<Option<i64>, _>("completed_at")?.map(TimeMs::new),
    })
}

impl Repository {
    /// Insert a freshly opened trade.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn insert_trade(
        conn: &mut SqliteConnection,
        trade: &Trade,
    ) -> Result<(), sqlx::Error> {
        let ad = &trade.advertisement;
        sqlx::query(
            r#"
            INSERT INTO trades (
                id, advertisement_id, asset, trade_type, rate, min_limit, max_limit, owner_id,
                buyer_id, seller_id, fiat_amount, asset_amount, status, payment_proof_ref,
                dispute_reason, escrow_held, version, created_at, updated_at, completed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(trade.id.to_string())
        .bind(ad.advertisement_id.as_str())
        .bind(ad.asset.as_str())
        .bind(ad.trade_type.as_str())
        .bind(ad.rate.to_canonical_string())
        .bind(ad.min_limit.to_canonical_string())
        .bind(ad.max_limit.to_canonical_string())
        .bind(ad.owner_id.as_str())
        .bind(trade.buyer_id.as_str())
        .bind(trade.seller_id.as_str())
        .bind(trade.fiat_amount.to_canonical_string())
        .bind(trade.asset_amount.to_canonical_string())
        .bind(trade.status.as_str())
        .bind(trade.payment_proof_ref.as_deref())
        .bind(trade.dispute_reason.as_deref())
        .bind(trade.escrow_held as i64)
        .bind(trade.version)
        .bind(trade.created_at.as_ms())
        .bind(trade.updated_at.as_ms())
        .bind(trade.completed_at.map(|t| t.as_ms()))
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Move a trade to a new status if it is still at `expected_version` and
    /// `expected_status`.
    ///
    /// Returns false when another transition won the race; nothing is written then.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn transition_trade(
        conn: &mut SqliteConnection,
        id: TradeId,
        expected_version: i64,
        expected_status: TradeStatus,
        update: &TradeUpdate,
        now: TimeMs,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE trades
            SET status = ?,
                payment_proof_ref = COALESCE(?, payment_proof_ref),
                dispute_reason = COALESCE(?, dispute_reason),
                completed_at = COALESCE(?, completed_at),
                version = version + 1,
                updated_at = ?
            WHERE id = ? AND version = ? AND status = ?
            "#,
        )
        .bind(update.status.as_str())
        .bind(update.payment_proof_ref.as_deref())
        .bind(update.dispute_reason.as_deref())
        .bind(update.completed_at.map(|t| t.as_ms()))
        .bind(now.as_ms())
        .bind(id.to_string())
        .bind(expected_version)
        .bind(expected_status.as_str())
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Get a trade by id.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get_trade(&self, id: TradeId) -> Result<Option<Trade>, sqlx::Error> {
        let row = sqlx::query(&format!("SELECT {TRADE_COLUMNS} FROM trades WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(trade_from_row).transpose()
    }

    /// Trades where the user is buyer or seller, newest first, with the total count.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn list_trades_for_user(
        &self,
        user: &UserId,
        page: Pagination,
    ) -> Result<(Vec<Trade>, i64), sqlx::Error> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {TRADE_COLUMNS}
            FROM trades
            WHERE buyer_id = ? OR seller_id = ?
            ORDER BY created_at DESC, id ASC
            LIMIT ? OFFSET ?
            "#
        ))
        .bind(user.as_str())
        .bind(user.as_str())
        .bind(page.limit as i64)
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM trades WHERE buyer_id = ? OR seller_id = ?")
                .bind(user.as_str())
                .bind(user.as_str())
                .fetch_one(&self.pool)
                .await?;

        let trades = rows.iter().map(trade_from_row).collect::<Result<_, _>>()?;
        Ok((trades, total))
    }
}
