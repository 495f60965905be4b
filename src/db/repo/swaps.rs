//! Swap rows.

use super::{
    asset_column, decimal_column, parsed_column, time_column, user_column, Pagination, Repository,
};
use crate::domain::{Swap, SwapId, SwapStatus, UserId};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use uuid::Uuid;

fn swap_from_row(row: &SqliteRow) -> Result<Swap, sqlx::Error> {
    Ok(Swap {
        id: SwapId(parsed_column::<Uuid>(row, "id")?),
        user_id: user_column(row, "user_id")?,
        from_asset: asset_column(row, "from_asset")?,
        to_asset: asset_column(row, "to_asset")?,
        from_amount: decimal_column(row, "from_amount")?,
        to_amount: decimal_column(row, "to_amount")?,
        rate: decimal_column(row, "rate")?,
        status: parsed_column::<SwapStatus>(row, "status")?,
        created_at: time_column(row, "created_at")?,
    })
}

impl Repository {
    /// Insert a swap record.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn insert_swap(conn: &mut SqliteConnection, swap: &Swap) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO swaps (
                id, user_id, from_asset, to_asset, from_amount, to_amount, rate, status, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(swap.id.to_string())
        .bind(swap.user_id.as_str())
        .bind(swap.from_asset.as_str())
        .bind(swap.to_asset.as_str())
        .bind(swap.from_amount.to_canonical_string())
        .bind(swap.to_amount.to_canonical_string())
        .bind(swap.rate.to_canonical_string())
        .bind(swap.status.as_str())
        .bind(swap.created_at.as_ms())
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Swaps of a user, newest first, with the total count.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn list_swaps(
        &self,
        user: &UserId,
        page: Pagination,
    ) -> Result<(Vec<Swap>, i64), sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, from_asset, to_asset, from_amount, to_amount, rate, status, created_at
            FROM swaps
            WHERE user_id = ?
            ORDER BY created_at DESC, id ASC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(user.as_str())
        .bind(page.limit as i64)
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM swaps WHERE user_id = ?")
            .bind(user.as_str())
            .fetch_one(&self.pool)
            .await?;

        let swaps = rows.iter().map(swap_from_row).collect::<Result<_, _>>()?;
        Ok((swaps, total))
    }
}
