//! Balance rows and the append-only ledger.

use super::{
    asset_column, decimal_column, parsed_column, time_column, user_column, Pagination, Repository,
};
use crate::domain::{
    Asset, Balance, BalanceKey, Decimal, EntryKind, LedgerEntry, TimeMs, UserId,
};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;

fn balance_from_row(row: &SqliteRow) -> Result<Balance, sqlx::Error> {
    Ok(Balance {
        id: row.try_get("id")?,
        user_id: user_column(row, "user_id")?,
        asset: asset_column(row, "asset")?,
        amount: decimal_column(row, "amount")?,
        version: row.try_get("version")?,
    })
}

fn entry_from_row(row: &SqliteRow) -> Result<LedgerEntry, sqlx::Error> {
    Ok(LedgerEntry {
        id: row.try_get("id")?,
        balance_id: row.try_get("balance_id")?,
        user_id: user_column(row, "user_id")?,
        asset: asset_column(row, "asset")?,
        delta: decimal_column(row, "delta")?,
        resulting_balance: decimal_column(row, "resulting_balance")?,
        kind: parsed_column::<EntryKind>(row, "kind")?,
        reference_id: row.try_get("reference_id")?,
        created_at: time_column(row, "created_at")?,
    })
}

const ENTRY_COLUMNS: &str =
    "id, balance_id, user_id, asset, delta, resulting_balance, kind, reference_id, created_at";

impl Repository {
    // =========================================================================
    // Transactional primitives
    // =========================================================================

    /// Create the balance row at zero if missing, then read it.
    ///
    /// The insert runs first so that a transaction starting here takes SQLite's write
    /// lock before it reads anything.
    ///
    /// # Errors
    /// Returns an error if either statement fails.
    pub async fn ensure_balance(
        conn: &mut SqliteConnection,
        key: &BalanceKey,
        now: TimeMs,
    ) -> Result<Balance, sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO balances (user_id, asset, amount, version, updated_at)
            VALUES (?, ?, '0', 0, ?)
            ON CONFLICT(user_id, asset) DO NOTHING
            "#,
        )
        .bind(key.user.as_str())
        .bind(key.asset.as_str())
        .bind(now.as_ms())
        .execute(&mut *conn)
        .await?;

        let row = sqlx::query(
            "SELECT id, user_id, asset, amount, version FROM balances WHERE user_id = ? AND asset = ?",
        )
        .bind(key.user.as_str())
        .bind(key.asset.as_str())
        .fetch_one(&mut *conn)
        .await?;

        balance_from_row(&row)
    }

    /// Apply `delta` to `balance` and append the matching ledger entry.
    ///
    /// The update is guarded by `balance.version`; `Ok(None)` means the row changed since
    /// it was read and nothing was written. Overdraft rules are the caller's business.
    ///
    /// # Errors
    /// Returns an error if a statement fails.
    pub async fn apply_delta(
        conn: &mut SqliteConnection,
        balance: &Balance,
        delta: Decimal,
        kind: EntryKind,
        reference_id: &str,
        now: TimeMs,
    ) -> Result<Option<LedgerEntry>, sqlx::Error> {
        let resulting = balance.amount + delta;

        let updated = sqlx::query(
            r#"
            UPDATE balances
            SET amount = ?, version = version + 1, updated_at = ?
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(resulting.to_canonical_string())
        .bind(now.as_ms())
        .bind(balance.id)
        .bind(balance.version)
        .execute(&mut *conn)
        .await?;

        if updated.rows_affected() != 1 {
            return Ok(None);
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO ledger_entries (
                balance_id, user_id, asset, delta, resulting_balance, kind, reference_id, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(balance.id)
        .bind(balance.user_id.as_str())
        .bind(balance.asset.as_str())
        .bind(delta.to_canonical_string())
        .bind(resulting.to_canonical_string())
        .bind(kind.as_str())
        .bind(reference_id)
        .bind(now.as_ms())
        .execute(&mut *conn)
        .await?;

        Ok(Some(LedgerEntry {
            id: inserted.last_insert_rowid(),
            balance_id: balance.id,
            user_id: balance.user_id.clone(),
            asset: balance.asset,
            delta,
            resulting_balance: resulting,
            kind,
            reference_id: reference_id.to_string(),
            created_at: now,
        }))
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Get a balance row, if it was ever touched.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get_balance(&self, key: &BalanceKey) -> Result<Option<Balance>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT id, user_id, asset, amount, version FROM balances WHERE user_id = ? AND asset = ?",
        )
        .bind(key.user.as_str())
        .bind(key.asset.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(balance_from_row).transpose()
    }

    /// List every balance row, ordered by id.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn list_all_balances(&self) -> Result<Vec<Balance>, sqlx::Error> {
        let rows =
            sqlx::query("SELECT id, user_id, asset, amount, version FROM balances ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        rows.iter().map(balance_from_row).collect()
    }

    /// Ledger entries of one balance, newest first, with the total count.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn list_entries(
        &self,
        user: &UserId,
        asset: Asset,
        page: Pagination,
    ) -> Result<(Vec<LedgerEntry>, i64), sqlx::Error> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ENTRY_COLUMNS}
            FROM ledger_entries
            WHERE user_id = ? AND asset = ?
            ORDER BY id DESC
            LIMIT ? OFFSET ?
            "#
        ))
        .bind(user.as_str())
        .bind(asset.as_str())
        .bind(page.limit as i64)
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM ledger_entries WHERE user_id = ? AND asset = ?",
        )
        .bind(user.as_str())
        .bind(asset.as_str())
        .fetch_one(&self.pool)
        .await?;

        let entries = rows.iter().map(entry_from_row).collect::<Result<_, _>>()?;
        Ok((entries, total))
    }

    /// All entries written for a trade, swap or seeding reference, in write order.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn entries_by_reference(
        &self,
        reference_id: &str,
    ) -> Result<Vec<LedgerEntry>, sqlx::Error> {
        let rows = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE reference_id = ? ORDER BY id ASC"
        ))
        .bind(reference_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(entry_from_row).collect()
    }

    /// Every delta recorded against a balance, oldest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn balance_deltas(&self, balance_id: i64) -> Result<Vec<Decimal>, sqlx::Error> {
        let rows =
            sqlx::query("SELECT delta FROM ledger_entries WHERE balance_id = ? ORDER BY id ASC")
                .bind(balance_id)
                .fetch_all(&self.pool)
                .await?;

        rows.iter().map(|row| decimal_column(row, "delta")).collect()
    }

    /// Number of ledger entries across all balances.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn count_entries(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM ledger_entries")
            .fetch_one(&self.pool)
            .await
    }
}
