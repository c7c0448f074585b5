//! Refresh token records.
//!
//! Only the backing record of a refresh token is stored, never the bearer
//! string. A refresh token is valid only while its record exists, so deleting
//! the record revokes every copy of the token at once.

use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;

use super::StoreError;
use crate::jwt::unix_now;

/// A persisted refresh token record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTokenRecord {
    pub id: i64,
    pub user_id: i64,
    /// Expiry as a Unix timestamp (seconds).
    pub expires_at: u64,
}

/// Lifecycle of refresh token records.
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Create a record for `user_id` expiring one refresh TTL from now.
    async fn persist(&self, user_id: i64) -> Result<RefreshTokenRecord, StoreError>;

    /// Return the record only if both `id` and `user_id` match and it has not expired.
    /// Absence covers both "revoked" and "never existed".
    async fn find_active(
        &self,
        id: i64,
        user_id: i64,
    ) -> Result<Option<RefreshTokenRecord>, StoreError>;

    /// Delete a record. Returns false if it was already gone.
    async fn delete(&self, id: i64) -> Result<bool, StoreError>;

    /// Delete record `id` only if it still belongs to `user_id`.
    ///
    /// A single conditional delete: of two concurrent calls for the same
    /// record exactly one sees `true`.
    async fn delete_owned(&self, id: i64, user_id: i64) -> Result<bool, StoreError>;

    /// Delete every record of a user, ending all of their sessions.
    async fn delete_for_user(&self, user_id: i64) -> Result<u64, StoreError>;

    async fn count_for_user(&self, user_id: i64) -> Result<u64, StoreError>;

    /// Delete all expired records, returning how many were removed.
    async fn delete_expired(&self) -> Result<u64, StoreError>;
}

/// SQLite backed refresh token store.
#[derive(Clone)]
pub struct SqliteRefreshTokenStore {
    pool: SqlitePool,
    ttl_secs: u64,
}

impl SqliteRefreshTokenStore {
    pub fn new(pool: SqlitePool, ttl_secs: u64) -> Self {
        Self { pool, ttl_secs }
    }
}

#[async_trait]
impl RefreshTokenStore for SqliteRefreshTokenStore {
    async fn persist(&self, user_id: i64) -> Result<RefreshTokenRecord, StoreError> {
        let expires_at = unix_now().saturating_add(self.ttl_secs);

        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO refresh_tokens (user_id, expires_at) VALUES (?, ?) RETURNING id",
        )
        .bind(user_id)
        .bind(timestamp_to_datetime(expires_at))
        .fetch_one(&self.pool)
        .await?;

        Ok(RefreshTokenRecord {
            id,
            user_id,
            expires_at,
        })
    }

    async fn find_active(
        &self,
        id: i64,
        user_id: i64,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let row: Option<(i64, i64, i64)> = sqlx::query_as(
            "SELECT id, user_id, CAST(strftime('%s', expires_at) AS INTEGER)
             FROM refresh_tokens
             WHERE id = ? AND user_id = ? AND expires_at > datetime('now')",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, user_id, expires_at)| RefreshTokenRecord {
            id,
            user_id,
            expires_at: expires_at.max(0) as u64,
        }))
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_owned(&self, id: i64, user_id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_for_user(&self, user_id: i64) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn count_for_user(&self, user_id: i64) -> Result<u64, StoreError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM refresh_tokens WHERE user_id = ?")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count.max(0) as u64)
    }

    async fn delete_expired(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= datetime('now')")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// Convert a Unix timestamp to the `YYYY-MM-DD HH:MM:SS` form SQLite's
/// `datetime()` produces, so stored expiries compare correctly against it.
fn timestamp_to_datetime(timestamp: u64) -> String {
    let days_since_epoch = timestamp / 86400;
    let time_of_day = timestamp % 86400;
    let hours = time_of_day / 3600;
    let minutes = (time_of_day % 3600) / 60;
    let seconds = time_of_day % 60;

    let (year, month, day) = days_to_ymd(days_since_epoch as i64);

    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        year, month, day, hours, minutes, seconds
    )
}

/// Convert days since Unix epoch to year, month, day.
fn days_to_ymd(days: i64) -> (i32, u32, u32) {
    // Algorithm from http://howardhinnant.github.io/date_algorithms.html
    let z = days + 719468;
    let era = if z >= 0 { z } else { z - 146096 } / 146097;
    let doe = (z - era * 146097) as u32;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };
    (y as i32, m, d)
}
