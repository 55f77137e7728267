/// Bulk expiry transitions run by the sweeper
///
/// Each function is a single UPDATE with a time-based predicate, safe to run
/// concurrently with live traffic and a no-op when nothing qualifies.
use crate::error::PortalResult;
use sqlx::{FromRow, SqlitePool};

/// Rows moved by one sweep pass, per category.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub stale_awaiting: u64,
    pub stale_inserting: u64,
    pub finished_active: u64,
}

impl SweepReport {
    pub fn total(&self) -> u64 {
        self.stale_awaiting + self.stale_inserting + self.finished_active
    }
}

#[derive(Debug, FromRow)]
struct ExpiredRow {
    origin_address: Option<String>,
    session_start: Option<i64>,
}

/// Expire `awaiting_insertion` sessions older than the staleness threshold.
/// These never held access, so there is nothing to revoke.
pub async fn expire_stale_awaiting(
    pool: &SqlitePool,
    now: i64,
    max_age_seconds: i64,
) -> PortalResult<u64> {
    let cutoff = now - max_age_seconds;
    let result = sqlx::query(
        "UPDATE sessions SET status = 'expired', updated_at = ?1 \
         WHERE status = 'awaiting_insertion' AND created_at < ?2",
    )
    .bind(now)
    .bind(cutoff)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Expire `inserting` sessions whose holder abandoned the flow. Moving them
/// out of `inserting` frees the machine-wide slot. Returns the addresses of
/// previously activated sessions so the caller can revoke their access.
pub async fn expire_stale_inserting(
    pool: &SqlitePool,
    now: i64,
    lock_timeout_seconds: i64,
) -> PortalResult<(u64, Vec<String>)> {
    let cutoff = now - lock_timeout_seconds;
    let rows: Vec<ExpiredRow> = sqlx::query_as(
        "UPDATE sessions SET status = 'expired', updated_at = ?1 \
         WHERE status = 'inserting' AND updated_at < ?2 \
         RETURNING origin_address, session_start",
    )
    .bind(now)
    .bind(cutoff)
    .fetch_all(pool)
    .await?;

    Ok(split_revocations(rows))
}

/// Expire `active` sessions whose deadline has passed.
pub async fn expire_finished_active(
    pool: &SqlitePool,
    now: i64,
) -> PortalResult<(u64, Vec<String>)> {
    let rows: Vec<ExpiredRow> = sqlx::query_as(
        "UPDATE sessions SET status = 'expired', updated_at = ?1 \
         WHERE status = 'active' AND session_end IS NOT NULL AND session_end <= ?1 \
         RETURNING origin_address, session_start",
    )
    .bind(now)
    .fetch_all(pool)
    .await?;

    Ok(split_revocations(rows))
}

fn split_revocations(rows: Vec<ExpiredRow>) -> (u64, Vec<String>) {
    let count = rows.len() as u64;
    let addresses = rows
        .into_iter()
        .filter(|row| row.session_start.is_some())
        .filter_map(|row| row.origin_address)
        .collect();
    (count, addresses)
}
