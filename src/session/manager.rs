/// Session manager: the insertion-lock coordinator and time-banking engine.
///
/// Every mutation runs as one transaction against the store. The
/// single-`inserting`-row invariant is enforced by the partial unique index on
/// `sessions(status)`, so it holds across independent processes; a constraint
/// violation during `acquire` is reported as `Busy`, never as an internal
/// fault. Access-enforcement calls happen after commit and are only logged on
/// failure.
use crate::{
    access::AccessController,
    clock::Clock,
    config::PortalConfig,
    db::session::{Session, SessionStatus},
    error::{is_unique_violation, PortalError, PortalResult},
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{info, warn};

pub struct SessionManager {
    db: SqlitePool,
    config: Arc<PortalConfig>,
    clock: Arc<dyn Clock>,
    access: Arc<AccessController>,
}

impl SessionManager {
    pub fn new(
        db: SqlitePool,
        config: Arc<PortalConfig>,
        clock: Arc<dyn Clock>,
        access: Arc<AccessController>,
    ) -> Self {
        Self {
            db,
            config,
            clock,
            access,
        }
    }

    /// Acquire the machine-wide insertion slot for a device.
    ///
    /// Re-acquiring while already holding the slot returns the same session.
    /// A device with an `awaiting_insertion` or `active` session resumes it;
    /// otherwise a fresh `inserting` session is created. Fails with `Busy`
    /// when any other session holds the slot.
    pub async fn acquire(
        &self,
        device_key: &str,
        origin_address: Option<&str>,
    ) -> PortalResult<Session> {
        let now = self.clock.now_ts();
        let mut tx = self.db.begin().await?;

        let own_inserting: Option<Session> = sqlx::query_as(
            "SELECT * FROM sessions WHERE device_key = ?1 AND status = 'inserting' \
             ORDER BY updated_at DESC, created_at DESC LIMIT 1",
        )
        .bind(device_key)
        .fetch_optional(&mut *tx)
        .await?;
        if let Some(session) = own_inserting {
            tx.commit().await?;
            return Ok(session);
        }

        let holder: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM sessions WHERE status = 'inserting' LIMIT 1")
                .fetch_optional(&mut *tx)
                .await?;
        if holder.is_some() {
            return Err(PortalError::Busy);
        }

        // Most recently updated session wins when the device has several.
        let resumable: Option<Session> = sqlx::query_as(
            "SELECT * FROM sessions WHERE device_key = ?1 \
             AND status IN ('awaiting_insertion', 'active') \
             ORDER BY updated_at DESC, created_at DESC LIMIT 1",
        )
        .bind(device_key)
        .fetch_optional(&mut *tx)
        .await?;

        let session = if let Some(existing) = resumable {
            sqlx::query_as::<_, Session>(
                "UPDATE sessions SET status = 'inserting', updated_at = ?1 \
                 WHERE id = ?2 RETURNING *",
            )
            .bind(now)
            .bind(existing.id)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_lock_conflict)?
        } else {
            sqlx::query_as::<_, Session>(
                "INSERT INTO sessions (device_key, origin_address, status, created_at, updated_at) \
                 VALUES (?1, ?2, 'inserting', ?3, ?3) RETURNING *",
            )
            .bind(device_key)
            .bind(origin_address)
            .bind(now)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_lock_conflict)?
        };

        tx.commit().await.map_err(map_lock_conflict)?;

        info!(session_id = session.id, device_key, "insertion lock acquired");
        Ok(session)
    }

    /// Release the insertion slot held by a device. Best-effort and
    /// idempotent: releasing without holding the slot is a silent success.
    ///
    /// A session that already earned time is activated on release (the user
    /// keeps the credit and the clock starts); one with no bottles returns to
    /// `awaiting_insertion` with no timing side effects.
    pub async fn release(&self, device_key: &str) -> PortalResult<Option<Session>> {
        let now = self.clock.now_ts();
        let mut tx = self.db.begin().await?;

        let inserting: Option<Session> = sqlx::query_as(
            "SELECT * FROM sessions WHERE device_key = ?1 AND status = 'inserting' \
             ORDER BY updated_at DESC, created_at DESC LIMIT 1",
        )
        .bind(device_key)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(session) = inserting else {
            tx.commit().await?;
            return Ok(None);
        };

        let updated = if session.bottles_inserted > 0 {
            let activated = Self::activate_in_tx(&mut tx, &session, now).await?;
            info!(
                session_id = activated.id,
                "released insertion lock; session active"
            );
            activated
        } else {
            let reverted = sqlx::query_as::<_, Session>(
                "UPDATE sessions SET status = 'awaiting_insertion', updated_at = ?1 \
                 WHERE id = ?2 RETURNING *",
            )
            .bind(now)
            .bind(session.id)
            .fetch_one(&mut *tx)
            .await?;
            info!(
                session_id = reverted.id,
                "released insertion lock with no bottles"
            );
            reverted
        };

        tx.commit().await?;

        if updated.status == SessionStatus::Active {
            self.grant_access(&updated).await;
        }
        Ok(Some(updated))
    }

    /// Register inserted bottles and bank the earned seconds.
    ///
    /// Legal while `inserting` or `active`. An existing deadline is extended
    /// by `count * seconds_per_bottle` from the later of the deadline and
    /// now; a never-activated session banks seconds only and gets its
    /// deadline at activation. One immutable bottle event is appended in the
    /// same transaction.
    pub async fn credit(&self, session_id: i64, count: i64) -> PortalResult<Session> {
        if count < 1 {
            return Err(PortalError::Validation(
                "count must be a positive integer".to_string(),
            ));
        }

        let now = self.clock.now_ts();
        let earned = count * self.config.session.seconds_per_bottle;
        let mut tx = self.db.begin().await?;

        let session = Self::fetch_session(&mut tx, session_id).await?;
        if !matches!(
            session.status,
            SessionStatus::Inserting | SessionStatus::Active
        ) {
            return Err(PortalError::InvalidState(format!(
                "session {} is {} and not accepting bottles",
                session_id, session.status
            )));
        }

        // A lapsed-but-unswept session restarts its window from now.
        let session_end = session.session_end.map(|end| end.max(now) + earned);

        let updated = sqlx::query_as::<_, Session>(
            "UPDATE sessions SET bottles_inserted = bottles_inserted + ?1, \
             seconds_earned = seconds_earned + ?2, session_end = ?3, updated_at = ?4 \
             WHERE id = ?5 RETURNING *",
        )
        .bind(count)
        .bind(earned)
        .bind(session_end)
        .bind(now)
        .bind(session_id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO bottle_events (session_id, count, occurred_at) VALUES (?1, ?2, ?3)")
            .bind(session_id)
            .bind(count)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(
            session_id,
            count,
            seconds_earned = updated.seconds_earned,
            "bottles credited"
        );
        Ok(updated)
    }

    /// Activate a session: start the clock on its banked seconds.
    ///
    /// Requires at least one bottle; already-active and expired sessions are
    /// rejected without mutation.
    pub async fn activate(&self, session_id: i64) -> PortalResult<Session> {
        let now = self.clock.now_ts();
        let mut tx = self.db.begin().await?;

        let session = Self::fetch_session(&mut tx, session_id).await?;
        match session.status {
            SessionStatus::Active | SessionStatus::Expired => {
                return Err(PortalError::InvalidState(format!(
                    "session {} is {}",
                    session_id, session.status
                )));
            }
            SessionStatus::AwaitingInsertion | SessionStatus::Inserting => {}
        }
        if session.bottles_inserted == 0 {
            return Err(PortalError::InvalidState(format!(
                "session {} has no bottles inserted",
                session_id
            )));
        }

        let updated = Self::activate_in_tx(&mut tx, &session, now).await?;
        tx.commit().await?;

        self.grant_access(&updated).await;
        info!(
            session_id = updated.id,
            session_end = updated.session_end,
            "session activated"
        );
        Ok(updated)
    }

    /// Fetch a session snapshot by id.
    pub async fn get(&self, session_id: i64) -> PortalResult<Session> {
        sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE id = ?1")
            .bind(session_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| PortalError::NotFound(format!("session {}", session_id)))
    }

    /// Most recently updated session for a device among the given statuses.
    pub async fn get_for_device(
        &self,
        device_key: &str,
        statuses: &[SessionStatus],
    ) -> PortalResult<Option<Session>> {
        if statuses.is_empty() {
            return Ok(None);
        }

        let placeholders = (2..2 + statuses.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT * FROM sessions WHERE device_key = ?1 AND status IN ({}) \
             ORDER BY updated_at DESC, created_at DESC LIMIT 1",
            placeholders
        );

        let mut query = sqlx::query_as::<_, Session>(&sql).bind(device_key);
        for status in statuses {
            query = query.bind(status.as_str());
        }
        Ok(query.fetch_optional(&self.db).await?)
    }

    /// Find the device's current non-terminal session, creating an
    /// `awaiting_insertion` one when it has none. Used by the captive portal
    /// probes, which must never contend for the insertion slot.
    pub async fn find_or_create(
        &self,
        device_key: &str,
        origin_address: Option<&str>,
    ) -> PortalResult<Session> {
        if let Some(existing) = self
            .get_for_device(device_key, &SessionStatus::NON_TERMINAL)
            .await?
        {
            return Ok(existing);
        }

        let now = self.clock.now_ts();
        let session = sqlx::query_as::<_, Session>(
            "INSERT INTO sessions (device_key, origin_address, status, created_at, updated_at) \
             VALUES (?1, ?2, 'awaiting_insertion', ?3, ?3) RETURNING *",
        )
        .bind(device_key)
        .bind(origin_address)
        .bind(now)
        .fetch_one(&self.db)
        .await?;

        info!(session_id = session.id, device_key, "session created");
        Ok(session)
    }

    /// Shared activation routine. `session_start` is set exactly once; a
    /// deadline is computed from the banked seconds only when the session has
    /// never been activated (re-activations keep the deadline the credit
    /// path maintains).
    async fn activate_in_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        session: &Session,
        now: i64,
    ) -> PortalResult<Session> {
        let session_start = session.session_start.unwrap_or(now);
        let session_end = session
            .session_end
            .unwrap_or(now + session.seconds_earned);

        let updated = sqlx::query_as::<_, Session>(
            "UPDATE sessions SET status = 'active', session_start = ?1, session_end = ?2, \
             updated_at = ?3 WHERE id = ?4 RETURNING *",
        )
        .bind(session_start)
        .bind(session_end)
        .bind(now)
        .bind(session.id)
        .fetch_one(&mut **tx)
        .await?;

        Ok(updated)
    }

    async fn fetch_session(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        session_id: i64,
    ) -> PortalResult<Session> {
        sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE id = ?1")
            .bind(session_id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| PortalError::NotFound(format!("session {}", session_id)))
    }

    async fn grant_access(&self, session: &Session) {
        let Some(address) = session.origin_address.as_deref() else {
            warn!(
                session_id = session.id,
                "no origin address on activation; skipping access grant"
            );
            return;
        };

        let duration = session.remaining_seconds(self.clock.now_ts());
        if duration == 0 {
            return;
        }
        if let Err(e) = self.access.grant(address, duration).await {
            warn!(session_id = session.id, error = %e, "access grant failed");
        }
    }
}

/// Unique-index violations on the `inserting` slot mean another transaction
/// won the race; surface them as the lock being busy.
fn map_lock_conflict(err: sqlx::Error) -> PortalError {
    if is_unique_violation(&err) {
        PortalError::Busy
    } else {
        err.into()
    }
}
