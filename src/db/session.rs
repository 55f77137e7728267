/// Session database models
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Lifecycle states of a portal session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum SessionStatus {
    AwaitingInsertion,
    Inserting,
    Active,
    Expired,
}

impl SessionStatus {
    /// States a device can still do something with.
    pub const NON_TERMINAL: [SessionStatus; 3] = [
        SessionStatus::AwaitingInsertion,
        SessionStatus::Inserting,
        SessionStatus::Active,
    ];

    pub const ALL: [SessionStatus; 4] = [
        SessionStatus::AwaitingInsertion,
        SessionStatus::Inserting,
        SessionStatus::Active,
        SessionStatus::Expired,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::AwaitingInsertion => "awaiting_insertion",
            SessionStatus::Inserting => "inserting",
            SessionStatus::Active => "active",
            SessionStatus::Expired => "expired",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session record in the database
///
/// Timestamps are unix seconds. `session_start` is set once, at first
/// activation; `session_end` is the authoritative expiry deadline.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    /// MAC address, or `device:<token>` when only a cookie identifies the device
    pub device_key: String,
    /// Best-effort network origin; informational, not authoritative for ownership
    pub origin_address: Option<String>,
    pub bottles_inserted: i64,
    pub seconds_earned: i64,
    pub session_start: Option<i64>,
    pub session_end: Option<i64>,
    pub status: SessionStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Session {
    /// Seconds left before the deadline; zero when lapsed or never activated.
    pub fn remaining_seconds(&self, now: i64) -> i64 {
        match self.session_end {
            Some(end) if end > now => end - now,
            _ => 0,
        }
    }
}

/// Append-only record of one bottle insertion batch
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BottleEvent {
    pub id: i64,
    pub session_id: i64,
    pub count: i64,
    pub occurred_at: i64,
}

/// Survey submitted at most once per session
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Rating {
    pub id: i64,
    pub session_id: i64,
    pub q1: i64,
    pub q2: i64,
    pub q3: i64,
    pub q4: i64,
    pub q5: i64,
    pub q6: i64,
    pub q7: i64,
    pub q8: i64,
    pub q9: i64,
    pub q10: i64,
    pub comment: Option<String>,
    pub submitted_at: i64,
}
