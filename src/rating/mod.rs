/// Session ratings: a ten-question survey, submitted at most once per session.
use crate::{
    clock::Clock,
    db::session::Rating,
    error::{is_unique_violation, PortalError, PortalResult},
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::info;

/// Ten survey answers, each scored 1 to 5.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingScores {
    #[serde(default)]
    pub q1: i64,
    #[serde(default)]
    pub q2: i64,
    #[serde(default)]
    pub q3: i64,
    #[serde(default)]
    pub q4: i64,
    #[serde(default)]
    pub q5: i64,
    #[serde(default)]
    pub q6: i64,
    #[serde(default)]
    pub q7: i64,
    #[serde(default)]
    pub q8: i64,
    #[serde(default)]
    pub q9: i64,
    #[serde(default)]
    pub q10: i64,
}

impl RatingScores {
    fn entries(&self) -> [(&'static str, i64); 10] {
        [
            ("q1", self.q1),
            ("q2", self.q2),
            ("q3", self.q3),
            ("q4", self.q4),
            ("q5", self.q5),
            ("q6", self.q6),
            ("q7", self.q7),
            ("q8", self.q8),
            ("q9", self.q9),
            ("q10", self.q10),
        ]
    }

    pub fn validate(&self) -> PortalResult<()> {
        for (name, value) in self.entries() {
            if !(1..=5).contains(&value) {
                return Err(PortalError::Validation(format!(
                    "Value for {} must be between 1 and 5",
                    name
                )));
            }
        }
        Ok(())
    }
}

pub struct RatingManager {
    db: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl RatingManager {
    pub fn new(db: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Store a session's rating. The unique constraint on `session_id` makes
    /// a second submission fail, surfaced as `InvalidState`.
    pub async fn submit(
        &self,
        session_id: i64,
        scores: &RatingScores,
        comment: Option<&str>,
    ) -> PortalResult<Rating> {
        scores.validate()?;
        let now = self.clock.now_ts();

        let rating = sqlx::query_as::<_, Rating>(
            "INSERT INTO ratings (session_id, q1, q2, q3, q4, q5, q6, q7, q8, q9, q10, comment, submitted_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13) RETURNING *",
        )
        .bind(session_id)
        .bind(scores.q1)
        .bind(scores.q2)
        .bind(scores.q3)
        .bind(scores.q4)
        .bind(scores.q5)
        .bind(scores.q6)
        .bind(scores.q7)
        .bind(scores.q8)
        .bind(scores.q9)
        .bind(scores.q10)
        .bind(comment)
        .bind(now)
        .fetch_one(&self.db)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                return PortalError::InvalidState(format!(
                    "session {} already has a rating",
                    session_id
                ));
            }
            if let sqlx::Error::Database(db) = &e {
                if db.is_foreign_key_violation() {
                    return PortalError::NotFound(format!("session {}", session_id));
                }
            }
            e.into()
        })?;

        info!(session_id, "rating submitted");
        Ok(rating)
    }

    pub async fn get_for_session(&self, session_id: i64) -> PortalResult<Option<Rating>> {
        Ok(sqlx::query_as("SELECT * FROM ratings WHERE session_id = ?1")
            .bind(session_id)
            .fetch_optional(&self.db)
            .await?)
    }
}
