/// Read-only admin metrics
use crate::{context::AppContext, db::session::Session, error::PortalError};
use axum::{extract::State, Json};
use serde_json::{json, Value};

/// GET /api/admin/metrics — dashboard aggregates.
pub async fn metrics(State(ctx): State<AppContext>) -> Result<Json<Value>, PortalError> {
    let now = ctx.clock.now_ts();

    let (active_sessions,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM sessions WHERE status = 'active'")
            .fetch_one(&ctx.db)
            .await?;

    let (total_bottles,): (Option<i64>,) = sqlx::query_as("SELECT SUM(count) FROM bottle_events")
        .fetch_one(&ctx.db)
        .await?;

    let (total_reviews,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM ratings")
        .fetch_one(&ctx.db)
        .await?;

    let ongoing_sessions: Vec<Session> = sqlx::query_as(
        "SELECT * FROM sessions \
         WHERE status IN ('awaiting_insertion', 'inserting', 'active') \
         ORDER BY updated_at DESC",
    )
    .fetch_all(&ctx.db)
    .await?;

    Ok(Json(json!({
        "active_sessions": active_sessions,
        "total_bottles": total_bottles.unwrap_or(0),
        "total_reviews": total_reviews,
        "ongoing_sessions": ongoing_sessions,
        "generated_at": now,
    })))
}
