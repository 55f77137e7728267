/// Shared test harness: a migrated in-memory database, a manual clock, and a
/// fully assembled application context.
use econet_portal::{clock::ManualClock, config::PortalConfig, context::AppContext, db};
use std::sync::Arc;

#[allow(dead_code)]
pub const T0: i64 = 1_700_000_000;

pub async fn test_context() -> (AppContext, Arc<ManualClock>) {
    let pool = db::create_memory_pool().await.expect("in-memory pool");
    let clock = Arc::new(ManualClock::new(T0));
    let ctx = AppContext::assemble(PortalConfig::for_tests(), pool, clock.clone());
    (ctx, clock)
}

#[allow(dead_code)]
pub async fn count_with_status(ctx: &AppContext, status: &str) -> i64 {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sessions WHERE status = ?1")
        .bind(status)
        .fetch_one(&ctx.db)
        .await
        .expect("count sessions");
    count
}

#[allow(dead_code)]
pub async fn force_status(ctx: &AppContext, session_id: i64, status: &str) {
    sqlx::query("UPDATE sessions SET status = ?1 WHERE id = ?2")
        .bind(status)
        .bind(session_id)
        .execute(&ctx.db)
        .await
        .expect("force session status");
}
