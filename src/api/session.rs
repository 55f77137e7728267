/// Session lifecycle endpoints
use crate::{context::AppContext, error::PortalError};
use axum::{
    extract::{ConnectInfo, Path, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;

/// POST /api/session/create — acquire the insertion lock for this device.
pub async fn create(
    State(ctx): State<AppContext>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<impl IntoResponse, PortalError> {
    let (identity, ip) = super::resolve_identity(&ctx, &addr, &headers, &jar).await;
    let session = ctx
        .sessions
        .acquire(&identity.device_key, Some(ip.as_str()))
        .await?;

    let jar = super::persist_device_cookie(jar, &identity);
    Ok((
        jar,
        Json(json!({ "session_id": session.id, "session": session })),
    ))
}

/// POST /api/session/unlock — best-effort release of the insertion lock.
pub async fn unlock(
    State(ctx): State<AppContext>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<impl IntoResponse, PortalError> {
    let (identity, _ip) = super::resolve_identity(&ctx, &addr, &headers, &jar).await;
    ctx.sessions.release(&identity.device_key).await?;

    let jar = super::persist_device_cookie(jar, &identity);
    Ok((
        jar,
        Json(json!({ "success": true, "message": "Insertion lock released" })),
    ))
}

#[derive(Debug, Deserialize)]
pub struct InsertBottleRequest {
    pub session_id: i64,
    #[serde(default = "default_count")]
    pub count: i64,
}

fn default_count() -> i64 {
    1
}

/// POST /api/bottle — credit inserted bottles to a session.
pub async fn insert_bottle(
    State(ctx): State<AppContext>,
    Json(req): Json<InsertBottleRequest>,
) -> Result<Json<Value>, PortalError> {
    let session = ctx.sessions.credit(req.session_id, req.count).await?;
    let now = ctx.clock.now_ts();

    Ok(Json(json!({
        "success": true,
        "session_id": session.id,
        "bottles_inserted": session.bottles_inserted,
        "seconds_earned": session.seconds_earned,
        "remaining_seconds": session.remaining_seconds(now),
    })))
}

/// POST /api/session/{id}/activate — start the clock on banked seconds.
pub async fn activate(
    State(ctx): State<AppContext>,
    Path(session_id): Path<i64>,
) -> Result<Json<Value>, PortalError> {
    let session = ctx.sessions.activate(session_id).await?;
    Ok(Json(json!({ "success": true, "session": session })))
}

/// GET /api/session/{id} — full session snapshot.
pub async fn get(
    State(ctx): State<AppContext>,
    Path(session_id): Path<i64>,
) -> Result<Json<Value>, PortalError> {
    let session = ctx.sessions.get(session_id).await?;
    Ok(Json(json!(session)))
}

/// GET /api/session/{id}/status — the fields the waiting page polls.
pub async fn status(
    State(ctx): State<AppContext>,
    Path(session_id): Path<i64>,
) -> Result<Json<Value>, PortalError> {
    let session = ctx.sessions.get(session_id).await?;
    let now = ctx.clock.now_ts();

    Ok(Json(json!({
        "session_id": session.id,
        "status": session.status,
        "device_key": session.device_key,
        "origin_address": session.origin_address,
        "bottles_inserted": session.bottles_inserted,
        "seconds_earned": session.seconds_earned,
        "session_start": session.session_start,
        "session_end": session.session_end,
        "remaining_seconds": session.remaining_seconds(now),
    })))
}
