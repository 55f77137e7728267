/// Rating endpoints
///
/// Ratings bind to the caller's own session, looked up by device identity;
/// clients never pick the session id themselves.
use crate::{
    context::AppContext,
    db::session::SessionStatus,
    error::{PortalError, PortalResult},
    rating::RatingScores,
};
use axum::{
    extract::{ConnectInfo, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;

#[derive(Debug, Deserialize)]
pub struct SubmitRatingRequest {
    #[serde(flatten)]
    pub scores: RatingScores,
    pub comment: Option<String>,
}

/// POST /api/rating — submit the survey for this device's session.
pub async fn submit(
    State(ctx): State<AppContext>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(req): Json<SubmitRatingRequest>,
) -> Result<impl IntoResponse, PortalError> {
    let (identity, _ip) = super::resolve_identity(&ctx, &addr, &headers, &jar).await;
    let session = eligible_session(&ctx, &identity.device_key).await?;

    let comment = req
        .comment
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());
    ctx.ratings.submit(session.id, &req.scores, comment).await?;

    let jar = super::persist_device_cookie(jar, &identity);
    Ok((jar, Json(json!({ "success": true }))))
}

/// GET /api/rating/status — whether this device's session was already rated.
pub async fn status(
    State(ctx): State<AppContext>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<Json<Value>, PortalError> {
    let (identity, _ip) = super::resolve_identity(&ctx, &addr, &headers, &jar).await;

    let Some(session) = ctx
        .sessions
        .get_for_device(&identity.device_key, &SessionStatus::ALL)
        .await?
    else {
        return Ok(Json(json!({ "has_session": false, "has_rating": false })));
    };

    let rating = ctx.ratings.get_for_session(session.id).await?;
    Ok(Json(json!({
        "has_session": true,
        "has_rating": rating.is_some(),
        "session_id": session.id,
    })))
}

async fn eligible_session(
    ctx: &AppContext,
    device_key: &str,
) -> PortalResult<crate::db::session::Session> {
    ctx.sessions
        .get_for_device(device_key, &SessionStatus::ALL)
        .await?
        .ok_or_else(|| PortalError::NotFound("no eligible session for rating".to_string()))
}
