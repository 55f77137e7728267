/// HTTP API handlers
pub mod admin;
pub mod portal;
pub mod rating;
pub mod session;

use crate::{context::AppContext, identity::DeviceIdentity};
use axum::{
    http::HeaderMap,
    routing::{get, post},
    Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use std::net::SocketAddr;

/// All API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/session/create", post(session::create))
        .route("/api/session/unlock", post(session::unlock))
        .route("/api/bottle", post(session::insert_bottle))
        .route("/api/session/:id/activate", post(session::activate))
        .route("/api/session/:id", get(session::get))
        .route("/api/session/:id/status", get(session::status))
        .route("/generate_204", get(portal::captive_detect))
        .route("/connecttest.txt", get(portal::captive_detect))
        .route("/hotspot-detect.html", get(portal::captive_detect))
        .route("/api/rating", post(rating::submit))
        .route("/api/rating/status", get(rating::status))
        .route("/api/admin/metrics", get(admin::metrics))
}

/// Resolve the calling device's identity and best-effort origin address.
pub(crate) async fn resolve_identity(
    ctx: &AppContext,
    addr: &SocketAddr,
    headers: &HeaderMap,
    jar: &CookieJar,
) -> (DeviceIdentity, String) {
    let ip = client_ip(addr, headers);
    let cookie_token = jar
        .get(crate::identity::DEVICE_COOKIE)
        .map(|c| c.value().to_string());
    let identity = ctx
        .resolver
        .resolve(Some(ip.as_str()), cookie_token.as_deref())
        .await;
    (identity, ip)
}

/// Best-effort client address: the socket peer, or the first
/// X-Forwarded-For entry when the peer is a local proxy.
pub(crate) fn client_ip(addr: &SocketAddr, headers: &HeaderMap) -> String {
    let peer = addr.ip();
    if peer.is_loopback() || peer.is_unspecified() {
        if let Some(forwarded) = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
        {
            return forwarded.to_string();
        }
    }
    peer.to_string()
}

/// Persist a freshly minted fallback token in a long-lived cookie.
pub(crate) fn persist_device_cookie(jar: CookieJar, identity: &DeviceIdentity) -> CookieJar {
    let Some(token) = &identity.issued_token else {
        return jar;
    };

    let cookie = Cookie::build((crate::identity::DEVICE_COOKIE, token.clone()))
        .path("/")
        .same_site(SameSite::Lax)
        .max_age(time::Duration::days(5 * 365))
        .build();
    jar.add(cookie)
}
