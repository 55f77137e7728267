/// Captive portal probe endpoints
///
/// Phones and laptops hit well-known probe URLs after joining the network;
/// answering with a redirect stub sends them to the portal page with their
/// session attached. Probes find-or-create a session but never contend for
/// the insertion slot.
use crate::{context::AppContext, error::PortalError};
use axum::{
    extract::{ConnectInfo, State},
    http::HeaderMap,
    response::{Html, IntoResponse},
};
use axum_extra::extract::cookie::CookieJar;
use std::net::SocketAddr;

/// GET /generate_204, /connecttest.txt, /hotspot-detect.html
pub async fn captive_detect(
    State(ctx): State<AppContext>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<impl IntoResponse, PortalError> {
    let (identity, ip) = super::resolve_identity(&ctx, &addr, &headers, &jar).await;
    let session = ctx
        .sessions
        .find_or_create(&identity.device_key, Some(ip.as_str()))
        .await?;

    let jar = super::persist_device_cookie(jar, &identity);
    let body = format!(
        "<html><body><script>window.location.href=\"/?session={}\";</script></body></html>",
        session.id
    );
    Ok((jar, Html(body)))
}
