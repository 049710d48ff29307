//! Access-log middleware.
//!
//! Runs inside an authentication gate. Requests that reach it without an
//! [`Identity`] pass through unrecorded.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use std::time::Instant;

use crate::middleware::auth::Identity;
use crate::models::audit::RequestRecord;
use crate::state::AppState;

/// Record one access-log entry per authenticated request.
///
/// # Flow
///
/// 1. Skip if no identity is attached
/// 2. Capture method, path, client address, user agent and start time
/// 3. Run the handler
/// 4. Queue an entry with the final status and elapsed milliseconds
///
/// The entry is queued, not written, so the response is never delayed or
/// failed by persistence.
pub async fn audit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(user_id) = request.extensions().get::<Identity>().map(|i| i.user_id) else {
        return next.run(request).await;
    };

    let start = Instant::now();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let user_agent = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip_address = client_ip(request.headers(), peer);

    let response = next.run(request).await;

    state.audit.record(RequestRecord {
        user_id,
        method,
        path,
        status_code: response.status().as_u16(),
        ip_address,
        user_agent,
        duration_ms: i64::try_from(start.elapsed().as_millis()).unwrap_or(i64::MAX),
    });

    response
}

/// Caller address: first `X-Forwarded-For` hop, then `X-Real-IP`, then the
/// socket peer. Empty when none is known.
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    forwarded
        .or(real_ip)
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_default()
}
