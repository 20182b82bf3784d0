use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use crate::app::AppState;
use crate::audit::AuditEntry;
use crate::middleware::session::extract_cookie;

/// Record every request made with a valid session once it has been answered.
/// Anonymous requests are not logged.
pub async fn audit_requests(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(audit) = state.audit.clone() else {
        return next.run(request).await;
    };

    let identity = extract_cookie(request.headers(), &state.config.security.cookie_name)
        .and_then(|token| state.tokens.identify(&token).ok());
    let client_ip = client_ip(request.headers(), request.extensions().get::<ConnectInfo<SocketAddr>>());
    let method = request.method().to_string();
    let url = request
        .uri()
        .path_and_query()
        .map(|pq| pq.to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let response = next.run(request).await;

    if let Some(identity) = identity {
        let entry = AuditEntry::new(
            identity.user_id,
            identity.domain_id,
            client_ip,
            method,
            url,
            response.status().as_u16(),
        );
        audit.log(entry).await;
    }

    response
}

fn client_ip(headers: &HeaderMap, peer: Option<&ConnectInfo<SocketAddr>>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| peer.map(|ConnectInfo(addr)| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}
