// handlers/session.rs - POST /login, POST /logout, GET /health

use axum::{
    extract::State,
    http::header::SET_COOKIE,
    response::{IntoResponse, Response},
    Form,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::app::AppState;
use crate::database::with_deadline;
use crate::error::{keys, ApiError};
use crate::middleware::ApiResponse;

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/**
 * POST /login - resolve the user's domain and default org, check the
 * password and hand out a session cookie.
 *
 * 401 `error_user_no_domain` | 402 `error_user_no_org` | 401 `error_user_passwd`
 */
pub async fn login(State(state): State<AppState>, Form(form): Form<LoginForm>) -> Result<Response, ApiError> {
    let user_id = form.username.trim();
    let timeout = state.query_timeout();

    let domain_id = with_deadline(timeout, state.accounts.domain_of(user_id))
        .await
        .unwrap_or_else(|e| {
            error!("Domain lookup for '{}' failed: {}", user_id, e);
            None
        })
        .ok_or_else(|| {
            warn!("User '{}' has no domain", user_id);
            ApiError::unauthorized("error_user_no_domain")
        })?;

    let org_unit_id = with_deadline(timeout, state.accounts.default_org(user_id))
        .await
        .unwrap_or_else(|e| {
            error!("Default org lookup for '{}' failed: {}", user_id, e);
            None
        })
        .ok_or_else(|| {
            warn!("User '{}' has no default org unit", user_id);
            ApiError::no_default_org("error_user_no_org")
        })?;

    let password_ok = with_deadline(timeout, state.accounts.check_password(user_id, &form.password)).await?;
    if !password_ok {
        warn!("Wrong password for user '{}'", user_id);
        return Err(ApiError::unauthorized("error_user_passwd"));
    }

    let ttl = state.config.security.token_ttl_secs;
    let token = state.tokens.issue(user_id, &domain_id, &org_unit_id, ttl)?;
    let cookie = format!(
        "{}={}; Path=/; Max-Age={}; HttpOnly",
        state.config.security.cookie_name, token, ttl
    );

    info!("User '{}' logged in to domain '{}'", user_id, domain_id);
    Ok(([(SET_COOKIE, cookie)], ApiResponse::success("success")).into_response())
}

/// POST /logout - clears the cookie. The token itself stays valid until it expires.
pub async fn logout(State(state): State<AppState>) -> Response {
    let cookie = format!(
        "{}=; Path=/; Max-Age=0; HttpOnly",
        state.config.security.cookie_name
    );
    ([(SET_COOKIE, cookie)], ApiResponse::success("logout")).into_response()
}

pub async fn health(State(state): State<AppState>) -> Result<Response, ApiError> {
    with_deadline(state.query_timeout(), state.health.ping())
        .await
        .map_err(|e| {
            error!("Health check failed: {}", e);
            ApiError::service_unavailable(keys::DATABASE)
        })?;

    Ok(ApiResponse::success(json!({
        "status": "ok",
        "timestamp": Utc::now(),
        "database": "ok"
    }))
    .into_response())
}
