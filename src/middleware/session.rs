use axum::{
    async_trait,
    extract::{FromRequestParts, OriginalUri, Request, State},
    http::{header::COOKIE, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use crate::app::AppState;
use crate::auth::Identity;
use crate::error::ApiError;

/// Caller identity recovered from the session cookie
#[derive(Clone, Debug)]
pub struct Session {
    pub identity: Identity,
    pub token: String,
}

/// Value of the cookie named `cookie_name`, if present and non-empty
pub fn extract_cookie(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|cookie| {
            let (name, value) = cookie.trim().split_once('=')?;
            (name == cookie_name && !value.is_empty()).then(|| value.to_string())
        })
}

fn open_session(headers: &HeaderMap, state: &AppState) -> Result<Session, ApiError> {
    let token = extract_cookie(headers, &state.config.security.cookie_name).ok_or_else(|| {
        debug!("Request without session cookie");
        ApiError::disconnect()
    })?;

    let identity = state.tokens.identify(&token).map_err(|e| {
        warn!("Rejected session cookie: {}", e);
        ApiError::disconnect()
    })?;

    Ok(Session { identity, token })
}

/// Every request under `/v1/auth` must carry a valid session
pub async fn check_connection(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let session = open_session(request.headers(), &state)?;
    request.extensions_mut().insert(session);
    Ok(next.run(request).await)
}

#[async_trait]
impl FromRequestParts<AppState> for Session {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(session) = parts.extensions.get::<Session>() {
            return Ok(session.clone());
        }
        open_session(&parts.headers, state)
    }
}

/// A session that also passed the API-level grant check for the request path
#[derive(Clone, Debug)]
pub struct ApiUser(pub Session);

impl ApiUser {
    pub fn identity(&self) -> &Identity {
        &self.0.identity
    }
}

#[async_trait]
impl FromRequestParts<AppState> for ApiUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state).await?;

        let path = parts
            .extensions
            .get::<OriginalUri>()
            .map(|uri| uri.0.path().to_string())
            .unwrap_or_else(|| parts.uri.path().to_string());

        state
            .resolver
            .authorize_api(&session.identity, &path)
            .await
            .map_err(|e| ApiError::from_permission(e, ApiError::no_auth()))?;

        Ok(ApiUser(session))
    }
}
