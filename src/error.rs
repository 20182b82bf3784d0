// HTTP API Error Types
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::auth::TokenError;
use crate::database::DatabaseError;
use crate::permission::PermissionError;

/// Envelope version expected by existing clients
pub const API_VERSION: &str = "v1.0";

/// Message keys; translation happens on the client
pub mod keys {
    pub const NO_AUTH: &str = "error_no_auth";
    pub const DISCONNECT: &str = "error_disconnect";
    pub const DOMAIN_DENIED: &str = "as_of_date_domain_permission_denied";
    pub const DOMAIN_DENIED_MODIFY: &str = "as_of_date_domain_permission_denied_modify";
    pub const NO_SEPARATOR: &str = "error_no_separator";
    pub const PAGE_NOT_FOUND: &str = "error_page_not_found";
    pub const DATABASE: &str = "error_database";
    pub const QUERY_TIMEOUT: &str = "error_query_timeout";
    pub const INTERNAL: &str = "error_internal";
}

/// HTTP API error. Each operation reports failures with its own status code,
/// so the variants follow the codes rather than generic HTTP semantics.
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),

    // 401 Unauthorized (login: unknown domain, wrong password)
    Unauthorized(String),

    // 402 login: user has no default org unit
    NoDefaultOrg(String),

    // 403 Forbidden
    Forbidden {
        message: String,
        details: Option<String>,
    },

    // 404 Not Found
    NotFound(String),

    // 417 query failed
    QueryFailed(String),

    // 418 delete failed
    DeleteFailed(String),

    // 419 sub-org query failed
    SubQueryFailed(String),

    // 421 validation or processing failure
    Unprocessable {
        message: String,
        details: Option<String>,
    },

    // 423 malformed composite id
    MalformedId(String),

    // 500 Internal Server Error
    InternalServerError(String),

    // 503 Service Unavailable
    ServiceUnavailable(String),
}

impl ApiError {
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::Unauthorized(_) => 401,
            ApiError::NoDefaultOrg(_) => 402,
            ApiError::Forbidden { .. } => 403,
            ApiError::NotFound(_) => 404,
            ApiError::QueryFailed(_) => 417,
            ApiError::DeleteFailed(_) => 418,
            ApiError::SubQueryFailed(_) => 419,
            ApiError::Unprocessable { .. } => 421,
            ApiError::MalformedId(_) => 423,
            ApiError::InternalServerError(_) => 500,
            ApiError::ServiceUnavailable(_) => 503,
        }
    }

    /// Client-facing message key
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::Unauthorized(msg) => msg,
            ApiError::NoDefaultOrg(msg) => msg,
            ApiError::Forbidden { message, .. } => message,
            ApiError::NotFound(msg) => msg,
            ApiError::QueryFailed(msg) => msg,
            ApiError::DeleteFailed(msg) => msg,
            ApiError::SubQueryFailed(msg) => msg,
            ApiError::Unprocessable { message, .. } => message,
            ApiError::MalformedId(msg) => msg,
            ApiError::InternalServerError(msg) => msg,
            ApiError::ServiceUnavailable(msg) => msg,
        }
    }

    pub fn to_json(&self) -> Value {
        let mut body = json!({
            "version": API_VERSION,
            "error_code": self.status_code(),
            "error_msg": self.message(),
        });

        match self {
            ApiError::Unprocessable {
                details: Some(details),
                ..
            }
            | ApiError::Forbidden {
                details: Some(details),
                ..
            } => {
                body["error_details"] = json!(details);
            }
            _ => {}
        }

        body
    }
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn no_default_org(message: impl Into<String>) -> Self {
        ApiError::NoDefaultOrg(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden {
            message: message.into(),
            details: None,
        }
    }

    pub fn forbidden_with(message: impl Into<String>, details: impl ToString) -> Self {
        ApiError::Forbidden {
            message: message.into(),
            details: Some(details.to_string()),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn query_failed(message: impl Into<String>) -> Self {
        ApiError::QueryFailed(message.into())
    }

    pub fn delete_failed(message: impl Into<String>) -> Self {
        ApiError::DeleteFailed(message.into())
    }

    pub fn sub_query_failed(message: impl Into<String>) -> Self {
        ApiError::SubQueryFailed(message.into())
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        ApiError::Unprocessable {
            message: message.into(),
            details: None,
        }
    }

    pub fn unprocessable_with(message: impl Into<String>, details: impl ToString) -> Self {
        ApiError::Unprocessable {
            message: message.into(),
            details: Some(details.to_string()),
        }
    }

    pub fn malformed_id(message: impl Into<String>) -> Self {
        ApiError::MalformedId(message.into())
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }

    /// 403 for a missing or invalid session
    pub fn disconnect() -> Self {
        ApiError::forbidden(keys::DISCONNECT)
    }

    /// 403 for a failed API-level check
    pub fn no_auth() -> Self {
        ApiError::forbidden(keys::NO_AUTH)
    }

    /// `denial` for a refused check. A grant lookup that failed keeps its own
    /// status (503 on timeout) and is never reported as a denial.
    pub fn from_permission(err: PermissionError, denial: ApiError) -> Self {
        match err {
            PermissionError::Persistence(e) => ApiError::from(e),
            _ => denial,
        }
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound(msg) => ApiError::not_found(msg),
            DatabaseError::Timeout(limit) => {
                tracing::error!("Database call exceeded {:?}", limit);
                ApiError::service_unavailable(keys::QUERY_TIMEOUT)
            }
            DatabaseError::ConfigMissing(_) | DatabaseError::InvalidDatabaseUrl => {
                tracing::error!("Database misconfigured: {}", err);
                ApiError::service_unavailable(keys::DATABASE)
            }
            other => {
                // Don't expose internal SQL errors to clients
                tracing::error!("Database error: {}", other);
                ApiError::internal_server_error(keys::DATABASE)
            }
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::InvalidToken(_) => ApiError::disconnect(),
            TokenError::SigningFailed(_) | TokenError::InvalidSecret => {
                tracing::error!("Token service failure: {}", err);
                ApiError::internal_server_error(keys::INTERNAL)
            }
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.status_code(), self.message())
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}
