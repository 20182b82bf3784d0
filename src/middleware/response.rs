use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::API_VERSION;

pub const REPLY_OK: &str = "execute successfully.";

/// Success envelope for mutations: `{version, reply_code, reply_msg, data}`
#[derive(Debug)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self { data }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let data_value = match serde_json::to_value(&self.data) {
            Ok(value) => value,
            Err(e) => return serialization_failure(e),
        };

        let envelope = json!({
            "version": API_VERSION,
            "reply_code": 200,
            "reply_msg": REPLY_OK,
            "data": data_value
        });

        (StatusCode::OK, Json(envelope)).into_response()
    }
}

/// Bare JSON for queries; the management pages read the array directly.
/// A `null` payload is sent as `[]`.
#[derive(Debug)]
pub struct Rows<T: Serialize>(pub T);

impl<T: Serialize> IntoResponse for Rows<T> {
    fn into_response(self) -> Response {
        match serde_json::to_value(&self.0) {
            Ok(Value::Null) => (StatusCode::OK, Json(json!([]))).into_response(),
            Ok(value) => (StatusCode::OK, Json(value)).into_response(),
            Err(e) => serialization_failure(e),
        }
    }
}

/// Paged listing: `{version, reply_code, reply_msg, rows, total}`
#[derive(Debug)]
pub struct Table<T: Serialize> {
    pub rows: T,
    pub total: i64,
}

impl<T: Serialize> IntoResponse for Table<T> {
    fn into_response(self) -> Response {
        let rows = match serde_json::to_value(&self.rows) {
            Ok(Value::Null) => json!([]),
            Ok(value) => value,
            Err(e) => return serialization_failure(e),
        };

        let envelope = json!({
            "version": API_VERSION,
            "reply_code": 200,
            "reply_msg": REPLY_OK,
            "rows": rows,
            "total": self.total
        });

        (StatusCode::OK, Json(envelope)).into_response()
    }
}

fn serialization_failure(e: serde_json::Error) -> Response {
    tracing::error!("Failed to serialize response data: {}", e);
    (
        StatusCode::EXPECTATION_FAILED,
        Json(json!({
            "version": API_VERSION,
            "error_code": 417,
            "error_msg": "format json type info failed.",
        })),
    )
        .into_response()
}
