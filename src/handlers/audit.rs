// handlers/audit.rs - audit log reads under /v1/auth/handle/logs
//
// Queries always run against the caller's own domain. Failures answer 421.

use axum::{
    extract::{Query, State},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};

use crate::app::AppState;
use crate::audit::{AuditEntry, AuditFilter, Paging};
use crate::error::ApiError;
use crate::middleware::{ApiUser, Rows, Table};

const QUERY_FAILED: &str = "error_handle_logs_query_failed";
const GET_FAILED: &str = "error_handle_logs_get_failed";

pub fn routes(router: Router<AppState>) -> Router<AppState> {
    router
        .route("/v1/auth/handle/logs", get(logs_page))
        .route("/v1/auth/handle/logs/search", get(logs_search))
        .route("/v1/auth/handle/logs/download", get(logs_download))
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub offset: String,
    #[serde(default)]
    pub limit: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(rename = "UserId", default)]
    pub user_id: String,
    #[serde(rename = "StartDate", default)]
    pub start_date: String,
    #[serde(rename = "EndDate", default)]
    pub end_date: String,
}

/// Row shape the log pages read
#[derive(Debug, Serialize)]
pub struct HandleLog {
    pub uuid: String,
    pub user_id: String,
    pub handle_time: String,
    pub client_ip: String,
    pub method: String,
    pub url: String,
    pub status_code: u16,
    pub domain_id: String,
}

impl From<AuditEntry> for HandleLog {
    fn from(entry: AuditEntry) -> Self {
        Self {
            uuid: entry.id.to_string(),
            user_id: entry.user_id,
            handle_time: entry.handled_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            client_ip: entry.client_ip,
            method: entry.method,
            url: entry.url,
            status_code: entry.status_code,
            domain_id: entry.domain_id,
        }
    }
}

/// GET /v1/auth/handle/logs?offset=&limit=
pub async fn logs_page(
    State(state): State<AppState>,
    user: ApiUser,
    Query(query): Query<PageQuery>,
) -> Result<Table<Vec<HandleLog>>, ApiError> {
    let paging = Paging::parse(&query.offset, &query.limit)
        .map_err(|e| ApiError::unprocessable_with(QUERY_FAILED, &e))?;

    let (entries, total) = state
        .audit_log
        .page(&user.identity().domain_id, paging)
        .await
        .map_err(|e| ApiError::unprocessable_with(e.message_key(QUERY_FAILED), &e))?;

    Ok(Table {
        rows: entries.into_iter().map(HandleLog::from).collect(),
        total,
    })
}

/// GET /v1/auth/handle/logs/search?UserId=&StartDate=&EndDate=
pub async fn logs_search(
    State(state): State<AppState>,
    user: ApiUser,
    Query(query): Query<SearchQuery>,
) -> Result<Rows<Vec<HandleLog>>, ApiError> {
    let filter = AuditFilter::parse(&query.user_id, &query.start_date, &query.end_date)
        .map_err(|e| ApiError::unprocessable_with(QUERY_FAILED, &e))?;

    let entries = state
        .audit_log
        .search(&user.identity().domain_id, &filter)
        .await
        .map_err(|e| ApiError::unprocessable_with(e.message_key(QUERY_FAILED), &e))?;

    Ok(Rows(entries.into_iter().map(HandleLog::from).collect()))
}

/// GET /v1/auth/handle/logs/download - header row plus one row per entry
pub async fn logs_download(
    State(state): State<AppState>,
    user: ApiUser,
) -> Result<Rows<Vec<Vec<String>>>, ApiError> {
    let rows = state
        .audit_log
        .export(&user.identity().domain_id)
        .await
        .map_err(|e| ApiError::unprocessable(e.message_key(GET_FAILED)))?;

    Ok(Rows(rows))
}
