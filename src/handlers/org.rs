// handlers/org.rs - org unit endpoints under /v1/auth
//
// Every failure carries the status code its operation has always used:
// query 417, delete 418, sub-org query 419, everything else 421.

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    routing::{get, post, put},
    Form, Json, Router,
};
use serde::Deserialize;
use tracing::warn;

use crate::app::AppState;
use crate::auth::Identity;
use crate::codec::{CodecError, CompositeId, DELIMITER};
use crate::database::DatabaseError;
use crate::error::{keys, ApiError};
use crate::middleware::{ApiResponse, ApiUser, Rows, Session};
use crate::org::{NewOrgUnit, OrgError, OrgUnit, OrgUpdate};
use crate::permission::AccessMode;
use crate::upload::{UploadError, UploadOutcome, UploadSheet};

pub fn routes(router: Router<AppState>) -> Router<AppState> {
    router
        .route("/v1/auth/resource/org/get", get(org_get))
        .route("/v1/auth/resource/org/post", post(org_post))
        .route("/v1/auth/resource/org/update", put(org_update))
        .route("/v1/auth/resource/org/delete", post(org_delete))
        .route("/v1/auth/resource/org/download", get(org_download))
        .route("/v1/auth/resource/org/upload", post(org_upload))
        .route("/v1/auth/relation/domain/org", get(sub_org_get))
}

#[derive(Debug, Default, Deserialize)]
pub struct DomainQuery {
    #[serde(default)]
    pub domain_id: String,
}

#[derive(Debug, Deserialize)]
pub struct OrgPostForm {
    #[serde(rename = "Org_unit_id", default)]
    pub code: String,
    #[serde(rename = "Org_unit_desc", default)]
    pub description: String,
    #[serde(rename = "Up_org_id", default)]
    pub parent: String,
    #[serde(rename = "Domain_id", default)]
    pub domain_id: String,
}

#[derive(Debug, Deserialize)]
pub struct OrgUpdateForm {
    #[serde(rename = "Id", default)]
    pub id: String,
    #[serde(rename = "Org_unit_desc", default)]
    pub description: String,
    #[serde(rename = "Up_org_id", default)]
    pub parent: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteForm {
    #[serde(default)]
    pub domain_id: String,
    #[serde(rename = "JSON", default)]
    pub json: String,
}

#[derive(Debug, Deserialize)]
struct OrgRef {
    #[serde(rename = "Org_unit_id")]
    id: String,
}

#[derive(Debug, Deserialize)]
pub struct SubOrgQuery {
    #[serde(default)]
    pub org_unit_id: String,
}

/// An empty domain parameter means the caller's own domain
pub(crate) fn domain_or_own(requested: &str, identity: &Identity) -> String {
    if requested.trim().is_empty() {
        identity.domain_id.clone()
    } else {
        requested.to_string()
    }
}

/// Parent given either as a composite id or as a local code within `domain_id`
fn parent_ref(domain_id: &str, raw: &str) -> Result<Option<CompositeId>, CodecError> {
    let raw = raw.trim();
    if raw.is_empty() {
        Ok(None)
    } else if raw.contains(DELIMITER) {
        CompositeId::parse(raw).map(Some)
    } else {
        CompositeId::new(domain_id, raw).map(Some)
    }
}

/// GET /v1/auth/resource/org/get?domain_id=
pub async fn org_get(
    State(state): State<AppState>,
    user: ApiUser,
    Query(query): Query<DomainQuery>,
) -> Result<Rows<Vec<OrgUnit>>, ApiError> {
    let domain_id = domain_or_own(&query.domain_id, user.identity());

    state
        .resolver
        .authorize_domain(user.identity(), &domain_id, AccessMode::Read)
        .await
        .map_err(|e| ApiError::from_permission(e, ApiError::unprocessable(keys::DOMAIN_DENIED)))?;

    let units = state
        .orgs
        .get(&domain_id)
        .await
        .map_err(|e| ApiError::query_failed(e.message_key("error_query_org_info")))?;

    Ok(Rows(units))
}

/// POST /v1/auth/resource/org/post
pub async fn org_post(
    State(state): State<AppState>,
    user: ApiUser,
    Form(form): Form<OrgPostForm>,
) -> Result<ApiResponse<&'static str>, ApiError> {
    let identity = user.identity();

    state
        .resolver
        .authorize_domain(identity, &form.domain_id, AccessMode::Write)
        .await
        .map_err(|e| ApiError::from_permission(e, ApiError::unprocessable(keys::DOMAIN_DENIED_MODIFY)))?;

    let parent = parent_ref(&form.domain_id, &form.parent)
        .map_err(|e| ApiError::unprocessable_with(keys::NO_SEPARATOR, e))?;
    let mut unit = NewOrgUnit::from_codes(&form.domain_id, form.code.trim(), &form.description, "")
        .map_err(|e| ApiError::unprocessable_with(e.message_key("error_org_add"), &e))?;
    unit.parent = parent;

    state
        .orgs
        .post(unit, &identity.user_id)
        .await
        .map_err(|e| ApiError::unprocessable_with(e.message_key("error_org_add"), &e))?;

    Ok(ApiResponse::success("success"))
}

/// PUT /v1/auth/resource/org/update
pub async fn org_update(
    State(state): State<AppState>,
    user: ApiUser,
    Form(form): Form<OrgUpdateForm>,
) -> Result<ApiResponse<&'static str>, ApiError> {
    let identity = user.identity();

    let id = CompositeId::parse(&form.id).map_err(|e| {
        warn!("Org update with malformed id: {}", e);
        ApiError::unprocessable_with(keys::NO_SEPARATOR, &form.id)
    })?;

    state
        .resolver
        .authorize_domain(identity, id.domain_id(), AccessMode::Write)
        .await
        .map_err(|e| ApiError::from_permission(e, ApiError::unprocessable(keys::DOMAIN_DENIED_MODIFY)))?;

    let parent = parent_ref(id.domain_id(), &form.parent)
        .map_err(|e| ApiError::unprocessable_with(keys::NO_SEPARATOR, e))?;
    let update = OrgUpdate {
        id,
        description: form.description,
        parent,
    };

    state
        .orgs
        .update(update, &identity.user_id)
        .await
        .map_err(|e| ApiError::unprocessable_with(e.message_key("error_org_update"), &e))?;

    Ok(ApiResponse::success("success"))
}

/// POST /v1/auth/resource/org/delete, `JSON` holds `[{"Org_unit_id": ...}]`
pub async fn org_delete(
    State(state): State<AppState>,
    user: ApiUser,
    Form(form): Form<DeleteForm>,
) -> Result<ApiResponse<&'static str>, ApiError> {
    let identity = user.identity();

    let refs: Vec<OrgRef> = serde_json::from_str(&form.json)
        .map_err(|e| ApiError::unprocessable_with("error_delete_org_info", e))?;
    let ids = refs
        .iter()
        .map(|r| CompositeId::parse(&r.id))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ApiError::unprocessable_with(keys::NO_SEPARATOR, e))?;

    let domain_id = domain_or_own(&form.domain_id, identity);
    state
        .resolver
        .authorize_domain(identity, &domain_id, AccessMode::Write)
        .await
        .map_err(|e| ApiError::from_permission(e, ApiError::forbidden(keys::DOMAIN_DENIED_MODIFY)))?;

    state.orgs.delete(&domain_id, &ids).await.map_err(|e| match e {
        OrgError::ForeignId { ref id, .. } => ApiError::forbidden_with(keys::DOMAIN_DENIED_MODIFY, id),
        other => ApiError::delete_failed(other.message_key("error_org_delete")),
    })?;

    Ok(ApiResponse::success("success"))
}

/// GET /v1/auth/relation/domain/org?org_unit_id= - every unit below the given one
pub async fn sub_org_get(
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<SubOrgQuery>,
) -> Result<Rows<Vec<OrgUnit>>, ApiError> {
    let id = CompositeId::parse(&query.org_unit_id)
        .map_err(|_| ApiError::unprocessable_with(keys::NO_SEPARATOR, &query.org_unit_id))?;

    state
        .resolver
        .authorize_domain(&session.identity, id.domain_id(), AccessMode::Read)
        .await
        .map_err(|e| ApiError::from_permission(e, ApiError::forbidden(keys::DOMAIN_DENIED)))?;

    let units = state
        .orgs
        .children(&id)
        .await
        .map_err(|e| ApiError::sub_query_failed(e.message_key("error_org_sub_query")))?;

    Ok(Rows(units))
}

/// GET /v1/auth/resource/org/download?domain_id= - header row plus one row per unit
pub async fn org_download(
    State(state): State<AppState>,
    user: ApiUser,
    Query(query): Query<DomainQuery>,
) -> Result<Rows<Vec<Vec<String>>>, ApiError> {
    let domain_id = domain_or_own(&query.domain_id, user.identity());

    state
        .resolver
        .authorize_domain(user.identity(), &domain_id, AccessMode::Read)
        .await
        .map_err(|e| ApiError::from_permission(e, ApiError::forbidden(keys::DOMAIN_DENIED)))?;

    let rows = state
        .orgs
        .export(&domain_id)
        .await
        .map_err(|e| ApiError::query_failed(e.message_key("error_query_org_info")))?;

    Ok(Rows(rows))
}

/// POST /v1/auth/resource/org/upload with `{"rows": [[code, desc, parent, domain], ...]}`
pub async fn org_upload(
    State(state): State<AppState>,
    session: Session,
    body: Result<Json<UploadSheet>, JsonRejection>,
) -> Result<ApiResponse<&'static str>, ApiError> {
    if state.uploader.is_busy() {
        return Ok(ApiResponse::success("error_org_upload_wait"));
    }

    let Json(sheet) = body.map_err(|e| {
        warn!("Unreadable upload body: {}", e);
        ApiError::unprocessable_with("error_org_read_upload_file", e.body_text())
    })?;

    match state.uploader.upload(&session.identity, &sheet.rows).await {
        Ok(UploadOutcome::Imported(_)) => Ok(ApiResponse::success("success")),
        Ok(UploadOutcome::Busy) => Ok(ApiResponse::success("error_org_upload_wait")),
        Err(UploadError::Persistence(e @ DatabaseError::Timeout(_))) => Err(e.into()),
        Err(e) if e.is_denial() => Err(ApiError::forbidden_with(e.message_key(), &e)),
        Err(e) => Err(ApiError::unprocessable_with(e.message_key(), &e)),
    }
}
