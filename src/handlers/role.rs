// handlers/role.rs - role endpoints under /v1/auth/role

use axum::{
    extract::{Query, State},
    routing::{get, post, put},
    Form, Router,
};
use serde::Deserialize;
use tracing::warn;

use super::org::{domain_or_own, DomainQuery};
use crate::app::AppState;
use crate::codec::CompositeId;
use crate::error::{keys, ApiError};
use crate::middleware::{ApiResponse, ApiUser, Rows};
use crate::permission::AccessMode;
use crate::role::{Role, RoleUpdate};

pub fn routes(router: Router<AppState>) -> Router<AppState> {
    router
        .route("/v1/auth/role/get", get(role_get))
        .route("/v1/auth/role/post", post(role_post))
        .route("/v1/auth/role/delete", post(role_delete))
        .route("/v1/auth/role/update", put(role_update))
}

#[derive(Debug, Deserialize)]
pub struct RolePostForm {
    #[serde(default)]
    pub domain_id: String,
    #[serde(rename = "Role_id", default)]
    pub code: String,
    #[serde(rename = "Role_name", default)]
    pub name: String,
    #[serde(rename = "Role_status", default)]
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct RoleUpdateForm {
    #[serde(rename = "Role_id", default)]
    pub id: String,
    #[serde(rename = "Role_name", default)]
    pub name: String,
    #[serde(rename = "Role_status", default)]
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct RoleDeleteForm {
    #[serde(rename = "JSON", default)]
    pub json: String,
}

#[derive(Debug, Deserialize)]
struct RoleRef {
    #[serde(rename = "Role_id")]
    id: String,
}

/// GET /v1/auth/role/get?domain_id=
pub async fn role_get(
    State(state): State<AppState>,
    user: ApiUser,
    Query(query): Query<DomainQuery>,
) -> Result<Rows<Vec<Role>>, ApiError> {
    let domain_id = domain_or_own(&query.domain_id, user.identity());

    state
        .resolver
        .authorize_domain(user.identity(), &domain_id, AccessMode::Read)
        .await
        .map_err(|e| ApiError::from_permission(e, ApiError::forbidden(keys::DOMAIN_DENIED)))?;

    let roles = state
        .roles
        .get(&domain_id)
        .await
        .map_err(|e| ApiError::unprocessable_with(e.message_key("error_role_query"), &e))?;

    Ok(Rows(roles))
}

/// POST /v1/auth/role/post
pub async fn role_post(
    State(state): State<AppState>,
    user: ApiUser,
    Form(form): Form<RolePostForm>,
) -> Result<ApiResponse<&'static str>, ApiError> {
    let identity = user.identity();

    state
        .resolver
        .authorize_domain(identity, &form.domain_id, AccessMode::Write)
        .await
        .map_err(|e| ApiError::from_permission(e, ApiError::unprocessable(keys::DOMAIN_DENIED)))?;

    state
        .roles
        .post(&form.domain_id, form.code.trim(), &form.name, &form.status, &identity.user_id)
        .await
        .map_err(|e| ApiError::unprocessable_with(e.message_key("error_role_add"), &e))?;

    Ok(ApiResponse::success("success"))
}

/// POST /v1/auth/role/delete, `JSON` holds `[{"Role_id": ...}]`. Every
/// role's own domain needs write access.
pub async fn role_delete(
    State(state): State<AppState>,
    user: ApiUser,
    Form(form): Form<RoleDeleteForm>,
) -> Result<ApiResponse<&'static str>, ApiError> {
    let identity = user.identity();

    let refs: Vec<RoleRef> = serde_json::from_str(&form.json)
        .map_err(|e| ApiError::unprocessable_with("error_role_json_failed", e))?;
    let ids = refs
        .iter()
        .map(|r| CompositeId::parse(&r.id))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ApiError::unprocessable_with(keys::NO_SEPARATOR, e))?;

    for id in &ids {
        state
            .resolver
            .authorize_domain(identity, id.domain_id(), AccessMode::Write)
            .await
            .map_err(|e| {
                ApiError::from_permission(e, ApiError::forbidden_with("error_write_domain", id.domain_id()))
            })?;
    }

    state
        .roles
        .delete(&ids)
        .await
        .map_err(|e| ApiError::delete_failed(e.message_key("error_role_delete")))?;

    Ok(ApiResponse::success("success"))
}

/// PUT /v1/auth/role/update - name and status only, the local code is fixed
pub async fn role_update(
    State(state): State<AppState>,
    user: ApiUser,
    Form(form): Form<RoleUpdateForm>,
) -> Result<ApiResponse<&'static str>, ApiError> {
    let identity = user.identity();

    let id = CompositeId::parse(&form.id).map_err(|e| {
        warn!("Role update with malformed id: {}", e);
        ApiError::malformed_id(keys::NO_SEPARATOR)
    })?;

    state
        .resolver
        .authorize_domain(identity, id.domain_id(), AccessMode::Write)
        .await
        .map_err(|e| ApiError::from_permission(e, ApiError::forbidden(keys::DOMAIN_DENIED_MODIFY)))?;

    let update = RoleUpdate {
        id,
        name: form.name,
        status: form.status,
    };
    state
        .roles
        .update(update, &identity.user_id)
        .await
        .map_err(|e| ApiError::unprocessable_with(e.message_key("error_role_update"), &e))?;

    Ok(ApiResponse::success("success"))
}
