//! Roles keyed by composite ids. The local code is fixed at creation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::ser::{Serialize, SerializeStruct, Serializer};
use thiserror::Error;
use tracing::{error, info};

use crate::codec::{CodecError, CompositeId};
use crate::database::{with_deadline, DatabaseError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub id: CompositeId,
    pub name: String,
    pub status: String,
    pub create_user: String,
    pub create_date: DateTime<Utc>,
    pub maintain_user: String,
    pub maintain_date: DateTime<Utc>,
}

impl Role {
    pub fn domain_id(&self) -> &str {
        self.id.domain_id()
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Role", 9)?;
        s.serialize_field("Role_id", &self.id)?;
        s.serialize_field("Role_name", &self.name)?;
        s.serialize_field("Role_status_code", &self.status)?;
        s.serialize_field("Domain_id", self.id.domain_id())?;
        s.serialize_field("Code_number", self.id.local_code())?;
        s.serialize_field("Create_user", &self.create_user)?;
        s.serialize_field("Create_date", &self.create_date)?;
        s.serialize_field("Maintance_user", &self.maintain_user)?;
        s.serialize_field("Maintance_date", &self.maintain_date)?;
        s.end()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRole {
    pub id: CompositeId,
    pub name: String,
    pub status: String,
}

/// Name and status only; there is no way to express a new local code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleUpdate {
    pub id: CompositeId,
    pub name: String,
    pub status: String,
}

#[derive(Debug, Error)]
pub enum RoleError {
    #[error("role code must not be empty")]
    EmptyCode,

    #[error("role name must not be empty")]
    EmptyName,

    #[error("role '{0}' not found")]
    NotFound(CompositeId),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Persistence(#[from] DatabaseError),
}

impl RoleError {
    pub fn message_key(&self, fallback: &'static str) -> &'static str {
        match self {
            RoleError::EmptyCode => "error_role_id_empty",
            RoleError::EmptyName => "error_role_name_empty",
            RoleError::NotFound(_) => "error_role_not_found",
            RoleError::Codec(_) => "error_no_separator",
            RoleError::Persistence(DatabaseError::Conflict(_)) => "error_role_duplicate",
            RoleError::Persistence(DatabaseError::Timeout(_)) => "error_query_timeout",
            RoleError::Persistence(_) => fallback,
        }
    }
}

#[async_trait]
pub trait RoleRepository: Send + Sync {
    async fn list(&self, domain_id: &str) -> Result<Vec<Role>, DatabaseError>;

    async fn insert(&self, role: &NewRole, user_id: &str) -> Result<(), DatabaseError>;

    /// Returns the number of rows touched
    async fn update(&self, update: &RoleUpdate, user_id: &str) -> Result<u64, DatabaseError>;

    async fn delete(&self, ids: &[CompositeId]) -> Result<(), DatabaseError>;
}

pub struct RoleService {
    repo: Arc<dyn RoleRepository>,
    query_timeout: Duration,
}

impl RoleService {
    pub fn new(repo: Arc<dyn RoleRepository>, query_timeout: Duration) -> Self {
        Self { repo, query_timeout }
    }

    pub async fn get(&self, domain_id: &str) -> Result<Vec<Role>, RoleError> {
        let roles = with_deadline(self.query_timeout, self.repo.list(domain_id))
            .await
            .map_err(|e| {
                error!("Failed to query roles of domain '{}': {}", domain_id, e);
                e
            })?;
        Ok(roles)
    }

    pub async fn post(
        &self,
        domain_id: &str,
        code: &str,
        name: &str,
        status: &str,
        user_id: &str,
    ) -> Result<(), RoleError> {
        if code.trim().is_empty() {
            return Err(RoleError::EmptyCode);
        }
        if name.trim().is_empty() {
            return Err(RoleError::EmptyName);
        }

        let role = NewRole {
            id: CompositeId::new(domain_id, code)?,
            name: name.to_string(),
            status: status.to_string(),
        };

        with_deadline(self.query_timeout, self.repo.insert(&role, user_id))
            .await
            .map_err(|e| {
                error!("Failed to insert role '{}': {}", role.id, e);
                e
            })?;

        info!("User '{}' created role '{}'", user_id, role.id);
        Ok(())
    }

    pub async fn update(&self, update: RoleUpdate, user_id: &str) -> Result<(), RoleError> {
        if update.name.trim().is_empty() {
            return Err(RoleError::EmptyName);
        }

        let touched = with_deadline(self.query_timeout, self.repo.update(&update, user_id))
            .await
            .map_err(|e| {
                error!("Failed to update role '{}': {}", update.id, e);
                e
            })?;

        if touched == 0 {
            return Err(RoleError::NotFound(update.id));
        }

        info!("User '{}' updated role '{}'", user_id, update.id);
        Ok(())
    }

    pub async fn delete(&self, ids: &[CompositeId]) -> Result<(), RoleError> {
        if ids.is_empty() {
            return Ok(());
        }

        with_deadline(self.query_timeout, self.repo.delete(ids))
            .await
            .map_err(|e| {
                error!("Failed to delete {} roles: {}", ids.len(), e);
                e
            })?;

        info!("Deleted {} roles", ids.len());
        Ok(())
    }
}
