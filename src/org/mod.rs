//! Domain-scoped org unit hierarchy.
//!
//! The repository port only persists; every invariant is checked here by
//! [`OrgService`]. Authorization is the caller's job.

pub mod tree;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::ser::{Serialize, SerializeStruct, Serializer};
use thiserror::Error;
use tracing::{error, info};

use crate::codec::{CodecError, CompositeId};
use crate::database::{with_deadline, DatabaseError};

/// Persisted org unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgUnit {
    pub id: CompositeId,
    pub description: String,
    /// `None` for a top-level unit
    pub parent: Option<CompositeId>,
    pub create_user: String,
    pub create_date: DateTime<Utc>,
    pub maintain_user: String,
    pub maintain_date: DateTime<Utc>,
}

impl OrgUnit {
    pub fn domain_id(&self) -> &str {
        self.id.domain_id()
    }

    pub fn code(&self) -> &str {
        self.id.local_code()
    }
}

// Field names follow the JSON already consumed by the org management page.
impl Serialize for OrgUnit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("OrgUnit", 9)?;
        s.serialize_field("Org_unit_id", &self.id)?;
        s.serialize_field("Org_unit_desc", &self.description)?;
        s.serialize_field("Up_org_id", &self.parent)?;
        s.serialize_field("Domain_id", self.domain_id())?;
        s.serialize_field("Code_number", self.code())?;
        s.serialize_field("Create_user", &self.create_user)?;
        s.serialize_field("Create_date", &self.create_date)?;
        s.serialize_field("Maintance_user", &self.maintain_user)?;
        s.serialize_field("Maintance_date", &self.maintain_date)?;
        s.end()
    }
}

/// Unit to be created, either from the API or from an upload row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrgUnit {
    pub id: CompositeId,
    pub description: String,
    pub parent: Option<CompositeId>,
}

impl NewOrgUnit {
    /// Build from the tabular/form shape. An empty parent code means top level.
    pub fn from_codes(
        domain_id: &str,
        code: &str,
        description: &str,
        parent_code: &str,
    ) -> Result<Self, OrgError> {
        if code.trim().is_empty() {
            return Err(OrgError::EmptyCode);
        }

        let id = CompositeId::new(domain_id, code)?;
        let parent = if parent_code.is_empty() {
            None
        } else {
            Some(CompositeId::new(domain_id, parent_code)?)
        };

        Ok(Self {
            id,
            description: description.to_string(),
            parent,
        })
    }

    pub fn domain_id(&self) -> &str {
        self.id.domain_id()
    }

    /// Structural checks that need no persistence
    pub fn validate(&self) -> Result<(), OrgError> {
        check_parent(&self.id, self.parent.as_ref())
    }
}

/// Mutable fields of an existing unit; the id itself never changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgUpdate {
    pub id: CompositeId,
    pub description: String,
    pub parent: Option<CompositeId>,
}

fn check_parent(id: &CompositeId, parent: Option<&CompositeId>) -> Result<(), OrgError> {
    match parent {
        Some(parent) if parent == id => Err(OrgError::SelfParent(id.clone())),
        Some(parent) if !parent.belongs_to(id.domain_id()) => Err(OrgError::CrossDomainParent {
            parent: parent.clone(),
            domain_id: id.domain_id().to_string(),
        }),
        _ => Ok(()),
    }
}

#[derive(Debug, Error)]
pub enum OrgError {
    #[error("org unit '{0}' cannot be its own parent")]
    SelfParent(CompositeId),

    #[error("parent '{parent}' is outside domain '{domain_id}'")]
    CrossDomainParent { parent: CompositeId, domain_id: String },

    #[error("moving '{id}' under '{parent}' would create a cycle")]
    Cycle { id: CompositeId, parent: CompositeId },

    #[error("org unit '{0}' not found")]
    NotFound(CompositeId),

    #[error("parent org unit '{0}' not found")]
    MissingParent(CompositeId),

    #[error("org unit '{id}' is outside domain '{domain_id}'")]
    ForeignId { id: CompositeId, domain_id: String },

    #[error("org code must not be empty")]
    EmptyCode,

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Persistence(#[from] DatabaseError),
}

impl OrgError {
    /// Message key for the client; persistence failures use the caller's key
    pub fn message_key(&self, fallback: &'static str) -> &'static str {
        match self {
            OrgError::SelfParent(_) => "as_of_date_up_org_equal_org_id",
            OrgError::CrossDomainParent { .. } => "error_org_up_org_domain",
            OrgError::Cycle { .. } => "error_org_up_org_cycle",
            OrgError::NotFound(_) => "error_org_not_found",
            OrgError::MissingParent(_) => "error_org_up_org_not_exists",
            OrgError::ForeignId { .. } => "as_of_date_domain_permission_denied_modify",
            OrgError::EmptyCode => "error_org_code_empty",
            OrgError::Codec(_) => "error_no_separator",
            OrgError::Persistence(DatabaseError::Conflict(_)) => "error_org_duplicate",
            OrgError::Persistence(DatabaseError::Timeout(_)) => "error_query_timeout",
            OrgError::Persistence(_) => fallback,
        }
    }
}

/// Persistence port for org units
#[async_trait]
pub trait OrgRepository: Send + Sync {
    /// Every unit of one domain
    async fn list(&self, domain_id: &str) -> Result<Vec<OrgUnit>, DatabaseError>;

    async fn insert(&self, unit: &NewOrgUnit, user_id: &str) -> Result<(), DatabaseError>;

    async fn update(&self, update: &OrgUpdate, user_id: &str) -> Result<(), DatabaseError>;

    /// Removes exactly the given units; no cascade
    async fn delete(&self, ids: &[CompositeId]) -> Result<(), DatabaseError>;

    /// All-or-nothing insert; a conflicting key rolls back the whole batch
    async fn insert_batch(&self, units: &[NewOrgUnit], user_id: &str) -> Result<(), DatabaseError>;
}

pub struct OrgService {
    repo: Arc<dyn OrgRepository>,
    query_timeout: Duration,
}

impl OrgService {
    pub fn new(repo: Arc<dyn OrgRepository>, query_timeout: Duration) -> Self {
        Self { repo, query_timeout }
    }

    pub async fn get(&self, domain_id: &str) -> Result<Vec<OrgUnit>, OrgError> {
        let units = with_deadline(self.query_timeout, self.repo.list(domain_id))
            .await
            .map_err(|e| {
                error!("Failed to query org units of domain '{}': {}", domain_id, e);
                e
            })?;
        Ok(units)
    }

    /// Transitive children of `id`, excluding `id` itself
    pub async fn children(&self, id: &CompositeId) -> Result<Vec<OrgUnit>, OrgError> {
        let units = self.get(id.domain_id()).await?;
        Ok(tree::descendants(&units, id))
    }

    pub async fn post(&self, unit: NewOrgUnit, user_id: &str) -> Result<(), OrgError> {
        unit.validate()?;

        if let Some(parent) = &unit.parent {
            let units = self.get(unit.domain_id()).await?;
            if !units.iter().any(|u| &u.id == parent) {
                return Err(OrgError::MissingParent(parent.clone()));
            }
        }

        with_deadline(self.query_timeout, self.repo.insert(&unit, user_id))
            .await
            .map_err(|e| {
                error!("Failed to insert org unit '{}': {}", unit.id, e);
                e
            })?;

        info!("User '{}' created org unit '{}'", user_id, unit.id);
        Ok(())
    }

    pub async fn update(&self, update: OrgUpdate, user_id: &str) -> Result<(), OrgError> {
        check_parent(&update.id, update.parent.as_ref())?;

        let units = self.get(update.id.domain_id()).await?;
        if !units.iter().any(|u| u.id == update.id) {
            return Err(OrgError::NotFound(update.id.clone()));
        }

        if let Some(parent) = &update.parent {
            if !units.iter().any(|u| &u.id == parent) {
                return Err(OrgError::MissingParent(parent.clone()));
            }
            if tree::would_cycle(&units, &update.id, parent) {
                return Err(OrgError::Cycle {
                    id: update.id.clone(),
                    parent: parent.clone(),
                });
            }
        }

        with_deadline(self.query_timeout, self.repo.update(&update, user_id))
            .await
            .map_err(|e| {
                error!("Failed to update org unit '{}': {}", update.id, e);
                e
            })?;

        info!("User '{}' updated org unit '{}'", user_id, update.id);
        Ok(())
    }

    /// Delete units of `domain_id`; any id from another domain rejects the call
    pub async fn delete(&self, domain_id: &str, ids: &[CompositeId]) -> Result<(), OrgError> {
        if let Some(foreign) = ids.iter().find(|id| !id.belongs_to(domain_id)) {
            return Err(OrgError::ForeignId {
                id: foreign.clone(),
                domain_id: domain_id.to_string(),
            });
        }

        if ids.is_empty() {
            return Ok(());
        }

        with_deadline(self.query_timeout, self.repo.delete(ids))
            .await
            .map_err(|e| {
                error!("Failed to delete org units of domain '{}': {}", domain_id, e);
                e
            })?;

        info!("Deleted {} org units from domain '{}'", ids.len(), domain_id);
        Ok(())
    }

    /// Header plus one row per unit, ready for a tabular writer
    pub async fn export(&self, domain_id: &str) -> Result<Vec<Vec<String>>, OrgError> {
        let units = self.get(domain_id).await?;
        Ok(tree::export_rows(&units))
    }
}
