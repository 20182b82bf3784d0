//! Bulk org-tree import from a decoded spreadsheet.
//!
//! Rows are checked in order (structure, write access, duplicates) and the
//! first bad row aborts the whole import. Parent references are resolved in a
//! second pass because a parent may sit further down the sheet, so a missing
//! parent is only reported once every row has passed its own checks. Nothing
//! is written until both passes succeed, and the batch is committed in one
//! transaction.

pub mod guard;
pub mod sheet;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::auth::Identity;
use crate::codec::CompositeId;
use crate::database::{with_deadline, DatabaseError};
use crate::org::{NewOrgUnit, OrgError, OrgRepository};
use crate::permission::{AccessMode, PermissionError, PermissionResolver};

pub use guard::{UploadGuard, UploadPermit};
pub use sheet::{SheetRow, UploadSheet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Number of units committed
    Imported(usize),
    /// Another upload holds the guard; nothing was read or written
    Busy,
}

/// Row numbers are 1-based sheet rows, the header being row 1
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("row {row}: {source}")]
    Validation {
        row: usize,
        #[source]
        source: OrgError,
    },

    #[error("row {row}: no write access to domain '{domain_id}'")]
    Denied { row: usize, domain_id: String },

    #[error("row {row}: '{id}' already defined on row {first}")]
    DuplicateRow { row: usize, first: usize, id: CompositeId },

    #[error("row {row}: parent '{parent}' not found")]
    MissingParent { row: usize, parent: CompositeId },

    #[error(transparent)]
    Persistence(#[from] DatabaseError),
}

impl UploadError {
    pub fn message_key(&self) -> &'static str {
        match self {
            UploadError::Validation { source, .. } => source.message_key("error_org_upload"),
            UploadError::Denied { .. } => "as_of_date_domain_permission_denied_modify",
            UploadError::DuplicateRow { .. } => "error_org_duplicate",
            UploadError::MissingParent { .. } => "error_org_up_org_not_exists",
            UploadError::Persistence(DatabaseError::Conflict(_)) => "error_org_duplicate",
            UploadError::Persistence(DatabaseError::Timeout(_)) => "error_query_timeout",
            UploadError::Persistence(_) => "error_org_upload",
        }
    }

    pub fn is_denial(&self) -> bool {
        matches!(self, UploadError::Denied { .. })
    }
}

pub struct OrgUploader {
    guard: UploadGuard,
    resolver: Arc<PermissionResolver>,
    orgs: Arc<dyn OrgRepository>,
    query_timeout: Duration,
}

impl OrgUploader {
    pub fn new(
        resolver: Arc<PermissionResolver>,
        orgs: Arc<dyn OrgRepository>,
        query_timeout: Duration,
    ) -> Self {
        Self {
            guard: UploadGuard::new(),
            resolver,
            orgs,
            query_timeout,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.guard.is_held()
    }

    /// Import `rows` (header first) on behalf of `identity`
    pub async fn upload(&self, identity: &Identity, rows: &[SheetRow]) -> Result<UploadOutcome, UploadError> {
        let Some(_permit) = self.guard.try_acquire() else {
            info!("Upload by '{}' rejected, another upload is running", identity.user_id);
            return Ok(UploadOutcome::Busy);
        };

        let batch = self.validate_rows(identity, rows).await?;
        if batch.is_empty() {
            return Ok(UploadOutcome::Imported(0));
        }

        let units: Vec<NewOrgUnit> = batch.into_iter().map(|(_, unit)| unit).collect();
        with_deadline(self.query_timeout, self.orgs.insert_batch(&units, &identity.user_id))
            .await
            .map_err(|e| {
                error!("Org upload by '{}' rolled back: {}", identity.user_id, e);
                e
            })?;

        info!("User '{}' imported {} org units", identity.user_id, units.len());
        Ok(UploadOutcome::Imported(units.len()))
    }

    async fn validate_rows(
        &self,
        identity: &Identity,
        rows: &[SheetRow],
    ) -> Result<Vec<(usize, NewOrgUnit)>, UploadError> {
        let mut batch = Vec::new();
        let mut seen: HashMap<CompositeId, usize> = HashMap::new();

        for (index, row) in rows.iter().enumerate().skip(1) {
            let line = index + 1;
            if row.is_empty() {
                continue;
            }

            let unit = NewOrgUnit::from_codes(
                row.cell(sheet::COL_DOMAIN),
                row.cell(sheet::COL_CODE),
                row.cell(sheet::COL_DESCRIPTION),
                row.cell(sheet::COL_PARENT_CODE),
            )
            .and_then(|unit| unit.validate().map(|_| unit))
            .map_err(|source| {
                warn!("Upload row {} rejected: {}", line, source);
                UploadError::Validation { row: line, source }
            })?;

            match self
                .resolver
                .authorize_domain(identity, unit.domain_id(), AccessMode::Write)
                .await
            {
                Ok(()) => {}
                Err(PermissionError::Persistence(e)) => {
                    error!("Upload row {} grant lookup failed: {}", line, e);
                    return Err(UploadError::Persistence(e));
                }
                Err(e) => {
                    warn!("Upload row {} denied for '{}': {}", line, identity.user_id, e);
                    return Err(UploadError::Denied {
                        row: line,
                        domain_id: unit.domain_id().to_string(),
                    });
                }
            }

            if let Some(first) = seen.insert(unit.id.clone(), line) {
                return Err(UploadError::DuplicateRow {
                    row: line,
                    first,
                    id: unit.id,
                });
            }

            batch.push((line, unit));
        }

        self.check_parents(&batch, &seen).await?;
        Ok(batch)
    }

    /// Every parent must be another row of the batch or an existing unit
    async fn check_parents(
        &self,
        batch: &[(usize, NewOrgUnit)],
        in_batch: &HashMap<CompositeId, usize>,
    ) -> Result<(), UploadError> {
        let mut existing: HashMap<String, HashSet<CompositeId>> = HashMap::new();

        for (line, unit) in batch {
            let Some(parent) = &unit.parent else { continue };
            if in_batch.contains_key(parent) {
                continue;
            }

            let domain_id = parent.domain_id();
            if !existing.contains_key(domain_id) {
                let units = with_deadline(self.query_timeout, self.orgs.list(domain_id)).await?;
                existing.insert(domain_id.to_string(), units.into_iter().map(|u| u.id).collect());
            }

            let known = existing
                .get(domain_id)
                .is_some_and(|ids| ids.contains(parent));
            if !known {
                return Err(UploadError::MissingParent {
                    row: *line,
                    parent: parent.clone(),
                });
            }
        }

        Ok(())
    }
}
