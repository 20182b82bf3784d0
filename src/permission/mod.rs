//! Two-tier authorization: API-level grants per `(user, path)` and
//! domain-level grant levels per `(user, domain)`.
//!
//! Every decision re-queries the [`GrantStore`]; nothing is cached, so a
//! revoked write grant takes effect on the next request. All failures deny.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{error, warn};

use crate::auth::{Identity, TokenError, TokenService};
use crate::database::{with_deadline, DatabaseError};

/// Grant level protocol shared with callers: `-1` none, `1` read, `2` read-write
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AccessLevel {
    None,
    Read,
    ReadWrite,
}

impl AccessLevel {
    /// Unknown codes collapse to `None`
    pub fn from_code(code: i32) -> Self {
        match code {
            2 => AccessLevel::ReadWrite,
            1 => AccessLevel::Read,
            _ => AccessLevel::None,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            AccessLevel::None => -1,
            AccessLevel::Read => 1,
            AccessLevel::ReadWrite => 2,
        }
    }
}

/// Requested access pattern, `"r"` or `"w"` on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
}

impl AccessMode {
    pub fn parse(pattern: &str) -> Option<Self> {
        match pattern {
            "r" => Some(AccessMode::Read),
            "w" => Some(AccessMode::Write),
            _ => None,
        }
    }

    /// Read accepts any grant; write needs read-write exactly
    pub fn permits(self, level: AccessLevel) -> bool {
        match self {
            AccessMode::Read => level != AccessLevel::None,
            AccessMode::Write => level == AccessLevel::ReadWrite,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AccessMode::Read => "r",
            AccessMode::Write => "w",
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only persistence port for grant lookups
#[async_trait]
pub trait GrantStore: Send + Sync {
    /// Number of grant rows matching `(user_id, api_path)`
    async fn count_api_grants(&self, user_id: &str, api_path: &str) -> Result<i64, DatabaseError>;

    /// Highest level the user holds at `domain_id` or any ancestor domain
    async fn domain_level(&self, user_id: &str, domain_id: &str) -> Result<AccessLevel, DatabaseError>;
}

#[derive(Debug, Error)]
pub enum PermissionError {
    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("user '{user_id}' is not permitted to access {resource}")]
    Denied { user_id: String, resource: String },

    #[error("no domain given")]
    MissingDomain,

    #[error("unknown access pattern '{0}'")]
    UnknownPattern(String),

    #[error(transparent)]
    Persistence(#[from] DatabaseError),
}

pub struct PermissionResolver {
    tokens: Arc<TokenService>,
    grants: Arc<dyn GrantStore>,
    root_domain: String,
    query_timeout: Duration,
}

impl PermissionResolver {
    pub fn new(
        tokens: Arc<TokenService>,
        grants: Arc<dyn GrantStore>,
        root_domain: impl Into<String>,
        query_timeout: Duration,
    ) -> Self {
        Self {
            tokens,
            grants,
            root_domain: root_domain.into(),
            query_timeout,
        }
    }

    /// May the bearer of `token` call the API at `path`?
    pub async fn basic_auth(&self, token: &str, path: &str) -> bool {
        match self.tokens.identify(token) {
            Ok(identity) => self.authorize_api(&identity, path).await.is_ok(),
            Err(e) => {
                warn!("API check on '{}' rejected token: {}", path, e);
                false
            }
        }
    }

    pub async fn authorize_api(&self, identity: &Identity, path: &str) -> Result<(), PermissionError> {
        if identity.is_super_user() {
            return Ok(());
        }

        let count = with_deadline(
            self.query_timeout,
            self.grants.count_api_grants(&identity.user_id, path),
        )
        .await
        .map_err(|e| {
            error!("API grant lookup failed for user '{}' on '{}': {}", identity.user_id, path, e);
            e
        })?;

        if count > 0 {
            Ok(())
        } else {
            warn!("insufficient privileges, user id is: {}, api is: {}", identity.user_id, path);
            Err(PermissionError::Denied {
                user_id: identity.user_id.clone(),
                resource: format!("api '{}'", path),
            })
        }
    }

    /// May the bearer of `token` access `domain_id` with `pattern` (`"r"`/`"w"`)?
    pub async fn domain_auth(&self, token: &str, domain_id: &str, pattern: &str) -> bool {
        let identity = match self.tokens.identify(token) {
            Ok(identity) => identity,
            Err(e) => {
                warn!("Domain check on '{}' rejected token: {}", domain_id, e);
                return false;
            }
        };

        self.check_domain_pattern(&identity, domain_id, pattern).await.is_ok()
    }

    /// Same as [`Self::domain_auth`] for an already decoded identity
    pub async fn check_domain_pattern(
        &self,
        identity: &Identity,
        domain_id: &str,
        pattern: &str,
    ) -> Result<(), PermissionError> {
        let mode = AccessMode::parse(pattern)
            .ok_or_else(|| PermissionError::UnknownPattern(pattern.to_string()))?;
        self.authorize_domain(identity, domain_id, mode).await
    }

    pub async fn authorize_domain(
        &self,
        identity: &Identity,
        domain_id: &str,
        mode: AccessMode,
    ) -> Result<(), PermissionError> {
        let level = self.domain_level(identity, domain_id).await?;

        if mode.permits(level) {
            Ok(())
        } else {
            warn!(
                "domain permission denied, user id is: {}, domain is: {}, mode: {}, level: {}",
                identity.user_id,
                domain_id,
                mode,
                level.code()
            );
            Err(PermissionError::Denied {
                user_id: identity.user_id.clone(),
                resource: format!("domain '{}' ({})", domain_id, mode),
            })
        }
    }

    pub async fn domain_level(
        &self,
        identity: &Identity,
        domain_id: &str,
    ) -> Result<AccessLevel, PermissionError> {
        if domain_id.trim().is_empty() {
            return Err(PermissionError::MissingDomain);
        }

        let level = with_deadline(
            self.query_timeout,
            self.grants.domain_level(&identity.user_id, domain_id),
        )
        .await
        .map_err(|e| {
            error!("Domain grant lookup failed for user '{}' on '{}': {}", identity.user_id, domain_id, e);
            e
        })?;

        Ok(level)
    }

    pub fn is_root(&self, domain_id: &str) -> bool {
        domain_id == self.root_domain
    }
}
