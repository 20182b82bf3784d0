//! Composite identifiers of the form `<domain-id>_join_<local-code>`.
//!
//! Org units and roles are keyed by a single string that carries both the
//! owning domain and the local code. The string form only exists at the
//! boundary (database rows, form fields); everything else works with
//! [`CompositeId`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// System-wide delimiter between the domain and the local code.
/// Neither component may contain it.
pub const DELIMITER: &str = "_join_";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("identifier '{0}' has no domain separator")]
    NoSeparator(String),

    #[error("component '{0}' contains the reserved separator")]
    ReservedSeparator(String),
}

/// Typed `{domain, local code}` pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CompositeId {
    domain_id: String,
    local_code: String,
}

impl CompositeId {
    pub fn new(domain_id: impl Into<String>, local_code: impl Into<String>) -> Result<Self, CodecError> {
        let domain_id = domain_id.into();
        let local_code = local_code.into();

        for component in [&domain_id, &local_code] {
            if component.contains(DELIMITER) {
                return Err(CodecError::ReservedSeparator(component.clone()));
            }
        }

        Ok(Self { domain_id, local_code })
    }

    pub fn parse(composite: &str) -> Result<Self, CodecError> {
        let (domain_id, local_code) = split(composite)?;
        Self::new(domain_id, local_code)
    }

    pub fn domain_id(&self) -> &str {
        &self.domain_id
    }

    pub fn local_code(&self) -> &str {
        &self.local_code
    }

    pub fn belongs_to(&self, domain_id: &str) -> bool {
        self.domain_id == domain_id
    }
}

impl fmt::Display for CompositeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.domain_id, DELIMITER, self.local_code)
    }
}

impl FromStr for CompositeId {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CompositeId {
    type Error = CodecError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CompositeId> for String {
    fn from(id: CompositeId) -> Self {
        id.to_string()
    }
}

/// Join a domain and a local code into the wire form
pub fn join(domain_id: &str, local_code: &str) -> String {
    format!("{}{}{}", domain_id, DELIMITER, local_code)
}

/// Split the wire form at the first separator
pub fn split(composite: &str) -> Result<(&str, &str), CodecError> {
    composite
        .split_once(DELIMITER)
        .ok_or_else(|| CodecError::NoSeparator(composite.to_string()))
}

/// Domain part of a composite id
pub fn split_domain(composite: &str) -> Result<&str, CodecError> {
    split(composite).map(|(domain_id, _)| domain_id)
}

/// Local-code part of a composite id
pub fn split_code(composite: &str) -> Result<&str, CodecError> {
    split(composite).map(|(_, code)| code)
}
