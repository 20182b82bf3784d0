pub mod account;

use std::collections::HashSet;

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::SecurityConfig;

pub use account::AccountStore;

/// Capability tags carried by every session
pub const DEFAULT_AUTHORITIES: &str = "ROLE_ADMIN,AUTH_WRITE,ACTUATOR";

/// Tag stamped into the claim of configured super users
pub const SUPER_USER_AUTHORITY: &str = "SUPER_USER";

/// Signed session claim. Field names match the tokens already held by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub exp: i64,
    pub iss: String,
    #[serde(rename = "UserId")]
    pub user_id: String,
    #[serde(rename = "DomainId")]
    pub domain_id: String,
    #[serde(rename = "OrgUnitId")]
    pub org_unit_id: String,
    pub authorities: String,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("token signing failed: {0}")]
    SigningFailed(String),

    #[error("JWT secret not configured")]
    InvalidSecret,
}

/// Caller identity recovered from a verified claim
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub domain_id: String,
    pub org_unit_id: String,
    pub authorities: Vec<String>,
    super_user: bool,
}

impl Identity {
    /// Super users pass every API-level check without a grant lookup
    pub fn is_super_user(&self) -> bool {
        self.super_user
    }

    pub fn has_authority(&self, tag: &str) -> bool {
        self.authorities.iter().any(|a| a == tag)
    }
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        let authorities: Vec<String> = claims
            .authorities
            .split(',')
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect();
        let super_user = authorities.iter().any(|a| a == SUPER_USER_AUTHORITY);

        Self {
            user_id: claims.user_id,
            domain_id: claims.domain_id,
            org_unit_id: claims.org_unit_id,
            authorities,
            super_user,
        }
    }
}

/// Issues, verifies and decodes HS256 session tokens.
///
/// There is no server-side session store and no revocation list: a token stays
/// valid until it expires, logout only clears the client cookie.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    super_users: HashSet<String>,
}

impl TokenService {
    pub fn new(
        secret: &str,
        issuer: impl Into<String>,
        super_users: impl IntoIterator<Item = String>,
    ) -> Result<Self, TokenError> {
        if secret.is_empty() {
            return Err(TokenError::InvalidSecret);
        }

        let issuer = issuer.into();
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[issuer.as_str()]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            issuer,
            super_users: super_users.into_iter().collect(),
        })
    }

    pub fn from_config(security: &SecurityConfig) -> Result<Self, TokenError> {
        Self::new(
            &security.jwt_secret,
            security.jwt_issuer.clone(),
            security.super_users.iter().cloned(),
        )
    }

    /// Sign a claim that expires `ttl_secs` from now. A negative ttl yields an
    /// already-expired token.
    pub fn issue(
        &self,
        user_id: &str,
        domain_id: &str,
        org_unit_id: &str,
        ttl_secs: i64,
    ) -> Result<String, TokenError> {
        let mut authorities = DEFAULT_AUTHORITIES.to_string();
        if self.super_users.contains(user_id) {
            authorities.push(',');
            authorities.push_str(SUPER_USER_AUTHORITY);
        }

        let claims = Claims {
            exp: Utc::now().timestamp() + ttl_secs,
            iss: self.issuer.clone(),
            user_id: user_id.to_string(),
            domain_id: domain_id.to_string(),
            org_unit_id: org_unit_id.to_string(),
            authorities,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(|e| {
            tracing::error!("Failed to sign token for user '{}': {}", user_id, e);
            TokenError::SigningFailed(e.to_string())
        })
    }

    /// Signature and expiry check only
    pub fn verify(&self, token: &str) -> bool {
        self.decode(token).is_ok()
    }

    pub fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| TokenError::InvalidToken(e.to_string()))
    }

    pub fn identify(&self, token: &str) -> Result<Identity, TokenError> {
        self.decode(token).map(Identity::from)
    }
}
