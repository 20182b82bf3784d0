use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::PgPool;

use super::DatabaseError;
use crate::auth::AccountStore;

const DOMAIN_OF: &str = "SELECT domain_id FROM sys_user_info WHERE user_id = $1";

const DEFAULT_ORG: &str = "SELECT org_unit_id FROM sys_user_info WHERE user_id = $1";

const PASSWORD_MATCHES: &str = r#"
    SELECT COUNT(*)
      FROM sys_sec_user
     WHERE user_id = $1
       AND user_passwd = $2
       AND status_cd = '0'
"#;

pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Stored form of a password: lowercase hex SHA-256
    pub fn digest(password: &str) -> String {
        format!("{:x}", Sha256::digest(password.as_bytes()))
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn domain_of(&self, user_id: &str) -> Result<Option<String>, DatabaseError> {
        let row: Option<(Option<String>,)> = sqlx::query_as(DOMAIN_OF)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.and_then(|(d,)| d).filter(|d| !d.is_empty()))
    }

    async fn default_org(&self, user_id: &str) -> Result<Option<String>, DatabaseError> {
        let row: Option<(Option<String>,)> = sqlx::query_as(DEFAULT_ORG)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.and_then(|(o,)| o).filter(|o| !o.is_empty()))
    }

    async fn check_password(&self, user_id: &str, password: &str) -> Result<bool, DatabaseError> {
        let (count,): (i64,) = sqlx::query_as(PASSWORD_MATCHES)
            .bind(user_id)
            .bind(Self::digest(password))
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }
}
