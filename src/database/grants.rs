use async_trait::async_trait;
use sqlx::PgPool;

use super::DatabaseError;
use crate::permission::{AccessLevel, GrantStore};

/// Grant rows reachable from the user through role membership
const COUNT_API_GRANTS: &str = r#"
    SELECT COUNT(*)
      FROM sys_role_user_relation ur
      JOIN sys_role_resource_relation rr ON rr.role_id = ur.role_id
      JOIN sys_resource_info ri ON ri.res_id = rr.res_id
     WHERE ur.user_id = $1
       AND ri.res_url = $2
"#;

/// Highest level held on the domain or any ancestor. The walk stops at the
/// first repeated domain so a corrupt hierarchy cannot loop.
const DOMAIN_LEVEL: &str = r#"
    WITH RECURSIVE ancestors (domain_id, up_domain_id, path) AS (
        SELECT d.domain_id, d.up_domain_id, ARRAY[d.domain_id]::text[]
          FROM sys_domain_info d
         WHERE d.domain_id = $2
        UNION ALL
        SELECT p.domain_id, p.up_domain_id, a.path || p.domain_id::text
          FROM sys_domain_info p
          JOIN ancestors a ON p.domain_id = a.up_domain_id
         WHERE NOT p.domain_id = ANY(a.path)
    )
    SELECT COALESCE(MAX(g.auth_level), -1)::int4
      FROM sys_user_domain_grant g
     WHERE g.user_id = $1
       AND (g.domain_id = $2 OR g.domain_id IN (SELECT domain_id FROM ancestors))
"#;

pub struct PgGrantStore {
    pool: PgPool,
}

impl PgGrantStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GrantStore for PgGrantStore {
    async fn count_api_grants(&self, user_id: &str, api_path: &str) -> Result<i64, DatabaseError> {
        let (count,): (i64,) = sqlx::query_as(COUNT_API_GRANTS)
            .bind(user_id)
            .bind(api_path)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn domain_level(&self, user_id: &str, domain_id: &str) -> Result<AccessLevel, DatabaseError> {
        let (level,): (i32,) = sqlx::query_as(DOMAIN_LEVEL)
            .bind(user_id)
            .bind(domain_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(AccessLevel::from_code(level))
    }
}
