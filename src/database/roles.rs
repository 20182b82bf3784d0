use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use super::DatabaseError;
use crate::codec::CompositeId;
use crate::role::{NewRole, Role, RoleRepository, RoleUpdate};

const SELECT_BY_DOMAIN: &str = r#"
    SELECT role_id, role_name, role_status_code, create_user, create_date,
           maintance_user, maintance_date
      FROM sys_role_info
     WHERE domain_id = $1
     ORDER BY role_id
"#;

const INSERT: &str = r#"
    INSERT INTO sys_role_info
        (role_id, role_name, role_status_code, domain_id, code_number,
         create_user, create_date, maintance_user, maintance_date)
    VALUES ($1, $2, $3, $4, $5, $6, now(), $6, now())
"#;

// role_id and code_number are never written here
const UPDATE: &str = r#"
    UPDATE sys_role_info
       SET role_name = $2, role_status_code = $3, maintance_user = $4, maintance_date = now()
     WHERE role_id = $1
"#;

const DELETE: &str = "DELETE FROM sys_role_info WHERE role_id = ANY($1)";

#[derive(Debug, FromRow)]
struct RoleRow {
    role_id: String,
    role_name: String,
    role_status_code: String,
    create_user: String,
    create_date: DateTime<Utc>,
    maintance_user: String,
    maintance_date: DateTime<Utc>,
}

impl TryFrom<RoleRow> for Role {
    type Error = DatabaseError;

    fn try_from(row: RoleRow) -> Result<Self, Self::Error> {
        Ok(Role {
            id: CompositeId::parse(&row.role_id).map_err(|e| DatabaseError::QueryError(e.to_string()))?,
            name: row.role_name,
            status: row.role_status_code,
            create_user: row.create_user,
            create_date: row.create_date,
            maintain_user: row.maintance_user,
            maintain_date: row.maintance_date,
        })
    }
}

pub struct PgRoleRepository {
    pool: PgPool,
}

impl PgRoleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoleRepository for PgRoleRepository {
    async fn list(&self, domain_id: &str) -> Result<Vec<Role>, DatabaseError> {
        let rows: Vec<RoleRow> = sqlx::query_as(SELECT_BY_DOMAIN)
            .bind(domain_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Role::try_from).collect()
    }

    async fn insert(&self, role: &NewRole, user_id: &str) -> Result<(), DatabaseError> {
        sqlx::query(INSERT)
            .bind(role.id.to_string())
            .bind(&role.name)
            .bind(&role.status)
            .bind(role.id.domain_id())
            .bind(role.id.local_code())
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_write)?;
        Ok(())
    }

    async fn update(&self, update: &RoleUpdate, user_id: &str) -> Result<u64, DatabaseError> {
        let result = sqlx::query(UPDATE)
            .bind(update.id.to_string())
            .bind(&update.name)
            .bind(&update.status)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_write)?;
        Ok(result.rows_affected())
    }

    async fn delete(&self, ids: &[CompositeId]) -> Result<(), DatabaseError> {
        let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
        sqlx::query(DELETE).bind(&ids).execute(&self.pool).await?;
        Ok(())
    }
}
