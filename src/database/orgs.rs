use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::{debug, warn};

use super::DatabaseError;
use crate::codec::CompositeId;
use crate::org::{NewOrgUnit, OrgRepository, OrgUnit, OrgUpdate};

const SELECT_BY_DOMAIN: &str = r#"
    SELECT org_unit_id, org_unit_desc, up_org_id, create_user, create_date,
           maintance_user, maintance_date
      FROM sys_org_info
     WHERE domain_id = $1
     ORDER BY org_unit_id
"#;

const INSERT: &str = r#"
    INSERT INTO sys_org_info
        (org_unit_id, org_unit_desc, up_org_id, domain_id, code_number,
         create_user, create_date, maintance_user, maintance_date)
    VALUES ($1, $2, $3, $4, $5, $6, now(), $6, now())
"#;

const UPDATE: &str = r#"
    UPDATE sys_org_info
       SET org_unit_desc = $2, up_org_id = $3, maintance_user = $4, maintance_date = now()
     WHERE org_unit_id = $1
"#;

const DELETE: &str = "DELETE FROM sys_org_info WHERE org_unit_id = ANY($1)";

/// Raw row; composite ids are parsed on the way out
#[derive(Debug, FromRow)]
struct OrgUnitRow {
    org_unit_id: String,
    org_unit_desc: String,
    up_org_id: Option<String>,
    create_user: String,
    create_date: DateTime<Utc>,
    maintance_user: String,
    maintance_date: DateTime<Utc>,
}

impl TryFrom<OrgUnitRow> for OrgUnit {
    type Error = DatabaseError;

    fn try_from(row: OrgUnitRow) -> Result<Self, Self::Error> {
        let id = CompositeId::parse(&row.org_unit_id)
            .map_err(|e| DatabaseError::QueryError(e.to_string()))?;
        let parent = match row.up_org_id.as_deref() {
            None | Some("") => None,
            Some(raw) => Some(CompositeId::parse(raw).map_err(|e| DatabaseError::QueryError(e.to_string()))?),
        };

        Ok(OrgUnit {
            id,
            description: row.org_unit_desc,
            parent,
            create_user: row.create_user,
            create_date: row.create_date,
            maintain_user: row.maintance_user,
            maintain_date: row.maintance_date,
        })
    }
}

pub struct PgOrgRepository {
    pool: PgPool,
}

impl PgOrgRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrgRepository for PgOrgRepository {
    async fn list(&self, domain_id: &str) -> Result<Vec<OrgUnit>, DatabaseError> {
        let rows: Vec<OrgUnitRow> = sqlx::query_as(SELECT_BY_DOMAIN)
            .bind(domain_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(OrgUnit::try_from).collect()
    }

    async fn insert(&self, unit: &NewOrgUnit, user_id: &str) -> Result<(), DatabaseError> {
        sqlx::query(INSERT)
            .bind(unit.id.to_string())
            .bind(&unit.description)
            .bind(unit.parent.as_ref().map(|p| p.to_string()))
            .bind(unit.domain_id())
            .bind(unit.id.local_code())
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_write)?;
        Ok(())
    }

    async fn update(&self, update: &OrgUpdate, user_id: &str) -> Result<(), DatabaseError> {
        let result = sqlx::query(UPDATE)
            .bind(update.id.to_string())
            .bind(&update.description)
            .bind(update.parent.as_ref().map(|p| p.to_string()))
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_write)?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(update.id.to_string()));
        }
        Ok(())
    }

    async fn delete(&self, ids: &[CompositeId]) -> Result<(), DatabaseError> {
        let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
        let result = sqlx::query(DELETE).bind(&ids).execute(&self.pool).await?;
        debug!("Deleted {} of {} requested org units", result.rows_affected(), ids.len());
        Ok(())
    }

    async fn insert_batch(&self, units: &[NewOrgUnit], user_id: &str) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;

        for unit in units {
            let inserted = sqlx::query(INSERT)
                .bind(unit.id.to_string())
                .bind(&unit.description)
                .bind(unit.parent.as_ref().map(|p| p.to_string()))
                .bind(unit.domain_id())
                .bind(unit.id.local_code())
                .bind(user_id)
                .execute(&mut *tx)
                .await;

            if let Err(e) = inserted {
                warn!("Org batch insert failed at '{}', rolling back", unit.id);
                tx.rollback().await?;
                return Err(DatabaseError::from_write(e));
            }
        }

        tx.commit().await?;
        Ok(())
    }
}
