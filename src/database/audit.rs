use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::DatabaseError;
use crate::audit::{AuditEntry, AuditFilter, AuditLog, AuditSink, Paging};

const INSERT: &str = r#"
    INSERT INTO sys_handle_logs
        (uuid, user_id, handle_time, client_ip, status_code, method, url, domain_id)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
"#;

const SELECT_PAGE: &str = r#"
    SELECT uuid, user_id, handle_time, client_ip, status_code, method, url, domain_id
      FROM sys_handle_logs
     WHERE domain_id = $1
     ORDER BY handle_time DESC
     LIMIT $2 OFFSET $3
"#;

const COUNT: &str = "SELECT count(*) FROM sys_handle_logs WHERE domain_id = $1";

const SEARCH: &str = r#"
    SELECT uuid, user_id, handle_time, client_ip, status_code, method, url, domain_id
      FROM sys_handle_logs
     WHERE domain_id = $1
       AND ($2::text IS NULL OR user_id = $2)
       AND ($3::timestamptz IS NULL OR handle_time >= $3)
       AND ($4::timestamptz IS NULL OR handle_time < $4)
     ORDER BY handle_time DESC
"#;

#[derive(Debug, FromRow)]
struct HandleLogRow {
    uuid: Uuid,
    user_id: String,
    handle_time: DateTime<Utc>,
    client_ip: String,
    status_code: i32,
    method: String,
    url: String,
    domain_id: String,
}

impl From<HandleLogRow> for AuditEntry {
    fn from(row: HandleLogRow) -> Self {
        AuditEntry {
            id: row.uuid,
            user_id: row.user_id,
            domain_id: row.domain_id,
            client_ip: row.client_ip,
            method: row.method,
            url: row.url,
            status_code: u16::try_from(row.status_code).unwrap_or_default(),
            handled_at: row.handle_time,
        }
    }
}

pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn record(&self, entry: &AuditEntry) -> Result<(), DatabaseError> {
        sqlx::query(INSERT)
            .bind(entry.id)
            .bind(&entry.user_id)
            .bind(entry.handled_at)
            .bind(&entry.client_ip)
            .bind(i32::from(entry.status_code))
            .bind(&entry.method)
            .bind(&entry.url)
            .bind(&entry.domain_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl AuditLog for PgAuditSink {
    async fn page(&self, domain_id: &str, paging: Paging) -> Result<(Vec<AuditEntry>, i64), DatabaseError> {
        let rows: Vec<HandleLogRow> = sqlx::query_as(SELECT_PAGE)
            .bind(domain_id)
            .bind(paging.limit)
            .bind(paging.offset)
            .fetch_all(&self.pool)
            .await?;
        let (total,): (i64,) = sqlx::query_as(COUNT).bind(domain_id).fetch_one(&self.pool).await?;

        Ok((rows.into_iter().map(AuditEntry::from).collect(), total))
    }

    async fn search(&self, domain_id: &str, filter: &AuditFilter) -> Result<Vec<AuditEntry>, DatabaseError> {
        let rows: Vec<HandleLogRow> = sqlx::query_as(SEARCH)
            .bind(domain_id)
            .bind(filter.user_id.as_deref())
            .bind(filter.from)
            .bind(filter.until)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(AuditEntry::from).collect())
    }
}
