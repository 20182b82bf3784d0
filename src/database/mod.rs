pub mod accounts;
pub mod audit;
pub mod grants;
pub mod manager;
pub mod orgs;
pub mod roles;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

pub use accounts::PgAccountStore;
pub use audit::PgAuditSink;
pub use grants::PgGrantStore;
pub use manager::{DatabaseError, DatabaseManager};
pub use orgs::PgOrgRepository;
pub use roles::PgRoleRepository;

/// Liveness check behind `GET /health`
#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn ping(&self) -> Result<(), DatabaseError>;
}

#[async_trait]
impl HealthCheck for DatabaseManager {
    async fn ping(&self) -> Result<(), DatabaseError> {
        self.health_check().await
    }
}

/// Bound a persistence call; an elapsed deadline surfaces as `DatabaseError::Timeout`
pub async fn with_deadline<T, F>(limit: Duration, fut: F) -> Result<T, DatabaseError>
where
    F: Future<Output = Result<T, DatabaseError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(DatabaseError::Timeout(limit)),
    }
}
