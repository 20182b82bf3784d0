use async_trait::async_trait;

use crate::database::DatabaseError;

/// Account lookups needed at login. Password storage stays behind this port.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Domain the user belongs to, `None` for an unknown user
    async fn domain_of(&self, user_id: &str) -> Result<Option<String>, DatabaseError>;

    /// Composite id of the user's default org unit
    async fn default_org(&self, user_id: &str) -> Result<Option<String>, DatabaseError>;

    async fn check_password(&self, user_id: &str, password: &str) -> Result<bool, DatabaseError>;
}
