use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
    pub audit: AuditConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub connection_timeout: u64,
    /// Deadline applied to every grant, org and role query
    pub query_timeout_ms: u64,
    pub enable_query_logging: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub token_ttl_secs: i64,
    pub cookie_name: String,
    /// User ids that receive the super-user capability when a token is issued
    pub super_users: Vec<String>,
    /// Sentinel id of the super-tenant domain
    pub root_domain: String,
    pub enable_cors: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Wait for queue capacity before the response completes
    Block,
    /// Drop the entry being logged when the queue is full
    DropNewest,
}

impl std::str::FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "block" => Ok(OverflowPolicy::Block),
            "drop_newest" | "drop-newest" => Ok(OverflowPolicy::DropNewest),
            other => Err(format!("unknown audit overflow policy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    pub enabled: bool,
    pub queue_capacity: usize,
    pub overflow_policy: OverflowPolicy,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Server overrides
        if let Ok(v) = env::var("HAUTH_BIND_ADDRESS") {
            self.server.bind_address = v;
        }
        if let Some(port) = env::var("HAUTH_PORT")
            .ok()
            .or_else(|| env::var("PORT").ok())
            .and_then(|s| s.parse::<u16>().ok())
        {
            self.server.port = port;
        }

        // Database overrides
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }
        if let Ok(v) = env::var("DATABASE_QUERY_TIMEOUT_MS") {
            self.database.query_timeout_ms = v.parse().unwrap_or(self.database.query_timeout_ms);
        }
        if let Ok(v) = env::var("DATABASE_ENABLE_QUERY_LOGGING") {
            self.database.enable_query_logging = v.parse().unwrap_or(self.database.enable_query_logging);
        }

        // Security overrides
        if let Ok(v) = env::var("SECURITY_JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("SECURITY_JWT_ISSUER") {
            self.security.jwt_issuer = v;
        }
        if let Ok(v) = env::var("SECURITY_TOKEN_TTL_SECS") {
            self.security.token_ttl_secs = v.parse().unwrap_or(self.security.token_ttl_secs);
        }
        if let Ok(v) = env::var("SECURITY_COOKIE_NAME") {
            self.security.cookie_name = v;
        }
        if let Ok(v) = env::var("SECURITY_SUPER_USERS") {
            self.security.super_users = split_list(&v);
        }
        if let Ok(v) = env::var("SECURITY_ROOT_DOMAIN") {
            self.security.root_domain = v;
        }
        if let Ok(v) = env::var("SECURITY_ENABLE_CORS") {
            self.security.enable_cors = v.parse().unwrap_or(self.security.enable_cors);
        }

        // Audit overrides
        if let Ok(v) = env::var("AUDIT_ENABLED") {
            self.audit.enabled = v.parse().unwrap_or(self.audit.enabled);
        }
        if let Ok(v) = env::var("AUDIT_QUEUE_CAPACITY") {
            self.audit.queue_capacity = v.parse().unwrap_or(self.audit.queue_capacity);
        }
        if let Ok(v) = env::var("AUDIT_OVERFLOW_POLICY") {
            self.audit.overflow_policy = v.parse().unwrap_or(self.audit.overflow_policy);
        }

        self
    }

    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                max_connections: 10,
                connection_timeout: 30,
                query_timeout_ms: 5_000,
                enable_query_logging: true,
            },
            security: SecurityConfig {
                jwt_secret: "hc".to_string(),
                jwt_issuer: "hc".to_string(),
                token_ttl_secs: 86_400,
                cookie_name: "Authorization".to_string(),
                super_users: vec!["admin".to_string()],
                root_domain: "vertex_root".to_string(),
                enable_cors: true,
            },
            audit: AuditConfig {
                enabled: false,
                queue_capacity: 1024,
                overflow_policy: OverflowPolicy::DropNewest,
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            server: ServerConfig {
                bind_address: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                max_connections: 20,
                connection_timeout: 10,
                query_timeout_ms: 3_000,
                enable_query_logging: true,
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_issuer: "hc".to_string(),
                token_ttl_secs: 86_400,
                cookie_name: "Authorization".to_string(),
                super_users: vec!["admin".to_string()],
                root_domain: "vertex_root".to_string(),
                enable_cors: true,
            },
            audit: AuditConfig {
                enabled: true,
                queue_capacity: 4096,
                overflow_policy: OverflowPolicy::DropNewest,
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            server: ServerConfig {
                bind_address: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                max_connections: 50,
                connection_timeout: 5,
                query_timeout_ms: 2_000,
                enable_query_logging: false,
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_issuer: "hc".to_string(),
                token_ttl_secs: 4 * 3_600,
                cookie_name: "Authorization".to_string(),
                super_users: vec!["admin".to_string()],
                root_domain: "vertex_root".to_string(),
                enable_cors: false,
            },
            audit: AuditConfig {
                enabled: true,
                queue_capacity: 16_384,
                overflow_policy: OverflowPolicy::DropNewest,
            },
        }
    }
}

fn split_list(v: &str) -> Vec<String> {
    v.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}
