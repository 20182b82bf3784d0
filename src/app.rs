use std::sync::Arc;
use std::time::Duration;

use axum::{middleware::from_fn_with_state, routing::get, routing::post, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::audit::{AuditLog, AuditLogService, AuditService, AuditSink};
use crate::auth::{AccountStore, TokenError, TokenService};
use crate::bootstrap::{AppRegistry, BootstrapError};
use crate::config::AppConfig;
use crate::database::HealthCheck;
use crate::error::{keys, ApiError};
use crate::handlers;
use crate::middleware::{audit_requests, check_connection};
use crate::org::{OrgRepository, OrgService};
use crate::permission::{GrantStore, PermissionResolver};
use crate::role::{RoleRepository, RoleService};
use crate::upload::OrgUploader;

/// Persistence ports the application is assembled from
pub struct Ports {
    pub grants: Arc<dyn GrantStore>,
    pub orgs: Arc<dyn OrgRepository>,
    pub roles: Arc<dyn RoleRepository>,
    pub accounts: Arc<dyn AccountStore>,
    pub health: Arc<dyn HealthCheck>,
    pub audit_sink: Option<Arc<dyn AuditSink>>,
    pub audit_log: Arc<dyn AuditLog>,
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub tokens: Arc<TokenService>,
    pub resolver: Arc<PermissionResolver>,
    pub orgs: Arc<OrgService>,
    pub roles: Arc<RoleService>,
    pub uploader: Arc<OrgUploader>,
    pub accounts: Arc<dyn AccountStore>,
    pub health: Arc<dyn HealthCheck>,
    pub audit: Option<Arc<AuditService>>,
    pub audit_log: Arc<AuditLogService>,
}

impl AppState {
    /// Wire services over `ports`. Spawns the audit worker when auditing is on.
    pub fn compose(config: AppConfig, ports: Ports) -> Result<Self, TokenError> {
        let query_timeout = Duration::from_millis(config.database.query_timeout_ms);
        let tokens = Arc::new(TokenService::from_config(&config.security)?);
        let resolver = Arc::new(PermissionResolver::new(
            tokens.clone(),
            ports.grants,
            config.security.root_domain.clone(),
            query_timeout,
        ));

        let audit = match ports.audit_sink {
            Some(sink) if config.audit.enabled => Some(Arc::new(AuditService::new(
                sink,
                config.audit.queue_capacity,
                config.audit.overflow_policy,
            ))),
            _ => None,
        };

        Ok(Self {
            tokens,
            orgs: Arc::new(OrgService::new(ports.orgs.clone(), query_timeout)),
            roles: Arc::new(RoleService::new(ports.roles, query_timeout)),
            uploader: Arc::new(OrgUploader::new(resolver.clone(), ports.orgs, query_timeout)),
            resolver,
            accounts: ports.accounts,
            health: ports.health,
            audit,
            audit_log: Arc::new(AuditLogService::new(ports.audit_log, query_timeout)),
            config: Arc::new(config),
        })
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.config.database.query_timeout_ms)
    }
}

/// Applications mounted under `/v1/auth`
pub fn default_registry() -> Result<AppRegistry, BootstrapError> {
    AppRegistry::new()
        .register("org", handlers::org::routes)?
        .register("role", handlers::role::routes)?
        .register("handle_logs", handlers::audit::routes)
}

pub fn router(state: AppState, registry: &AppRegistry) -> Router {
    // Registered applications all live under /v1/auth and need a session
    let mut protected = registry.mount(Router::new());
    if !registry.is_empty() {
        protected = protected.route_layer(from_fn_with_state(state.clone(), check_connection));
    }

    let mut router = Router::new()
        .route("/health", get(handlers::session::health))
        .route("/login", post(handlers::session::login))
        .route("/logout", post(handlers::session::logout))
        .merge(protected)
        .fallback(not_found)
        .layer(from_fn_with_state(state.clone(), audit_requests))
        .layer(TraceLayer::new_for_http());

    if state.config.security.enable_cors {
        router = router.layer(CorsLayer::permissive());
    }

    router.with_state(state)
}

async fn not_found() -> ApiError {
    ApiError::not_found(keys::PAGE_NOT_FOUND)
}
