use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hauth_api::app::{self, AppState, Ports};
use hauth_api::audit::AuditSink;
use hauth_api::config::AppConfig;
use hauth_api::database::{
    DatabaseManager, PgAccountStore, PgAuditSink, PgGrantStore, PgOrgRepository, PgRoleRepository,
};

#[derive(Debug, Parser)]
#[command(name = "hauth-api", version, about = "Domain-scoped authorization server")]
struct Args {
    /// Port to listen on (overrides HAUTH_PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Address to bind (overrides HAUTH_BIND_ADDRESS)
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so DATABASE_URL and friends are picked up
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let mut config: AppConfig = hauth_api::config::config().clone();
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(bind) = args.bind {
        config.server.bind_address = bind;
    }
    info!("Starting hauth-api in {:?} mode", config.environment);

    let db = Arc::new(
        DatabaseManager::connect(&config.database)
            .await
            .context("failed to connect to database")?,
    );
    let pool = db.pool();

    let handle_logs = Arc::new(PgAuditSink::new(pool.clone()));
    let audit_sink: Option<Arc<dyn AuditSink>> = if config.audit.enabled {
        Some(handle_logs.clone())
    } else {
        None
    };

    let ports = Ports {
        grants: Arc::new(PgGrantStore::new(pool.clone())),
        orgs: Arc::new(PgOrgRepository::new(pool.clone())),
        roles: Arc::new(PgRoleRepository::new(pool.clone())),
        accounts: Arc::new(PgAccountStore::new(pool)),
        health: db.clone(),
        audit_sink,
        audit_log: handle_logs,
    };

    let bind_addr = format!("{}:{}", config.server.bind_address, config.server.port);
    let state = AppState::compose(config, ports).context("invalid token configuration")?;
    let registry = app::default_registry().context("application registration failed")?;
    let router = app::router(state, &registry);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    info!("hauth-api listening on http://{}", bind_addr);

    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .context("server error")?;

    db.close().await;
    Ok(())
}
