//! Keygate - Main Application Entry Point
//!
//! A REST API server for user accounts, session tokens and API keys. Every
//! authenticated request is written to an access log.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (async queries)
//! - **Authentication**: HS256 session tokens, SHA-256 hashed API keys
//! - **Passwords**: bcrypt
//! - **Format**: JSON requests/responses
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool and run migrations
//! 3. Start the audit workers
//! 4. Build HTTP router with routes and middleware
//! 5. Serve until SIGINT/SIGTERM, then drain the audit queue

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use keygate::{
    clock::{Clock, SystemClock},
    config::Config,
    db, routes,
    services::{audit_service, password::PasswordHasher, token_service::TokenService},
    state::AppState,
    store::PgStore,
};

const AUDIT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging with tracing subscriber. Reads RUST_LOG environment variable (defaults to "info" level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env()?;
    tracing::info!(?config, "Configuration loaded");
    let token_ttl = config
        .token_ttl()
        .with_context(|| format!("TOKEN_TTL_HOURS out of range: {}", config.token_ttl_hours))?;

    let pool = db::create_pool(&config.database_url, config.database_max_connections).await?;
    tracing::info!("Database pool created");

    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let store = Arc::new(PgStore::new(pool));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let (audit, audit_workers) = audit_service::spawn(
        store.clone(),
        clock.clone(),
        config.audit_queue_capacity,
        config.audit_workers,
    );

    let tokens = TokenService::new(&config.jwt_secret, token_ttl, clock.clone());

    let state = AppState::new(
        store,
        clock,
        PasswordHasher::new(config.bcrypt_cost),
        tokens,
        audit,
    );

    let app = routes::router(state, Duration::from_secs(config.request_timeout_secs));

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped, draining audit queue");
    audit_workers.shutdown(AUDIT_DRAIN_TIMEOUT).await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
