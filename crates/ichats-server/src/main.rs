use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use ichats_core::store::SqlMessageStore;
use ichats_core::{AppConfig, AppState};
use tracing_subscriber::EnvFilter;

mod cli;
mod config;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Args::parse();
    let config = config::Config::load(&args.config)?;

    init_tracing(config.logging.json);
    if config.generated {
        tracing::info!("Config file not found, generated defaults at '{}'", args.config);
    }

    ensure_data_dir(&config);

    let db = ichats_db::create_pool(&config.database.url, config.database.max_connections).await?;
    ichats_db::run_migrations(&db).await?;
    tracing::info!(
        engine = ichats_db::active_database_engine().as_str(),
        "Database ready"
    );

    let store = Arc::new(SqlMessageStore::new(db, config.server.worker_id));
    let state = AppState::new(
        store,
        AppConfig {
            jwt_secret: config.auth.jwt_secret.clone(),
            strict_payloads: config.gateway.strict_payloads,
            max_connections: config.gateway.max_connections,
            ping_interval_seconds: config.gateway.ping_interval_seconds,
            heartbeat_timeout_seconds: config.gateway.heartbeat_timeout_seconds,
            wire_trace: config.gateway.wire_trace,
        },
    );

    let app = ichats_api::build_router()
        .merge(ichats_ws::gateway_router())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;
    tracing::info!(
        bind_address = %config.server.bind_address,
        public_url = config.server.public_url.as_deref().unwrap_or("-"),
        strict_payloads = config.gateway.strict_payloads,
        "iChats server listening"
    );

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutting down (ctrl-c)...");
    };

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ichats=info,tower_http=debug,wire=info"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Create the parent directory of a file-backed SQLite database.
fn ensure_data_dir(config: &config::Config) {
    if let Some(db_path) = config
        .database
        .url
        .strip_prefix("sqlite://")
        .and_then(|s| s.split('?').next())
    {
        if let Some(parent) = std::path::Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    tracing::warn!("Could not create directory '{}': {}", parent.display(), e);
                }
            }
        }
    }
}
