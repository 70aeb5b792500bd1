//! DeskWire API server entry point

use std::sync::Arc;
use std::time::Duration;

use deskwire_api::chat::{NoAutoAssign, PgConversationStore};
use deskwire_api::routes::create_router;
use deskwire_api::{AppState, Config};
use deskwire_shared::db::{create_pool, run_migrations};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present; deployments set the environment directly
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(&config.log_level);

    let pool = create_pool(&config.database_url, config.database_max_connections).await?;
    run_migrations(&pool).await?;
    tracing::info!("Database migrations applied");

    let store = Arc::new(PgConversationStore::new(pool));
    let state = AppState::new(config, store, Arc::new(NoAutoAssign));

    spawn_idle_sweeper(&state);

    let bind_address = state.config.bind_address.clone();
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!(address = %bind_address, "DeskWire API listening");
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "deskwire_api={log_level},deskwire_shared={log_level},warn"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Evict connections that stopped sending frames
fn spawn_idle_sweeper(state: &AppState) {
    let registry = state.registry.clone();
    let idle_timeout = Duration::from_secs(state.config.ws_idle_timeout_secs);
    let sweep_interval = Duration::from_secs(state.config.ws_sweep_interval_secs);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        loop {
            ticker.tick().await;
            registry.sweep_idle(idle_timeout).await;
        }
    });
}
