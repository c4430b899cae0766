use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use chapyap::{
    AppState,
    config::Config,
    engine::Engine,
    rooms,
    stats::{MemoryStats, PersistenceGateway, SqliteStats},
};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    let stats: Arc<dyn PersistenceGateway> = match &config.database_url {
        Some(url) => Arc::new(
            SqliteStats::connect(url)
                .await
                .with_context(|| format!("opening stats database {url}"))?,
        ),
        None => {
            warn!("DATABASE_URL not set, counters will not survive a restart");
            Arc::new(MemoryStats::new())
        }
    };

    let app_state = AppState {
        engine: Engine::new(config.engine.clone(), stats),
    };

    let app = Router::new()
        .merge(rooms::router())
        .with_state(app_state)
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
