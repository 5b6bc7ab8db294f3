mod auth;
mod config;
mod error;
mod rate_limit;
mod routes;

use std::sync::Arc;

use config::AppConfig;
use larder_core::db::{Database, DatabaseConfig};
use routes::{app_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Only load .env in development; production uses platform-native env injection.
    #[cfg(debug_assertions)]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("larder_api=info".parse()?)
                .add_directive("larder_core=info".parse()?),
        )
        .init();

    let config = Arc::new(AppConfig::from_env()?);
    tracing::info!("Starting larder-api with config: {:?}", config);

    let db = Database::open_with_config(
        &config.database_path,
        DatabaseConfig::default().with_busy_timeout(config.db_busy_timeout),
    )?;
    if db.is_in_memory() {
        tracing::warn!("Using an in-memory database; data is lost on shutdown");
    }

    let state = AppState::new(Arc::clone(&config), db);
    let router = app_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("larder-api listening on {}", config.bind_addr);
    axum::serve(listener, router).await?;
    Ok(())
}
