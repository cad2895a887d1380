//! AutoPay server - Main Application Entry Point
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool
//! 3. Run database migrations
//! 4. Start the due-payment scheduler
//! 5. Build the HTTP router and start serving on the configured port

use std::sync::Arc;

use autopay_server::{
    AppState, config::Config, db, router::create_router,
    services::{notification_service::Notifier, processing_service},
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Reads RUST_LOG (defaults to "info")
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env()?;
    tracing::info!("Configuration loaded");

    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database pool created");

    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let notifier = Notifier::from_config(&config)?;
    if !notifier.is_relay_configured() {
        tracing::warn!("NOTIFY_WEBHOOK_URL not set; emails will only be logged");
    }

    let state = Arc::new(AppState {
        config,
        pool,
        notifier,
    });

    if state.config.scheduler_enabled {
        processing_service::spawn_scheduler(state.clone());
    } else {
        tracing::info!("Payment scheduler disabled");
    }

    let addr = format!("0.0.0.0:{}", state.config.server_port);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
