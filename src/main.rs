//! # Repair Desk Server
//!
//! Serves the job-records API backed by PostgreSQL.
//!
//! ## Architecture
//!
//! - Axum handles HTTP routing and request/response lifecycle
//! - The repair job engine validates and prices every mutation
//! - SQLx stores job documents and inventory stock

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing::info;

use repair_desk::config::AppConfig;
use repair_desk::db::PgJobStore;
use repair_desk::inventory::PgInventory;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "repair_desk=debug,tower_http=debug".into()),
        )
        .init();

    info!("Starting repair desk");
    let config = AppConfig::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;
    info!("Connected to application database");

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Application migrations complete");

    let app = repair_desk::create_app(
        Arc::new(PgJobStore::new(pool.clone())),
        Arc::new(PgInventory::new(pool)),
    );

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
