//! # Repair Desk
//!
//! Repair job lifecycle and pricing engine, served over a small job-records
//! HTTP API. The engine lives in `handlers`; `routes` exposes it, `client`
//! consumes it, and `db`/`inventory` are the storage and stock seams.
//!
//! Exposes the Axum router so integration tests can create an in-process
//! server without requiring `cargo run` in another terminal.

pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod inventory;
pub mod models;
pub mod routes;

use axum::{Extension, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::db::AppDb;
use crate::inventory::AppInventory;

/// Build the Axum router with all route modules and middleware.
///
/// The caller provides the job store and inventory collaborator. This
/// function does NOT start a server.
pub fn create_app(store: AppDb, inventory: AppInventory) -> Router {
    Router::new()
        .merge(routes::repairs::router())
        .layer(Extension(store))
        .layer(Extension(inventory))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
