// Core modules
pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod orchestrator;
pub mod server;
pub mod types;

// Re-export key types and functions
pub use api::{AppState, create_router};
pub use config::{ConfigError, DatabaseArgs, GatewayConfig, ServeArgs};
pub use db::{DatabaseConfig, DbPool, create_connection, ensure_schema};
pub use orchestrator::{LoginOutcome, ProfileQuery, SessionError, SessionOrchestrator};
pub use server::{LifecycleState, Server, ShutdownOutcome, shutdown_signal};

use std::sync::Arc;

use anyhow::Result;
use axum::Router;

use auth::UserStore;

/// Connect storage, apply the schema and wire the HTTP application.
///
/// The returned pool is the one the router uses; close it once the server
/// has stopped.
pub async fn build_app(config: &GatewayConfig) -> Result<(Router, DbPool)> {
    let pool = DbPool::connect(&config.database).await?;
    ensure_schema(&*pool.acquire().await?).await?;

    let state = AppState::new(
        Arc::new(UserStore::new(pool.clone())),
        Arc::new(config.identity_verifier()?),
        Arc::new(config.token_issuer()),
    );

    Ok((create_router(state), pool))
}
