//! Portwarden API composition root.

#![forbid(unsafe_code)]

mod api_config;
mod api_router;
mod api_services;
mod dto;
mod error;
mod handlers;
mod middleware;
mod state;

use std::net::SocketAddr;
use std::time::Duration;

use portwarden_application::ExpiryExecutorService;
use portwarden_core::AppError;
use tracing::{info, warn};

use crate::api_config::{ApiConfig, init_tracing};
use crate::api_router::build_router;
use crate::api_services::{build_api_services, connect_and_migrate};

const LOCAL_EXECUTOR_ID: &str = "api-local";
const LOCAL_EXECUTOR_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ApiConfig::load()?;

    let pool = match config.database_url.as_deref() {
        Some(database_url) => Some(connect_and_migrate(database_url).await?),
        None => None,
    };

    if config.migrate_only {
        info!("database migrations applied successfully");
        return Ok(());
    }

    let services = build_api_services(pool, &config)?;
    if let Some(executor) = services.local_executor {
        tokio::spawn(run_local_executor(executor));
    }

    let app = build_router(services.state);
    let address = config.socket_address()?;
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .map_err(|error| AppError::Internal(format!("failed to bind {address}: {error}")))?;

    info!(
        %address,
        group_id = %config.firewall_group_id,
        port = config.grant_port,
        ttl_seconds = config.grant_ttl_seconds,
        "portwarden api listening"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|error| AppError::Internal(format!("api server failed: {error}")))
}

async fn run_local_executor(executor: ExpiryExecutorService) {
    info!("in-process revocation executor started");

    loop {
        match executor.run_once(LOCAL_EXECUTOR_ID, 10, 60).await {
            Ok(summary) if summary.claimed > 0 => {
                info!(
                    claimed = summary.claimed,
                    completed = summary.completed,
                    failed = summary.failed,
                    "in-process revocation pass finished"
                );
            }
            Ok(_) => {}
            Err(error) => warn!(error = %error, "in-process revocation pass failed"),
        }

        tokio::time::sleep(LOCAL_EXECUTOR_POLL_INTERVAL).await;
    }
}
