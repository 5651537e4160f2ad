use std::sync::Arc;

use tokio::time::Duration;
use tracing_subscriber::EnvFilter;

use ride_dispatch::api;
use ride_dispatch::config::Config;
use ride_dispatch::engine::fare::FareCalculator;
use ride_dispatch::engine::matching::run_matching_engine;
use ride_dispatch::error::AppError;
use ride_dispatch::state::AppState;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let fares = FareCalculator::new(config.base_fare, config.fare_per_distance);
    let shared_state = Arc::new(AppState::new(
        config.matching_batch_size,
        config.event_buffer_size,
        fares,
    ));

    let sessions = shared_state.sessions.warm(&shared_state.store);
    tracing::info!(sessions, "session cache loaded");

    let app = api::rest::router(shared_state.clone());

    tokio::spawn(run_matching_engine(
        shared_state.clone(),
        Duration::from_millis(config.matching_interval_ms),
    ));

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(
        http_port = config.http_port,
        batch_size = config.matching_batch_size,
        "http server started"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
