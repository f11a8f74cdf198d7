use std::sync::Arc;

use delivery_tracker::api;
use delivery_tracker::config::Config;
use delivery_tracker::engine::handoff::run_confirmation_handoff;
use delivery_tracker::error::AppError;
use delivery_tracker::state::AppState;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let (app_state, confirmation_rx) = AppState::new(&config);
    let shared_state = Arc::new(app_state);

    let app = api::rest::router(shared_state.clone());

    tokio::spawn(run_confirmation_handoff(
        shared_state.clone(),
        confirmation_rx,
    ));

    if shared_state
        .tracker
        .attach_battery(shared_state.battery.clone())
        .await
        .is_none()
    {
        tracing::info!("battery status unavailable, publishing at the configured cadence");
    }

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(
        http_port = config.http_port,
        interval_secs = config.tracking.poll_interval_seconds,
        "http server started"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    shared_state.tracker.stop();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
