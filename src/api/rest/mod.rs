pub mod device;
pub mod notifications;
pub mod tracking;
pub mod ws;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use crate::models::confirmation::DeliveryConfirmation;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(tracking::router())
        .merge(device::router())
        .merge(notifications::router())
        .route("/confirmations", get(list_confirmations))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
        .fallback_service(ServeDir::new("static"))
        .layer(CorsLayer::permissive())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    tracking: bool,
    fixes: usize,
    drivers_notified: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        tracking: state.tracker.is_tracking(),
        fixes: state.tracker.history().len(),
        drivers_notified: state.notifications.drivers_notified(),
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}

async fn list_confirmations(State(state): State<Arc<AppState>>) -> Json<Vec<DeliveryConfirmation>> {
    let confirmations = state
        .confirmations
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    Json(confirmations)
}
