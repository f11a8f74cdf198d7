use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post, put};
use axum::Json;
use axum::Router;
use serde::Deserialize;

use crate::error::AppError;
use crate::models::location::{Destination, LocationFix, TrackingOptions, TrackingStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tracking/start", post(start_tracking))
        .route("/tracking/stop", post(stop_tracking))
        .route("/tracking/status", get(get_status))
        .route("/tracking/history", get(get_history).delete(clear_history))
        .route("/tracking/destination", put(set_destination))
        .route("/tracking/simulate", post(simulate_fix))
}

#[derive(Deserialize)]
pub struct StartTrackingRequest {
    pub driver_id: String,
    pub delivery_id: String,
    pub destination: Option<Destination>,
    pub options: Option<TrackingOptions>,
}

#[derive(Deserialize, Default)]
pub struct SimulateRequest {
    pub fix: Option<LocationFix>,
}

async fn start_tracking(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<StartTrackingRequest>,
) -> Result<Json<TrackingStatus>, AppError> {
    if payload.driver_id.trim().is_empty() || payload.delivery_id.trim().is_empty() {
        return Err(AppError::BadRequest(
            "driver_id and delivery_id cannot be empty".to_string(),
        ));
    }

    state.tracker.start(
        payload.driver_id,
        payload.delivery_id,
        payload.destination,
        payload.options,
    )?;

    Ok(Json(state.tracker.status()))
}

async fn stop_tracking(State(state): State<Arc<AppState>>) -> Json<TrackingStatus> {
    state.tracker.stop();
    Json(state.tracker.status())
}

async fn get_status(State(state): State<Arc<AppState>>) -> Json<TrackingStatus> {
    Json(state.tracker.status())
}

async fn get_history(State(state): State<Arc<AppState>>) -> Json<Vec<LocationFix>> {
    Json(state.tracker.history())
}

async fn clear_history(State(state): State<Arc<AppState>>) -> Json<TrackingStatus> {
    state.tracker.clear_history();
    Json(state.tracker.status())
}

async fn set_destination(
    State(state): State<Arc<AppState>>,
    Json(destination): Json<Destination>,
) -> Result<Json<TrackingStatus>, AppError> {
    if !valid_coordinates(destination.lat, destination.lng) {
        return Err(AppError::BadRequest("destination out of range".to_string()));
    }

    state.tracker.set_destination(destination);
    Ok(Json(state.tracker.status()))
}

async fn simulate_fix(
    State(state): State<Arc<AppState>>,
    payload: Option<Json<SimulateRequest>>,
) -> Result<Json<LocationFix>, AppError> {
    let request = payload.map(|Json(request)| request).unwrap_or_default();
    if let Some(fix) = &request.fix {
        if !valid_coordinates(fix.lat, fix.lng) {
            return Err(AppError::BadRequest("fix out of range".to_string()));
        }
    }

    Ok(Json(state.tracker.simulate_fix(request.fix)))
}

pub(crate) fn valid_coordinates(lat: f64, lng: f64) -> bool {
    (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng)
}
