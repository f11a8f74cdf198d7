use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::api::rest::tracking::valid_coordinates;
use crate::error::{AppError, TrackingError};
use crate::platform::Coordinates;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/device/position", post(report_position))
        .route("/device/error", post(report_error))
        .route("/device/battery", post(report_battery))
}

#[derive(Deserialize)]
pub struct PositionReport {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Deserialize, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum DeviceErrorKind {
    PermissionDenied,
    PositionUnavailable,
    Timeout,
}

#[derive(Deserialize)]
pub struct ErrorReport {
    pub kind: DeviceErrorKind,
}

#[derive(Deserialize)]
pub struct BatteryReport {
    pub level: f64,
}

#[derive(Serialize)]
pub struct DeliveryReceipt {
    pub delivered_to: usize,
}

async fn report_position(
    State(state): State<Arc<AppState>>,
    Json(report): Json<PositionReport>,
) -> Result<Json<DeliveryReceipt>, AppError> {
    if !valid_coordinates(report.lat, report.lng) {
        return Err(AppError::BadRequest("coordinates out of range".to_string()));
    }

    let delivered_to = state.device.emit(Ok(Coordinates {
        latitude: report.lat,
        longitude: report.lng,
    }));
    Ok(Json(DeliveryReceipt { delivered_to }))
}

async fn report_error(
    State(state): State<Arc<AppState>>,
    Json(report): Json<ErrorReport>,
) -> Json<DeliveryReceipt> {
    let error = match report.kind {
        DeviceErrorKind::PermissionDenied => TrackingError::PermissionDenied,
        DeviceErrorKind::PositionUnavailable => TrackingError::PositionUnavailable,
        DeviceErrorKind::Timeout => TrackingError::Timeout,
    };
    let delivered_to = state.device.emit(Err(error));
    Json(DeliveryReceipt { delivered_to })
}

async fn report_battery(
    State(state): State<Arc<AppState>>,
    Json(report): Json<BatteryReport>,
) -> Result<Json<DeliveryReceipt>, AppError> {
    state.battery.set_level(report.level)?;
    Ok(Json(DeliveryReceipt { delivered_to: 1 }))
}
