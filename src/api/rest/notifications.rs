use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::notification::{
    DeliveryRef, DriverNotification, DriverRef, NotificationOverrides, NotificationPayload,
};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/notifications/:driver_id",
            post(notify).get(history).delete(clear_history),
        )
        .route("/assignments/notify", post(notify_assignment))
}

#[derive(Serialize)]
pub struct DispatchResponse {
    pub dispatched: bool,
}

#[derive(Deserialize)]
pub struct AssignmentRequest {
    pub driver: DriverRef,
    pub delivery: DeliveryRef,
    #[serde(default)]
    pub overrides: Option<NotificationOverrides>,
}

async fn notify(
    State(state): State<Arc<AppState>>,
    Path(driver_id): Path<String>,
    Json(payload): Json<NotificationPayload>,
) -> Result<Json<DispatchResponse>, AppError> {
    if payload.title.trim().is_empty() {
        return Err(AppError::BadRequest("title cannot be empty".to_string()));
    }

    let dispatched = state.notifications.notify(&driver_id, payload);
    Ok(Json(DispatchResponse { dispatched }))
}

async fn notify_assignment(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AssignmentRequest>,
) -> Json<DispatchResponse> {
    let dispatched = state.notifications.notify_driver(
        &request.driver,
        &request.delivery,
        request.overrides.unwrap_or_default(),
    );
    Json(DispatchResponse { dispatched })
}

async fn history(
    State(state): State<Arc<AppState>>,
    Path(driver_id): Path<String>,
) -> Json<Vec<DriverNotification>> {
    Json(state.notifications.history(&driver_id))
}

async fn clear_history(
    State(state): State<Arc<AppState>>,
    Path(driver_id): Path<String>,
) -> StatusCode {
    state.notifications.clear_history(&driver_id);
    StatusCode::NO_CONTENT
}
