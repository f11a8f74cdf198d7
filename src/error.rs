use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail")]
pub enum TrackingError {
    #[error("geolocation is not supported on this device")]
    GeolocationUnsupported,

    #[error("location permission denied")]
    PermissionDenied,

    #[error("position unavailable")]
    PositionUnavailable,

    #[error("timed out waiting for a position")]
    Timeout,

    #[error("camera permission denied")]
    CameraPermissionDenied,

    #[error("camera unavailable")]
    CameraUnavailable,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl TrackingError {
    pub fn kind(&self) -> &'static str {
        match self {
            TrackingError::GeolocationUnsupported => "geolocation_unsupported",
            TrackingError::PermissionDenied => "permission_denied",
            TrackingError::PositionUnavailable => "position_unavailable",
            TrackingError::Timeout => "timeout",
            TrackingError::CameraPermissionDenied => "camera_permission_denied",
            TrackingError::CameraUnavailable => "camera_unavailable",
            TrackingError::InvalidArgument(_) => "invalid_argument",
            TrackingError::Internal(_) => "internal",
        }
    }
}

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("action not allowed at step {0}")]
    WrongStep(u8),

    #[error("signature is empty")]
    EmptySignature,

    #[error("receiver name and document are required")]
    MissingReceiverInfo,

    #[error("payment amount must be non-negative")]
    NegativeAmount,

    #[error("a confirmation is already being processed")]
    Processing,

    #[error("flow was cancelled while waiting")]
    Cancelled,

    #[error("no active camera")]
    NoActiveCamera,

    #[error("failed to read image: {0}")]
    ImageRead(String),

    #[error("confirmation consumer is gone")]
    HandoffClosed,

    #[error(transparent)]
    Device(#[from] TrackingError),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<TrackingError> for AppError {
    fn from(err: TrackingError) -> Self {
        match err {
            TrackingError::InvalidArgument(msg) => AppError::BadRequest(msg),
            TrackingError::Internal(msg) => AppError::Internal(msg),
            other => AppError::Conflict(other.to_string()),
        }
    }
}

impl From<FlowError> for AppError {
    fn from(err: FlowError) -> Self {
        match err {
            FlowError::HandoffClosed => AppError::Internal(err.to_string()),
            FlowError::Device(inner) => inner.into(),
            other => AppError::BadRequest(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
