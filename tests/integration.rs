use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use delivery_tracker::api::rest::router;
use delivery_tracker::config::Config;
use delivery_tracker::engine::handoff::run_confirmation_handoff;
use delivery_tracker::engine::signature::SignaturePad;
use delivery_tracker::models::confirmation::{DeliveryConfirmation, OrderSummary};
use delivery_tracker::state::AppState;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;

fn setup() -> (
    Arc<AppState>,
    axum::Router,
    mpsc::Receiver<DeliveryConfirmation>,
) {
    let (state, rx) = AppState::new(&Config::default());
    let state = Arc::new(state);
    (state.clone(), router(state), rx)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    empty_request("GET", uri)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn start_tracking(app: &axum::Router, destination: Option<Value>) -> Value {
    let mut body = json!({
        "driver_id": "driver-001",
        "delivery_id": "delivery-42",
    });
    if let Some(destination) = destination {
        body["destination"] = destination;
    }

    let response = app
        .clone()
        .oneshot(json_request("POST", "/tracking/start", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await
}

async fn report_position(app: &axum::Router, lat: f64, lng: f64) -> Value {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/device/position",
            json!({ "lat": lat, "lng": lng }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await
}

#[tokio::test]
async fn health_returns_ok() {
    let (_state, app, _rx) = setup();
    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["tracking"], false);
    assert_eq!(body["fixes"], 0);
    assert_eq!(body["drivers_notified"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let (_state, app, _rx) = setup();
    let response = app.oneshot(get_request("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.starts_with("text/plain"));

    let body = body_string(response).await;
    assert!(body.contains("tracking_active"));
}

#[tokio::test]
async fn start_reports_a_tracking_status() {
    let (state, app, _rx) = setup();

    let body = start_tracking(&app, None).await;
    assert_eq!(body["is_tracking"], true);
    assert!(body["last_location"].is_null());
    assert!(state.tracker.is_tracking());

    // a second start is ignored
    let again = start_tracking(&app, None).await;
    assert_eq!(again["is_tracking"], true);
    assert_eq!(state.device.active_watches(), 1);

    state.tracker.stop();
}

#[tokio::test]
async fn start_rejects_empty_ids() {
    let (_state, app, _rx) = setup();
    let response = app
        .oneshot(json_request(
            "POST",
            "/tracking/start",
            json!({ "driver_id": " ", "delivery_id": "delivery-42" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn start_rejects_zero_interval() {
    let (state, app, _rx) = setup();
    let response = app
        .oneshot(json_request(
            "POST",
            "/tracking/start",
            json!({
                "driver_id": "driver-001",
                "delivery_id": "delivery-42",
                "options": { "poll_interval_seconds": 0 }
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("poll interval"));
    assert!(!state.tracker.is_tracking());
}

#[tokio::test]
async fn device_fixes_update_status_and_history() {
    let (state, app, _rx) = setup();
    start_tracking(&app, Some(json!({ "lat": -23.5605, "lng": -46.6433 }))).await;

    let receipt = report_position(&app, -23.5505, -46.6333).await;
    assert_eq!(receipt["delivered_to"], 1);

    let response = app
        .clone()
        .oneshot(get_request("/tracking/status"))
        .await
        .unwrap();
    let status = body_json(response).await;
    assert_eq!(status["last_location"]["lat"], -23.5505);
    assert_eq!(status["last_location"]["driver_id"], "driver-001");
    assert_eq!(status["last_location"]["delivery_id"], "delivery-42");
    let distance = status["distance_to_destination"].as_f64().unwrap();
    assert!(distance > 1.0 && distance < 2.0);
    assert_eq!(status["estimated_time_text"], "3 min");

    let response = app
        .clone()
        .oneshot(get_request("/tracking/history"))
        .await
        .unwrap();
    let history = body_json(response).await;
    assert_eq!(history.as_array().unwrap().len(), 1);

    state.tracker.stop();
}

#[tokio::test]
async fn device_position_without_session_reaches_nobody() {
    let (state, app, _rx) = setup();

    let receipt = report_position(&app, -23.5505, -46.6333).await;

    assert_eq!(receipt["delivered_to"], 0);
    assert!(state.tracker.history().is_empty());
}

#[tokio::test]
async fn device_position_out_of_range_is_rejected() {
    let (_state, app, _rx) = setup();
    let response = app
        .oneshot(json_request(
            "POST",
            "/device/position",
            json!({ "lat": 91.0, "lng": 0.0 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn device_error_keeps_last_location() {
    let (state, app, _rx) = setup();
    start_tracking(&app, None).await;
    report_position(&app, -23.5505, -46.6333).await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/device/error",
            json!({ "kind": "permission_denied" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let status = state.tracker.status();
    assert!(status.is_tracking);
    assert_eq!(
        status.error,
        Some(delivery_tracker::error::TrackingError::PermissionDenied)
    );
    assert_eq!(status.last_location.unwrap().lat, -23.5505);

    let response = app
        .oneshot(get_request("/tracking/status"))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["error"]["kind"], "PermissionDenied");

    state.tracker.stop();
}

#[tokio::test]
async fn battery_level_must_be_a_fraction() {
    let (_state, app, _rx) = setup();
    let response = app
        .oneshot(json_request(
            "POST",
            "/device/battery",
            json!({ "level": 1.5 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn low_battery_slows_publishing() {
    let (state, app, _rx) = setup();
    state
        .tracker
        .attach_battery(state.battery.clone())
        .await
        .unwrap();
    start_tracking(&app, None).await;
    assert_eq!(state.tracker.publish_interval(), Some(Duration::from_secs(30)));

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/device/battery",
            json!({ "level": 0.125 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    for _ in 0..50 {
        if state.tracker.status().battery_level.is_some() {
            break;
        }
        tokio::task::yield_now().await;
    }

    assert_eq!(state.tracker.status().battery_level, Some(12.5));
    assert_eq!(state.tracker.publish_interval(), Some(Duration::from_secs(60)));

    state.tracker.stop();
}

#[tokio::test]
async fn destination_change_recomputes_distance() {
    let (state, app, _rx) = setup();
    start_tracking(&app, None).await;
    report_position(&app, -23.5505, -46.6333).await;
    assert!(state.tracker.status().distance_to_destination.is_none());

    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            "/tracking/destination",
            json!({ "lat": -23.5505, "lng": -46.6333 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["distance_to_destination"], 0.0);
    assert_eq!(body["estimated_time_text"], "< 1 min");

    state.tracker.stop();
}

#[tokio::test]
async fn simulate_produces_a_fix_near_the_destination() {
    let (state, app, _rx) = setup();
    start_tracking(&app, Some(json!({ "lat": -22.9068, "lng": -43.1729 }))).await;

    let response = app
        .clone()
        .oneshot(empty_request("POST", "/tracking/simulate"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let fix = body_json(response).await;
    assert!((fix["lat"].as_f64().unwrap() + 22.9068).abs() <= 0.0051);
    assert!((fix["lng"].as_f64().unwrap() + 43.1729).abs() <= 0.0051);
    assert_eq!(state.tracker.history().len(), 1);

    state.tracker.stop();
}

#[tokio::test]
async fn simulate_rejects_out_of_range_fix() {
    let (state, app, _rx) = setup();
    let response = app
        .oneshot(json_request(
            "POST",
            "/tracking/simulate",
            json!({
                "fix": {
                    "lat": -23.5505,
                    "lng": 200.0,
                    "timestamp": "2024-05-01T12:00:00Z"
                }
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(state.tracker.history().is_empty());
}

#[tokio::test]
async fn stop_keeps_history_until_cleared() {
    let (state, app, _rx) = setup();
    start_tracking(&app, None).await;
    report_position(&app, -23.5505, -46.6333).await;

    let response = app
        .clone()
        .oneshot(empty_request("POST", "/tracking/stop"))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["is_tracking"], false);
    assert_eq!(state.device.active_watches(), 0);
    assert_eq!(state.tracker.history().len(), 1);

    let response = app
        .clone()
        .oneshot(empty_request("DELETE", "/tracking/history"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(state.tracker.history().is_empty());
}

#[tokio::test]
async fn notifications_are_kept_per_driver() {
    let (_state, app, _rx) = setup();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/notifications/driver-001",
            json!({ "title": "Route changed", "message": "Use the north entrance", "kind": "change" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["dispatched"], true);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/assignments/notify",
            json!({
                "driver": { "id": "driver-001", "name": "João Oliveira" },
                "delivery": {
                    "id": "delivery-42",
                    "customer": "Mundo Animal",
                    "address": "Av. Paulista, 1000 - São Paulo, SP"
                }
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(get_request("/notifications/driver-001"))
        .await
        .unwrap();
    let history = body_json(response).await;
    let history = history.as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["kind"], "change");
    assert_eq!(history[1]["title"], "New delivery assigned");
    assert_eq!(history[1]["data"]["delivery"]["customer"], "Mundo Animal");

    let response = app
        .clone()
        .oneshot(empty_request("DELETE", "/notifications/driver-001"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(get_request("/notifications/driver-001"))
        .await
        .unwrap();
    assert_eq!(body_json(response).await, json!([]));
}

#[tokio::test]
async fn confirmed_delivery_stops_tracking() {
    let (state, app, rx) = setup();
    tokio::spawn(run_confirmation_handoff(state.clone(), rx));
    start_tracking(&app, None).await;

    let flow = state.confirmation_flow(OrderSummary {
        delivery_id: "delivery-42".to_string(),
        is_paid: false,
        total_value: dec!(3450.75),
    });
    let mut pad = SignaturePad::new(300, 200);
    pad.begin_stroke(10.0, 10.0);
    pad.extend_stroke(120.0, 60.0);
    pad.end_stroke();
    flow.submit_signature(&pad).unwrap();
    flow.skip().unwrap();
    flow.set_receiver_name("Maria Souza").unwrap();
    flow.set_receiver_document("123.456.789-00").unwrap();
    flow.set_payment_amount(dec!(3450.75)).unwrap();

    let confirmation = flow.confirm().await.unwrap();
    assert_eq!(confirmation.delivery_id, "delivery-42");

    for _ in 0..50 {
        if !state.confirmations.is_empty() {
            break;
        }
        tokio::task::yield_now().await;
    }

    assert!(!state.tracker.is_tracking());

    let response = app.oneshot(get_request("/confirmations")).await.unwrap();
    let body = body_json(response).await;
    let confirmations = body.as_array().unwrap();
    assert_eq!(confirmations.len(), 1);
    assert_eq!(confirmations[0]["receiver_name"], "Maria Souza");
    assert_eq!(confirmations[0]["payment_method"], "cash");
}
