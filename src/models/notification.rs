use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    #[default]
    NewDelivery,
    Cancellation,
    Change,
    Info,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationPayload {
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub kind: NotificationKind,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DriverNotification {
    pub id: Uuid,
    pub driver_id: String,
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub data: serde_json::Value,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverRef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRef {
    pub id: String,
    pub customer: String,
    pub address: String,
    #[serde(default)]
    pub order_number: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationOverrides {
    pub title: Option<String>,
    pub message: Option<String>,
    pub kind: Option<NotificationKind>,
    pub data: Option<serde_json::Value>,
}
