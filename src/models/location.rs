use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TrackingError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

pub type Destination = GeoPoint;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocationFix {
    pub lat: f64,
    pub lng: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_id: Option<String>,
}

impl LocationFix {
    pub fn point(&self) -> GeoPoint {
        GeoPoint {
            lat: self.lat,
            lng: self.lng,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TrackingStatus {
    pub is_tracking: bool,
    pub last_location: Option<LocationFix>,
    pub error: Option<TrackingError>,
    pub battery_level: Option<f64>,
    pub distance_to_destination: Option<f64>,
    pub estimated_time_text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrackingOptions {
    pub high_accuracy: bool,
    #[serde(with = "millis")]
    pub max_fix_age: Duration,
    #[serde(with = "millis")]
    pub fix_timeout: Duration,
    pub poll_interval_seconds: u64,
    pub adapt_to_low_battery: bool,
}

impl Default for TrackingOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            max_fix_age: Duration::from_millis(10_000),
            fix_timeout: Duration::from_millis(5_000),
            poll_interval_seconds: 30,
            adapt_to_low_battery: true,
        }
    }
}

impl TrackingOptions {
    pub fn validate(&self) -> Result<(), TrackingError> {
        if self.poll_interval_seconds == 0 {
            return Err(TrackingError::InvalidArgument(
                "poll interval must be > 0".to_string(),
            ));
        }
        if self.fix_timeout.is_zero() {
            return Err(TrackingError::InvalidArgument(
                "fix timeout must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocationPayload {
    pub lat: f64,
    pub lng: f64,
    pub timestamp: DateTime<Utc>,
    pub driver_id: Option<String>,
    pub delivery_id: Option<String>,
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
