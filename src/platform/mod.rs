pub mod mock;

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::{FlowError, TrackingError};
use crate::models::location::LocationPayload;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatchOptions {
    pub high_accuracy: bool,
    pub maximum_age: Duration,
    pub timeout: Duration,
}

pub type WatchId = u64;

pub type PositionEvent = Result<Coordinates, TrackingError>;

pub type PositionCallback = Arc<dyn Fn(PositionEvent) + Send + Sync>;

pub trait Geolocation: Send + Sync {
    fn is_supported(&self) -> bool;

    fn watch_position(
        &self,
        options: WatchOptions,
        callback: PositionCallback,
    ) -> Result<WatchId, TrackingError>;

    fn clear_watch(&self, id: WatchId);
}

#[async_trait]
pub trait Battery: Send + Sync {
    async fn status(&self) -> Option<watch::Receiver<Option<f64>>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacingMode {
    Environment,
    User,
}

pub trait VideoStream: Send {
    fn snapshot(&mut self) -> Result<Vec<u8>, TrackingError>;

    fn stop_tracks(&mut self);
}

#[async_trait]
pub trait Camera: Send + Sync {
    async fn open(&self, facing: FacingMode) -> Result<Box<dyn VideoStream>, TrackingError>;
}

#[async_trait]
pub trait ImageReader: Send + Sync {
    async fn read_image(&self, path: &Path) -> Result<Vec<u8>, FlowError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationPermission {
    Granted,
    Denied,
    Default,
}

#[async_trait]
pub trait PushNotifier: Send + Sync {
    fn is_supported(&self) -> bool;

    fn permission(&self) -> NotificationPermission;

    async fn request_permission(&self) -> NotificationPermission;

    fn show(&self, title: &str, body: &str);
}

pub trait LocationPublisher: Send + Sync {
    fn publish(&self, payload: &LocationPayload);
}

pub struct DeviceGeolocation {
    supported: bool,
    next_id: AtomicU64,
    watches: Mutex<HashMap<WatchId, PositionCallback>>,
}

impl DeviceGeolocation {
    pub fn new() -> Self {
        Self {
            supported: true,
            next_id: AtomicU64::new(1),
            watches: Mutex::new(HashMap::new()),
        }
    }

    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::new()
        }
    }

    pub fn active_watches(&self) -> usize {
        self.watches.lock().len()
    }

    pub fn emit(&self, event: PositionEvent) -> usize {
        let callbacks: Vec<PositionCallback> = self.watches.lock().values().cloned().collect();
        for callback in &callbacks {
            callback(event.clone());
        }
        callbacks.len()
    }
}

impl Default for DeviceGeolocation {
    fn default() -> Self {
        Self::new()
    }
}

impl Geolocation for DeviceGeolocation {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn watch_position(
        &self,
        options: WatchOptions,
        callback: PositionCallback,
    ) -> Result<WatchId, TrackingError> {
        if !self.supported {
            return Err(TrackingError::GeolocationUnsupported);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.watches.lock().insert(id, callback);
        debug!(watch_id = id, high_accuracy = options.high_accuracy, "position watch registered");
        Ok(id)
    }

    fn clear_watch(&self, id: WatchId) {
        self.watches.lock().remove(&id);
    }
}

pub struct DeviceBattery {
    level_tx: watch::Sender<Option<f64>>,
}

impl DeviceBattery {
    pub fn new() -> Self {
        let (level_tx, _level_rx) = watch::channel(None);
        Self { level_tx }
    }

    pub fn set_level(&self, level: f64) -> Result<(), TrackingError> {
        if !(0.0..=1.0).contains(&level) {
            return Err(TrackingError::InvalidArgument(format!(
                "battery level must be within 0..1, got {level}"
            )));
        }
        self.level_tx.send_replace(Some(level));
        Ok(())
    }
}

impl Default for DeviceBattery {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Battery for DeviceBattery {
    async fn status(&self) -> Option<watch::Receiver<Option<f64>>> {
        Some(self.level_tx.subscribe())
    }
}

pub struct NoBattery;

#[async_trait]
impl Battery for NoBattery {
    async fn status(&self) -> Option<watch::Receiver<Option<f64>>> {
        None
    }
}

pub struct NoCamera;

#[async_trait]
impl Camera for NoCamera {
    async fn open(&self, _facing: FacingMode) -> Result<Box<dyn VideoStream>, TrackingError> {
        Err(TrackingError::CameraUnavailable)
    }
}

pub struct FsImageReader;

#[async_trait]
impl ImageReader for FsImageReader {
    async fn read_image(&self, path: &Path) -> Result<Vec<u8>, FlowError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|err| FlowError::ImageRead(format!("{}: {err}", path.display())))?;

        if !looks_like_image(&bytes) {
            return Err(FlowError::ImageRead(format!(
                "{} is not a supported image",
                path.display()
            )));
        }

        Ok(bytes)
    }
}

pub fn looks_like_image(bytes: &[u8]) -> bool {
    bytes.starts_with(&[0xFF, 0xD8, 0xFF])
        || bytes.starts_with(&[0x89, b'P', b'N', b'G'])
        || bytes.starts_with(b"GIF8")
        || (bytes.len() >= 12 && bytes.starts_with(b"RIFF") && &bytes[8..12] == b"WEBP")
        || bytes.starts_with(b"<svg")
}

pub struct HeadlessNotifier;

#[async_trait]
impl PushNotifier for HeadlessNotifier {
    fn is_supported(&self) -> bool {
        false
    }

    fn permission(&self) -> NotificationPermission {
        NotificationPermission::Denied
    }

    async fn request_permission(&self) -> NotificationPermission {
        NotificationPermission::Denied
    }

    fn show(&self, _title: &str, _body: &str) {}
}

pub struct TracingPublisher;

impl LocationPublisher for TracingPublisher {
    fn publish(&self, payload: &LocationPayload) {
        info!(
            lat = payload.lat,
            lng = payload.lng,
            driver_id = payload.driver_id.as_deref().unwrap_or("-"),
            delivery_id = payload.delivery_id.as_deref().unwrap_or("-"),
            "publishing location"
        );
    }
}
