use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::TrackingError;
use crate::models::location::LocationPayload;
use crate::platform::{
    Camera, FacingMode, Geolocation, LocationPublisher, NotificationPermission, PositionCallback,
    PositionEvent, PushNotifier, VideoStream, WatchId, WatchOptions,
};

#[derive(Default)]
pub struct MockGeolocation {
    next_id: AtomicU64,
    active: Mutex<HashMap<WatchId, PositionCallback>>,
    ever_registered: Mutex<Vec<PositionCallback>>,
    watch_calls: AtomicUsize,
    last_options: Mutex<Option<WatchOptions>>,
}

impl MockGeolocation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_watches(&self) -> usize {
        self.active.lock().len()
    }

    pub fn watch_calls(&self) -> usize {
        self.watch_calls.load(Ordering::SeqCst)
    }

    pub fn last_options(&self) -> Option<WatchOptions> {
        *self.last_options.lock()
    }

    pub fn emit(&self, event: PositionEvent) {
        let callbacks: Vec<PositionCallback> = self.active.lock().values().cloned().collect();
        for callback in callbacks {
            callback(event.clone());
        }
    }

    /// Delivers to every callback, including ones whose watch was cleared.
    pub fn emit_late(&self, event: PositionEvent) {
        let callbacks: Vec<PositionCallback> = self.ever_registered.lock().clone();
        for callback in callbacks {
            callback(event.clone());
        }
    }
}

impl Geolocation for MockGeolocation {
    fn is_supported(&self) -> bool {
        true
    }

    fn watch_position(
        &self,
        options: WatchOptions,
        callback: PositionCallback,
    ) -> Result<WatchId, TrackingError> {
        self.watch_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_options.lock() = Some(options);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.active.lock().insert(id, callback.clone());
        self.ever_registered.lock().push(callback);
        Ok(id)
    }

    fn clear_watch(&self, id: WatchId) {
        self.active.lock().remove(&id);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraBehavior {
    Grant,
    Deny,
    Unavailable,
}

#[derive(Clone)]
pub struct MockCamera {
    behavior: CameraBehavior,
    active_tracks: Arc<AtomicUsize>,
    gate: Option<Arc<Notify>>,
    frame: Vec<u8>,
}

impl MockCamera {
    pub fn new(behavior: CameraBehavior) -> Self {
        Self {
            behavior,
            active_tracks: Arc::new(AtomicUsize::new(0)),
            gate: None,
            frame: vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10],
        }
    }

    pub fn gated(behavior: CameraBehavior) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let mut camera = Self::new(behavior);
        camera.gate = Some(gate.clone());
        (camera, gate)
    }

    pub fn active_tracks(&self) -> usize {
        self.active_tracks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Camera for MockCamera {
    async fn open(&self, _facing: FacingMode) -> Result<Box<dyn VideoStream>, TrackingError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        match self.behavior {
            CameraBehavior::Grant => {
                // one video track per stream
                self.active_tracks.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(MockStream {
                    tracks: self.active_tracks.clone(),
                    stopped: false,
                    frame: self.frame.clone(),
                }))
            }
            CameraBehavior::Deny => Err(TrackingError::CameraPermissionDenied),
            CameraBehavior::Unavailable => Err(TrackingError::CameraUnavailable),
        }
    }
}

struct MockStream {
    tracks: Arc<AtomicUsize>,
    stopped: bool,
    frame: Vec<u8>,
}

impl VideoStream for MockStream {
    fn snapshot(&mut self) -> Result<Vec<u8>, TrackingError> {
        if self.stopped {
            return Err(TrackingError::CameraUnavailable);
        }
        Ok(self.frame.clone())
    }

    fn stop_tracks(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.tracks.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

pub struct MockNotifier {
    supported: bool,
    permission: Mutex<NotificationPermission>,
    answer: NotificationPermission,
    requests: AtomicUsize,
    shown: Mutex<Vec<(String, String)>>,
}

impl MockNotifier {
    pub fn new(initial: NotificationPermission, answer: NotificationPermission) -> Self {
        Self {
            supported: true,
            permission: Mutex::new(initial),
            answer,
            requests: AtomicUsize::new(0),
            shown: Mutex::new(Vec::new()),
        }
    }

    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::new(NotificationPermission::Default, NotificationPermission::Denied)
        }
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn shown(&self) -> Vec<(String, String)> {
        self.shown.lock().clone()
    }
}

#[async_trait]
impl PushNotifier for MockNotifier {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn permission(&self) -> NotificationPermission {
        *self.permission.lock()
    }

    async fn request_permission(&self) -> NotificationPermission {
        self.requests.fetch_add(1, Ordering::SeqCst);
        *self.permission.lock() = self.answer;
        self.answer
    }

    fn show(&self, title: &str, body: &str) {
        self.shown.lock().push((title.to_string(), body.to_string()));
    }
}

#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<LocationPayload>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<LocationPayload> {
        self.published.lock().clone()
    }
}

impl LocationPublisher for RecordingPublisher {
    fn publish(&self, payload: &LocationPayload) {
        self.published.lock().push(payload.clone());
    }
}
