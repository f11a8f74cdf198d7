use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::cadence::{effective_interval, PublishTimer};
use crate::engine::listeners::{ListenerId, ListenerRegistry, Subscription};
use crate::error::TrackingError;
use crate::geo::{eta_minutes, format_distance, format_duration, haversine_km, DEFAULT_SPEED_KMH};
use crate::models::location::{
    Destination, GeoPoint, LocationFix, LocationPayload, TrackingOptions, TrackingStatus,
};
use crate::observability::metrics::Metrics;
use crate::platform::{
    Battery, Coordinates, Geolocation, LocationPublisher, PositionCallback, PositionEvent,
    WatchId, WatchOptions,
};

const DEFAULT_SIMULATION_BASE: GeoPoint = GeoPoint {
    lat: -23.5505,
    lng: -46.6333,
};

/// Half-width in degrees of the box simulated fixes are drawn from (~500 m).
const SIMULATION_JITTER_DEG: f64 = 0.005;

#[derive(Clone)]
pub struct LocationTracker {
    shared: Arc<Shared>,
}

struct Shared {
    geolocation: Arc<dyn Geolocation>,
    publisher: Arc<dyn LocationPublisher>,
    preferences: TrackingOptions,
    metrics: Metrics,
    listeners: ListenerRegistry<TrackingStatus>,
    events_tx: broadcast::Sender<TrackingStatus>,
    state: parking_lot::Mutex<TrackerState>,
}

enum Phase {
    Idle,
    Starting { epoch: u64 },
    Tracking(Session),
}

struct Session {
    epoch: u64,
    watch_id: WatchId,
    timer: PublishTimer,
}

struct TrackerState {
    phase: Phase,
    epoch: u64,
    options: TrackingOptions,
    driver_id: Option<String>,
    delivery_id: Option<String>,
    history: Vec<LocationFix>,
    last_location: Option<LocationFix>,
    error: Option<TrackingError>,
    battery_level: Option<f64>,
    destination: Option<Destination>,
    distance_to_destination: Option<f64>,
    estimated_time_text: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FixSource {
    Device,
    Simulated,
}

impl FixSource {
    fn label(self) -> &'static str {
        match self {
            FixSource::Device => "device",
            FixSource::Simulated => "simulated",
        }
    }
}

impl TrackerState {
    fn live_epoch(&self) -> Option<u64> {
        match &self.phase {
            Phase::Idle => None,
            Phase::Starting { epoch } => Some(*epoch),
            Phase::Tracking(session) => Some(session.epoch),
        }
    }

    fn snapshot(&self) -> TrackingStatus {
        TrackingStatus {
            is_tracking: matches!(self.phase, Phase::Tracking(_)),
            last_location: self.last_location.clone(),
            error: self.error.clone(),
            battery_level: self.battery_level,
            distance_to_destination: self.distance_to_destination,
            estimated_time_text: self.estimated_time_text.clone(),
        }
    }

    fn apply_fix(&mut self, fix: LocationFix) {
        self.history.push(fix.clone());
        self.last_location = Some(fix);
        self.error = None;
        self.recompute_destination();
    }

    fn recompute_destination(&mut self) {
        let (Some(destination), Some(fix)) = (&self.destination, &self.last_location) else {
            return;
        };

        let distance = haversine_km(&fix.point(), destination);
        self.distance_to_destination = Some(distance);
        self.estimated_time_text = eta_minutes(distance, DEFAULT_SPEED_KMH)
            .ok()
            .map(eta_text);
    }
}

pub fn eta_text(minutes: f64) -> String {
    if minutes.round() < 1.0 {
        "< 1 min".to_string()
    } else {
        format_duration(minutes)
    }
}

impl LocationTracker {
    pub fn new(
        geolocation: Arc<dyn Geolocation>,
        publisher: Arc<dyn LocationPublisher>,
        preferences: TrackingOptions,
        event_buffer_size: usize,
        metrics: Metrics,
    ) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(event_buffer_size.max(1));

        Self {
            shared: Arc::new(Shared {
                geolocation,
                publisher,
                preferences: preferences.clone(),
                metrics,
                listeners: ListenerRegistry::new(),
                events_tx,
                state: parking_lot::Mutex::new(TrackerState {
                    phase: Phase::Idle,
                    epoch: 0,
                    options: preferences,
                    driver_id: None,
                    delivery_id: None,
                    history: Vec::new(),
                    last_location: None,
                    error: None,
                    battery_level: None,
                    destination: None,
                    distance_to_destination: None,
                    estimated_time_text: None,
                }),
            }),
        }
    }

    pub fn start(
        &self,
        driver_id: impl Into<String>,
        delivery_id: impl Into<String>,
        destination: Option<Destination>,
        options: Option<TrackingOptions>,
    ) -> Result<(), TrackingError> {
        let options = options.unwrap_or_else(|| self.shared.preferences.clone());
        options.validate()?;
        let runtime = Handle::try_current().map_err(|_| {
            TrackingError::Internal("tracking must be started inside a tokio runtime".to_string())
        })?;

        let driver_id = driver_id.into();
        let delivery_id = delivery_id.into();

        let epoch = {
            let mut state = self.shared.state.lock();
            if state.live_epoch().is_some() {
                debug!(%driver_id, %delivery_id, "tracking already active; ignoring start");
                return Ok(());
            }

            state.driver_id = Some(driver_id.clone());
            state.delivery_id = Some(delivery_id.clone());
            if let Some(destination) = destination {
                state.destination = Some(destination);
                state.recompute_destination();
            }
            state.options = options.clone();

            if !self.shared.geolocation.is_supported() {
                state.error = Some(TrackingError::GeolocationUnsupported);
                let snapshot = state.snapshot();
                drop(state);

                self.shared.record_error(&TrackingError::GeolocationUnsupported);
                warn!(%driver_id, "geolocation unsupported; tracking not started");
                self.shared.broadcast(snapshot);
                return Err(TrackingError::GeolocationUnsupported);
            }

            state.epoch += 1;
            let epoch = state.epoch;
            state.phase = Phase::Starting { epoch };
            epoch
        };

        // The platform may deliver a position from inside `watch_position`,
        // so the state lock must not be held across it.
        let watch_options = WatchOptions {
            high_accuracy: options.high_accuracy,
            maximum_age: options.max_fix_age,
            timeout: options.fix_timeout,
        };
        let watch_result = self
            .shared
            .geolocation
            .watch_position(watch_options, Shared::position_callback(&self.shared, epoch));

        let mut state = self.shared.state.lock();
        let watch_id = match watch_result {
            Ok(watch_id) => watch_id,
            Err(err) => {
                if state.live_epoch() == Some(epoch) {
                    state.phase = Phase::Idle;
                }
                state.error = Some(err.clone());
                let snapshot = state.snapshot();
                drop(state);

                self.shared.record_error(&err);
                warn!(error = %err, "failed to start position watch");
                self.shared.broadcast(snapshot);
                return Err(err);
            }
        };

        if state.live_epoch() != Some(epoch) {
            // stopped while the watch was being registered
            drop(state);
            self.shared.geolocation.clear_watch(watch_id);
            return Ok(());
        }

        let interval = effective_interval(
            options.poll_interval(),
            state.battery_level,
            options.adapt_to_low_battery,
        );
        let weak = Arc::downgrade(&self.shared);
        let timer = PublishTimer::spawn(&runtime, interval, move || {
            if let Some(shared) = weak.upgrade() {
                shared.publish_current(epoch);
            }
        });

        state.phase = Phase::Tracking(Session {
            epoch,
            watch_id,
            timer,
        });
        state.error = None;
        let snapshot = state.snapshot();
        drop(state);

        self.shared.metrics.tracking_active.set(1);
        info!(
            %driver_id,
            %delivery_id,
            interval_secs = interval.as_secs(),
            "tracking started"
        );
        self.shared.broadcast(snapshot);
        Ok(())
    }

    pub fn stop(&self) {
        let mut state = self.shared.state.lock();
        let previous = std::mem::replace(&mut state.phase, Phase::Idle);
        let session = match previous {
            Phase::Idle => return,
            Phase::Starting { .. } => None,
            Phase::Tracking(session) => Some(session),
        };
        let snapshot = state.snapshot();
        let delivery_id = state.delivery_id.clone();
        drop(state);

        if let Some(session) = session {
            self.shared.geolocation.clear_watch(session.watch_id);
            drop(session.timer);
        }

        self.shared.metrics.tracking_active.set(0);
        info!(delivery_id = delivery_id.as_deref().unwrap_or("-"), "tracking stopped");
        self.shared.broadcast(snapshot);
    }

    pub fn status(&self) -> TrackingStatus {
        self.shared.state.lock().snapshot()
    }

    pub fn is_tracking(&self) -> bool {
        matches!(self.shared.state.lock().phase, Phase::Tracking(_))
    }

    pub fn delivery_id(&self) -> Option<String> {
        self.shared.state.lock().delivery_id.clone()
    }

    pub fn destination(&self) -> Option<Destination> {
        self.shared.state.lock().destination
    }

    pub fn history(&self) -> Vec<LocationFix> {
        self.shared.state.lock().history.clone()
    }

    pub fn clear_history(&self) {
        let snapshot = {
            let mut state = self.shared.state.lock();
            state.history = Vec::new();
            state.snapshot()
        };
        self.shared.broadcast(snapshot);
    }

    pub fn publish_interval(&self) -> Option<Duration> {
        match &self.shared.state.lock().phase {
            Phase::Tracking(session) => Some(session.timer.interval()),
            _ => None,
        }
    }

    pub fn set_destination(&self, destination: Destination) {
        let snapshot = {
            let mut state = self.shared.state.lock();
            state.destination = Some(destination);
            if state.last_location.is_none() {
                return;
            }
            state.recompute_destination();
            state.snapshot()
        };

        if let Some(distance) = snapshot.distance_to_destination {
            info!(
                lat = destination.lat,
                lng = destination.lng,
                distance = %format_distance(distance),
                "destination updated"
            );
        }
        self.shared.broadcast(snapshot);
    }

    pub fn simulate_fix(&self, fix: Option<LocationFix>) -> LocationFix {
        let (fix, snapshot) = {
            let mut state = self.shared.state.lock();
            let fix = fix.unwrap_or_else(|| {
                let base = state
                    .last_location
                    .as_ref()
                    .map(LocationFix::point)
                    .or(state.destination)
                    .unwrap_or(DEFAULT_SIMULATION_BASE);
                let mut rng = rand::thread_rng();

                LocationFix {
                    lat: base.lat + rng.gen_range(-SIMULATION_JITTER_DEG..SIMULATION_JITTER_DEG),
                    lng: base.lng + rng.gen_range(-SIMULATION_JITTER_DEG..SIMULATION_JITTER_DEG),
                    timestamp: Utc::now(),
                    driver_id: state.driver_id.clone(),
                    delivery_id: state.delivery_id.clone(),
                }
            });
            state.apply_fix(fix.clone());
            (fix, state.snapshot())
        };

        self.shared.record_fix(FixSource::Simulated);
        self.shared.broadcast(snapshot);
        fix
    }

    pub fn update_battery_level(&self, level: f64) {
        let level = level.clamp(0.0, 100.0);
        let snapshot = {
            let mut state = self.shared.state.lock();
            state.battery_level = Some(level);

            let adapt = state.options.adapt_to_low_battery;
            let configured = state.options.poll_interval();
            if let Phase::Tracking(session) = &state.phase {
                if adapt {
                    let interval = effective_interval(configured, Some(level), adapt);
                    if session.timer.reset(interval) {
                        info!(
                            battery_level = level,
                            interval_secs = interval.as_secs(),
                            "publish interval adjusted for battery"
                        );
                    }
                }
            }
            state.snapshot()
        };

        self.shared.metrics.battery_level.set(level);
        self.shared.broadcast(snapshot);
    }

    pub async fn attach_battery(&self, battery: Arc<dyn Battery>) -> Option<JoinHandle<()>> {
        let Some(mut level_rx) = battery.status().await else {
            debug!("no battery signal; cadence adaptation disabled");
            return None;
        };

        let weak = Arc::downgrade(&self.shared);
        Some(tokio::spawn(async move {
            loop {
                let level = *level_rx.borrow_and_update();
                if let Some(level) = level {
                    let Some(shared) = weak.upgrade() else {
                        return;
                    };
                    LocationTracker { shared }.update_battery_level(level * 100.0);
                }

                if level_rx.changed().await.is_err() {
                    return;
                }
            }
        }))
    }

    pub fn add_listener<F>(&self, listener: F) -> Subscription<TrackingStatus>
    where
        F: Fn(&TrackingStatus) + Send + Sync + 'static,
    {
        let subscription = self.shared.listeners.add(listener);
        let snapshot = self.status();
        if !self.shared.listeners.notify_one(subscription.id(), &snapshot) {
            self.shared.metrics.listener_failures_total.inc();
        }
        subscription
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.shared.listeners.remove(id)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackingStatus> {
        self.shared.events_tx.subscribe()
    }
}

impl Shared {
    fn position_callback(shared: &Arc<Shared>, epoch: u64) -> PositionCallback {
        let weak: Weak<Shared> = Arc::downgrade(shared);
        Arc::new(move |event: PositionEvent| {
            if let Some(shared) = weak.upgrade() {
                shared.handle_position(epoch, event);
            }
        })
    }

    fn handle_position(&self, epoch: u64, event: PositionEvent) {
        let mut state = self.state.lock();
        if state.live_epoch() != Some(epoch) {
            debug!(epoch, "dropping position event from a finished session");
            return;
        }

        match event {
            Ok(Coordinates {
                latitude,
                longitude,
            }) => {
                let fix = LocationFix {
                    lat: latitude,
                    lng: longitude,
                    timestamp: Utc::now(),
                    driver_id: state.driver_id.clone(),
                    delivery_id: state.delivery_id.clone(),
                };
                state.apply_fix(fix);
                let snapshot = state.snapshot();
                drop(state);

                self.record_fix(FixSource::Device);
                self.broadcast(snapshot);
            }
            Err(err) => {
                state.error = Some(err.clone());
                let snapshot = state.snapshot();
                drop(state);

                self.record_error(&err);
                warn!(error = %err, "location error");
                self.broadcast(snapshot);
            }
        }
    }

    fn publish_current(&self, epoch: u64) {
        let payload = {
            let state = self.state.lock();
            if state.live_epoch() != Some(epoch) {
                return;
            }
            let Some(fix) = &state.last_location else {
                return;
            };
            LocationPayload {
                lat: fix.lat,
                lng: fix.lng,
                timestamp: fix.timestamp,
                driver_id: state.driver_id.clone(),
                delivery_id: state.delivery_id.clone(),
            }
        };

        self.publisher.publish(&payload);
        self.metrics.location_publishes_total.inc();
        debug!(lat = payload.lat, lng = payload.lng, "location published");
    }

    fn record_fix(&self, source: FixSource) {
        self.metrics
            .location_fixes_total
            .with_label_values(&[source.label()])
            .inc();
    }

    fn record_error(&self, err: &TrackingError) {
        self.metrics
            .tracking_errors_total
            .with_label_values(&[err.kind()])
            .inc();
    }

    fn broadcast(&self, snapshot: TrackingStatus) {
        let failures = self.listeners.notify(&snapshot);
        if failures > 0 {
            self.metrics.listener_failures_total.inc_by(failures as u64);
        }
        let _ = self.events_tx.send(snapshot);
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Phase::Tracking(session) = &self.state.get_mut().phase {
            self.geolocation.clear_watch(session.watch_id);
        }
    }
}
