use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::engine::confirmation::ConfirmationFlow;
use crate::engine::notifications::NotificationChannel;
use crate::engine::tracker::LocationTracker;
use crate::models::confirmation::{DeliveryConfirmation, OrderSummary};
use crate::observability::metrics::Metrics;
use crate::platform::{
    Camera, DeviceBattery, DeviceGeolocation, FsImageReader, HeadlessNotifier, ImageReader,
    NoCamera, TracingPublisher,
};

pub struct AppState {
    pub tracker: LocationTracker,
    pub device: Arc<DeviceGeolocation>,
    pub battery: Arc<DeviceBattery>,
    pub notifications: NotificationChannel,
    pub confirmations: DashMap<String, DeliveryConfirmation>,
    pub confirmation_tx: mpsc::Sender<DeliveryConfirmation>,
    pub camera: Arc<dyn Camera>,
    pub images: Arc<dyn ImageReader>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: &Config) -> (Self, mpsc::Receiver<DeliveryConfirmation>) {
        let (confirmation_tx, confirmation_rx) = mpsc::channel(config.confirmation_queue_size.max(1));
        let metrics = Metrics::new();
        let device = Arc::new(DeviceGeolocation::new());

        let tracker = LocationTracker::new(
            device.clone(),
            Arc::new(TracingPublisher),
            config.tracking.clone(),
            config.event_buffer_size,
            metrics.clone(),
        );

        (
            Self {
                tracker,
                device,
                battery: Arc::new(DeviceBattery::new()),
                notifications: NotificationChannel::new(Arc::new(HeadlessNotifier), metrics.clone()),
                confirmations: DashMap::new(),
                confirmation_tx,
                camera: Arc::new(NoCamera),
                images: Arc::new(FsImageReader),
                metrics,
            },
            confirmation_rx,
        )
    }

    pub fn confirmation_flow(&self, order: OrderSummary) -> ConfirmationFlow {
        ConfirmationFlow::new(
            order,
            self.camera.clone(),
            self.images.clone(),
            self.confirmation_tx.clone(),
        )
    }
}
