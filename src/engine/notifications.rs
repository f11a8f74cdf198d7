use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::json;
use tokio::runtime::Handle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::engine::listeners::{ListenerId, ListenerRegistry, Subscription};
use crate::models::notification::{
    DeliveryRef, DriverNotification, DriverRef, NotificationKind, NotificationOverrides,
    NotificationPayload,
};
use crate::observability::metrics::Metrics;
use crate::platform::{NotificationPermission, PushNotifier};

pub struct NotificationChannel {
    notifier: Arc<dyn PushNotifier>,
    history: DashMap<String, Vec<DriverNotification>>,
    listeners: DashMap<String, ListenerRegistry<DriverNotification>>,
    permission_requested: Arc<AtomicBool>,
    metrics: Metrics,
}

impl NotificationChannel {
    pub fn new(notifier: Arc<dyn PushNotifier>, metrics: Metrics) -> Self {
        Self {
            notifier,
            history: DashMap::new(),
            listeners: DashMap::new(),
            permission_requested: Arc::new(AtomicBool::new(false)),
            metrics,
        }
    }

    /// Returns whether dispatch was attempted, not whether anyone saw it.
    pub fn notify(&self, driver_id: &str, payload: NotificationPayload) -> bool {
        if driver_id.trim().is_empty() {
            return false;
        }

        let notification = DriverNotification {
            id: Uuid::new_v4(),
            driver_id: driver_id.to_string(),
            title: payload.title,
            message: payload.message,
            kind: payload.kind,
            data: payload.data,
            sent_at: Utc::now(),
        };

        self.history
            .entry(driver_id.to_string())
            .or_default()
            .push(notification.clone());

        // clone out so no map shard is locked while listeners run
        let registry = self.listeners.get(driver_id).map(|entry| entry.value().clone());
        if let Some(registry) = registry {
            let failures = registry.notify(&notification);
            if failures > 0 {
                self.metrics.listener_failures_total.inc_by(failures as u64);
            }
        }

        self.surface(&notification);
        self.metrics.notifications_total.inc();
        info!(
            driver_id,
            notification_id = %notification.id,
            kind = ?notification.kind,
            "driver notified"
        );
        true
    }

    pub fn notify_driver(
        &self,
        driver: &DriverRef,
        delivery: &DeliveryRef,
        overrides: NotificationOverrides,
    ) -> bool {
        let mut data = json!({
            "delivery": delivery,
            "driver": driver,
            "timestamp": Utc::now().to_rfc3339(),
        });
        if let (Some(extra), Some(base)) = (overrides.data, data.as_object_mut()) {
            if let Some(extra) = extra.as_object() {
                for (key, value) in extra {
                    base.insert(key.clone(), value.clone());
                }
            }
        }

        let payload = NotificationPayload {
            title: overrides
                .title
                .unwrap_or_else(|| "New delivery assigned".to_string()),
            message: overrides.message.unwrap_or_else(|| {
                format!("You have a new delivery for {}", delivery.customer)
            }),
            kind: overrides.kind.unwrap_or(NotificationKind::NewDelivery),
            data,
        };

        self.notify(&driver.id, payload)
    }

    pub fn add_listener<F>(&self, driver_id: &str, listener: F) -> Subscription<DriverNotification>
    where
        F: Fn(&DriverNotification) + Send + Sync + 'static,
    {
        self.listeners
            .entry(driver_id.to_string())
            .or_default()
            .add(listener)
    }

    pub fn remove_listener(&self, driver_id: &str, id: ListenerId) -> bool {
        self.listeners
            .get(driver_id)
            .map(|registry| registry.remove(id))
            .unwrap_or(false)
    }

    pub fn history(&self, driver_id: &str) -> Vec<DriverNotification> {
        self.history
            .get(driver_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    pub fn clear_history(&self, driver_id: &str) {
        self.history.remove(driver_id);
    }

    pub fn drivers_notified(&self) -> usize {
        self.history.len()
    }

    fn surface(&self, notification: &DriverNotification) {
        if !self.notifier.is_supported() {
            return;
        }

        match self.notifier.permission() {
            NotificationPermission::Granted => {
                self.notifier.show(&notification.title, &notification.message);
            }
            NotificationPermission::Denied => {}
            NotificationPermission::Default => {
                if self.permission_requested.swap(true, Ordering::SeqCst) {
                    return;
                }
                let Ok(runtime) = Handle::try_current() else {
                    debug!("no runtime to request notification permission");
                    self.permission_requested.store(false, Ordering::SeqCst);
                    return;
                };

                let notifier = self.notifier.clone();
                let title = notification.title.clone();
                let message = notification.message.clone();
                runtime.spawn(async move {
                    let permission = notifier.request_permission().await;
                    debug!(?permission, "notification permission answered");
                    if permission == NotificationPermission::Granted {
                        notifier.show(&title, &message);
                    }
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use parking_lot::Mutex;

    use super::*;
    use crate::platform::mock::MockNotifier;

    fn channel(notifier: Arc<MockNotifier>) -> NotificationChannel {
        NotificationChannel::new(notifier, Metrics::new())
    }

    fn payload(title: &str) -> NotificationPayload {
        NotificationPayload {
            title: title.to_string(),
            message: "Pet food, 12 bags".to_string(),
            kind: NotificationKind::Info,
            data: serde_json::Value::Null,
        }
    }

    fn driver() -> DriverRef {
        DriverRef {
            id: "driver-001".to_string(),
            name: "João Oliveira".to_string(),
            phone: None,
        }
    }

    fn delivery() -> DeliveryRef {
        DeliveryRef {
            id: "delivery-42".to_string(),
            customer: "Mundo Animal".to_string(),
            address: "Av. Paulista, 1000 - São Paulo, SP".to_string(),
            order_number: Some("PED-001".to_string()),
        }
    }

    #[test]
    fn history_is_ordered_per_driver() {
        let channel = channel(Arc::new(MockNotifier::unsupported()));

        assert!(channel.notify("driver-001", payload("first")));
        assert!(channel.notify("driver-002", payload("other")));
        assert!(channel.notify("driver-001", payload("second")));

        let titles: Vec<_> = channel
            .history("driver-001")
            .into_iter()
            .map(|n| n.title)
            .collect();
        assert_eq!(titles, vec!["first", "second"]);
        assert_eq!(channel.history("driver-002").len(), 1);
        assert_eq!(channel.drivers_notified(), 2);

        channel.clear_history("driver-001");
        assert!(channel.history("driver-001").is_empty());
    }

    #[test]
    fn empty_driver_id_is_not_dispatched() {
        let channel = channel(Arc::new(MockNotifier::unsupported()));
        assert!(!channel.notify("  ", payload("nobody")));
        assert_eq!(channel.drivers_notified(), 0);
    }

    #[test]
    fn listeners_are_scoped_to_their_driver() {
        let channel = channel(Arc::new(MockNotifier::unsupported()));
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let subscription = channel.add_listener("driver-001", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        channel.notify("driver-002", payload("elsewhere"));
        channel.notify("driver-001", payload("mine"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        assert!(channel.remove_listener("driver-001", subscription.id()));
        channel.notify("driver-001", payload("after removal"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failing_listener_does_not_block_others() {
        let channel = channel(Arc::new(MockNotifier::unsupported()));
        let seen = Arc::new(Mutex::new(Vec::new()));
        channel.add_listener("driver-001", |_| panic!("broken listener"));
        let sink = seen.clone();
        channel.add_listener("driver-001", move |n: &DriverNotification| {
            sink.lock().push(n.title.clone());
        });

        assert!(channel.notify("driver-001", payload("still delivered")));
        assert_eq!(*seen.lock(), vec!["still delivered".to_string()]);
    }

    #[test]
    fn granted_permission_shows_immediately() {
        let notifier = Arc::new(MockNotifier::new(
            NotificationPermission::Granted,
            NotificationPermission::Granted,
        ));
        let channel = channel(notifier.clone());

        channel.notify("driver-001", payload("New delivery assigned"));

        assert_eq!(notifier.shown().len(), 1);
        assert_eq!(notifier.requests(), 0);
    }

    #[test]
    fn denied_permission_never_prompts() {
        let notifier = Arc::new(MockNotifier::new(
            NotificationPermission::Denied,
            NotificationPermission::Granted,
        ));
        let channel = channel(notifier.clone());

        assert!(channel.notify("driver-001", payload("quiet")));

        assert!(notifier.shown().is_empty());
        assert_eq!(notifier.requests(), 0);
    }

    #[tokio::test]
    async fn undecided_permission_is_requested_once() {
        let notifier = Arc::new(MockNotifier::new(
            NotificationPermission::Default,
            NotificationPermission::Granted,
        ));
        let channel = channel(notifier.clone());

        channel.notify("driver-001", payload("first"));
        channel.notify("driver-001", payload("second"));
        tokio::task::yield_now().await;

        assert_eq!(notifier.requests(), 1);
        assert_eq!(notifier.shown(), vec![("first".to_string(), "Pet food, 12 bags".to_string())]);

        channel.notify("driver-001", payload("third"));
        assert_eq!(notifier.shown().len(), 2);
    }

    #[test]
    fn default_assignment_message_names_the_customer() {
        let channel = channel(Arc::new(MockNotifier::unsupported()));

        assert!(channel.notify_driver(&driver(), &delivery(), NotificationOverrides::default()));

        let sent = channel.history("driver-001").remove(0);
        assert_eq!(sent.kind, NotificationKind::NewDelivery);
        assert_eq!(sent.title, "New delivery assigned");
        assert!(sent.message.contains("Mundo Animal"));
        assert_eq!(sent.data["delivery"]["id"], "delivery-42");
        assert_eq!(sent.data["driver"]["name"], "João Oliveira");
    }

    #[test]
    fn overrides_replace_defaults_and_extend_data() {
        let channel = channel(Arc::new(MockNotifier::unsupported()));
        let overrides = NotificationOverrides {
            title: Some("Delivery cancelled".to_string()),
            kind: Some(NotificationKind::Cancellation),
            data: Some(json!({ "reason": "customer request" })),
            ..NotificationOverrides::default()
        };

        channel.notify_driver(&driver(), &delivery(), overrides);

        let sent = channel.history("driver-001").remove(0);
        assert_eq!(sent.title, "Delivery cancelled");
        assert_eq!(sent.kind, NotificationKind::Cancellation);
        assert_eq!(sent.data["reason"], "customer request");
        assert_eq!(sent.data["delivery"]["customer"], "Mundo Animal");
    }
}
