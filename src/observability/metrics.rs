use prometheus::{Encoder, Gauge, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub location_fixes_total: IntCounterVec,
    pub tracking_errors_total: IntCounterVec,
    pub location_publishes_total: IntCounter,
    pub listener_failures_total: IntCounter,
    pub notifications_total: IntCounter,
    pub confirmations_total: IntCounter,
    pub tracking_active: IntGauge,
    pub battery_level: Gauge,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let location_fixes_total = IntCounterVec::new(
            Opts::new("location_fixes_total", "Location fixes accepted by source"),
            &["source"],
        )
        .expect("valid location_fixes_total metric");

        let tracking_errors_total = IntCounterVec::new(
            Opts::new("tracking_errors_total", "Tracking errors by kind"),
            &["kind"],
        )
        .expect("valid tracking_errors_total metric");

        let location_publishes_total = IntCounter::new(
            "location_publishes_total",
            "Location payloads handed to the publisher",
        )
        .expect("valid location_publishes_total metric");

        let listener_failures_total = IntCounter::new(
            "listener_failures_total",
            "Status listeners that panicked during notification",
        )
        .expect("valid listener_failures_total metric");

        let notifications_total =
            IntCounter::new("notifications_total", "Driver notifications dispatched")
                .expect("valid notifications_total metric");

        let confirmations_total =
            IntCounter::new("confirmations_total", "Delivery confirmations handed off")
                .expect("valid confirmations_total metric");

        let tracking_active = IntGauge::new("tracking_active", "1 while a session is tracking")
            .expect("valid tracking_active metric");

        let battery_level = Gauge::new("battery_level", "Last reported battery level [0..100]")
            .expect("valid battery_level metric");

        registry
            .register(Box::new(location_fixes_total.clone()))
            .expect("register location_fixes_total");
        registry
            .register(Box::new(tracking_errors_total.clone()))
            .expect("register tracking_errors_total");
        registry
            .register(Box::new(location_publishes_total.clone()))
            .expect("register location_publishes_total");
        registry
            .register(Box::new(listener_failures_total.clone()))
            .expect("register listener_failures_total");
        registry
            .register(Box::new(notifications_total.clone()))
            .expect("register notifications_total");
        registry
            .register(Box::new(confirmations_total.clone()))
            .expect("register confirmations_total");
        registry
            .register(Box::new(tracking_active.clone()))
            .expect("register tracking_active");
        registry
            .register(Box::new(battery_level.clone()))
            .expect("register battery_level");

        Self {
            registry,
            location_fixes_total,
            tracking_errors_total,
            location_publishes_total,
            listener_failures_total,
            notifications_total,
            confirmations_total,
            tracking_active,
            battery_level,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
