use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub qr_codes_created_total: IntCounter,
    pub position_updates_total: IntCounterVec,
    pub lifecycle_transitions_total: IntCounterVec,
    pub active_tracking_sessions: IntGauge,
    pub notifications_in_queue: IntGauge,
    pub notifications_total: IntCounterVec,
    pub position_update_seconds: HistogramVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let qr_codes_created_total =
            IntCounter::new("qr_codes_created_total", "Total QR codes generated")
                .expect("valid qr_codes_created_total metric");

        let position_updates_total = IntCounterVec::new(
            Opts::new("position_updates_total", "Live position updates by kind"),
            &["kind"],
        )
        .expect("valid position_updates_total metric");

        let lifecycle_transitions_total = IntCounterVec::new(
            Opts::new(
                "lifecycle_transitions_total",
                "QR lifecycle transitions by target status",
            ),
            &["status"],
        )
        .expect("valid lifecycle_transitions_total metric");

        let active_tracking_sessions = IntGauge::new(
            "active_tracking_sessions",
            "QR codes activated and not yet delivered or stopped",
        )
        .expect("valid active_tracking_sessions metric");

        let notifications_in_queue = IntGauge::new(
            "notifications_in_queue",
            "Current number of notifications waiting for the worker",
        )
        .expect("valid notifications_in_queue metric");

        let notifications_total = IntCounterVec::new(
            Opts::new("notifications_total", "Processed notifications by outcome"),
            &["outcome"],
        )
        .expect("valid notifications_total metric");

        let position_update_seconds = HistogramVec::new(
            HistogramOpts::new(
                "position_update_seconds",
                "Latency of applying a position update in seconds",
            ),
            &["outcome"],
        )
        .expect("valid position_update_seconds metric");

        registry
            .register(Box::new(qr_codes_created_total.clone()))
            .expect("register qr_codes_created_total");
        registry
            .register(Box::new(position_updates_total.clone()))
            .expect("register position_updates_total");
        registry
            .register(Box::new(lifecycle_transitions_total.clone()))
            .expect("register lifecycle_transitions_total");
        registry
            .register(Box::new(active_tracking_sessions.clone()))
            .expect("register active_tracking_sessions");
        registry
            .register(Box::new(notifications_in_queue.clone()))
            .expect("register notifications_in_queue");
        registry
            .register(Box::new(notifications_total.clone()))
            .expect("register notifications_total");
        registry
            .register(Box::new(position_update_seconds.clone()))
            .expect("register position_update_seconds");

        Self {
            registry,
            qr_codes_created_total,
            position_updates_total,
            lifecycle_transitions_total,
            active_tracking_sessions,
            notifications_in_queue,
            notifications_total,
            position_update_seconds,
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

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
