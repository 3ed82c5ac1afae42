use prometheus::{IntCounter, IntGaugeVec, Opts};
use tracing::warn;

/// Pending depth is consumer-group-specific (each group reads the stream
/// independently), so unlike a single global gauge it is broken out by
/// `(consumer_group, uri)`.
#[derive(Clone)]
pub struct OutboxMetrics {
    pub pending: IntGaugeVec,
    pub oldest_pending_age_seconds: IntGaugeVec,
    pub delivered: IntCounter,
}

impl OutboxMetrics {
    pub fn new(service: &str) -> Self {
        let registry = prometheus::default_registry();

        let pending = IntGaugeVec::new(
            Opts::new(
                "outbox_pending_count",
                "Number of outbox rows past a consumer group's cursor",
            )
            .const_label("service", service.to_string()),
            &["consumer_group", "uri"],
        )
        .expect("valid metric opts for outbox_pending_count");

        let oldest_pending_age_seconds = IntGaugeVec::new(
            Opts::new(
                "outbox_oldest_pending_age_seconds",
                "Age in seconds of the oldest pending row for a consumer group",
            )
            .const_label("service", service.to_string()),
            &["consumer_group", "uri"],
        )
        .expect("valid metric opts for outbox_oldest_pending_age_seconds");

        let delivered = IntCounter::with_opts(
            Opts::new(
                "outbox_delivered_total",
                "Total number of outbox rows delivered to a subscriber",
            )
            .const_label("service", service.to_string()),
        )
        .expect("valid metric opts for outbox_delivered_total");

        if let Err(e) = registry.register(Box::new(pending.clone())) {
            warn!("failed to register outbox_pending_count: {}", e);
        }
        if let Err(e) = registry.register(Box::new(oldest_pending_age_seconds.clone())) {
            warn!("failed to register outbox_oldest_pending_age_seconds: {}", e);
        }
        if let Err(e) = registry.register(Box::new(delivered.clone())) {
            warn!("failed to register outbox_delivered_total: {}", e);
        }

        Self {
            pending,
            oldest_pending_age_seconds,
            delivered,
        }
    }
}
