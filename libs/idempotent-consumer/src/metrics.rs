use prometheus::{IntCounter, IntGauge, Opts};
use tracing::warn;

#[derive(Clone)]
pub struct InboxMetrics {
    pub pending: IntGauge,
    pub delivered: IntCounter,
    pub skipped_unmet_dependency: IntCounter,
}

impl InboxMetrics {
    pub fn new(service: &str) -> Self {
        let registry = prometheus::default_registry();

        let pending = IntGauge::with_opts(
            Opts::new("inbox_pending_count", "Number of inbox rows with processed_position IS NULL")
                .const_label("service", service.to_string()),
        )
        .expect("valid metric opts for inbox_pending_count");

        let delivered = IntCounter::with_opts(
            Opts::new("inbox_delivered_total", "Total number of inbox rows delivered to a subscriber")
                .const_label("service", service.to_string()),
        )
        .expect("valid metric opts for inbox_delivered_total");

        let skipped_unmet_dependency = IntCounter::with_opts(
            Opts::new(
                "inbox_skipped_unmet_dependency_total",
                "Total number of candidates skipped this round for an unmet causal dependency",
            )
            .const_label("service", service.to_string()),
        )
        .expect("valid metric opts for inbox_skipped_unmet_dependency_total");

        if let Err(e) = registry.register(Box::new(pending.clone())) {
            warn!("failed to register inbox_pending_count: {}", e);
        }
        if let Err(e) = registry.register(Box::new(delivered.clone())) {
            warn!("failed to register inbox_delivered_total: {}", e);
        }
        if let Err(e) = registry.register(Box::new(skipped_unmet_dependency.clone())) {
            warn!("failed to register inbox_skipped_unmet_dependency_total: {}", e);
        }

        Self {
            pending,
            delivered,
            skipped_unmet_dependency,
        }
    }
}
