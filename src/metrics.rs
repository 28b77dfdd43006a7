use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

pub struct AppMetrics {
    registry: Registry,
    records_received: IntCounter,
    batches_rejected: IntCounterVec,
    publish_failures: IntCounter,
    persist_failures: IntCounter,
    records_persisted: IntCounter,
}

impl AppMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let records_received = IntCounter::new(
            "relay_records_received_total",
            "Log records decoded from accepted request bodies",
        )?;
        let batches_rejected = IntCounterVec::new(
            Opts::new(
                "relay_batches_rejected_total",
                "Request bodies rejected before forwarding",
            ),
            &["reason"],
        )?;
        let publish_failures = IntCounter::new(
            "relay_publish_failures_total",
            "Batches the stream backend did not fully accept",
        )?;
        let persist_failures = IntCounter::new(
            "relay_persist_failures_total",
            "Batches that could not be appended to the local log file",
        )?;
        let records_persisted = IntCounter::new(
            "relay_records_persisted_total",
            "Log records appended to the local log file",
        )?;

        registry.register(Box::new(records_received.clone()))?;
        registry.register(Box::new(batches_rejected.clone()))?;
        registry.register(Box::new(publish_failures.clone()))?;
        registry.register(Box::new(persist_failures.clone()))?;
        registry.register(Box::new(records_persisted.clone()))?;

        Ok(Self {
            registry,
            records_received,
            batches_rejected,
            publish_failures,
            persist_failures,
            records_persisted,
        })
    }

    pub fn records_received(&self, n: usize) {
        self.records_received.inc_by(n as u64);
    }

    pub fn ingest_rejected_total(&self, reason: &str) {
        self.batches_rejected.with_label_values(&[reason]).inc();
    }

    pub fn publish_failed(&self) {
        self.publish_failures.inc();
    }

    pub fn persist_failed(&self) {
        self.persist_failures.inc();
    }

    pub fn records_persisted(&self, n: usize) {
        self.records_persisted.inc_by(n as u64);
    }

    pub fn render(&self) -> String {
        let mut buf = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buf) {
            tracing::warn!(error = %e, "failed to encode relay metrics");
            return String::new();
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}
