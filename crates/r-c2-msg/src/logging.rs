//! ---
//! c2_section: "02-messaging-wire-protocol"
//! c2_subsection: "module"
//! c2_type: "source"
//! c2_scope: "code"
//! c2_description: "Per-datagram tracing and Prometheus link counters."
//! c2_version: "v0.0.0-prealpha"
//! c2_owner: "tbd"
//! ---
use prometheus::{IntCounter, Opts, Registry};
use tracing::debug;

use crate::types::Message;

/// Direction of the message movement, used for consistent logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageDirection {
    /// Message sent out via a transport.
    Outbound,
    /// Message received from a transport.
    Inbound,
}

/// Emit a structured log entry for message activity.
pub fn log_message(direction: MessageDirection, message: &Message) {
    debug!(
        kind = message.kind(),
        direction = ?direction,
        message = ?message,
        "link activity"
    );
}

/// Prometheus metric handles for link activity.
#[derive(Clone)]
pub struct LinkMetricsExporter {
    sent: IntCounter,
    received: IntCounter,
    dropped: IntCounter,
    malformed: IntCounter,
}

impl LinkMetricsExporter {
    /// Register link metrics with the provided registry.
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let sent = IntCounter::with_opts(Opts::new(
            "r_c2_datagrams_sent_total",
            "Datagrams handed to the transport",
        ))?;
        let received = IntCounter::with_opts(Opts::new(
            "r_c2_datagrams_received_total",
            "Datagrams decoded from the transport",
        ))?;
        let dropped = IntCounter::with_opts(Opts::new(
            "r_c2_datagrams_dropped_total",
            "Datagrams that failed to send",
        ))?;
        let malformed = IntCounter::with_opts(Opts::new(
            "r_c2_datagrams_malformed_total",
            "Datagrams skipped because they failed to decode",
        ))?;

        registry.register(Box::new(sent.clone()))?;
        registry.register(Box::new(received.clone()))?;
        registry.register(Box::new(dropped.clone()))?;
        registry.register(Box::new(malformed.clone()))?;

        Ok(Self {
            sent,
            received,
            dropped,
            malformed,
        })
    }

    /// Record a sent datagram.
    pub fn observe_sent(&self) {
        self.sent.inc();
    }

    /// Record a received datagram.
    pub fn observe_received(&self) {
        self.received.inc();
    }

    /// Record a failed send.
    pub fn observe_dropped(&self) {
        self.dropped.inc();
    }

    /// Record a skipped datagram.
    pub fn observe_malformed(&self) {
        self.malformed.inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_exporter_records_counts() {
        let registry = Registry::new();
        let metrics = LinkMetricsExporter::register(&registry).expect("register metrics");
        metrics.observe_sent();
        metrics.observe_received();
        metrics.observe_dropped();
        metrics.observe_malformed();

        let families = registry.gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "r_c2_datagrams_malformed_total"));
    }

    #[test]
    fn double_registration_fails() {
        let registry = Registry::new();
        LinkMetricsExporter::register(&registry).expect("first registration");
        assert!(LinkMetricsExporter::register(&registry).is_err());
    }
}
