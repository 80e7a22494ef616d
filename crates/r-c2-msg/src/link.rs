//! ---
//! c2_section: "02-messaging-wire-protocol"
//! c2_subsection: "module"
//! c2_type: "source"
//! c2_scope: "code"
//! c2_description: "Message link: codec, transport and datagram counters."
//! c2_version: "v0.0.0-prealpha"
//! c2_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::codec::{decode, encode};
use crate::logging::{log_message, MessageDirection, LinkMetricsExporter};
use crate::{Message, Result, Transport};

/// Snapshot of link counters used by dashboards and tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LinkMetrics {
    /// Datagrams handed to the transport.
    pub sent: u64,
    /// Datagrams decoded successfully.
    pub received: u64,
    /// Sends that failed at the transport.
    pub dropped: u64,
    /// Datagrams that failed to decode and were skipped.
    pub malformed: u64,
}

#[derive(Default)]
struct Counters {
    sent: AtomicU64,
    received: AtomicU64,
    dropped: AtomicU64,
    malformed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> LinkMetrics {
        LinkMetrics {
            sent: self.sent.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
        }
    }
}

/// Couples a transport with the codec, logging and counters.
///
/// Decode failures never surface to callers: the datagram is logged, counted and skipped.
#[derive(Clone)]
pub struct MessageLink {
    transport: Arc<dyn Transport>,
    counters: Arc<Counters>,
    exporter: Option<LinkMetricsExporter>,
}

impl MessageLink {
    /// Wrap a transport.
    pub fn new<T>(transport: Arc<T>) -> Self
    where
        T: Transport + 'static,
    {
        Self {
            transport: transport as Arc<dyn Transport>,
            counters: Arc::new(Counters::default()),
            exporter: None,
        }
    }

    /// Mirror counters into Prometheus.
    pub fn with_exporter(mut self, exporter: LinkMetricsExporter) -> Self {
        self.exporter = Some(exporter);
        self
    }

    /// Name of the underlying transport.
    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    /// Encode and send one message.
    pub async fn send(&self, message: &Message) -> Result<()> {
        log_message(MessageDirection::Outbound, message);
        match self.transport.send(encode(message)).await {
            Ok(()) => {
                self.counters.sent.fetch_add(1, Ordering::Relaxed);
                if let Some(exporter) = &self.exporter {
                    exporter.observe_sent();
                }
                Ok(())
            }
            Err(err) => {
                tracing::warn!(transport = self.transport.name(), kind = message.kind(), error = %err, "transport send failed");
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                if let Some(exporter) = &self.exporter {
                    exporter.observe_dropped();
                }
                Err(err)
            }
        }
    }

    /// Receive at most one datagram within `wait`.
    ///
    /// Returns `Ok(None)` when nothing arrived or when the datagram was malformed.
    pub async fn recv(&self, wait: Duration) -> Result<Option<Message>> {
        let Some(payload) = self.transport.recv(wait).await? else {
            return Ok(None);
        };
        Ok(self.accept(&payload))
    }

    /// Next message already queued, skipping malformed datagrams. Never waits.
    ///
    /// `Ok(None)` means the transport queue is empty.
    pub async fn try_recv(&self) -> Result<Option<Message>> {
        while let Some(payload) = self.transport.recv(Duration::ZERO).await? {
            if let Some(message) = self.accept(&payload) {
                return Ok(Some(message));
            }
        }
        Ok(None)
    }

    fn accept(&self, payload: &[u8]) -> Option<Message> {
        match decode(payload) {
            Ok(message) => {
                self.counters.received.fetch_add(1, Ordering::Relaxed);
                if let Some(exporter) = &self.exporter {
                    exporter.observe_received();
                }
                log_message(MessageDirection::Inbound, &message);
                Some(message)
            }
            Err(err) => {
                tracing::warn!(transport = self.transport.name(), bytes = payload.len(), error = %err, "skipping malformed datagram");
                self.counters.malformed.fetch_add(1, Ordering::Relaxed);
                if let Some(exporter) = &self.exporter {
                    exporter.observe_malformed();
                }
                None
            }
        }
    }

    /// Receive until a message arrives or `deadline` passes, skipping malformed datagrams.
    pub async fn recv_until(&self, deadline: Instant) -> Result<Option<Message>> {
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            if let Some(message) = self.recv(deadline - now).await? {
                return Ok(Some(message));
            }
        }
    }

    /// Close the transport.
    pub async fn close(&self) -> Result<()> {
        self.transport.close().await
    }

    /// Return the current metrics snapshot.
    pub fn metrics(&self) -> LinkMetrics {
        self.counters.snapshot()
    }
}
