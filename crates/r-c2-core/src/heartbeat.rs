//! ---
//! c2_section: "07-resilience-fault-tolerance"
//! c2_subsection: "module"
//! c2_type: "source"
//! c2_scope: "code"
//! c2_description: "Peer liveness tracking from heartbeat traffic."
//! c2_version: "v0.0.0-prealpha"
//! c2_owner: "tbd"
//! ---
use std::time::Duration;

use r_c2_msg::{HeartbeatMessage, Message, MessageLink, PeerIdentity, PeerState, PROTOCOL_VERSION};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Tracks when the peer was last heard from.
#[derive(Debug, Clone, Default)]
pub struct HeartbeatMonitor {
    last_seen_at: Option<Instant>,
    peer: Option<PeerIdentity>,
    peer_state: Option<PeerState>,
}

impl HeartbeatMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a heartbeat. Repeated heartbeats only refresh the timestamp and reported state.
    pub fn observe(&mut self, heartbeat: &HeartbeatMessage, now: Instant) {
        if heartbeat.protocol_version != PROTOCOL_VERSION {
            warn!(
                sender = %heartbeat.sender,
                theirs = heartbeat.protocol_version,
                ours = PROTOCOL_VERSION,
                "peer advertises a different protocol version"
            );
        }
        match self.peer {
            None => info!(sender = %heartbeat.sender, state = %heartbeat.state, "first heartbeat from peer"),
            Some(previous) if previous != heartbeat.sender => {
                warn!(previous = %previous, sender = %heartbeat.sender, "heartbeat sender changed")
            }
            Some(_) => debug!(sender = %heartbeat.sender, state = %heartbeat.state, "heartbeat"),
        }
        self.last_seen_at = Some(now);
        self.peer = Some(heartbeat.sender);
        self.peer_state = Some(heartbeat.state);
    }

    /// Consume inbound traffic until one heartbeat has been observed or `timeout` elapses.
    ///
    /// Non-heartbeat messages read meanwhile are discarded. Transport failures are logged and
    /// reported as `false`.
    pub async fn wait_for_first(&mut self, link: &MessageLink, timeout: Duration) -> bool {
        if self.last_seen_at.is_some() {
            return true;
        }
        let deadline = Instant::now() + timeout;
        loop {
            match link.recv_until(deadline).await {
                Ok(Some(Message::Heartbeat(heartbeat))) => {
                    self.observe(&heartbeat, Instant::now());
                    return true;
                }
                Ok(Some(other)) => {
                    debug!(kind = other.kind(), "discarding message while waiting for heartbeat");
                }
                Ok(None) => {
                    debug!(?timeout, "no heartbeat within timeout");
                    return false;
                }
                Err(err) => {
                    warn!(error = %err, "transport failure while waiting for heartbeat");
                    return false;
                }
            }
        }
    }

    /// Whether the last heartbeat is at most `stale_after` old.
    pub fn is_alive(&self, now: Instant, stale_after: Duration) -> bool {
        self.last_seen_at
            .map(|seen| now.saturating_duration_since(seen) <= stale_after)
            .unwrap_or(false)
    }

    pub fn last_seen_at(&self) -> Option<Instant> {
        self.last_seen_at
    }

    pub fn peer(&self) -> Option<PeerIdentity> {
        self.peer
    }

    /// State the peer reported in its most recent heartbeat.
    pub fn peer_state(&self) -> Option<PeerState> {
        self.peer_state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use r_c2_msg::{InMemoryTransport, StatusText, NODE_IDENTITY};

    #[tokio::test(start_paused = true)]
    async fn wait_for_first_times_out_without_error() {
        let (a, _b) = InMemoryTransport::pair();
        let link = MessageLink::new(a);
        let mut monitor = HeartbeatMonitor::new();

        let started = Instant::now();
        assert!(!monitor.wait_for_first(&link, Duration::from_secs(10)).await);
        assert!(started.elapsed() >= Duration::from_secs(10));
        assert!(monitor.last_seen_at().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_first_skips_other_traffic() {
        let (a, b) = InMemoryTransport::pair();
        let link = MessageLink::new(a);
        let peer = MessageLink::new(b);
        peer.send(&StatusText::info("noise").into()).await.expect("send");
        peer.send(&HeartbeatMessage::new(NODE_IDENTITY, PeerState::Active).into())
            .await
            .expect("send");

        let mut monitor = HeartbeatMonitor::new();
        assert!(monitor.wait_for_first(&link, Duration::from_secs(1)).await);
        assert_eq!(monitor.peer(), Some(NODE_IDENTITY));
        assert_eq!(monitor.peer_state(), Some(PeerState::Active));
        // Already known: returns without touching the link.
        assert!(monitor.wait_for_first(&link, Duration::ZERO).await);
    }

    #[tokio::test(start_paused = true)]
    async fn liveness_expires_after_stale_window() {
        let mut monitor = HeartbeatMonitor::new();
        assert!(!monitor.is_alive(Instant::now(), Duration::from_secs(3)));

        let seen = Instant::now();
        monitor.observe(&HeartbeatMessage::new(NODE_IDENTITY, PeerState::Standby), seen);
        assert!(monitor.is_alive(seen + Duration::from_secs(3), Duration::from_secs(3)));
        assert!(!monitor.is_alive(seen + Duration::from_secs(4), Duration::from_secs(3)));
    }

    #[tokio::test(start_paused = true)]
    async fn observe_refreshes_timestamp() {
        let mut monitor = HeartbeatMonitor::new();
        let heartbeat = HeartbeatMessage::new(NODE_IDENTITY, PeerState::Standby);
        let first = Instant::now();
        monitor.observe(&heartbeat, first);
        let second = first + Duration::from_secs(2);
        monitor.observe(&heartbeat, second);
        assert_eq!(monitor.last_seen_at(), Some(second));
        assert_eq!(monitor.peer(), Some(NODE_IDENTITY));
    }
}
