//! ---
//! c2_section: "01-core-functionality"
//! c2_subsection: "module"
//! c2_type: "source"
//! c2_scope: "code"
//! c2_description: "Ground station command dispatch and acknowledgement monitoring."
//! c2_version: "v0.0.0-prealpha"
//! c2_owner: "tbd"
//! ---
use std::time::Duration;

use r_c2_msg::{
    CommandAck, CommandRequest, CommandResult, HeartbeatMessage, Message, MessageLink,
    PeerIdentity, PeerState, ScanDuration, ScanType, StatusText, TransportError,
    COMMAND_PARAM_COUNT,
};
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::heartbeat::HeartbeatMonitor;

/// Failures raised while sending a command.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to send command: {0}")]
    Transport(#[from] TransportError),
}

/// Something the node told us during a monitoring window.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum MonitorEvent {
    Ack(CommandAck),
    Status(StatusText),
    Heartbeat(HeartbeatMessage),
}

/// Why a monitoring window ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "end", content = "detail", rename_all = "snake_case")]
pub enum MonitorEnd {
    /// The full window elapsed.
    TimedOut,
    /// A non-accepting acknowledgement arrived.
    Rejected(CommandResult),
    /// The transport failed; carries the error text.
    TransportFailed(String),
}

/// Events observed during [`CommandDispatcher::monitor`], in arrival order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorReport {
    pub events: Vec<MonitorEvent>,
    pub end: MonitorEnd,
}

impl MonitorReport {
    /// Result of the first acknowledgement seen, if any.
    pub fn ack_result(&self) -> Option<CommandResult> {
        self.events.iter().find_map(|event| match event {
            MonitorEvent::Ack(ack) => Some(ack.result),
            _ => None,
        })
    }

    pub fn status_texts(&self) -> impl Iterator<Item = &StatusText> {
        self.events.iter().filter_map(|event| match event {
            MonitorEvent::Status(status) => Some(status),
            _ => None,
        })
    }
}

/// Controller side of the command exchange.
pub struct CommandDispatcher {
    link: MessageLink,
    identity: PeerIdentity,
    heartbeat_interval: Duration,
    next_beacon: Instant,
    heartbeats: HeartbeatMonitor,
}

impl CommandDispatcher {
    pub fn new(link: MessageLink, identity: PeerIdentity, heartbeat_interval: Duration) -> Self {
        Self {
            link,
            identity,
            heartbeat_interval,
            next_beacon: Instant::now(),
            heartbeats: HeartbeatMonitor::new(),
        }
    }

    pub fn link(&self) -> &MessageLink {
        &self.link
    }

    pub fn heartbeats(&self) -> &HeartbeatMonitor {
        &self.heartbeats
    }

    /// Send `START_SCAN`. Does not wait for the acknowledgement.
    pub async fn send_scan_command(
        &mut self,
        duration: ScanDuration,
        scan_type: ScanType,
    ) -> Result<(), DispatchError> {
        info!(duration = duration.as_secs_f32(), %scan_type, "sending scan command");
        self.send_request(CommandRequest::start_scan(duration, scan_type))
            .await
    }

    /// Send an arbitrary command.
    pub async fn send_command(
        &mut self,
        command_id: u16,
        params: [f32; COMMAND_PARAM_COUNT],
    ) -> Result<(), DispatchError> {
        info!(command_id, ?params, "sending command");
        self.send_request(CommandRequest::new(command_id, params))
            .await
    }

    async fn send_request(&mut self, request: CommandRequest) -> Result<(), DispatchError> {
        self.link.send(&request.into()).await?;
        Ok(())
    }

    /// Collect node traffic for up to `timeout`, stopping early on a non-accepting ack.
    pub async fn monitor(&mut self, timeout: Duration) -> MonitorReport {
        let deadline = Instant::now() + timeout;
        let mut events = Vec::new();
        let end = loop {
            self.beacon_if_due().await;
            let now = Instant::now();
            if now >= deadline {
                break MonitorEnd::TimedOut;
            }
            let slice_end = deadline.min(self.next_beacon);
            let message = match self.link.recv_until(slice_end).await {
                Ok(Some(message)) => message,
                Ok(None) => continue,
                Err(err) => {
                    warn!(error = %err, "transport failure while monitoring");
                    break MonitorEnd::TransportFailed(err.to_string());
                }
            };
            match message {
                Message::CommandAck(ack) => {
                    info!(command_id = ack.command_id, result = %ack.result, "command acknowledged");
                    events.push(MonitorEvent::Ack(ack));
                    if ack.result.is_terminal() {
                        break MonitorEnd::Rejected(ack.result);
                    }
                }
                Message::StatusText(status) => {
                    info!(severity = %status.severity, text = %status.text, "node status");
                    events.push(MonitorEvent::Status(status));
                }
                Message::Heartbeat(heartbeat) => {
                    self.heartbeats.observe(&heartbeat, Instant::now());
                    events.push(MonitorEvent::Heartbeat(heartbeat));
                }
                Message::CommandRequest(request) => {
                    debug!(command_id = request.command_id, "ignoring command request");
                }
            }
        };
        MonitorReport { events, end }
    }

    /// Consume whatever is already queued without waiting. Heartbeats refresh liveness;
    /// late acks and status texts are returned.
    pub async fn pump(&mut self) -> Vec<MonitorEvent> {
        let mut events = Vec::new();
        loop {
            match self.link.try_recv().await {
                Ok(Some(Message::Heartbeat(heartbeat))) => {
                    self.heartbeats.observe(&heartbeat, Instant::now());
                }
                Ok(Some(Message::CommandAck(ack))) => events.push(MonitorEvent::Ack(ack)),
                Ok(Some(Message::StatusText(status))) => events.push(MonitorEvent::Status(status)),
                Ok(Some(Message::CommandRequest(_))) => {}
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, "transport failure while draining");
                    break;
                }
            }
        }
        events
    }

    /// Wait until the node's first heartbeat, beaconing our own meanwhile.
    pub async fn wait_for_heartbeat(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.beacon_if_due().await;
            let now = Instant::now();
            let slice = deadline.min(self.next_beacon).saturating_duration_since(now);
            if self.heartbeats.wait_for_first(&self.link, slice).await {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
        }
    }

    /// Whether the node was heard from within `stale_after`.
    pub fn is_peer_alive(&self, stale_after: Duration) -> bool {
        self.heartbeats.is_alive(Instant::now(), stale_after)
    }

    /// Send our own heartbeat if the interval has elapsed.
    pub async fn beacon_if_due(&mut self) {
        let now = Instant::now();
        if now < self.next_beacon {
            return;
        }
        let heartbeat = HeartbeatMessage::new(self.identity, PeerState::Active);
        if let Err(err) = self.link.send(&heartbeat.into()).await {
            warn!(error = %err, "failed to send heartbeat");
        }
        self.next_beacon = now + self.heartbeat_interval;
    }

    /// Close the underlying transport.
    pub async fn close(&self) -> Result<(), DispatchError> {
        self.link.close().await?;
        Ok(())
    }
}
