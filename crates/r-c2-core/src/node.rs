//! ---
//! c2_section: "01-core-functionality"
//! c2_subsection: "module"
//! c2_type: "source"
//! c2_scope: "code"
//! c2_description: "Node runtime loop: heartbeat emission and command intake."
//! c2_version: "v0.0.0-prealpha"
//! c2_owner: "tbd"
//! ---
use std::time::Duration;

use anyhow::{Context, Result};
use r_c2_msg::{CommandRequest, HeartbeatMessage, Message, MessageLink, PeerIdentity};
use r_c2_rt::RateLimiter;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::heartbeat::HeartbeatMonitor;
use crate::scan::{NodeState, ScanStateMachine};

/// Single cooperative loop driving one node.
pub struct NodeRuntime {
    link: MessageLink,
    identity: PeerIdentity,
    heartbeat_interval: Duration,
    machine: ScanStateMachine,
    controller: HeartbeatMonitor,
}

impl NodeRuntime {
    pub fn new(
        link: MessageLink,
        identity: PeerIdentity,
        heartbeat_interval: Duration,
        machine: ScanStateMachine,
    ) -> Self {
        Self {
            link,
            identity,
            heartbeat_interval,
            machine,
            controller: HeartbeatMonitor::new(),
        }
    }

    pub fn state(&self) -> NodeState {
        self.machine.state()
    }

    /// Run until `shutdown` fires, then close the transport.
    ///
    /// Shutdown also interrupts a scan in progress.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let mut limiter = RateLimiter::new(self.heartbeat_interval);
        info!(
            identity = %self.identity,
            transport = self.link.transport_name(),
            interval = ?self.heartbeat_interval,
            "node loop running"
        );
        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    debug!("node shutdown signal received");
                    break;
                }
                _ = self.cycle(&mut limiter) => {}
            }
        }
        let metrics = self.link.metrics();
        info!(
            sent = metrics.sent,
            received = metrics.received,
            malformed = metrics.malformed,
            state = %self.machine.state(),
            "node loop stopped"
        );
        self.link
            .close()
            .await
            .context("failed to close node transport")
    }

    /// One tick: heartbeat, take at most one queued command, run an accepted scan to completion.
    ///
    /// Controller heartbeats and other non-command traffic queued ahead of the command are
    /// consumed in the same tick.
    async fn cycle(&mut self, limiter: &mut RateLimiter) {
        limiter.tick().await;

        let heartbeat = HeartbeatMessage::new(self.identity, self.machine.state().advertised());
        if let Err(err) = self.link.send(&heartbeat.into()).await {
            warn!(error = %err, "failed to send heartbeat");
        }

        if let Some(request) = self.next_command().await {
            info!(command_id = request.command_id, "command received");
            self.machine.handle_command(&request, &self.link).await;
        }
    }

    async fn next_command(&mut self) -> Option<CommandRequest> {
        loop {
            match self.link.try_recv().await {
                Ok(Some(Message::CommandRequest(request))) => return Some(request),
                Ok(Some(Message::Heartbeat(heartbeat))) => {
                    self.controller.observe(&heartbeat, Instant::now());
                }
                Ok(Some(other)) => {
                    debug!(kind = other.kind(), "ignoring message");
                }
                Ok(None) => return None,
                Err(err) => {
                    warn!(error = %err, "failed to poll transport");
                    return None;
                }
            }
        }
    }
}
