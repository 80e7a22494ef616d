//! ---
//! c2_section: "02-messaging-wire-protocol"
//! c2_subsection: "module"
//! c2_type: "source"
//! c2_scope: "code"
//! c2_description: "Datagram transports used by the node and ground station."
//! c2_version: "v0.0.0-prealpha"
//! c2_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

use crate::{Result, TransportError};

/// Largest datagram the UDP transport will accept.
pub const MAX_DATAGRAM_LEN: usize = 512;

/// Best-effort datagram transport. One payload per datagram, no ordering or delivery guarantees.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one datagram to the peer.
    async fn send(&self, payload: Bytes) -> Result<()>;
    /// Receive the next datagram, waiting at most `wait`. A zero `wait` polls without blocking.
    async fn recv(&self, wait: Duration) -> Result<Option<Bytes>>;
    /// Release the underlying resources; further calls fail with [`TransportError::Closed`].
    async fn close(&self) -> Result<()>;
    /// Human-readable transport name for logging/metrics.
    fn name(&self) -> &'static str;
}

/// UDP transport bound to a local endpoint and addressing a single peer.
pub struct UdpTransport {
    socket: UdpSocket,
    peer: SocketAddr,
    closed: AtomicBool,
}

impl UdpTransport {
    /// Bind `local` and address every datagram to `peer`.
    pub async fn bind(local: SocketAddr, peer: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(local).await?;
        info!(local = %socket.local_addr()?, peer = %peer, "udp transport bound");
        Ok(Self {
            socket,
            peer,
            closed: AtomicBool::new(false),
        })
    }

    /// Address actually bound, useful when binding port 0.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Address datagrams are sent to.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send(&self, payload: Bytes) -> Result<()> {
        self.ensure_open()?;
        self.socket.send_to(&payload, self.peer).await?;
        Ok(())
    }

    async fn recv(&self, wait: Duration) -> Result<Option<Bytes>> {
        self.ensure_open()?;
        let mut buf = vec![0u8; MAX_DATAGRAM_LEN];
        let received = if wait.is_zero() {
            match self.socket.try_recv_from(&mut buf) {
                Ok(received) => received,
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => return Ok(None),
                Err(err) => return Err(err.into()),
            }
        } else {
            match tokio::time::timeout(wait, self.socket.recv_from(&mut buf)).await {
                Ok(received) => received?,
                Err(_) => return Ok(None),
            }
        };
        let (len, from) = received;
        if from != self.peer {
            debug!(from = %from, expected = %self.peer, "datagram from unexpected endpoint");
        }
        buf.truncate(len);
        Ok(Some(Bytes::from(buf)))
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!(peer = %self.peer, "udp transport closed");
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "udp"
    }
}

/// In-memory transport endpoint; create connected endpoints with [`InMemoryTransport::pair`].
pub struct InMemoryTransport {
    outbound: mpsc::UnboundedSender<Bytes>,
    inbound: Mutex<mpsc::UnboundedReceiver<Bytes>>,
    closed: AtomicBool,
}

impl InMemoryTransport {
    /// Two endpoints where each one receives what the other sends.
    pub fn pair() -> (Arc<Self>, Arc<Self>) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        let a = Self {
            outbound: a_tx,
            inbound: Mutex::new(b_rx),
            closed: AtomicBool::new(false),
        };
        let b = Self {
            outbound: b_tx,
            inbound: Mutex::new(a_rx),
            closed: AtomicBool::new(false),
        };
        (Arc::new(a), Arc::new(b))
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn send(&self, payload: Bytes) -> Result<()> {
        self.ensure_open()?;
        // A vanished peer is indistinguishable from a lost datagram.
        let _ = self.outbound.send(payload);
        Ok(())
    }

    async fn recv(&self, wait: Duration) -> Result<Option<Bytes>> {
        self.ensure_open()?;
        let mut inbound = self.inbound.lock().await;
        if wait.is_zero() {
            return Ok(inbound.try_recv().ok());
        }
        match tokio::time::timeout(wait, inbound.recv()).await {
            Ok(Some(payload)) => Ok(Some(payload)),
            Ok(None) => {
                // Peer dropped; behave like a silent link for the rest of the window.
                drop(inbound);
                tokio::time::sleep(wait).await;
                Ok(None)
            }
            Err(_) => Ok(None),
        }
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "in_memory"
    }
}
