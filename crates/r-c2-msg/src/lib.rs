//! ---
//! c2_section: "02-messaging-wire-protocol"
//! c2_subsection: "module"
//! c2_type: "source"
//! c2_scope: "code"
//! c2_description: "Message schema, codec and transports for the C2 link."
//! c2_version: "v0.0.0-prealpha"
//! c2_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Wire model, codec and datagram transports for the R-C2 protocol.

pub mod codec;
pub mod link;
pub mod logging;
pub mod transport;
pub mod types;

/// Shared result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Failures raised by a transport adapter. Callers log them and decide whether to retry.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Socket level failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The transport was closed by its owner.
    #[error("transport closed")]
    Closed,
}

pub use codec::{decode, encode, DecodeError};
pub use link::{LinkMetrics, MessageLink};
pub use logging::{log_message, MessageDirection, LinkMetricsExporter};
pub use transport::{InMemoryTransport, Transport, UdpTransport};
pub use types::{
    CommandAck, CommandRequest, CommandResult, HeartbeatMessage, Message, PeerIdentity,
    PeerState, ScanDuration, ScanType, Severity, StatusText, CMD_START_SCAN, COMMAND_PARAM_COUNT,
    GCS_IDENTITY, MAX_STATUS_TEXT_LEN, NODE_IDENTITY, PROTOCOL_VERSION,
};
