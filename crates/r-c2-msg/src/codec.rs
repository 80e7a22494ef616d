//! ---
//! c2_section: "02-messaging-wire-protocol"
//! c2_subsection: "module"
//! c2_type: "source"
//! c2_scope: "code"
//! c2_description: "Binary datagram codec for protocol messages."
//! c2_version: "v0.0.0-prealpha"
//! c2_owner: "tbd"
//! ---
//! Binary datagram codec.
//!
//! Every datagram carries exactly one message. Integers are big-endian.
//!
//! ```text
//! [magic 0xC2][kind u8][body ...]
//! 0x01 heartbeat       system_id u8, component_id u8, state u8, version u8
//! 0x02 command request command_id u16, confirmation u8, 7 x f32
//! 0x03 command ack     command_id u16, result u8
//! 0x04 status text     severity u8, len u8, len bytes of UTF-8
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::types::{
    CommandAck, CommandRequest, CommandResult, HeartbeatMessage, Message, PeerIdentity,
    PeerState, Severity, StatusText, COMMAND_PARAM_COUNT, MAX_STATUS_TEXT_LEN,
};

/// First byte of every datagram.
pub const FRAME_MAGIC: u8 = 0xC2;

const KIND_HEARTBEAT: u8 = 0x01;
const KIND_COMMAND_REQUEST: u8 = 0x02;
const KIND_COMMAND_ACK: u8 = 0x03;
const KIND_STATUS_TEXT: u8 = 0x04;

const HEADER_LEN: usize = 2;
const HEARTBEAT_LEN: usize = 4;
const COMMAND_REQUEST_LEN: usize = 2 + 1 + 4 * COMMAND_PARAM_COUNT;
const COMMAND_ACK_LEN: usize = 3;

/// Reasons a datagram could not be decoded. Callers skip the datagram and continue.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Zero-length datagram.
    #[error("empty datagram")]
    Empty,
    /// First byte is not [`FRAME_MAGIC`].
    #[error("bad frame magic 0x{0:02x}")]
    BadMagic(u8),
    /// Kind byte does not name a known message.
    #[error("unknown message kind 0x{0:02x}")]
    UnknownKind(u8),
    /// Body shorter than the kind requires.
    #[error("truncated {kind} body: need {needed} bytes, have {available}")]
    Truncated {
        /// Message kind being decoded.
        kind: &'static str,
        /// Bytes required.
        needed: usize,
        /// Bytes present.
        available: usize,
    },
    /// Extra bytes after a complete message.
    #[error("{0} trailing bytes after message")]
    TrailingBytes(usize),
    /// Enum field holds an unassigned value.
    #[error("invalid {field} value {value}")]
    InvalidEnum {
        /// Field name.
        field: &'static str,
        /// Raw value.
        value: u8,
    },
    /// Status text length prefix exceeds the protocol bound.
    #[error("status text of {0} bytes exceeds limit")]
    TextTooLong(usize),
    /// Status text is not valid UTF-8.
    #[error("status text is not valid utf-8")]
    InvalidUtf8,
}

/// Encode a message into a single datagram payload.
pub fn encode(message: &Message) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + COMMAND_REQUEST_LEN);
    buf.put_u8(FRAME_MAGIC);
    match message {
        Message::Heartbeat(heartbeat) => {
            buf.put_u8(KIND_HEARTBEAT);
            buf.put_u8(heartbeat.sender.system_id);
            buf.put_u8(heartbeat.sender.component_id);
            buf.put_u8(peer_state_code(heartbeat.state));
            buf.put_u8(heartbeat.protocol_version);
        }
        Message::CommandRequest(request) => {
            buf.put_u8(KIND_COMMAND_REQUEST);
            buf.put_u16(request.command_id);
            buf.put_u8(request.confirmation);
            for param in request.params {
                buf.put_f32(param);
            }
        }
        Message::CommandAck(ack) => {
            buf.put_u8(KIND_COMMAND_ACK);
            buf.put_u16(ack.command_id);
            buf.put_u8(result_code(ack.result));
        }
        Message::StatusText(status) => {
            buf.put_u8(KIND_STATUS_TEXT);
            buf.put_u8(severity_code(status.severity));
            // Texts built by hand may exceed the bound; cut them like the constructor does.
            let text = StatusText::new(status.severity, status.text.as_str()).text;
            buf.put_u8(text.len() as u8);
            buf.put_slice(text.as_bytes());
        }
    }
    buf.freeze()
}

/// Decode a datagram payload. Never panics; any malformed input yields a [`DecodeError`].
pub fn decode(datagram: &[u8]) -> Result<Message, DecodeError> {
    let mut buf = datagram;
    if buf.is_empty() {
        return Err(DecodeError::Empty);
    }
    let magic = buf.get_u8();
    if magic != FRAME_MAGIC {
        return Err(DecodeError::BadMagic(magic));
    }
    if buf.is_empty() {
        return Err(DecodeError::Truncated {
            kind: "header",
            needed: 1,
            available: 0,
        });
    }
    let message = match buf.get_u8() {
        KIND_HEARTBEAT => {
            require(&buf, "heartbeat", HEARTBEAT_LEN)?;
            let sender = PeerIdentity::new(buf.get_u8(), buf.get_u8());
            let state = peer_state_from(buf.get_u8())?;
            let protocol_version = buf.get_u8();
            Message::Heartbeat(HeartbeatMessage {
                sender,
                state,
                protocol_version,
            })
        }
        KIND_COMMAND_REQUEST => {
            require(&buf, "command_request", COMMAND_REQUEST_LEN)?;
            let command_id = buf.get_u16();
            let confirmation = buf.get_u8();
            let mut params = [0.0f32; COMMAND_PARAM_COUNT];
            for param in params.iter_mut() {
                *param = buf.get_f32();
            }
            Message::CommandRequest(CommandRequest {
                command_id,
                confirmation,
                params,
            })
        }
        KIND_COMMAND_ACK => {
            require(&buf, "command_ack", COMMAND_ACK_LEN)?;
            let command_id = buf.get_u16();
            let result = result_from(buf.get_u8())?;
            Message::CommandAck(CommandAck { command_id, result })
        }
        KIND_STATUS_TEXT => {
            require(&buf, "status_text", 2)?;
            let severity = severity_from(buf.get_u8())?;
            let len = usize::from(buf.get_u8());
            if len > MAX_STATUS_TEXT_LEN {
                return Err(DecodeError::TextTooLong(len));
            }
            require(&buf, "status_text", len)?;
            let text = std::str::from_utf8(&buf[..len])
                .map_err(|_| DecodeError::InvalidUtf8)?
                .to_owned();
            buf.advance(len);
            Message::StatusText(StatusText { severity, text })
        }
        other => return Err(DecodeError::UnknownKind(other)),
    };
    if buf.has_remaining() {
        return Err(DecodeError::TrailingBytes(buf.remaining()));
    }
    Ok(message)
}

fn require(buf: &[u8], kind: &'static str, needed: usize) -> Result<(), DecodeError> {
    if buf.len() < needed {
        return Err(DecodeError::Truncated {
            kind,
            needed,
            available: buf.len(),
        });
    }
    Ok(())
}

fn peer_state_code(state: PeerState) -> u8 {
    match state {
        PeerState::Standby => 3,
        PeerState::Active => 4,
    }
}

fn peer_state_from(value: u8) -> Result<PeerState, DecodeError> {
    match value {
        3 => Ok(PeerState::Standby),
        4 => Ok(PeerState::Active),
        value => Err(DecodeError::InvalidEnum {
            field: "state",
            value,
        }),
    }
}

fn result_code(result: CommandResult) -> u8 {
    match result {
        CommandResult::Accepted => 0,
        CommandResult::TemporarilyRejected => 1,
        CommandResult::Denied => 2,
        CommandResult::Unsupported => 3,
        CommandResult::Failed => 4,
    }
}

fn result_from(value: u8) -> Result<CommandResult, DecodeError> {
    match value {
        0 => Ok(CommandResult::Accepted),
        1 => Ok(CommandResult::TemporarilyRejected),
        2 => Ok(CommandResult::Denied),
        3 => Ok(CommandResult::Unsupported),
        4 => Ok(CommandResult::Failed),
        value => Err(DecodeError::InvalidEnum {
            field: "result",
            value,
        }),
    }
}

fn severity_code(severity: Severity) -> u8 {
    match severity {
        Severity::Error => 3,
        Severity::Warning => 4,
        Severity::Info => 6,
    }
}

fn severity_from(value: u8) -> Result<Severity, DecodeError> {
    match value {
        3 => Ok(Severity::Error),
        4 => Ok(Severity::Warning),
        6 => Ok(Severity::Info),
        value => Err(DecodeError::InvalidEnum {
            field: "severity",
            value,
        }),
    }
}
