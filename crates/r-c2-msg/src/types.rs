//! ---
//! c2_section: "02-messaging-wire-protocol"
//! c2_subsection: "module"
//! c2_type: "source"
//! c2_scope: "code"
//! c2_description: "Wire data model: identities, commands, acks and status texts."
//! c2_version: "v0.0.0-prealpha"
//! c2_owner: "tbd"
//! ---
use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Protocol version advertised in every heartbeat.
pub const PROTOCOL_VERSION: u8 = 2;

/// Command identifier for the scan operation.
pub const CMD_START_SCAN: u16 = 1;

/// Number of numeric parameters carried by a command request.
pub const COMMAND_PARAM_COUNT: usize = 7;

/// Upper bound for [`StatusText::text`], in bytes.
pub const MAX_STATUS_TEXT_LEN: usize = 50;

/// Identity of the ground control station.
pub const GCS_IDENTITY: PeerIdentity = PeerIdentity::new(255, 26);

/// Identity of the scan node.
pub const NODE_IDENTITY: PeerIdentity = PeerIdentity::new(1, 25);

/// Identifies a protocol participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerIdentity {
    /// System identifier.
    pub system_id: u8,
    /// Component identifier within the system.
    pub component_id: u8,
}

impl PeerIdentity {
    /// Construct an identity from its raw parts.
    pub const fn new(system_id: u8, component_id: u8) -> Self {
        Self {
            system_id,
            component_id,
        }
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.system_id, self.component_id)
    }
}

/// Operating state advertised in heartbeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum PeerState {
    /// Ready for work.
    Standby,
    /// Busy with an operation.
    Active,
}

/// Periodic liveness advertisement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatMessage {
    /// Who sent the heartbeat.
    pub sender: PeerIdentity,
    /// Operating state reported by the sender.
    pub state: PeerState,
    /// Protocol version spoken by the sender.
    pub protocol_version: u8,
}

impl HeartbeatMessage {
    /// Heartbeat for the current protocol version.
    pub fn new(sender: PeerIdentity, state: PeerState) -> Self {
        Self {
            sender,
            state,
            protocol_version: PROTOCOL_VERSION,
        }
    }
}

/// Request for the peer to execute a command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    /// Command identifier, e.g. [`CMD_START_SCAN`].
    pub command_id: u16,
    /// Transmission counter; `0` for the first transmission.
    pub confirmation: u8,
    /// Command parameters; unused slots are zero.
    pub params: [f32; COMMAND_PARAM_COUNT],
}

impl CommandRequest {
    /// First transmission of a command.
    pub fn new(command_id: u16, params: [f32; COMMAND_PARAM_COUNT]) -> Self {
        Self {
            command_id,
            confirmation: 0,
            params,
        }
    }

    /// Build a scan request for the given duration and scan type.
    pub fn start_scan(duration: ScanDuration, scan_type: ScanType) -> Self {
        Self::new(
            CMD_START_SCAN,
            [duration.as_secs_f32(), scan_type.code(), 0.0, 0.0, 0.0, 0.0, 0.0],
        )
    }

    /// Requested scan duration in seconds (`params[0]`).
    pub fn duration_param(&self) -> f32 {
        self.params[0]
    }

    /// Requested scan type code (`params[1]`).
    pub fn scan_type_param(&self) -> f32 {
        self.params[1]
    }
}

/// Outcome reported in a command acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandResult {
    /// The command was admitted.
    Accepted,
    /// The command cannot run right now.
    TemporarilyRejected,
    /// The command is not permitted.
    Denied,
    /// The command is unknown to the receiver.
    Unsupported,
    /// The command failed.
    Failed,
}

impl CommandResult {
    /// Whether the result ends a monitoring window.
    pub fn is_terminal(self) -> bool {
        !matches!(self, CommandResult::Accepted)
    }
}

/// Acknowledgement for a single [`CommandRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandAck {
    /// Command being acknowledged.
    pub command_id: u16,
    /// Admission decision.
    pub result: CommandResult,
}

/// Severity attached to a [`StatusText`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational.
    Info,
    /// Something unexpected but handled.
    Warning,
    /// An operation failed.
    Error,
}

/// Informational text, best effort and unordered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusText {
    /// Message severity.
    pub severity: Severity,
    /// Text, at most [`MAX_STATUS_TEXT_LEN`] bytes.
    pub text: String,
}

impl StatusText {
    /// Construct a status text, truncating on a character boundary when needed.
    pub fn new(severity: Severity, text: impl Into<String>) -> Self {
        let mut text = text.into();
        if text.len() > MAX_STATUS_TEXT_LEN {
            let mut cut = MAX_STATUS_TEXT_LEN;
            while !text.is_char_boundary(cut) {
                cut -= 1;
            }
            text.truncate(cut);
        }
        Self { severity, text }
    }

    /// Informational status text.
    pub fn info(text: impl Into<String>) -> Self {
        Self::new(Severity::Info, text)
    }

    /// Warning status text.
    pub fn warning(text: impl Into<String>) -> Self {
        Self::new(Severity::Warning, text)
    }
}

/// Every message kind exchanged on the link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Message {
    /// Liveness advertisement.
    Heartbeat(HeartbeatMessage),
    /// Command request.
    CommandRequest(CommandRequest),
    /// Command acknowledgement.
    CommandAck(CommandAck),
    /// Informational text.
    StatusText(StatusText),
}

impl Message {
    /// Convenience accessor returning the message kind as a static string.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Heartbeat(_) => "heartbeat",
            Message::CommandRequest(_) => "command_request",
            Message::CommandAck(_) => "command_ack",
            Message::StatusText(_) => "status_text",
        }
    }
}

impl From<HeartbeatMessage> for Message {
    fn from(value: HeartbeatMessage) -> Self {
        Message::Heartbeat(value)
    }
}

impl From<CommandRequest> for Message {
    fn from(value: CommandRequest) -> Self {
        Message::CommandRequest(value)
    }
}

impl From<CommandAck> for Message {
    fn from(value: CommandAck) -> Self {
        Message::CommandAck(value)
    }
}

impl From<StatusText> for Message {
    fn from(value: StatusText) -> Self {
        Message::StatusText(value)
    }
}

/// Closed set of scan types a node can perform.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter, EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum ScanType {
    /// Code 1.
    Radar,
    /// Code 2.
    #[strum(serialize = "LiDAR")]
    Lidar,
    /// Code 3.
    Sonar,
}

impl ScanType {
    /// Wire code carried in `params[1]`.
    pub fn code(self) -> f32 {
        match self {
            ScanType::Radar => 1.0,
            ScanType::Lidar => 2.0,
            ScanType::Sonar => 3.0,
        }
    }

    /// Parse a wire code; only the exact integers 1, 2 and 3 are recognised.
    pub fn from_code(code: f32) -> Option<Self> {
        if code == 1.0 {
            Some(ScanType::Radar)
        } else if code == 2.0 {
            Some(ScanType::Lidar)
        } else if code == 3.0 {
            Some(ScanType::Sonar)
        } else {
            None
        }
    }
}

/// Non-negative, finite scan duration in seconds.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct ScanDuration(f32);

impl ScanDuration {
    /// Validate a duration; negative and non-finite values are refused.
    pub fn from_secs(seconds: f32) -> Option<Self> {
        (seconds.is_finite() && seconds >= 0.0).then_some(Self(seconds))
    }

    /// Duration in seconds.
    pub fn as_secs_f32(self) -> f32 {
        self.0
    }

    /// Duration as a [`std::time::Duration`], saturating for absurdly large values.
    pub fn to_std(self) -> std::time::Duration {
        std::time::Duration::try_from_secs_f32(self.0).unwrap_or(std::time::Duration::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn status_text_truncates_on_char_boundary() {
        let long = "é".repeat(40);
        let status = StatusText::info(long);
        assert!(status.text.len() <= MAX_STATUS_TEXT_LEN);
        assert_eq!(status.text.chars().count(), MAX_STATUS_TEXT_LEN / 2);
    }

    #[test]
    fn scan_type_codes_roundtrip() {
        for scan_type in ScanType::iter() {
            assert_eq!(ScanType::from_code(scan_type.code()), Some(scan_type));
        }
        assert_eq!(ScanType::from_code(0.0), None);
        assert_eq!(ScanType::from_code(1.5), None);
        assert_eq!(ScanType::from_code(f32::NAN), None);
    }

    #[test]
    fn scan_type_names() {
        assert_eq!(ScanType::Lidar.to_string(), "LiDAR");
        assert_eq!("sonar".parse::<ScanType>().ok(), Some(ScanType::Sonar));
        assert_eq!("lidar".parse::<ScanType>().ok(), Some(ScanType::Lidar));
    }

    #[test]
    fn scan_duration_rejects_negative_and_nan() {
        assert!(ScanDuration::from_secs(-1.0).is_none());
        assert!(ScanDuration::from_secs(f32::NAN).is_none());
        assert!(ScanDuration::from_secs(f32::INFINITY).is_none());
        assert_eq!(ScanDuration::from_secs(0.0).map(|d| d.as_secs_f32()), Some(0.0));
    }

    #[test]
    fn start_scan_request_layout() {
        let duration = ScanDuration::from_secs(5.0).expect("valid duration");
        let request = CommandRequest::start_scan(duration, ScanType::Radar);
        assert_eq!(request.command_id, CMD_START_SCAN);
        assert_eq!(request.confirmation, 0);
        assert_eq!(request.params, [5.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn only_accepted_is_non_terminal() {
        assert!(!CommandResult::Accepted.is_terminal());
        assert!(CommandResult::TemporarilyRejected.is_terminal());
        assert!(CommandResult::Unsupported.is_terminal());
        assert_eq!(
            CommandResult::TemporarilyRejected.to_string(),
            "TEMPORARILY_REJECTED"
        );
    }
}
