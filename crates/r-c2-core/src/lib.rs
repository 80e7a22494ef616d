//! ---
//! c2_section: "01-core-functionality"
//! c2_subsection: "module"
//! c2_type: "source"
//! c2_scope: "code"
//! c2_description: "Protocol state machines shared by the node and ground station."
//! c2_version: "v0.0.0-prealpha"
//! c2_owner: "tbd"
//! ---
//! Heartbeat liveness, command dispatch and the node scan state machine.

pub mod dispatcher;
pub mod heartbeat;
pub mod node;
pub mod scan;

pub use dispatcher::{CommandDispatcher, DispatchError, MonitorEnd, MonitorEvent, MonitorReport};
pub use heartbeat::HeartbeatMonitor;
pub use node::NodeRuntime;
pub use scan::{Admission, NodeState, Outbox, ScanPlan, ScanRunner, ScanStateMachine, TimedScan};
