//! ---
//! c2_section: "01-core-functionality"
//! c2_subsection: "module"
//! c2_type: "source"
//! c2_scope: "code"
//! c2_description: "Node-side scan admission and execution."
//! c2_version: "v0.0.0-prealpha"
//! c2_owner: "tbd"
//! ---
//! The node owns exactly one mutable operational state. Every command request is admitted
//! or rejected against it, and an accepted scan runs to completion before the next request
//! is looked at.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use r_c2_metrics::NodeMetrics;
use r_c2_msg::{
    CommandAck, CommandRequest, CommandResult, Message, MessageLink, PeerState, ScanType,
    StatusText, TransportError, CMD_START_SCAN,
};
use tracing::{debug, info, warn};

/// Operational state of the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeState {
    #[default]
    Idle,
    Scanning,
}

impl NodeState {
    /// State advertised in heartbeats.
    pub fn advertised(self) -> PeerState {
        match self {
            NodeState::Idle => PeerState::Standby,
            NodeState::Scanning => PeerState::Active,
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeState::Idle => f.write_str("Idle"),
            NodeState::Scanning => f.write_str("Scanning"),
        }
    }
}

/// Work to perform for an accepted scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanPlan {
    pub scan_type: ScanType,
    /// Number of one-tick progress steps.
    pub ticks: u64,
}

impl ScanPlan {
    /// Ticks for a requested duration: `ceil(seconds)`, zero for negative or non-finite input.
    pub fn ticks_for(seconds: f32) -> u64 {
        if !seconds.is_finite() || seconds <= 0.0 {
            return 0;
        }
        // Saturating float-to-int cast.
        seconds.ceil() as u64
    }
}

/// Outcome of admitting a command against the current state.
#[derive(Debug, Clone, PartialEq)]
pub struct Admission {
    pub ack: CommandAck,
    /// Explanation sent after the ack on rejection.
    pub status: Option<StatusText>,
    /// Present only when the scan was accepted.
    pub plan: Option<ScanPlan>,
}

/// Where the state machine sends acks and status texts.
#[async_trait]
pub trait Outbox: Send + Sync {
    async fn emit(&self, message: Message) -> Result<(), TransportError>;
}

#[async_trait]
impl Outbox for MessageLink {
    async fn emit(&self, message: Message) -> Result<(), TransportError> {
        self.send(&message).await
    }
}

/// Body of an accepted scan.
#[async_trait]
pub trait ScanRunner: Send + Sync {
    async fn run(&self, plan: &ScanPlan, outbox: &dyn Outbox) -> Result<()>;
}

/// Progress text sent once per scan tick.
pub fn progress_text(scan_type: ScanType) -> String {
    format!("Performing scan: {scan_type}, state: {}", NodeState::Scanning)
}

/// Scan-type parameter as shown in rejection texts: integral codes print plainly, anything
/// else in short scientific notation.
fn describe_code(code: f32) -> String {
    if code.fract() == 0.0 && code.abs() < 1e6 {
        format!("{}", code as i64)
    } else {
        format!("{code:.3e}")
    }
}

/// Placeholder scan: one progress text per tick, one tick per `tick` interval.
#[derive(Debug, Clone)]
pub struct TimedScan {
    tick: Duration,
}

impl TimedScan {
    pub fn new(tick: Duration) -> Self {
        Self { tick }
    }
}

impl Default for TimedScan {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[async_trait]
impl ScanRunner for TimedScan {
    async fn run(&self, plan: &ScanPlan, outbox: &dyn Outbox) -> Result<()> {
        for tick in 1..=plan.ticks {
            info!(scan_type = %plan.scan_type, tick, total = plan.ticks, "scanning");
            let progress = StatusText::info(progress_text(plan.scan_type));
            if let Err(err) = outbox.emit(progress.into()).await {
                warn!(error = %err, tick, "failed to send scan progress");
            }
            tokio::time::sleep(self.tick).await;
        }
        Ok(())
    }
}

/// Node-side owner of [`NodeState`].
pub struct ScanStateMachine {
    state: NodeState,
    runner: Arc<dyn ScanRunner>,
    metrics: Option<NodeMetrics>,
}

impl ScanStateMachine {
    pub fn new(runner: Arc<dyn ScanRunner>) -> Self {
        Self {
            state: NodeState::Idle,
            runner,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: NodeMetrics) -> Self {
        metrics.set_scanning(self.state == NodeState::Scanning);
        self.metrics = Some(metrics);
        self
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    /// Decide on a request. Accepting moves the machine to `Scanning`.
    pub fn admit(&mut self, request: &CommandRequest) -> Admission {
        let reject = |text: String| Admission {
            ack: CommandAck {
                command_id: request.command_id,
                result: CommandResult::TemporarilyRejected,
            },
            status: Some(StatusText::warning(text)),
            plan: None,
        };

        let admission = if request.command_id != CMD_START_SCAN {
            Admission {
                ack: CommandAck {
                    command_id: request.command_id,
                    result: CommandResult::Unsupported,
                },
                status: None,
                plan: None,
            }
        } else if self.state != NodeState::Idle {
            reject("Scan rejected: already scanning".to_owned())
        } else {
            match ScanType::from_code(request.scan_type_param()) {
                None => reject(format!(
                    "Scan rejected: unsupported scan type {}",
                    describe_code(request.scan_type_param())
                )),
                Some(scan_type) => {
                    self.set_state(NodeState::Scanning);
                    Admission {
                        ack: CommandAck {
                            command_id: request.command_id,
                            result: CommandResult::Accepted,
                        },
                        status: None,
                        plan: Some(ScanPlan {
                            scan_type,
                            ticks: ScanPlan::ticks_for(request.duration_param()),
                        }),
                    }
                }
            }
        };

        info!(
            command_id = request.command_id,
            result = %admission.ack.result,
            state = %self.state,
            "command admitted"
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_command(&admission.ack.result.to_string());
        }
        admission
    }

    /// Admit `request`, send the ack, then run an accepted scan to completion.
    ///
    /// Send failures are logged; the returned ack is the admission decision either way.
    pub async fn handle_command(
        &mut self,
        request: &CommandRequest,
        outbox: &dyn Outbox,
    ) -> CommandAck {
        let admission = self.admit(request);
        if let Err(err) = outbox.emit(admission.ack.into()).await {
            warn!(command_id = request.command_id, error = %err, "failed to send command ack");
        }
        if let Some(status) = admission.status {
            debug!(text = %status.text, "sending rejection status");
            if let Err(err) = outbox.emit(status.into()).await {
                warn!(error = %err, "failed to send status text");
            }
        }
        if let Some(plan) = admission.plan {
            self.run_scan(plan, outbox).await;
        }
        admission.ack
    }

    async fn run_scan(&mut self, plan: ScanPlan, outbox: &dyn Outbox) {
        info!(scan_type = %plan.scan_type, ticks = plan.ticks, "scan started");
        if let Err(err) = self.runner.run(&plan, outbox).await {
            warn!(error = %err, scan_type = %plan.scan_type, "scan runner failed");
        }
        self.set_state(NodeState::Idle);
        let done = StatusText::info(format!("State changed to: {}", NodeState::Idle));
        if let Err(err) = outbox.emit(done.into()).await {
            warn!(error = %err, "failed to send state change status");
        }
        info!(scan_type = %plan.scan_type, "scan finished");
    }

    fn set_state(&mut self, state: NodeState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "node state transition");
        }
        self.state = state;
        if let Some(metrics) = &self.metrics {
            metrics.set_scanning(state == NodeState::Scanning);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use r_c2_msg::{ScanDuration, Severity, MAX_STATUS_TEXT_LEN};
    use strum::IntoEnumIterator;

    #[derive(Default)]
    struct RecordingOutbox {
        sent: Mutex<Vec<Message>>,
    }

    impl RecordingOutbox {
        fn texts(&self) -> Vec<StatusText> {
            self.sent
                .lock()
                .iter()
                .filter_map(|message| match message {
                    Message::StatusText(status) => Some(status.clone()),
                    _ => None,
                })
                .collect()
        }
    }

    #[async_trait]
    impl Outbox for RecordingOutbox {
        async fn emit(&self, message: Message) -> Result<(), TransportError> {
            self.sent.lock().push(message);
            Ok(())
        }
    }

    struct FailingRunner;

    #[async_trait]
    impl ScanRunner for FailingRunner {
        async fn run(&self, _plan: &ScanPlan, _outbox: &dyn Outbox) -> Result<()> {
            anyhow::bail!("sensor offline")
        }
    }

    fn machine() -> ScanStateMachine {
        ScanStateMachine::new(Arc::new(TimedScan::default()))
    }

    fn scan(seconds: f32, scan_type: ScanType) -> CommandRequest {
        let duration = ScanDuration::from_secs(seconds).expect("valid duration");
        CommandRequest::start_scan(duration, scan_type)
    }

    #[tokio::test(start_paused = true)]
    async fn accepted_scan_reports_each_tick_then_idle() {
        let mut machine = machine();
        let outbox = RecordingOutbox::default();

        let started = tokio::time::Instant::now();
        let ack = machine
            .handle_command(&scan(5.0, ScanType::Radar), &outbox)
            .await;
        assert_eq!(ack.result, CommandResult::Accepted);
        assert_eq!(machine.state(), NodeState::Idle);
        assert!(started.elapsed() >= Duration::from_secs(5));

        let sent = outbox.sent.lock().clone();
        assert!(matches!(
            sent.first(),
            Some(Message::CommandAck(CommandAck {
                result: CommandResult::Accepted,
                ..
            }))
        ));
        let texts = outbox.texts();
        assert_eq!(texts.len(), 6);
        for progress in &texts[..5] {
            assert_eq!(progress.text, "Performing scan: Radar, state: Scanning");
        }
        assert_eq!(texts[5].text, "State changed to: Idle");
    }

    #[tokio::test(start_paused = true)]
    async fn fractional_duration_rounds_up() {
        let mut machine = machine();
        let outbox = RecordingOutbox::default();
        machine
            .handle_command(&scan(2.5, ScanType::Lidar), &outbox)
            .await;
        let texts = outbox.texts();
        assert_eq!(texts.len(), 4);
        assert!(texts[0].text.contains("LiDAR"));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_duration_scan_goes_straight_back_to_idle() {
        let mut machine = machine();
        let outbox = RecordingOutbox::default();
        let ack = machine
            .handle_command(&scan(0.0, ScanType::Sonar), &outbox)
            .await;
        assert_eq!(ack.result, CommandResult::Accepted);
        let texts = outbox.texts();
        assert_eq!(texts.len(), 1);
        assert_eq!(texts[0].text, "State changed to: Idle");
    }

    #[test]
    fn unknown_command_is_unsupported_in_both_states() {
        let mut machine = machine();
        let request = CommandRequest::new(999, [0.0; 7]);

        let idle = machine.admit(&request);
        assert_eq!(idle.ack.result, CommandResult::Unsupported);
        assert!(idle.status.is_none());
        assert_eq!(machine.state(), NodeState::Idle);

        machine.state = NodeState::Scanning;
        let busy = machine.admit(&request);
        assert_eq!(busy.ack.result, CommandResult::Unsupported);
        assert!(busy.status.is_none());
        assert_eq!(machine.state(), NodeState::Scanning);
    }

    #[test]
    fn start_scan_while_scanning_is_rejected() {
        let mut machine = machine();
        assert!(machine.admit(&scan(3.0, ScanType::Radar)).plan.is_some());
        assert_eq!(machine.state(), NodeState::Scanning);

        let admission = machine.admit(&scan(3.0, ScanType::Sonar));
        assert_eq!(admission.ack.result, CommandResult::TemporarilyRejected);
        assert!(admission.plan.is_none());
        let status = admission.status.expect("rejection explained");
        assert_eq!(status.severity, Severity::Warning);
        assert_eq!(status.text, "Scan rejected: already scanning");
        assert_eq!(machine.state(), NodeState::Scanning);
    }

    #[tokio::test]
    async fn busy_rejection_sends_ack_then_one_status() {
        let mut machine = machine();
        machine.state = NodeState::Scanning;
        let outbox = RecordingOutbox::default();

        let ack = machine
            .handle_command(&scan(1.0, ScanType::Radar), &outbox)
            .await;
        assert_eq!(ack.result, CommandResult::TemporarilyRejected);
        let sent = outbox.sent.lock().clone();
        assert_eq!(sent.len(), 2);
        assert!(matches!(sent[0], Message::CommandAck(_)));
        assert_eq!(outbox.texts()[0].text, "Scan rejected: already scanning");
        assert_eq!(machine.state(), NodeState::Scanning);
    }

    #[test]
    fn unsupported_scan_type_is_temporarily_rejected() {
        let mut machine = machine();
        let request = CommandRequest::new(CMD_START_SCAN, [5.0, 7.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        let admission = machine.admit(&request);
        assert_eq!(admission.ack.result, CommandResult::TemporarilyRejected);
        assert_eq!(
            admission.status.map(|s| s.text),
            Some("Scan rejected: unsupported scan type 7".to_owned())
        );
        assert_eq!(machine.state(), NodeState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn every_emitted_text_fits_one_status_message() {
        for scan_type in ScanType::iter() {
            let mut machine = machine();
            let outbox = RecordingOutbox::default();
            machine.handle_command(&scan(1.0, scan_type), &outbox).await;
            let texts = outbox.texts();
            assert_eq!(texts[0].text, progress_text(scan_type));
            assert!(progress_text(scan_type).len() <= MAX_STATUS_TEXT_LEN);
        }

        let mut machine = machine();
        for code in [7.0, -3.0, 2.5, f32::MAX, f32::MIN_POSITIVE, f32::NAN, f32::INFINITY] {
            let request = CommandRequest::new(CMD_START_SCAN, [1.0, code, 0.0, 0.0, 0.0, 0.0, 0.0]);
            let full = format!("Scan rejected: unsupported scan type {}", describe_code(code));
            assert!(full.len() <= MAX_STATUS_TEXT_LEN, "{full}");
            let status = machine.admit(&request).status.expect("rejection explained");
            assert_eq!(status.text, full);
        }

        machine.state = NodeState::Scanning;
        let busy = machine.admit(&scan(1.0, ScanType::Radar)).status.expect("busy explained");
        assert_eq!(busy.text, "Scan rejected: already scanning");
        assert!(format!("State changed to: {}", NodeState::Idle).len() <= MAX_STATUS_TEXT_LEN);
    }

    #[test]
    fn trailing_params_are_ignored() {
        let mut machine = machine();
        let request =
            CommandRequest::new(CMD_START_SCAN, [1.0, 1.0, 42.0, -3.0, 9.0, 1e9, f32::NAN]);
        assert_eq!(machine.admit(&request).ack.result, CommandResult::Accepted);
    }

    #[test]
    fn tick_count_handles_odd_durations() {
        assert_eq!(ScanPlan::ticks_for(0.0), 0);
        assert_eq!(ScanPlan::ticks_for(0.1), 1);
        assert_eq!(ScanPlan::ticks_for(3.0), 3);
        assert_eq!(ScanPlan::ticks_for(-2.0), 0);
        assert_eq!(ScanPlan::ticks_for(f32::NAN), 0);
        assert_eq!(ScanPlan::ticks_for(f32::INFINITY), 0);
    }

    #[tokio::test]
    async fn runner_failure_still_returns_to_idle() {
        let mut machine = ScanStateMachine::new(Arc::new(FailingRunner));
        let outbox = RecordingOutbox::default();
        let ack = machine
            .handle_command(&scan(3.0, ScanType::Radar), &outbox)
            .await;
        assert_eq!(ack.result, CommandResult::Accepted);
        assert_eq!(machine.state(), NodeState::Idle);
        assert_eq!(outbox.texts().last().map(|s| s.text.as_str()), Some("State changed to: Idle"));
    }

    #[test]
    fn node_state_maps_to_heartbeat_state() {
        assert_eq!(NodeState::Idle.advertised(), PeerState::Standby);
        assert_eq!(NodeState::Scanning.advertised(), PeerState::Active);
    }
}
