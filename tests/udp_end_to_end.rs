//! ---
//! c2_section: "15-testing-qa-runbook"
//! c2_subsection: "integration-tests"
//! c2_type: "source"
//! c2_scope: "code"
//! c2_description: "Node and ground station talking over UDP loopback."
//! c2_version: "v0.0.0-prealpha"
//! c2_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use r_c2_core::{CommandDispatcher, MonitorEnd, NodeRuntime, ScanStateMachine, TimedScan};
use r_c2_msg::{
    CommandResult, MessageLink, ScanDuration, ScanType, UdpTransport, GCS_IDENTITY,
    NODE_IDENTITY,
};
use tokio::net::UdpSocket;
use tokio::sync::broadcast;

const INTERVAL: Duration = Duration::from_millis(100);

async fn free_addr() -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.expect("bind probe");
    socket.local_addr().expect("probe addr")
}

async fn start() -> (
    CommandDispatcher,
    broadcast::Sender<()>,
    tokio::task::JoinHandle<anyhow::Result<()>>,
) {
    let node_addr = free_addr().await;
    let gcs_addr = free_addr().await;

    let node_transport = UdpTransport::bind(node_addr, gcs_addr)
        .await
        .expect("bind node");
    let machine = ScanStateMachine::new(Arc::new(TimedScan::new(Duration::from_millis(50))));
    let runtime = NodeRuntime::new(
        MessageLink::new(Arc::new(node_transport)),
        NODE_IDENTITY,
        INTERVAL,
        machine,
    );
    let (shutdown, rx) = broadcast::channel(1);
    let node = tokio::spawn(runtime.run(rx));

    let gcs_transport = UdpTransport::bind(gcs_addr, node_addr)
        .await
        .expect("bind gcs");
    let dispatcher =
        CommandDispatcher::new(MessageLink::new(Arc::new(gcs_transport)), GCS_IDENTITY, INTERVAL);
    (dispatcher, shutdown, node)
}

#[tokio::test]
async fn scan_over_udp_reports_progress() {
    let (mut dispatcher, shutdown, node) = start().await;
    assert!(dispatcher.wait_for_heartbeat(Duration::from_secs(5)).await);

    let duration = ScanDuration::from_secs(3.0).expect("duration");
    dispatcher
        .send_scan_command(duration, ScanType::Lidar)
        .await
        .expect("send scan");
    let report = dispatcher.monitor(Duration::from_secs(2)).await;

    assert_eq!(report.end, MonitorEnd::TimedOut);
    assert_eq!(report.ack_result(), Some(CommandResult::Accepted));
    let texts: Vec<_> = report.status_texts().map(|s| s.text.as_str()).collect();
    assert_eq!(
        texts,
        vec![
            "Performing scan: LiDAR, state: Scanning",
            "Performing scan: LiDAR, state: Scanning",
            "Performing scan: LiDAR, state: Scanning",
            "State changed to: Idle",
        ]
    );

    shutdown.send(()).expect("node listening");
    node.await.expect("join").expect("clean stop");
}

#[tokio::test]
async fn unsupported_scan_type_is_rejected_over_udp() {
    let (mut dispatcher, shutdown, node) = start().await;
    assert!(dispatcher.wait_for_heartbeat(Duration::from_secs(5)).await);

    dispatcher
        .send_command(1, [2.0, 9.0, 0.0, 0.0, 0.0, 0.0, 0.0])
        .await
        .expect("send command");
    let report = dispatcher.monitor(Duration::from_secs(2)).await;
    assert_eq!(
        report.end,
        MonitorEnd::Rejected(CommandResult::TemporarilyRejected)
    );

    shutdown.send(()).expect("node listening");
    node.await.expect("join").expect("clean stop");
}

#[tokio::test]
async fn silent_node_fails_heartbeat_wait() {
    let node_addr = free_addr().await;
    let gcs_addr = free_addr().await;
    let transport = UdpTransport::bind(gcs_addr, node_addr).await.expect("bind");
    let mut dispatcher =
        CommandDispatcher::new(MessageLink::new(Arc::new(transport)), GCS_IDENTITY, INTERVAL);

    let started = std::time::Instant::now();
    assert!(!dispatcher.wait_for_heartbeat(Duration::from_millis(500)).await);
    assert!(started.elapsed() >= Duration::from_millis(500));
}
