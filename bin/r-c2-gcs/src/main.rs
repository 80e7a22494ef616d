//! ---
//! c2_section: "05-networking-external-interfaces"
//! c2_subsection: "binary"
//! c2_type: "source"
//! c2_scope: "code"
//! c2_description: "Operator CLI for the ground control station."
//! c2_version: "v0.0.0-prealpha"
//! c2_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use r_c2_common::config::{AppConfig, StationConfig};
use r_c2_common::logging::init_tracing;
use r_c2_core::{CommandDispatcher, MonitorEnd, MonitorEvent, MonitorReport};
use r_c2_msg::{
    MessageLink, PeerIdentity, ScanDuration, ScanType, UdpTransport, COMMAND_PARAM_COUNT,
};
use tracing::info;

mod console;

const SERVICE: &str = "r-c2-gcs";

#[derive(Debug, Parser)]
#[command(
    author,
    version = concat!("R-C2 ground station ", env!("CARGO_PKG_VERSION")),
    about = "R-C2 ground control station",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, help = "Print monitor events as JSON lines")]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Interactive operator console")]
    Console,
    #[command(about = "Start a scan and follow its progress")]
    Scan {
        #[arg(long, value_parser = parse_duration, help = "Scan duration in seconds")]
        duration: ScanDuration,
        #[arg(
            long,
            value_parser = parse_scan_type,
            help = "Scan type: radar, lidar, sonar or 1, 2, 3"
        )]
        scan_type: ScanType,
    },
    #[command(about = "Check that the node is sending heartbeats")]
    Heartbeat,
    #[command(about = "Send a raw command request")]
    Command {
        #[arg(long, help = "Command identifier")]
        id: u16,
        #[arg(long = "param", allow_negative_numbers = true, help = "Command parameter, repeatable up to 7 times")]
        params: Vec<f32>,
        #[arg(long, default_value_t = 3, help = "Seconds to wait for the acknowledgement")]
        timeout: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("configs/r-c2.toml"));
    candidates.push(PathBuf::from("configs/example.toml"));

    let loaded = AppConfig::load_with_source(&candidates)?;
    let config = loaded.config;
    init_tracing(SERVICE, &config.logging)?;
    info!(config_path = %loaded.source.display(), "configuration loaded");

    let station = config.station;
    let mut dispatcher = connect(&station).await?;
    let outcome = run_command(
        cli.command.unwrap_or(Commands::Console),
        &mut dispatcher,
        &station,
        cli.json,
    )
    .await;
    dispatcher.close().await?;
    outcome
}

async fn connect(station: &StationConfig) -> Result<CommandDispatcher> {
    let transport = UdpTransport::bind(station.bind, station.peer)
        .await
        .with_context(|| format!("failed to bind station socket {}", station.bind))?;
    let link = MessageLink::new(Arc::new(transport));
    let identity = PeerIdentity::new(station.system_id, station.component_id);
    let mut dispatcher = CommandDispatcher::new(link, identity, station.heartbeat_interval);

    println!("Waiting for heartbeat from {} ...", station.peer);
    if !dispatcher
        .wait_for_heartbeat(station.heartbeat_timeout)
        .await
    {
        bail!(
            "no heartbeat from node at {} within {:?}",
            station.peer,
            station.heartbeat_timeout
        );
    }
    if let Some(peer) = dispatcher.heartbeats().peer() {
        println!("Heartbeat received from system {}", peer);
    }
    Ok(dispatcher)
}

async fn run_command(
    command: Commands,
    dispatcher: &mut CommandDispatcher,
    station: &StationConfig,
    json: bool,
) -> Result<()> {
    match command {
        Commands::Console => console::run(dispatcher, station, json).await,
        Commands::Heartbeat => {
            render_liveness(dispatcher, station);
            Ok(())
        }
        Commands::Scan {
            duration,
            scan_type,
        } => {
            let report = scan(dispatcher, station, duration, scan_type).await?;
            render_report(&report, json)?;
            check_report(&report)
        }
        Commands::Command {
            id,
            params,
            timeout,
        } => {
            let params = command_params(&params)?;
            dispatcher.send_command(id, params).await?;
            let report = dispatcher.monitor(Duration::from_secs(timeout)).await;
            render_report(&report, json)?;
            check_report(&report)
        }
    }
}

/// Send a scan and monitor for its full duration plus the configured grace.
pub(crate) async fn scan(
    dispatcher: &mut CommandDispatcher,
    station: &StationConfig,
    duration: ScanDuration,
    scan_type: ScanType,
) -> Result<MonitorReport> {
    dispatcher.send_scan_command(duration, scan_type).await?;
    let window = duration.to_std().saturating_add(station.monitor_grace);
    Ok(dispatcher.monitor(window).await)
}

pub(crate) fn render_liveness(dispatcher: &CommandDispatcher, station: &StationConfig) {
    let monitor = dispatcher.heartbeats();
    match (monitor.peer(), monitor.peer_state()) {
        (Some(peer), Some(state)) if dispatcher.is_peer_alive(station.stale_after) => {
            println!("Node {peer} is alive (state: {state})");
        }
        (Some(peer), _) => println!(
            "Node {peer} has been silent for more than {:?}",
            station.stale_after
        ),
        (None, _) => println!("No heartbeat seen yet"),
    }
}

pub(crate) fn render_events(events: &[MonitorEvent], json: bool) -> Result<()> {
    for event in events {
        if json {
            println!("{}", serde_json::to_string(event)?);
            continue;
        }
        match event {
            MonitorEvent::Ack(ack) => {
                println!("Command {} acknowledged: {}", ack.command_id, ack.result)
            }
            MonitorEvent::Status(status) => println!("[{}] {}", status.severity, status.text),
            MonitorEvent::Heartbeat(_) => {}
        }
    }
    Ok(())
}

pub(crate) fn render_report(report: &MonitorReport, json: bool) -> Result<()> {
    render_events(&report.events, json)?;
    if json {
        println!("{}", serde_json::to_string(&report.end)?);
        return Ok(());
    }
    match &report.end {
        MonitorEnd::TimedOut if report.ack_result().is_none() => {
            println!("No acknowledgement received")
        }
        MonitorEnd::TimedOut => println!("Monitoring finished"),
        MonitorEnd::Rejected(result) => println!("Command rejected: {result}"),
        MonitorEnd::TransportFailed(err) => println!("Link failure: {err}"),
    }
    Ok(())
}

fn check_report(report: &MonitorReport) -> Result<()> {
    match &report.end {
        MonitorEnd::Rejected(result) => bail!("command rejected: {result}"),
        MonitorEnd::TransportFailed(err) => bail!("link failure: {err}"),
        MonitorEnd::TimedOut if report.ack_result().is_none() => {
            bail!("no acknowledgement received")
        }
        MonitorEnd::TimedOut => Ok(()),
    }
}

fn command_params(values: &[f32]) -> Result<[f32; COMMAND_PARAM_COUNT]> {
    if values.len() > COMMAND_PARAM_COUNT {
        bail!(
            "at most {COMMAND_PARAM_COUNT} parameters are allowed, got {}",
            values.len()
        );
    }
    let mut params = [0.0; COMMAND_PARAM_COUNT];
    params[..values.len()].copy_from_slice(values);
    Ok(params)
}

pub(crate) fn parse_duration(raw: &str) -> Result<ScanDuration, String> {
    let seconds: f32 = raw
        .trim()
        .parse()
        .map_err(|_| format!("'{raw}' is not a number"))?;
    ScanDuration::from_secs(seconds)
        .ok_or_else(|| format!("duration must be a non-negative number of seconds, got {raw}"))
}

pub(crate) fn parse_scan_type(raw: &str) -> Result<ScanType, String> {
    let raw = raw.trim();
    if let Ok(scan_type) = raw.parse::<ScanType>() {
        return Ok(scan_type);
    }
    raw.parse::<f32>()
        .ok()
        .and_then(ScanType::from_code)
        .ok_or_else(|| format!("unknown scan type '{raw}' (expected radar, lidar, sonar or 1-3)"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_type_accepts_names_and_codes() {
        assert_eq!(parse_scan_type("radar"), Ok(ScanType::Radar));
        assert_eq!(parse_scan_type("LiDAR"), Ok(ScanType::Lidar));
        assert_eq!(parse_scan_type(" 3 "), Ok(ScanType::Sonar));
        assert!(parse_scan_type("4").is_err());
        assert!(parse_scan_type("x-ray").is_err());
    }

    #[test]
    fn duration_must_be_non_negative() {
        assert_eq!(
            parse_duration("2.5").map(|d| d.as_secs_f32()),
            Ok(2.5)
        );
        assert!(parse_duration("-1").is_err());
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn params_are_zero_padded() {
        let params = command_params(&[5.0, 2.0]).expect("two params");
        assert_eq!(params, [5.0, 2.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert!(command_params(&[0.0; 8]).is_err());
    }

    #[test]
    fn cli_parses_scan_subcommand() {
        let cli = Cli::try_parse_from([
            "r-c2-gcs",
            "scan",
            "--duration",
            "5",
            "--scan-type",
            "sonar",
        ])
        .expect("valid invocation");
        assert!(matches!(
            cli.command,
            Some(Commands::Scan {
                scan_type: ScanType::Sonar,
                ..
            })
        ));
    }
}
