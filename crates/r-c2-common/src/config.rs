//! ---
//! c2_section: "01-core-functionality"
//! c2_subsection: "module"
//! c2_type: "source"
//! c2_scope: "code"
//! c2_description: "Shared primitives and utilities for the core runtime."
//! c2_version: "v0.0.0-prealpha"
//! c2_owner: "tbd"
//! ---
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_node_system_id() -> u8 {
    1
}

fn default_node_component_id() -> u8 {
    25
}

fn default_station_system_id() -> u8 {
    255
}

fn default_station_component_id() -> u8 {
    26
}

fn default_node_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 14550))
}

fn default_station_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 14551))
}

fn default_heartbeat_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_scan_tick() -> Duration {
    Duration::from_secs(1)
}

fn default_heartbeat_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_stale_after() -> Duration {
    Duration::from_secs(3)
}

fn default_monitor_grace() -> Duration {
    Duration::from_secs(1)
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9899))
}

/// Primary configuration object shared by the node daemon and the ground station.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub station: StationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "R_C2_CONFIG";

    /// Load configuration from disk, respecting the `R_C2_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: PathBuf) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.node.validate()?;
        self.station.validate()?;
        if (self.node.system_id, self.node.component_id)
            == (self.station.system_id, self.station.component_id)
        {
            return Err(anyhow!(
                "node and station must not share identity {}/{}",
                self.node.system_id,
                self.node.component_id
            ));
        }
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

fn validate_endpoint(section: &str, system_id: u8, bind: SocketAddr, peer: SocketAddr) -> Result<()> {
    if system_id == 0 {
        return Err(anyhow!("[{}] system_id 0 is reserved for broadcast", section));
    }
    if bind == peer {
        return Err(anyhow!(
            "[{}] bind and peer must differ (both {})",
            section,
            bind
        ));
    }
    Ok(())
}

fn validate_nonzero(section: &str, field: &str, value: Duration) -> Result<()> {
    if value.is_zero() {
        return Err(anyhow!("[{}] {} must be greater than zero", section, field));
    }
    Ok(())
}

/// Settings for the remote node daemon.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default = "default_node_system_id")]
    pub system_id: u8,
    #[serde(default = "default_node_component_id")]
    pub component_id: u8,
    #[serde(default = "default_node_bind")]
    pub bind: SocketAddr,
    #[serde(default = "default_station_bind")]
    pub peer: SocketAddr,
    #[serde(default = "default_heartbeat_interval")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub heartbeat_interval: Duration,
    #[serde(default = "default_scan_tick")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub scan_tick: Duration,
}

impl NodeConfig {
    pub fn validate(&self) -> Result<()> {
        validate_endpoint("node", self.system_id, self.bind, self.peer)?;
        validate_nonzero("node", "heartbeat_interval", self.heartbeat_interval)?;
        validate_nonzero("node", "scan_tick", self.scan_tick)?;
        Ok(())
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            system_id: default_node_system_id(),
            component_id: default_node_component_id(),
            bind: default_node_bind(),
            peer: default_station_bind(),
            heartbeat_interval: default_heartbeat_interval(),
            scan_tick: default_scan_tick(),
        }
    }
}

/// Settings for the ground control station.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationConfig {
    #[serde(default = "default_station_system_id")]
    pub system_id: u8,
    #[serde(default = "default_station_component_id")]
    pub component_id: u8,
    #[serde(default = "default_station_bind")]
    pub bind: SocketAddr,
    #[serde(default = "default_node_bind")]
    pub peer: SocketAddr,
    #[serde(default = "default_heartbeat_interval")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub heartbeat_interval: Duration,
    /// How long to wait for the first node heartbeat.
    #[serde(default = "default_heartbeat_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub heartbeat_timeout: Duration,
    /// Age after which the node is considered gone.
    #[serde(default = "default_stale_after")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub stale_after: Duration,
    /// Extra monitoring time added on top of a scan's duration.
    #[serde(default = "default_monitor_grace")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub monitor_grace: Duration,
}

impl StationConfig {
    pub fn validate(&self) -> Result<()> {
        validate_endpoint("station", self.system_id, self.bind, self.peer)?;
        validate_nonzero("station", "heartbeat_interval", self.heartbeat_interval)?;
        validate_nonzero("station", "heartbeat_timeout", self.heartbeat_timeout)?;
        validate_nonzero("station", "stale_after", self.stale_after)?;
        Ok(())
    }
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            system_id: default_station_system_id(),
            component_id: default_station_component_id(),
            bind: default_station_bind(),
            peer: default_node_bind(),
            heartbeat_interval: default_heartbeat_interval(),
            heartbeat_timeout: default_heartbeat_timeout(),
            stale_after: default_stale_after(),
            monitor_grace: default_monitor_grace(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            listen: default_metrics_listen(),
        }
    }
}
