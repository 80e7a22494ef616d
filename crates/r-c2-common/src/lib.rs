//! ---
//! c2_section: "01-core-functionality"
//! c2_subsection: "module"
//! c2_type: "source"
//! c2_scope: "code"
//! c2_description: "Shared primitives and utilities for the core runtime."
//! c2_version: "v0.0.0-prealpha"
//! c2_owner: "tbd"
//! ---
//! Shared primitives for the R-C2 workspace: configuration loading and
//! tracing initialisation consumed by the node daemon and the ground station.

pub mod config;
pub mod logging;

pub use config::{AppConfig, LoadedAppConfig, LoggingConfig, MetricsConfig, NodeConfig, StationConfig};
pub use logging::{init_tracing, LogFormat};
