//! ---
//! c2_section: "01-core-functionality"
//! c2_subsection: "module"
//! c2_type: "source"
//! c2_scope: "code"
//! c2_description: "Runtime helpers shared by the node and ground station."
//! c2_version: "v0.0.0-prealpha"
//! c2_owner: "tbd"
//! ---
//! Loop pacing and task supervision for the R-C2 runtime.

pub mod scheduling;

pub use scheduling::{RateLimiter, TaskGroup};
