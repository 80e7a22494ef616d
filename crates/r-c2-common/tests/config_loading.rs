//! ---
//! c2_section: "01-core-functionality"
//! c2_subsection: "integration-tests"
//! c2_type: "source"
//! c2_scope: "code"
//! c2_description: "Configuration discovery tests."
//! c2_version: "v0.0.0-prealpha"
//! c2_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::time::Duration;

use r_c2_common::config::AppConfig;

#[test]
fn loads_first_existing_candidate() {
    let dir = tempfile::tempdir().expect("tempdir");
    let missing = dir.path().join("missing.toml");
    let present = dir.path().join("r-c2.toml");
    std::fs::write(
        &present,
        r#"
[node]
heartbeat_interval = 2

[metrics]
enabled = false
"#,
    )
    .expect("write config");

    let loaded = AppConfig::load_with_source(&[missing, present.clone()]).expect("config loads");
    assert_eq!(loaded.source, present);
    assert_eq!(loaded.config.node.heartbeat_interval, Duration::from_secs(2));
    assert!(!loaded.config.metrics.enabled);
}

#[test]
fn reports_all_inspected_candidates() {
    let candidates = vec![
        PathBuf::from("does/not/exist-a.toml"),
        PathBuf::from("does/not/exist-b.toml"),
    ];
    let err = AppConfig::load(&candidates).expect_err("nothing to load");
    let message = err.to_string();
    assert!(message.contains("exist-a.toml"));
    assert!(message.contains("exist-b.toml"));
}

#[test]
fn invalid_file_surfaces_path_context() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "[node\nsystem_id = ").expect("write config");
    let err = AppConfig::load(&[path]).expect_err("parse error");
    assert!(format!("{err:#}").contains("broken.toml"));
}
