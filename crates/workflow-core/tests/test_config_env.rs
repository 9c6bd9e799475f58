//! BIZFLOW_* environment layering.
//! Kept in its own test binary: it mutates the process environment.

use std::path::PathBuf;
use workflow_core::config::{EnvOverrides, WorkflowConfig};

const VARS: [(&str, &str); 3] = [
    ("BIZFLOW_SERVER_PORT", "9123"),
    ("BIZFLOW_STORAGE_DATA_DIR", "/tmp/bizflow-env"),
    ("BIZFLOW_NOTIFICATIONS_WEBHOOK_URL", "https://hooks.example.com/env"),
];

#[test]
fn test_environment_overrides_file_values() {
    let saved: Vec<(&str, Option<String>)> = VARS
        .iter()
        .map(|(name, _)| (*name, std::env::var(name).ok()))
        .collect();
    for (name, value) in VARS {
        std::env::set_var(name, value);
    }

    let overrides = EnvOverrides::from_env();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{"server": {"host": "127.0.0.1", "port": 8181}, "storage": {"data_dir": "/var/lib/bizflow"}}"#,
    )
    .unwrap();
    let from_file = WorkflowConfig::from_file(&path);

    for (name, value) in saved {
        match value {
            Some(value) => std::env::set_var(name, value),
            None => std::env::remove_var(name),
        }
    }

    let overrides = overrides.unwrap();
    assert_eq!(overrides.server_port, Some(9123));
    assert_eq!(overrides.storage_data_dir, Some(PathBuf::from("/tmp/bizflow-env")));
    assert_eq!(
        overrides.notifications_webhook_url.as_deref(),
        Some("https://hooks.example.com/env")
    );

    let config = from_file.unwrap();
    assert_eq!(config.server.port, 9123);
    assert_eq!(config.server.bind_address, "127.0.0.1", "unset variables keep file values");
    assert_eq!(config.storage.data_dir, PathBuf::from("/tmp/bizflow-env"));
    assert_eq!(
        config.notifications.webhook_url.as_deref(),
        Some("https://hooks.example.com/env")
    );
}
