//! Smoke test for the shipped configuration and an empty host

use omnihost_core::config::ExtensionsConfig;
use omnihost_core::HostConfig;
use omnihost_lifecycle::ExtensionHost;
use std::path::Path;

#[test]
fn test_sample_config_is_valid() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/omnihost.yaml");
    let config = HostConfig::from_file(&path).expect("Failed to load sample config");

    assert!(config.validate().is_ok());
    assert_eq!(config.lifecycle.drain_timeout_ms, 30_000);
    assert!(config.lifecycle.synthetic_fallback);
    assert!(!config.lifecycle.hot_reload);
}

#[tokio::test]
async fn test_empty_root_starts_and_shuts_down_cleanly() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config = HostConfig {
        extensions: ExtensionsConfig::rooted_at(dir.path()),
        ..HostConfig::default()
    };

    let host = ExtensionHost::new(config);
    let result = host.start().await;
    assert!(result.succeeded.is_empty());
    assert!(result.failed.is_empty());
    assert_eq!(host.registry().count(), 0);

    let report = host.shutdown().await;
    assert!(report.is_clean());
    assert!(report.issued.is_empty());
}
