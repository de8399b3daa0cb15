//! End-to-end lifecycle tests against a temporary extension root.

mod common;

use common::{host, host_with_config, ExtensionTree, Journal};
use omnihost_core::types::ExtensionDescriptor;
use omnihost_extension_api::Extension;
use omnihost_lifecycle::{CleanupHook, CleanupPhase, ExtensionHost, SyntheticExtension};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_test::assert_ok;

const TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Discovery and startup
// ============================================================================

#[tokio::test]
async fn test_discovered_extension_is_started() {
    common::init_tracing();
    let tree = ExtensionTree::new();
    tree.add("echo", "1.0.0", 0);
    let journal = Journal::new();
    let host = host(&tree, &journal, &["echo"]);

    let result = host.start().await;
    assert!(result.is_success());
    assert!(result.succeeded.contains("echo"));

    let record = host.registry().get("echo").expect("echo should be registered");
    assert_eq!(record.version(), "1.0.0");
    assert_eq!(record.name(), "echo service");
    assert_eq!(record.author(), Some("tests"));
    assert!(record.is_started());
    assert_eq!(record.folder_path(), tree.folder("echo").as_path());
    assert_eq!(journal.entries_with("start:"), vec!["start:echo"]);

    let context = host.registry().context("echo").expect("context should be kept");
    assert!(context.primary_artifact().unwrap().ends_with("echo.pkg"));
    assert!(context.fingerprint().is_some());
}

#[tokio::test]
async fn test_disabled_folder_is_not_loaded() {
    let tree = ExtensionTree::new();
    tree.add("echo", "1.0.0", 0).add("paused", "1.0.0", 0);
    tree.disable("paused");
    let journal = Journal::new();
    let host = host(&tree, &journal, &["echo", "paused"]);

    let result = host.start().await;

    assert!(result.is_success());
    assert!(host.registry().has("echo"));
    assert!(!host.registry().has("paused"));
    assert!(journal.instances("paused").is_empty());
}

#[tokio::test]
async fn test_descriptor_without_entry_point_is_noop() {
    let tree = ExtensionTree::new();
    tree.add_with_entry_point("docs", "1.0.0", 0, "\"\"");
    let journal = Journal::new();
    let host = host(&tree, &journal, &[]);

    let result = host.start().await;

    assert!(result.succeeded.contains("docs"));
    assert!(!host.registry().has("docs"));
}

// ============================================================================
// Registry semantics
// ============================================================================

#[tokio::test]
async fn test_enable_twice_replaces_record() {
    let tree = ExtensionTree::new();
    tree.add("echo", "1.0.0", 0);
    let journal = Journal::new();
    let host = host(&tree, &journal, &["echo"]);
    let ops = host.operations();

    assert!(ops.enable_extensions(&["echo"], TIMEOUT).await.is_success());
    assert!(ops.enable_extensions(&["echo"], TIMEOUT).await.is_success());

    assert_eq!(host.registry().count(), 1);
    let instances = journal.instances("echo");
    assert_eq!(instances.len(), 2);
    let registered = host.registry().get("echo").unwrap();
    assert_eq!(
        Arc::as_ptr(&registered) as *const (),
        Arc::as_ptr(&instances[1]) as *const ()
    );
}

#[tokio::test]
async fn test_remove_is_idempotent() {
    let tree = ExtensionTree::new();
    tree.add("echo", "1.0.0", 0);
    let journal = Journal::new();
    let host = host(&tree, &journal, &["echo"]);
    host.start().await;

    let first = host.operations().remove_extensions(&["echo"], TIMEOUT).await;
    let second = host.operations().remove_extensions(&["echo"], TIMEOUT).await;
    let never = host.operations().remove_extensions(&["ghost"], TIMEOUT).await;

    assert!(first.succeeded.contains("echo"));
    assert!(second.succeeded.contains("echo"));
    assert!(never.succeeded.contains("ghost"));
    assert!(!host.registry().has("echo"));
    assert!(host.registry().context("echo").is_none());
    assert_eq!(journal.entries_with("stop:"), vec!["stop:echo"]);
    assert_eq!(journal.entries_with("cleanup:"), vec!["cleanup:echo:true"]);
}

#[tokio::test]
async fn test_remove_forces_unregister_when_stop_fails() {
    let tree = ExtensionTree::new();
    tree.add("echo", "1.0.0", 0);
    let journal = Journal::new();
    let host = host(&tree, &journal, &["echo"]);
    host.start().await;
    journal.fail_stop("echo");

    let result = host.operations().remove_extensions(&["echo"], TIMEOUT).await;

    assert!(result.succeeded.contains("echo"));
    assert!(!host.registry().has("echo"));
    assert!(host.registry().context("echo").is_none());
    assert_eq!(
        journal.entries_with("stop-failed:"),
        vec!["stop-failed:echo", "stop-failed:echo"]
    );
    assert_eq!(journal.entries_with("cleanup:"), vec!["cleanup:echo:true"]);
}

#[tokio::test]
async fn test_enable_disable_enable_round_trip() {
    let tree = ExtensionTree::new();
    tree.add("echo", "1.0.0", 0);
    let journal = Journal::new();
    let host = host(&tree, &journal, &["echo"]);
    let ops = host.operations();

    assert!(ops.enable_extensions(&["echo"], TIMEOUT).await.is_success());
    assert!(ops.disable_extensions(&["echo"], TIMEOUT).await.is_success());

    let disabled = host.registry().get("echo").expect("disable keeps the record");
    assert!(!disabled.is_enabled());
    assert!(disabled.is_stopped());

    assert!(ops.enable_extensions(&["echo"], TIMEOUT).await.is_success());
    let enabled = host.registry().get("echo").unwrap();
    assert!(enabled.is_enabled());
    assert!(enabled.is_started());
    assert_eq!(
        journal.entries_with("st"),
        vec!["start:echo", "stop:echo", "start:echo"]
    );
}

#[tokio::test]
async fn test_enable_disable_remove_leaves_registry_unchanged() {
    let tree = ExtensionTree::new();
    tree.add("echo", "1.0.0", 0).add("other", "1.0.0", 0);
    let journal = Journal::new();
    let host = host(&tree, &journal, &["echo", "other"]);
    let ops = host.operations();
    assert!(ops.enable_extensions(&["other"], TIMEOUT).await.is_success());
    let before = host.registry().count();

    assert!(ops.enable_extensions(&["echo"], TIMEOUT).await.is_success());
    assert!(ops.disable_extensions(&["echo"], TIMEOUT).await.is_success());
    assert!(ops.remove_extensions(&["echo"], TIMEOUT).await.is_success());

    assert!(!host.registry().has("echo"));
    assert_eq!(host.registry().count(), before);
    assert_eq!(journal.entries_with("cleanup:"), vec!["cleanup:echo:true"]);
}

// ============================================================================
// Batch operations
// ============================================================================

#[tokio::test]
async fn test_batch_partitions_success_and_failure() {
    let tree = ExtensionTree::new();
    tree.add("a", "1.0.0", 0).add("c", "1.0.0", 0);
    let journal = Journal::new();
    let host = host(&tree, &journal, &["a", "c"]);

    let result = host
        .operations()
        .enable_extensions(&["a", "b", "c", "a"], TIMEOUT)
        .await;

    assert_eq!(result.succeeded.iter().collect::<Vec<_>>(), vec!["a", "c"]);
    assert_eq!(result.failed.iter().collect::<Vec<_>>(), vec!["b"]);
    assert!(result.reason("b").is_some());
    assert_eq!(result.total(), 3);
    assert_eq!(journal.instances("a").len(), 1);
}

#[tokio::test]
async fn test_batch_start_failure_is_reported() {
    let tree = ExtensionTree::new();
    tree.add("flaky", "1.0.0", 0);
    let journal = Journal::new();
    journal.fail_start("flaky");
    let host = host(&tree, &journal, &["flaky"]);

    let result = host.operations().enable_extensions(&["flaky"], TIMEOUT).await;

    assert!(result.failed.contains("flaky"));
    assert!(result.reason("flaky").unwrap().contains("port already in use"));
}

#[tokio::test]
async fn test_batch_timeout_is_reported() {
    let tree = ExtensionTree::new();
    tree.add("slow", "1.0.0", 0);
    let journal = Journal::new();
    journal.delay_drain("slow", Duration::from_millis(500));
    let host = host(&tree, &journal, &["slow"]);
    host.start().await;

    let result = host
        .operations()
        .disable_extensions(&["slow"], Duration::from_millis(50))
        .await;

    assert!(result.failed.contains("slow"));
    assert!(result.reason("slow").unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_status_lists_registered_extensions() {
    let tree = ExtensionTree::new();
    tree.add("b", "2.0.0", 1).add("a", "1.0.0", 5);
    let journal = Journal::new();
    let host = host(&tree, &journal, &["a", "b"]);
    host.start().await;

    let status = host.operations().status();

    assert_eq!(status.len(), 2);
    assert_eq!(status[0].id, "a");
    assert_eq!(status[0].priority, 5);
    assert_eq!(status[1].version, "2.0.0");
    assert!(status.iter().all(|s| s.started && s.enabled));
    assert!(status.iter().all(|s| s.shutdown.can_shutdown_safely));
    assert!(status.iter().all(|s| s.fingerprint.is_some()));
}

// ============================================================================
// Update
// ============================================================================

#[tokio::test]
async fn test_update_to_newer_version() {
    let tree = ExtensionTree::new();
    tree.add("echo", "1.2.0", 0);
    let journal = Journal::new();
    let host = host(&tree, &journal, &["echo"]);
    host.start().await;

    tree.add("echo", "2.0.0", 0);
    let result = host.operations().update_extensions(&["echo"], TIMEOUT).await;

    assert!(result.is_success());
    assert_eq!(host.registry().get("echo").unwrap().version(), "2.0.0");
    let old = &journal.instances("echo")[0];
    assert!(old.is_stopped());
    assert!(!old.is_enabled());
    assert_eq!(
        journal.entries(),
        vec![
            "build:echo:1.2.0",
            "start:echo",
            "prepare:echo",
            "stop:echo",
            "cleanup:echo:false",
            "build:echo:2.0.0",
            "start:echo",
        ]
    );
}

#[tokio::test]
async fn test_update_to_older_version_still_proceeds() {
    let tree = ExtensionTree::new();
    tree.add("echo", "2.0.0", 0);
    let journal = Journal::new();
    let host = host(&tree, &journal, &["echo"]);
    host.start().await;

    tree.add("echo", "1.0.0", 0);
    let result = host.operations().update_extensions(&["echo"], TIMEOUT).await;

    assert!(result.is_success());
    let record = host.registry().get("echo").unwrap();
    assert_eq!(record.version(), "1.0.0");
    assert!(record.is_started());
}

#[tokio::test]
async fn test_update_of_unregistered_enables() {
    let tree = ExtensionTree::new();
    tree.add("echo", "1.0.0", 0);
    let journal = Journal::new();
    let host = host(&tree, &journal, &["echo"]);

    let result = host.operations().update_extensions(&["echo"], TIMEOUT).await;

    assert!(result.is_success());
    assert!(host.registry().get("echo").unwrap().is_started());
}

#[tokio::test]
async fn test_failed_update_rolls_back() {
    let tree = ExtensionTree::new();
    tree.add("echo", "1.0.0", 0);
    let journal = Journal::new();
    let host = host(&tree, &journal, &["echo"]);
    host.start().await;

    tree.write_manifest("echo", "2.0.0", 0, "echo-next");
    let result = host.operations().update_extensions(&["echo"], TIMEOUT).await;

    assert!(result.failed.contains("echo"));
    assert!(result.reason("echo").unwrap().contains("echo-next"));

    let record = host.registry().get("echo").expect("rollback should re-register");
    assert_eq!(record.version(), "1.0.0");
    assert!(record.is_started());
    assert_eq!(journal.instances("echo").len(), 2);
}

#[tokio::test]
async fn test_update_keeps_old_record_when_drain_fails() {
    let tree = ExtensionTree::new();
    tree.add("echo", "1.0.0", 0);
    let journal = Journal::new();
    let recorder = Arc::new(PhaseRecorder {
        phases: Mutex::new(Vec::new()),
    });
    let host = ExtensionHost::builder(tree.config())
        .factories(common::factories(&journal, &["echo"]))
        .cleanup_hook(recorder.clone())
        .build();
    host.start().await;

    journal.fail_stop("echo");
    tree.add("echo", "2.0.0", 0);
    let result = host.operations().update_extensions(&["echo"], TIMEOUT).await;

    assert!(result.failed.contains("echo"));
    assert!(result.reason("echo").unwrap().contains("listener refused to close"));
    let record = host.registry().get("echo").expect("old record stays registered");
    assert_eq!(record.version(), "1.0.0");
    assert!(host.registry().context("echo").is_some());
    assert_eq!(journal.instances("echo").len(), 1);
    assert_eq!(journal.entries_with("stop-failed:").len(), 2);
    assert_eq!(
        recorder.phases.lock().clone(),
        vec![("echo".to_string(), CleanupPhase::UpdateFailed)]
    );
}

struct PhaseRecorder {
    phases: Mutex<Vec<(String, CleanupPhase)>>,
}

#[async_trait::async_trait]
impl CleanupHook for PhaseRecorder {
    fn name(&self) -> &str {
        "phase-recorder"
    }

    async fn run(&self, extension_id: &str, phase: CleanupPhase) -> anyhow::Result<()> {
        self.phases.lock().push((extension_id.to_string(), phase));
        Ok(())
    }
}

#[tokio::test]
async fn test_cleanup_hooks_follow_outcome() {
    let tree = ExtensionTree::new();
    tree.add("echo", "1.0.0", 0);
    let journal = Journal::new();
    let recorder = Arc::new(PhaseRecorder {
        phases: Mutex::new(Vec::new()),
    });
    let host = ExtensionHost::builder(tree.config())
        .factories(common::factories(&journal, &["echo"]))
        .cleanup_hook(recorder.clone())
        .build();
    host.start().await;
    let ops = host.operations();

    tree.add("echo", "1.1.0", 0);
    ops.update_extensions(&["echo"], TIMEOUT).await;
    tree.write_manifest("echo", "1.2.0", 0, "missing");
    ops.update_extensions(&["echo"], TIMEOUT).await;
    ops.remove_extensions(&["echo"], TIMEOUT).await;

    let phases: Vec<CleanupPhase> = recorder.phases.lock().iter().map(|(_, p)| *p).collect();
    assert_eq!(
        phases,
        vec![
            CleanupPhase::UpdateSucceeded,
            CleanupPhase::UpdateFailed,
            CleanupPhase::Removed
        ]
    );
}

// ============================================================================
// Instantiation
// ============================================================================

#[tokio::test]
async fn test_synthetic_fallback_registers_placeholder() {
    let tree = ExtensionTree::new();
    tree.add("legacy", "3.1.0", 0);
    let journal = Journal::new();
    let factories = common::factories(&journal, &[]);
    factories.register(
        omnihost_extension_api::ExtensionFactory::new("legacy").constructor(
            vec![omnihost_extension_api::ParamType::Text; 5],
            |_, _| anyhow::bail!("never matched"),
        ),
    );
    let host = ExtensionHost::builder(tree.config()).factories(factories).build();

    let result = host.operations().enable_extensions(&["legacy"], TIMEOUT).await;

    assert!(result.is_success());
    let record = host.registry().get("legacy").unwrap();
    assert_eq!(record.version(), SyntheticExtension::VERSION);
    assert_eq!(record.author(), Some(SyntheticExtension::AUTHOR));
    assert!(record.is_enabled());
}

#[tokio::test]
async fn test_no_fallback_fails_enable() {
    let tree = ExtensionTree::new();
    tree.add("legacy", "3.1.0", 0);
    let journal = Journal::new();
    let mut config = tree.config();
    config.lifecycle.synthetic_fallback = false;
    let factories = common::factories(&journal, &[]);
    factories.register(
        omnihost_extension_api::ExtensionFactory::new("legacy")
            .constructor(vec![], |_, _| anyhow::bail!("socket unavailable")),
    );
    let host = ExtensionHost::builder(config).factories(factories).build();

    let result = host.operations().enable_extensions(&["legacy"], TIMEOUT).await;

    assert!(result.failed.contains("legacy"));
    assert!(result.reason("legacy").unwrap().contains("socket unavailable"));
    assert!(!host.registry().has("legacy"));
}

#[tokio::test]
async fn test_identity_mismatch_is_rejected() {
    let tree = ExtensionTree::new();
    tree.add_with_entry_point("alias", "1.0.0", 0, "echo");
    let journal = Journal::new();
    let factories = common::factories(&journal, &[]);
    let inner = Arc::clone(&journal);
    factories.register(
        omnihost_extension_api::ExtensionFactory::new("echo").constructor(vec![], move |ctx, args| {
            let mut renamed = ctx.clone();
            renamed.descriptor = ExtensionDescriptor::builder("someone-else").build();
            inner.factory("echo").constructors()[0].invoke(&renamed, args)
        }),
    );
    let host = ExtensionHost::builder(tree.config()).factories(factories).build();

    let result = host.operations().enable_extensions(&["alias"], TIMEOUT).await;

    assert!(result.failed.contains("alias"));
    assert!(result.reason("alias").unwrap().contains("someone-else"));
    assert!(!host.registry().has("alias"));
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test]
async fn test_drain_all_issues_by_priority() {
    let tree = ExtensionTree::new();
    tree.add("a", "1.0.0", 10)
        .add("b", "1.0.0", 5)
        .add("c", "1.0.0", 1);
    let journal = Journal::new();
    journal.delay_drain("a", Duration::from_millis(300));
    journal.delay_drain("b", Duration::from_millis(150));
    let host = host(&tree, &journal, &["a", "b", "c"]);
    host.start().await;

    let report = host.shutdown().await;

    assert_eq!(report.issued, vec!["a", "b", "c"]);
    assert_eq!(report.completed, vec!["c", "b", "a"]);
    assert!(report.is_clean());
    assert_eq!(journal.entries_with("stop:").len(), 3);
}

#[tokio::test]
async fn test_drain_all_gives_up_at_deadline() {
    let tree = ExtensionTree::new();
    tree.add("fast", "1.0.0", 0).add("hung", "1.0.0", 0);
    let journal = Journal::new();
    journal.delay_drain("hung", Duration::from_secs(30));
    let host = host(&tree, &journal, &["fast", "hung"]);
    host.start().await;

    let report = host
        .shutdown_manager()
        .drain_all(Duration::from_millis(200))
        .await;

    assert!(report.timed_out);
    assert_eq!(report.completed, vec!["fast"]);
    assert_eq!(report.unfinished, vec!["hung"]);
}

#[tokio::test(start_paused = true)]
async fn test_disable_with_stuck_request_is_bounded() {
    let tree = ExtensionTree::new();
    tree.add("http-slow", "1.0.0", 0);
    let journal = Journal::new();
    journal.stick("http-slow");
    let mut config = tree.config();
    config.lifecycle.drain_timeout_ms = 2_000;
    let host = host_with_config(config, &journal, &["http-slow"]);
    host.start().await;

    let started = Instant::now();
    let descriptor = host.registry().get("http-slow").unwrap().metadata().clone();
    assert_ok!(host.handler().disable(&descriptor).await);
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(2_000));
    assert!(elapsed <= Duration::from_millis(2_100));
    let record = journal.latest("http-slow").unwrap();
    assert_eq!(record.state.stop_count(), 1);
    assert!(!record.is_enabled());
}

#[tokio::test]
async fn test_stop_all_stops_everything() {
    let tree = ExtensionTree::new();
    tree.add("a", "1.0.0", 0).add("b", "1.0.0", 0);
    let journal = Journal::new();
    let host = host(&tree, &journal, &["a", "b"]);
    host.start().await;

    let failures = host.registry().stop_all().await;

    assert!(failures.is_empty());
    assert!(host.registry().get_all().iter().all(|r| r.is_stopped()));
}
