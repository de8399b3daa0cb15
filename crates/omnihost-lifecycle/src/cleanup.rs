//! Post-lifecycle cleanup hooks.
//!
//! Hooks run after removals and updates. A failing hook is logged and never
//! changes the outcome of the operation it follows.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Point in the lifecycle a cleanup hook runs at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CleanupPhase {
    /// Extension was removed
    Removed,
    /// Update finished and the new version is running
    UpdateSucceeded,
    /// Update failed; a rollback may have been attempted
    UpdateFailed,
}

impl fmt::Display for CleanupPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CleanupPhase::Removed => write!(f, "removed"),
            CleanupPhase::UpdateSucceeded => write!(f, "update-succeeded"),
            CleanupPhase::UpdateFailed => write!(f, "update-failed"),
        }
    }
}

#[async_trait]
pub trait CleanupHook: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, extension_id: &str, phase: CleanupPhase) -> anyhow::Result<()>;
}

/// Runs `hooks` in order, logging failures.
pub async fn run_cleanup_hooks(
    hooks: &[Arc<dyn CleanupHook>],
    extension_id: &str,
    phase: CleanupPhase,
) {
    for hook in hooks {
        match hook.run(extension_id, phase).await {
            Ok(()) => debug!(extension_id = %extension_id, hook = %hook.name(), phase = %phase, "Cleanup hook ran"),
            Err(e) => warn!(
                extension_id = %extension_id,
                hook = %hook.name(),
                phase = %phase,
                error = %e,
                "Cleanup hook failed"
            ),
        }
    }
}
