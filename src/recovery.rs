//! Shared recovery action.
//!
//! Recovery is the system's only self-healing mechanism: in a browser
//! host it is a full page reload, which re-initializes all process-wide
//! state from scratch. Both the session liveness monitor and the
//! diagnostics retry path escalate through the same `Recovery` value,
//! and either may fire first. The action runs at most once per instance;
//! a second trigger while a reload is already in flight is a no-op.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Idempotent handle around the host-supplied recovery action.
#[derive(Clone)]
pub struct Recovery {
    inner: Arc<RecoveryInner>,
}

struct RecoveryInner {
    triggered: AtomicBool,
    action: Box<dyn Fn() + Send + Sync>,
}

impl Recovery {
    /// Wrap the host's recovery action (typically a page reload).
    pub fn new(action: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(RecoveryInner {
                triggered: AtomicBool::new(false),
                action: Box::new(action),
            }),
        }
    }

    /// Run the recovery action. Only the first call per instance runs
    /// it; later calls observe the in-flight recovery and return.
    pub fn trigger(&self) {
        if self.inner.triggered.swap(true, Ordering::SeqCst) {
            debug!("recovery already in flight, ignoring trigger");
            return;
        }
        info!("triggering recovery");
        (self.inner.action)();
    }

    /// Whether recovery has been triggered on this instance.
    pub fn triggered(&self) -> bool {
        self.inner.triggered.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Recovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recovery")
            .field("triggered", &self.triggered())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_trigger_runs_action_once() {
        let invocations = Arc::new(AtomicUsize::new(0));
        let counter = invocations.clone();
        let recovery = Recovery::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!recovery.triggered());
        recovery.trigger();
        recovery.trigger();
        recovery.trigger();

        assert!(recovery.triggered());
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_clones_share_the_guard() {
        let invocations = Arc::new(AtomicUsize::new(0));
        let counter = invocations.clone();
        let recovery = Recovery::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        // Two independent failure paths holding clones of the same handle.
        let from_monitor = recovery.clone();
        let from_retry = recovery.clone();
        from_monitor.trigger();
        from_retry.trigger();

        assert_eq!(invocations.load(Ordering::SeqCst), 1);
    }
}
