//! Stage orchestration for the resolution pipeline.
//!
//! The gate chain runs in dependency order: the environment resolves
//! first, then the network-client probe and the identity resolver run
//! concurrently (identity may race ahead), and the device posture
//! projection derives from both. Ordering is enforced by the
//! projection's gating, not by sequencing the fetches. The session
//! liveness monitor and the diagnostics retry path are deliberately not
//! wired in here; they run on their own timelines against the shared
//! recovery action.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::client::PortalClient;
use crate::env::{resolve_environment, EnvConfig};
use crate::identity::{fetch_identity, IdentityState};
use crate::posture::{spawn_projection, DeviceProjection};
use crate::probe::{run_probe, ProbeState};

/// Per-stage progress, queryable by the host for loading indicators.
#[derive(Debug, Clone, Default)]
pub enum StageStatus {
    #[default]
    NotStarted,
    InProgress,
    Success,
    Failed(String),
}

impl StageStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, StageStatus::Success)
    }
}

/// One resolution run per page load.
pub struct Pipeline {
    client: Arc<PortalClient>,
    env: Option<Arc<EnvConfig>>,
    env_status: StageStatus,
    probe_rx: Option<watch::Receiver<ProbeState>>,
    identity_rx: Option<watch::Receiver<IdentityState>>,
    projection_rx: Option<watch::Receiver<DeviceProjection>>,
}

impl Pipeline {
    pub fn new(client: Arc<PortalClient>) -> Self {
        Self {
            client,
            env: None,
            env_status: StageStatus::NotStarted,
            probe_rx: None,
            identity_rx: None,
            projection_rx: None,
        }
    }

    /// The shared environment configuration, read-only after `run`
    /// loads it.
    pub fn env_config(&self) -> Option<Arc<EnvConfig>> {
        self.env.clone()
    }

    pub fn env_status(&self) -> &StageStatus {
        &self.env_status
    }

    /// Latest probe determination, if the probe stage has started.
    pub fn probe_state(&self) -> Option<ProbeState> {
        self.probe_rx.as_ref().map(|rx| rx.borrow().clone())
    }

    /// Latest identity resolver state, if the stage has started.
    pub fn identity_state(&self) -> Option<IdentityState> {
        self.identity_rx.as_ref().map(|rx| rx.borrow().clone())
    }

    /// Run the gate chain. Returns a receiver for the device posture
    /// projection; `on_loaded` fires exactly once when the projection
    /// settles.
    ///
    /// Runs at most once per pipeline instance: the probe determination
    /// is made exactly once per page load, so a repeat call does not
    /// re-fetch anything; it returns the existing projection receiver
    /// and its `on_loaded` is dropped unfired.
    ///
    /// An environment failure is terminal for configuration-dependent
    /// stages: the probe folds it into a Disabled determination (no
    /// worker domain to target) while theme and flag consumers degrade
    /// to defaults.
    pub async fn run(
        &mut self,
        on_loaded: impl Fn() + Send + 'static,
    ) -> watch::Receiver<DeviceProjection> {
        if let Some(projection_rx) = &self.projection_rx {
            warn!("resolution pipeline already started, returning existing projection");
            return projection_rx.clone();
        }

        self.env_status = StageStatus::InProgress;
        let env = match resolve_environment(&self.client).await {
            Ok(config) => {
                self.env_status = StageStatus::Success;
                Arc::new(config)
            }
            Err(e) => {
                warn!("environment unavailable, degrading to defaults: {}", e);
                self.env_status = StageStatus::Failed(e.user_message());
                Arc::new(EnvConfig::default())
            }
        };
        self.env = Some(env.clone());

        let (probe_tx, probe_rx) = watch::channel(ProbeState::Pending);
        let (identity_tx, identity_rx) = watch::channel(IdentityState::Pending);

        {
            let client = self.client.clone();
            let env = env.clone();
            tokio::spawn(async move {
                let state = run_probe(&client, &env).await;
                let _ = probe_tx.send(state);
            });
        }
        {
            let client = self.client.clone();
            tokio::spawn(async move {
                let state = fetch_identity(&client).await;
                let _ = identity_tx.send(state);
            });
        }

        self.probe_rx = Some(probe_rx.clone());
        self.identity_rx = Some(identity_rx.clone());

        info!("resolution pipeline started");
        let (projection_rx, _task) = spawn_projection(probe_rx, identity_rx, on_loaded);
        self.projection_rx = Some(projection_rx.clone());
        projection_rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_status() {
        let status = StageStatus::default();
        assert!(!status.is_success());
        assert!(StageStatus::Success.is_success());
        assert!(!StageStatus::Failed("error".to_string()).is_success());
    }

    #[test]
    fn test_pipeline_starts_empty() {
        let client = Arc::new(PortalClient::new("https://portal.example.com").unwrap());
        let pipeline = Pipeline::new(client);
        assert!(pipeline.env_config().is_none());
        assert!(pipeline.probe_state().is_none());
        assert!(pipeline.identity_state().is_none());
        assert!(matches!(pipeline.env_status(), StageStatus::NotStarted));
    }

    #[tokio::test]
    async fn test_repeat_run_does_not_restart_the_chain() {
        let client = Arc::new(PortalClient::new("https://portal.example.com").unwrap());
        let mut pipeline = Pipeline::new(client);

        // A pipeline that has already run holds its projection receiver.
        let (_projection_tx, projection_rx) = watch::channel(DeviceProjection::Pending);
        pipeline.env_status = StageStatus::Success;
        pipeline.projection_rx = Some(projection_rx);

        // The repeat call must return before any stage starts over: no
        // fetch, no status reset, no second probe determination.
        let again = pipeline.run(|| {}).await;
        assert!(matches!(pipeline.env_status(), StageStatus::Success));
        assert!(matches!(*again.borrow(), DeviceProjection::Pending));
    }
}
