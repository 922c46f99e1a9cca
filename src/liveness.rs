//! Session liveness monitor.
//!
//! A recurring background check, independent of the resolution pipeline,
//! that validates the session on a fixed interval: the authorization
//! cookie marker must be present and the portal origin must answer a
//! HEAD request. The first failed check is terminal for the monitor
//! instance; it triggers the shared recovery action and stops ticking,
//! since a reload is expected. The monitor's handle cancels the task on
//! teardown so no check fires after its owner is gone.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, warn};

use crate::client::PortalClient;
use crate::recovery::Recovery;

/// Name prefix of the authorization cookie.
pub const AUTH_COOKIE_PREFIX: &str = "CF_Authorization=";

/// Interval between liveness checks.
pub const CHECK_INTERVAL: Duration = Duration::from_secs(10);

/// Read-only view of the browser's cookie string. The monitor never
/// writes cookies.
pub trait AuthMarkerSource: Send + Sync + 'static {
    fn cookie_header(&self) -> Option<String>;
}

impl<F> AuthMarkerSource for F
where
    F: Fn() -> Option<String> + Send + Sync + 'static,
{
    fn cookie_header(&self) -> Option<String> {
        self()
    }
}

/// Match the authorization marker by name prefix in a `"; "`-separated
/// cookie string.
pub fn has_auth_marker(cookie_header: &str) -> bool {
    cookie_header
        .split("; ")
        .any(|pair| pair.starts_with(AUTH_COOKIE_PREFIX))
}

/// Outcome of one liveness check. Stateless; re-evaluated every tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LivenessVerdict {
    Alive,
    Expired(String),
}

/// Evaluate session liveness once: marker first, then origin
/// reachability.
pub async fn check_session(
    client: &PortalClient,
    markers: &dyn AuthMarkerSource,
) -> LivenessVerdict {
    let has_marker = markers
        .cookie_header()
        .map(|header| has_auth_marker(&header))
        .unwrap_or(false);
    if !has_marker {
        return LivenessVerdict::Expired("authorization marker missing".to_string());
    }

    match client.head_origin().await {
        Ok(response) if response.status().is_success() => LivenessVerdict::Alive,
        Ok(response) => LivenessVerdict::Expired(format!(
            "origin check failed with status {}",
            response.status().as_u16()
        )),
        Err(e) => LivenessVerdict::Expired(format!("origin check failed: {:#}", e)),
    }
}

/// Drive the check on a fixed interval until it fails. The check is
/// injected so the loop can be exercised without a network.
pub async fn run_liveness_loop<C, Fut>(mut check: C, recovery: Recovery, period: Duration)
where
    C: FnMut() -> Fut,
    Fut: Future<Output = LivenessVerdict>,
{
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // interval yields immediately; the first real check is one period in
    ticker.tick().await;

    loop {
        ticker.tick().await;
        match check().await {
            LivenessVerdict::Alive => debug!("session check passed"),
            LivenessVerdict::Expired(reason) => {
                warn!("session expired: {}", reason);
                recovery.trigger();
                return;
            }
        }
    }
}

/// Cancellation handle for a spawned monitor. Stops the interval task;
/// no check or callback fires afterwards.
pub struct MonitorHandle {
    task: JoinHandle<()>,
}

impl MonitorHandle {
    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct LivenessMonitor;

impl LivenessMonitor {
    /// Spawn the monitor with the default 10-second interval.
    pub fn spawn(
        client: Arc<PortalClient>,
        markers: Arc<dyn AuthMarkerSource>,
        recovery: Recovery,
    ) -> MonitorHandle {
        Self::spawn_with_period(client, markers, recovery, CHECK_INTERVAL)
    }

    pub fn spawn_with_period(
        client: Arc<PortalClient>,
        markers: Arc<dyn AuthMarkerSource>,
        recovery: Recovery,
        period: Duration,
    ) -> MonitorHandle {
        let task = tokio::spawn(async move {
            let check = move || {
                let client = client.clone();
                let markers = markers.clone();
                async move { check_session(&client, markers.as_ref()).await }
            };
            run_liveness_loop(check, recovery, period).await;
        });
        MonitorHandle { task }
    }
}
