//! Device posture projection.
//!
//! A pure derivation of the normalized device-info view from the probe
//! and identity resolver states, recomputed whenever either input
//! changes. The projection settles the moment a terminal outcome is
//! knowable: a disabled or failed probe settles it immediately, without
//! waiting on the identity resolver, and a settled projection never
//! reads a subsequently-resolved identity payload. Completion is
//! signaled upward exactly once per resolution regardless of how many
//! times the derivation re-runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::identity::IdentityState;
use crate::probe::ProbeState;

/// Shown when the probe determines the client is not active.
pub const CLIENT_INACTIVE_MESSAGE: &str =
    "Please enable the network client to view device information.";

/// Normalized device-info view. Missing payload fields default to empty
/// strings rather than failing the projection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfoView {
    pub device_model: String,
    pub device_name: String,
    pub device_os_ver: String,
    pub device_id: String,
    pub is_client_enabled: bool,
}

/// Projection outcome. Everything but `Pending` is terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceProjection {
    Pending,
    /// Client not active; identity data is meaningless.
    Unavailable { message: String },
    /// Client active but the identity fetch failed.
    Failed { message: String },
    Ready(DeviceInfoView),
}

impl DeviceProjection {
    pub fn is_settled(&self) -> bool {
        !matches!(self, DeviceProjection::Pending)
    }
}

/// One-shot "loaded" signal to the parent. `fire` returns true the
/// first time only; re-derivations cannot produce duplicate side
/// effects upstream.
#[derive(Clone, Default)]
pub struct CompletionSignal {
    fired: Arc<AtomicBool>,
}

impl CompletionSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fire(&self) -> bool {
        !self.fired.swap(true, Ordering::SeqCst)
    }

    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

/// Derive the projection from the two input states.
pub fn project_device(probe: &ProbeState, identity: &IdentityState) -> DeviceProjection {
    match probe {
        ProbeState::Pending => DeviceProjection::Pending,
        ProbeState::Disabled { error, .. } => DeviceProjection::Unavailable {
            message: error
                .clone()
                .unwrap_or_else(|| CLIENT_INACTIVE_MESSAGE.to_string()),
        },
        ProbeState::Enabled { .. } => match identity {
            IdentityState::Pending => DeviceProjection::Pending,
            IdentityState::Failed(message) => DeviceProjection::Failed {
                message: message.clone(),
            },
            IdentityState::Ready(payload) => {
                let device = payload.device.clone().unwrap_or_default();
                DeviceProjection::Ready(DeviceInfoView {
                    device_model: device.model.unwrap_or_default(),
                    device_name: device.name.unwrap_or_default(),
                    device_os_ver: device.os_version.unwrap_or_default(),
                    device_id: device.gateway_device_id.unwrap_or_default(),
                    is_client_enabled: true,
                })
            }
        },
    }
}

/// Spawn the projection task over the probe and identity watch channels.
///
/// The task re-derives on every input change, publishes the projection,
/// fires `on_loaded` once when it first settles, and then stops
/// observing its inputs; a late identity resolution after a disabled
/// probe is never read.
pub fn spawn_projection(
    mut probe_rx: watch::Receiver<ProbeState>,
    mut identity_rx: watch::Receiver<IdentityState>,
    on_loaded: impl Fn() + Send + 'static,
) -> (watch::Receiver<DeviceProjection>, JoinHandle<()>) {
    let (tx, rx) = watch::channel(DeviceProjection::Pending);
    let signal = CompletionSignal::new();

    let task = tokio::spawn(async move {
        loop {
            let projection = {
                let probe = probe_rx.borrow_and_update().clone();
                let identity = identity_rx.borrow_and_update().clone();
                project_device(&probe, &identity)
            };
            let settled = projection.is_settled();

            // send only fails when every receiver is gone
            if tx.send(projection).is_err() {
                break;
            }

            if settled {
                if signal.fire() {
                    debug!("device projection settled");
                    on_loaded();
                }
                break;
            }

            tokio::select! {
                changed = probe_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                changed = identity_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
    });

    (rx, task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{DeviceRecord, IdentityPayload};
    use std::sync::atomic::AtomicUsize;

    fn ready_identity(device: Option<DeviceRecord>) -> IdentityState {
        IdentityState::Ready(IdentityPayload {
            device,
            extra: Default::default(),
        })
    }

    fn enabled_probe() -> ProbeState {
        ProbeState::Enabled {
            trace: "warp=on".to_string(),
        }
    }

    #[test]
    fn test_pending_probe_keeps_projection_pending() {
        let projection = project_device(&ProbeState::Pending, &ready_identity(None));
        assert_eq!(projection, DeviceProjection::Pending);
    }

    #[test]
    fn test_disabled_probe_settles_without_identity() {
        let probe = ProbeState::Disabled {
            trace: String::new(),
            error: None,
        };
        let projection = project_device(&probe, &IdentityState::Pending);
        assert_eq!(
            projection,
            DeviceProjection::Unavailable {
                message: CLIENT_INACTIVE_MESSAGE.to_string()
            }
        );
    }

    #[test]
    fn test_enabled_probe_waits_for_identity() {
        let projection = project_device(&enabled_probe(), &IdentityState::Pending);
        assert_eq!(projection, DeviceProjection::Pending);
    }

    #[test]
    fn test_identity_failure_settles_with_error() {
        let identity = IdentityState::Failed("identity request failed with status 500".to_string());
        let projection = project_device(&enabled_probe(), &identity);
        assert_eq!(
            projection,
            DeviceProjection::Failed {
                message: "identity request failed with status 500".to_string()
            }
        );
    }

    #[test]
    fn test_partial_device_projects_with_empty_defaults() {
        // Scenario C: only model and name present.
        let identity = ready_identity(Some(DeviceRecord {
            model: Some("X1".to_string()),
            name: Some("laptop1".to_string()),
            ..Default::default()
        }));
        let projection = project_device(&enabled_probe(), &identity);
        assert_eq!(
            projection,
            DeviceProjection::Ready(DeviceInfoView {
                device_model: "X1".to_string(),
                device_name: "laptop1".to_string(),
                device_os_ver: String::new(),
                device_id: String::new(),
                is_client_enabled: true,
            })
        );
    }

    #[test]
    fn test_missing_device_projects_all_empty() {
        let projection = project_device(&enabled_probe(), &ready_identity(None));
        assert_eq!(
            projection,
            DeviceProjection::Ready(DeviceInfoView {
                is_client_enabled: true,
                ..Default::default()
            })
        );
    }

    #[test]
    fn test_completion_signal_fires_once() {
        let signal = CompletionSignal::new();
        assert!(!signal.is_fired());
        assert!(signal.fire());
        assert!(!signal.fire());
        assert!(signal.is_fired());
    }

    #[tokio::test]
    async fn test_disabled_probe_settles_before_identity_and_ignores_it() {
        let (probe_tx, probe_rx) = watch::channel(ProbeState::Pending);
        let (identity_tx, identity_rx) = watch::channel(IdentityState::Pending);
        let loads = Arc::new(AtomicUsize::new(0));

        let counter = loads.clone();
        let (mut projection_rx, task) = spawn_projection(probe_rx, identity_rx, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        // Scenario B: the probe fails while identity is still pending.
        probe_tx
            .send(ProbeState::Disabled {
                trace: String::new(),
                error: Some("trace request failed with status 530".to_string()),
            })
            .unwrap();

        projection_rx
            .wait_for(|projection| projection.is_settled())
            .await
            .unwrap();
        task.await.unwrap();

        assert_eq!(
            *projection_rx.borrow(),
            DeviceProjection::Unavailable {
                message: "trace request failed with status 530".to_string()
            }
        );
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        // A late identity resolution must not flip the settled projection
        // or re-fire completion. The send may find no listener at all,
        // which is the point.
        let _ = identity_tx.send(ready_identity(Some(DeviceRecord {
            model: Some("X1".to_string()),
            ..Default::default()
        })));
        tokio::task::yield_now().await;

        assert!(matches!(
            *projection_rx.borrow(),
            DeviceProjection::Unavailable { .. }
        ));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_enabled_probe_then_identity_projects_device() {
        let (probe_tx, probe_rx) = watch::channel(ProbeState::Pending);
        let (identity_tx, identity_rx) = watch::channel(IdentityState::Pending);
        let loads = Arc::new(AtomicUsize::new(0));

        let counter = loads.clone();
        let (mut projection_rx, task) = spawn_projection(probe_rx, identity_rx, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        probe_tx.send(enabled_probe()).unwrap();
        identity_tx
            .send(ready_identity(Some(DeviceRecord {
                model: Some("X1".to_string()),
                name: Some("laptop1".to_string()),
                ..Default::default()
            })))
            .unwrap();

        projection_rx
            .wait_for(|projection| projection.is_settled())
            .await
            .unwrap();
        task.await.unwrap();

        match &*projection_rx.borrow() {
            DeviceProjection::Ready(view) => {
                assert_eq!(view.device_model, "X1");
                assert_eq!(view.device_name, "laptop1");
                assert!(view.is_client_enabled);
            }
            other => panic!("unexpected projection: {:?}", other),
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }
}
