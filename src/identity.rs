//! Identity resolver.
//!
//! One fetch of the identity/device details per page load. The fetch is
//! independent of the probe in timing and may race ahead, but its result
//! is only interpreted by the device posture projection once the probe
//! confirms the client is active. The payload is untrusted and partial;
//! every field access tolerates absence. No retry at this layer.

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::client::PortalClient;

pub const USER_DETAILS_PATH: &str = "/api/userdetails";

/// Device sub-object of the identity payload, every field optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DeviceRecord {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub os_version: Option<String>,
    #[serde(default)]
    pub gateway_device_id: Option<String>,
}

/// Raw identity payload from the backend.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdentityPayload {
    #[serde(default)]
    pub device: Option<DeviceRecord>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Resolver state, fire-once per page load.
#[derive(Debug, Clone)]
pub enum IdentityState {
    Pending,
    Ready(IdentityPayload),
    Failed(String),
}

impl IdentityState {
    pub fn is_settled(&self) -> bool {
        !matches!(self, IdentityState::Pending)
    }
}

/// Fetch identity details. Non-success status and transport errors both
/// fold into `Failed` with the triggering condition.
pub async fn fetch_identity(client: &PortalClient) -> IdentityState {
    match client.get(USER_DETAILS_PATH).await {
        Ok(response) => {
            let status = response.status();
            if !status.is_success() {
                let message = format!("identity request failed with status {}", status.as_u16());
                warn!("{}", message);
                return IdentityState::Failed(message);
            }
            match response.json::<IdentityPayload>().await {
                Ok(payload) => IdentityState::Ready(payload),
                Err(e) => {
                    let message = format!("failed to parse identity payload: {}", e);
                    warn!("{}", message);
                    IdentityState::Failed(message)
                }
            }
        }
        Err(e) => {
            let message = format!("{:#}", e);
            warn!("identity fetch failed: {}", message);
            IdentityState::Failed(message)
        }
    }
}
