//! Network-client probe.
//!
//! Determines whether the security client is active by fetching the
//! trace endpoint on the configured worker domain and looking for the
//! active marker in the body. The determination is made exactly once
//! per page load: a probe failure of any kind (missing configuration,
//! network error, non-success status, missing marker) folds into a
//! terminal `Disabled` state with a captured message, never an
//! ambiguous error. Only a full reload re-probes.

use tracing::{debug, warn};

use crate::client::PortalClient;
use crate::env::EnvConfig;

/// Well-known diagnostic path on the worker domain.
pub const TRACE_PATH: &str = "/cdn-cgi/trace";

/// Marker substring in the trace body indicating the client is active.
pub const ACTIVE_MARKER: &str = "warp=on";

/// Tri-state probe determination. Leaves `Pending` at most once;
/// `Disabled` suppresses all downstream identity reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeState {
    Pending,
    Enabled {
        trace: String,
    },
    Disabled {
        trace: String,
        error: Option<String>,
    },
}

impl ProbeState {
    pub fn is_enabled(&self) -> bool {
        matches!(self, ProbeState::Enabled { .. })
    }

    pub fn is_settled(&self) -> bool {
        !matches!(self, ProbeState::Pending)
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ProbeState::Disabled { error, .. } => error.as_deref(),
            _ => None,
        }
    }
}

pub fn trace_indicates_active(trace: &str) -> bool {
    trace.contains(ACTIVE_MARKER)
}

pub fn trace_url(domain: &str) -> String {
    format!("https://{}{}", domain, TRACE_PATH)
}

/// Fold a raw trace outcome (status + body, or a transport error) into
/// the final probe determination.
pub fn evaluate_trace(outcome: Result<(u16, String), String>) -> ProbeState {
    match outcome {
        Ok((status, body)) if (200..300).contains(&status) => {
            if trace_indicates_active(&body) {
                ProbeState::Enabled { trace: body }
            } else {
                ProbeState::Disabled {
                    trace: body,
                    error: None,
                }
            }
        }
        Ok((status, body)) => ProbeState::Disabled {
            trace: body,
            error: Some(format!("trace request failed with status {}", status)),
        },
        Err(message) => ProbeState::Disabled {
            trace: String::new(),
            error: Some(message),
        },
    }
}

/// Issue the one-shot probe. Never returns an error: failure is the
/// `Disabled` determination.
pub async fn run_probe(client: &PortalClient, env: &EnvConfig) -> ProbeState {
    let domain = match env.worker_domain.as_deref() {
        Some(domain) => domain,
        None => {
            warn!("no worker domain configured, treating client as inactive");
            return ProbeState::Disabled {
                trace: String::new(),
                error: Some("no worker domain in environment configuration".to_string()),
            };
        }
    };

    let url = trace_url(domain);
    let outcome = match client.get_absolute(&url).await {
        Ok(response) => {
            let status = response.status().as_u16();
            match response.text().await {
                Ok(body) => Ok((status, body)),
                Err(e) => Err(format!("failed to read trace body: {}", e)),
            }
        }
        Err(e) => Err(format!("{:#}", e)),
    };

    let state = evaluate_trace(outcome);
    match &state {
        ProbeState::Enabled { .. } => debug!("network client active"),
        ProbeState::Disabled { error, .. } => {
            debug!("network client inactive (error: {:?})", error)
        }
        ProbeState::Pending => {}
    }
    state
}
