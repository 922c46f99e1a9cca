//! Error taxonomy for the portal diagnostics pipeline.
//!
//! Errors are captured where they happen and surfaced as user-visible
//! text; they never cross stage boundaries as panics. Stages that fold
//! failure into a state (the probe, the identity resolver) carry plain
//! strings in their state enums and only the diagnostics path returns
//! `PortalError` directly.

use thiserror::Error;

/// Failure classes of the diagnostics pipeline.
#[derive(Debug, Clone, Error)]
pub enum PortalError {
    /// Environment configuration missing or unloadable.
    #[error("configuration error: {0}")]
    Config(String),

    /// Network-client probe unreachable or failed. Terminal for the
    /// page lifetime; only a full reload re-probes.
    #[error("client probe failed: {0}")]
    Probe(String),

    /// A backend fetch failed with a status or transport error.
    #[error("{message}")]
    Resolver {
        status: Option<u16>,
        message: String,
    },

    /// The session is no longer authorized, either detected directly or
    /// disguised as a markup response from a data endpoint.
    #[error("session expired: {0}")]
    SessionExpired(String),

    /// Retries exhausted or liveness lost; recovery is the only repair.
    #[error("unrecoverable: {0}")]
    Fatal(String),
}

impl PortalError {
    pub fn is_session_expired(&self) -> bool {
        matches!(self, PortalError::SessionExpired(_))
    }

    /// Plain-text message suitable for direct display.
    pub fn user_message(&self) -> String {
        self.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_expired_classification() {
        let err = PortalError::SessionExpired("login page returned".to_string());
        assert!(err.is_session_expired());

        let err = PortalError::Config("no worker domain".to_string());
        assert!(!err.is_session_expired());
    }

    #[test]
    fn test_display_carries_condition() {
        let err = PortalError::Resolver {
            status: Some(503),
            message: "identity request failed with status 503".to_string(),
        };
        assert_eq!(err.user_message(), "identity request failed with status 503");

        let err = PortalError::Probe("trace unreachable".to_string());
        assert!(err.to_string().contains("trace unreachable"));
    }
}
