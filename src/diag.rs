//! Diagnostic fetch with bounded retry.
//!
//! The diagnostics endpoint sits behind the same access gate as the
//! portal itself, so an expired session does not fail cleanly: the
//! backend redirects to a login page and the fetch comes back as markup
//! instead of structured data. A markup content type is therefore
//! classified as a disguised session expiry before any parsing is
//! attempted. Failures are retried a bounded number of times with a
//! fixed delay (long enough for an in-flight session renewal to land),
//! then escalated to the shared recovery action after a short visible
//! delay.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, error, warn};

use crate::client::PortalClient;
use crate::error::PortalError;
use crate::recovery::Recovery;

pub const DEBUG_PATH: &str = "/api/debug";

/// Retries after the initial attempt.
pub const DEFAULT_RETRIES: u32 = 1;

/// Delay between attempts.
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Delay between the final user-visible error and recovery, so the
/// transition is not silent.
pub const RECOVERY_DELAY: Duration = Duration::from_secs(1);

pub const EXPIRY_MESSAGE: &str = "Session expired. Refreshing for a new session...";

/// One device-posture check result, keyed by rule id in the report.
#[derive(Debug, Clone, Deserialize)]
pub struct PostureRule {
    #[serde(default)]
    pub rule_name: Option<String>,
    #[serde(rename = "type", default)]
    pub rule_type: Option<String>,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub input: Value,
}

/// Parsed diagnostics payload. The posture map is optional; its absence
/// is an empty display state downstream, not an error.
#[derive(Debug, Clone)]
pub struct DebugReport {
    pub raw: Value,
    pub device_posture: Option<BTreeMap<String, PostureRule>>,
}

/// A document/markup payload from a data endpoint means the backend
/// redirected to a login page, whatever the body says.
pub fn is_markup_content_type(content_type: &str) -> bool {
    content_type.to_ascii_lowercase().contains("text/html")
}

/// Pull the posture-rules mapping out of the raw payload. Malformed
/// individual rules are skipped, not fatal.
pub(crate) fn extract_device_posture(raw: &Value) -> Option<BTreeMap<String, PostureRule>> {
    let rules = raw.get("devicePosture")?.as_object()?;
    let mut posture = BTreeMap::new();
    for (id, rule) in rules {
        match serde_json::from_value::<PostureRule>(rule.clone()) {
            Ok(rule) => {
                posture.insert(id.clone(), rule);
            }
            Err(e) => warn!("skipping malformed posture rule {}: {}", id, e),
        }
    }
    Some(posture)
}

/// Bounded-retry driver around a single fetch attempt. Performs at most
/// `remaining_retries + 1` attempts; on exhaustion the expiry error is
/// returned to the caller right away so the message can be shown, and
/// recovery fires `RECOVERY_DELAY` later from a spawned task — the
/// visible message precedes the reload.
///
/// The attempt is injected so the retry discipline can be exercised
/// without a network.
pub async fn fetch_with_retry<A, Fut>(
    mut attempt: A,
    remaining_retries: u32,
    recovery: &Recovery,
) -> Result<DebugReport, PortalError>
where
    A: FnMut() -> Fut,
    Fut: Future<Output = Result<DebugReport, PortalError>>,
{
    let mut remaining = remaining_retries;
    loop {
        match attempt().await {
            Ok(report) => return Ok(report),
            Err(e) => {
                warn!("diagnostics fetch failed: {}", e);
                if remaining > 0 {
                    remaining -= 1;
                    debug!("retrying diagnostics fetch, {} retries left", remaining);
                    sleep(RETRY_DELAY).await;
                    continue;
                }

                error!("{}", EXPIRY_MESSAGE);
                let recovery = recovery.clone();
                tokio::spawn(async move {
                    sleep(RECOVERY_DELAY).await;
                    recovery.trigger();
                });
                return Err(PortalError::SessionExpired(EXPIRY_MESSAGE.to_string()));
            }
        }
    }
}

/// One no-store fetch of the diagnostics endpoint: content-type gate,
/// then parse, then posture extraction.
pub async fn attempt_debug_fetch(client: &PortalClient) -> Result<DebugReport, PortalError> {
    let response = client.get_no_store(DEBUG_PATH).await.map_err(|e| {
        PortalError::Resolver {
            status: None,
            message: format!("diagnostics request failed: {:#}", e),
        }
    })?;

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");
    if is_markup_content_type(content_type) {
        return Err(PortalError::SessionExpired(
            "diagnostics endpoint returned a login page".to_string(),
        ));
    }

    let status = response.status().as_u16();
    let raw: Value = response.json().await.map_err(|e| PortalError::Resolver {
        status: Some(status),
        message: format!("failed to parse diagnostics payload: {}", e),
    })?;

    let device_posture = extract_device_posture(&raw);
    Ok(DebugReport {
        raw,
        device_posture,
    })
}

/// Fetch the diagnostics report with the default retry allowance.
pub async fn fetch_debug_report(
    client: &PortalClient,
    recovery: &Recovery,
) -> Result<DebugReport, PortalError> {
    fetch_with_retry(|| attempt_debug_fetch(client), DEFAULT_RETRIES, recovery).await
}
