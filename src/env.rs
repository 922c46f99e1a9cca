//! Environment resolver.
//!
//! Fetches the process-wide portal configuration once at startup:
//! feature flags, theme, and the worker domain the network-client probe
//! targets. The configuration is immutable after load and shared via
//! `Arc` with every consumer. There is no retry; a failed load is
//! terminal for the page load and consumers degrade to defaults.

use std::collections::BTreeMap;

use anyhow::Context;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::client::PortalClient;
use crate::error::PortalError;

pub const ENV_PATH: &str = "/api/env";

const DEFAULT_PRIMARY_COLOR: &str = "#3498db";
const DEFAULT_SECONDARY_COLOR: &str = "#2ecc71";
const DEFAULT_TERTIARY_COLOR: &str = "#ffffff";

/// Raw theme block of the environment document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ThemeDocument {
    #[serde(rename = "primaryColor", default)]
    pub primary_color: Option<String>,
    #[serde(rename = "secondaryColor", default)]
    pub secondary_color: Option<String>,
    #[serde(rename = "tertiaryColor", default)]
    pub tertiary_color: Option<String>,
}

/// Raw `/api/env` document. Every field is optional; the backend may
/// omit any of them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnvDocument {
    #[serde(rename = "DEBUG", default)]
    pub debug: Option<Value>,
    #[serde(rename = "SETUP", default)]
    pub setup: Option<Value>,
    #[serde(rename = "WORKER_DOMAIN", default)]
    pub worker_domain: Option<String>,
    #[serde(default)]
    pub theme: Option<ThemeDocument>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Portal color theme, defaulted field by field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Theme {
    pub primary: String,
    pub secondary: String,
    pub tertiary: String,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            primary: DEFAULT_PRIMARY_COLOR.to_string(),
            secondary: DEFAULT_SECONDARY_COLOR.to_string(),
            tertiary: DEFAULT_TERTIARY_COLOR.to_string(),
        }
    }
}

/// Normalized, immutable portal configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvConfig {
    pub worker_domain: Option<String>,
    pub debug_enabled: bool,
    pub setup_enabled: bool,
    pub theme: Theme,
    pub flags: BTreeMap<String, bool>,
}

/// The backend serves flags as the string "true"/"false"; tolerate real
/// booleans as well.
fn flag_is_set(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s == "true",
        _ => false,
    }
}

impl EnvConfig {
    pub fn from_document(doc: EnvDocument) -> Self {
        let theme_doc = doc.theme.unwrap_or_default();
        let defaults = Theme::default();
        let theme = Theme {
            primary: theme_doc.primary_color.unwrap_or(defaults.primary),
            secondary: theme_doc.secondary_color.unwrap_or(defaults.secondary),
            tertiary: theme_doc.tertiary_color.unwrap_or(defaults.tertiary),
        };

        let flags = doc
            .extra
            .iter()
            .map(|(name, value)| (name.clone(), flag_is_set(value)))
            .collect();

        Self {
            worker_domain: doc.worker_domain.filter(|d| !d.is_empty()),
            debug_enabled: doc.debug.as_ref().map(flag_is_set).unwrap_or(false),
            setup_enabled: doc.setup.as_ref().map(flag_is_set).unwrap_or(false),
            theme,
            flags,
        }
    }

    /// Look up an extra feature flag by name.
    pub fn flag(&self, name: &str) -> bool {
        self.flags.get(name).copied().unwrap_or(false)
    }
}

/// Fetch and normalize the environment configuration. One request, no
/// retry; failure maps to a configuration error.
pub async fn resolve_environment(client: &PortalClient) -> Result<EnvConfig, PortalError> {
    match fetch_env_document(client).await {
        Ok(doc) => {
            let config = EnvConfig::from_document(doc);
            debug!(
                "environment loaded: worker_domain={:?} debug={} setup={}",
                config.worker_domain, config.debug_enabled, config.setup_enabled
            );
            Ok(config)
        }
        Err(e) => {
            warn!("environment fetch failed: {:#}", e);
            Err(PortalError::Config(format!("{:#}", e)))
        }
    }
}

async fn fetch_env_document(client: &PortalClient) -> anyhow::Result<EnvDocument> {
    let response = client.get(ENV_PATH).await?;
    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("environment fetch failed with status {}", status.as_u16());
    }
    response
        .json::<EnvDocument>()
        .await
        .context("failed to parse environment document")
}
