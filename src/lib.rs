//! Diagnostics pipeline behind a "why was I denied access" portal.
//!
//! The crate resolves, in dependency order, everything such a portal
//! needs to explain a denial: whether the on-device network client is
//! active, whether the current session is still authorized, and the
//! identity/device-posture details gated behind both.
//!
//! Three timelines run side by side:
//!
//! - The **resolution pipeline** ([`Pipeline`]): environment
//!   configuration, then the network-client probe and the identity
//!   resolver concurrently, then the pure device posture projection
//!   gated on both. A disabled probe settles the projection immediately
//!   and downstream never reads identity data.
//! - The **session liveness monitor** ([`liveness::LivenessMonitor`]):
//!   a fixed-interval check of the authorization marker and origin
//!   reachability, cancelable on teardown.
//! - The **diagnostics fetch** ([`diag::fetch_debug_report`]): a
//!   bounded-retry fetch that classifies markup responses as disguised
//!   session expiry.
//!
//! The monitor and the diagnostics fetch escalate through the same
//! idempotent [`Recovery`] action (a full page reload in a browser
//! host); they are kept as independent fail-safes on purpose.
//!
//! ```ignore
//! let client = Arc::new(PortalClient::new("https://portal.example.com")?);
//! let recovery = Recovery::new(|| host.reload_page());
//!
//! let _monitor = LivenessMonitor::spawn(client.clone(), cookie_source, recovery.clone());
//!
//! let mut pipeline = Pipeline::new(client.clone());
//! let mut projection = pipeline.run(|| host.clear_loading_indicator()).await;
//! projection.wait_for(|p| p.is_settled()).await?;
//!
//! if pipeline.env_config().map(|env| env.debug_enabled).unwrap_or(false) {
//!     let report = diag::fetch_debug_report(&client, &recovery).await?;
//! }
//! ```

pub mod client;
pub mod diag;
pub mod env;
pub mod error;
pub mod identity;
pub mod liveness;
pub mod pipeline;
pub mod posture;
pub mod probe;
pub mod recovery;

pub use client::PortalClient;
pub use env::EnvConfig;
pub use error::PortalError;
pub use pipeline::{Pipeline, StageStatus};
pub use posture::{DeviceInfoView, DeviceProjection};
pub use probe::ProbeState;
pub use recovery::Recovery;
