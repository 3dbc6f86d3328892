//! Telemetry processing for language server quota responses.
//!
//! Turns an untrusted `GetUserStatus` document into a classified
//! [`TelemetrySnapshot`]:
//! - [`schema`]: shape validation with drift diagnostics
//! - [`normalize`]: per-model records, clamped and sorted
//! - [`pool`]: quota-pool inference
//! - [`readiness`]: per-system and fleet-wide readiness

pub mod normalize;
pub mod pool;
pub mod readiness;
pub mod schema;

use chrono::{DateTime, Utc};
use fuelwatch_core::{AlertThresholds, TelemetrySnapshot};
use serde_json::Value;

pub use normalize::{format_designation, normalize};
pub use pool::{assign_quota_pools, POOL_PRECISION_DIGITS};
pub use readiness::{assess_overall, assess_readiness, classify};
pub use schema::validate_server_response;

/// Normalize `response` and assess it as a snapshot taken at `timestamp`.
///
/// Callers are expected to have run [`validate_server_response`] first.
pub fn build_snapshot(
    response: &Value,
    thresholds: &AlertThresholds,
    timestamp: DateTime<Utc>,
) -> TelemetrySnapshot {
    let systems = normalize(response, thresholds);
    let overall = assess_overall(&systems);
    TelemetrySnapshot::new(timestamp, systems, overall)
}
