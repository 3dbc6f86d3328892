//! Domain types shared by every stage of the acquisition pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Largest PID accepted from process listings (Linux `pid_max` ceiling).
pub const MAX_PID: u32 = 4_194_304;
/// Minimum CSRF token length.
pub const MIN_TOKEN_LEN: usize = 6;
/// Maximum CSRF token length.
pub const MAX_TOKEN_LEN: usize = 256;
/// Signal strength of a freshly established or freshly answered uplink.
pub const FULL_SIGNAL: u8 = 100;
/// Signal strength lost per failed acquisition.
pub const SIGNAL_DECAY: u8 = 25;

/// Check a PID against the accepted range.
pub fn is_valid_pid(pid: u32) -> bool {
    (1..=MAX_PID).contains(&pid)
}

/// Check a token against the bounded hex/dash charset.
pub fn is_valid_token(token: &str) -> bool {
    (MIN_TOKEN_LEN..=MAX_TOKEN_LEN).contains(&token.len())
        && token.bytes().all(|b| b.is_ascii_hexdigit() || b == b'-')
}

/// PID and CSRF token lifted from the language server's command line.
///
/// Only constructible through [`Credential::new`], so holding one implies both
/// halves passed validation.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pid: u32,
    token: String,
}

impl Credential {
    /// Validate and pair a PID with a token.
    pub fn new(pid: u32, token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        if is_valid_pid(pid) && is_valid_token(&token) {
            Some(Self { pid, token })
        } else {
            None
        }
    }

    /// Owning process ID.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// CSRF token.
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("pid", &self.pid)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Connection state of the uplink. Never persisted.
#[derive(Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UplinkState {
    /// Whether a port has answered the capability probe
    pub connected: bool,
    /// Port of the established uplink
    pub port: Option<u16>,
    /// Token used for the established uplink
    #[serde(skip_serializing)]
    pub token: Option<String>,
    /// Last successful contact
    pub last_contact_at: Option<DateTime<Utc>>,
    /// Health score, 0..=100
    pub signal_strength: u8,
}

impl UplinkState {
    /// Disconnected state used at startup.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the uplink as established on `port`.
    pub fn establish(&mut self, port: u16, token: String, now: DateTime<Utc>) {
        self.connected = true;
        self.port = Some(port);
        self.token = Some(token);
        self.last_contact_at = Some(now);
        self.signal_strength = FULL_SIGNAL;
    }

    /// Record a successful acquisition.
    pub fn record_contact(&mut self, now: DateTime<Utc>) {
        self.signal_strength = FULL_SIGNAL;
        self.last_contact_at = Some(now);
    }

    /// Lose signal after a failed acquisition.
    ///
    /// Returns `true` when this call dropped the uplink to disconnected.
    pub fn degrade(&mut self) -> bool {
        if !self.connected {
            return false;
        }
        self.signal_strength = self.signal_strength.saturating_sub(SIGNAL_DECAY);
        if self.signal_strength == 0 {
            self.disconnect();
            return true;
        }
        false
    }

    /// Drop the uplink. `last_contact_at` is kept for diagnostics.
    pub fn disconnect(&mut self) {
        self.connected = false;
        self.port = None;
        self.token = None;
        self.signal_strength = 0;
    }

    /// Port and token of a connected uplink.
    pub fn endpoint(&self) -> Option<(u16, String)> {
        if !self.connected {
            return None;
        }
        Some((self.port?, self.token.clone()?))
    }
}

impl std::fmt::Debug for UplinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UplinkState")
            .field("connected", &self.connected)
            .field("port", &self.port)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("last_contact_at", &self.last_contact_at)
            .field("signal_strength", &self.signal_strength)
            .finish()
    }
}

/// Severity classification of a fuel level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Readiness {
    /// Above the caution threshold
    Nominal,
    /// At or below caution
    Caution,
    /// At or below warning
    Warning,
    /// At or below critical
    Critical,
    /// No systems reported (overall readiness only)
    Offline,
}

impl Readiness {
    /// Whether this readiness counts toward the active alert count.
    pub fn is_alert(&self) -> bool {
        matches!(
            self,
            Readiness::Caution | Readiness::Warning | Readiness::Critical
        )
    }
}

/// Model family inferred from the label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SystemClass {
    GeminiFlash,
    GeminiPro,
    Claude,
    Gpt,
    Experimental,
}

/// Alert thresholds as percentages of remaining quota.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlertThresholds {
    /// At or below: CAUTION
    pub caution: f64,
    /// At or below: WARNING
    pub warning: f64,
    /// At or below: CRITICAL
    pub critical: f64,
}

impl AlertThresholds {
    /// Enforce `caution > warning > critical`, each within `[1, 100]`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("caution", self.caution),
            ("warning", self.warning),
            ("critical", self.critical),
        ] {
            if !value.is_finite() || !(1.0..=100.0).contains(&value) {
                return Err(ConfigError::ValidationError(format!(
                    "thresholds.{} must be within [1, 100] (got {})",
                    name, value
                )));
            }
        }

        if !(self.caution > self.warning && self.warning > self.critical) {
            return Err(ConfigError::ValidationError(format!(
                "thresholds must satisfy caution > warning > critical (got {} / {} / {})",
                self.caution, self.warning, self.critical
            )));
        }

        Ok(())
    }
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            caution: 40.0,
            warning: 20.0,
            critical: 5.0,
        }
    }
}

/// One model's quota, normalized from the server payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FuelSystem {
    pub system_id: String,
    pub designation: String,
    /// Remaining quota fraction in `[0, 1]`
    pub fuel_level: f64,
    pub replenishment_eta: Option<DateTime<Utc>>,
    pub readiness: Readiness,
    pub system_class: SystemClass,
    pub quota_pool_id: Option<String>,
}

impl FuelSystem {
    /// Time left until the quota resets; zero once the reset time has passed.
    pub fn time_until_replenishment(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.replenishment_eta
            .map(|eta| (eta - now).max(chrono::Duration::zero()))
    }
}

/// Result of one successful acquisition cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySnapshot {
    pub timestamp: DateTime<Utc>,
    /// Sorted ascending by fuel level
    pub systems: Vec<FuelSystem>,
    pub overall_readiness: Readiness,
    pub active_alert_count: usize,
}

impl TelemetrySnapshot {
    /// Build a snapshot, deriving the active alert count from `systems`.
    pub fn new(
        timestamp: DateTime<Utc>,
        systems: Vec<FuelSystem>,
        overall_readiness: Readiness,
    ) -> Self {
        let active_alert_count = systems.iter().filter(|s| s.readiness.is_alert()).count();
        Self {
            timestamp,
            systems,
            overall_readiness,
            active_alert_count,
        }
    }

    /// System with the least fuel remaining.
    pub fn most_depleted(&self) -> Option<&FuelSystem> {
        self.systems
            .iter()
            .min_by(|a, b| a.fuel_level.total_cmp(&b.fuel_level))
    }

    /// Systems assigned to `pool_id`.
    pub fn pool_members<'a>(&'a self, pool_id: &'a str) -> impl Iterator<Item = &'a FuelSystem> {
        self.systems
            .iter()
            .filter(move |s| s.quota_pool_id.as_deref() == Some(pool_id))
    }
}

/// Outcome of validating one server response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Own keys of the top-level object, for API-drift diagnostics
    pub received_keys: Vec<String>,
}
