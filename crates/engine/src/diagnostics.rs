//! Diagnostics retained from the most recent fetch.

use chrono::{DateTime, Utc};
use fuelwatch_core::{FailureReason, ValidationResult};
use serde::Serialize;
use serde_json::Value;

/// Longest raw response excerpt kept for display.
pub const MAX_EXCERPT_CHARS: usize = 2048;

const TRUNCATION_MARKER: &str = "...[truncated]";

/// Cap `raw` at [`MAX_EXCERPT_CHARS`] characters, marking truncation.
pub fn excerpt(raw: &str) -> String {
    match raw.char_indices().nth(MAX_EXCERPT_CHARS) {
        Some((cut, _)) => format!("{}{}", &raw[..cut], TRUNCATION_MARKER),
        None => raw.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureRecord {
    pub at: DateTime<Utc>,
    pub reason: FailureReason,
    pub message: String,
}

/// Snapshot of what the engine last saw, for troubleshooting API drift.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    /// Size-capped serialization of the last status response
    pub last_response: Option<String>,
    pub last_validation: Option<ValidationResult>,
    pub last_failure: Option<FailureRecord>,
}

impl Diagnostics {
    pub(crate) fn record_response(&mut self, response: &Value, validation: ValidationResult) {
        self.last_response = Some(excerpt(&response.to_string()));
        self.last_validation = Some(validation);
    }

    pub(crate) fn record_failure(&mut self, reason: FailureReason, message: &str) {
        self.last_failure = Some(FailureRecord {
            at: Utc::now(),
            reason,
            message: excerpt(message),
        });
    }
}
