//! Error taxonomy for uplink acquisition.
//!
//! Every variant is recovered inside the engine. Callers of the public engine
//! API only ever observe `None`/`false` plus an emitted diagnostic event; these
//! errors exist so internal stages can propagate causes with `?` and the
//! engine can describe what went wrong.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure raised by one stage of the discovery / acquisition pipeline.
#[derive(Debug, Error)]
pub enum UplinkError {
    /// No matching process, or no valid credential in its command line
    #[error("Discovery failure: {0}")]
    Discovery(String),

    /// Candidate ports were found but none answered the capability probe
    #[error("Port exhaustion: none of {attempted} candidate ports answered")]
    PortExhaustion {
        /// Number of ports probed
        attempted: usize,
    },

    /// Timeout, reset, non-success status or oversized body
    #[error("Transport failure: {0}")]
    Transport(String),

    /// Well-formed transport, wrong payload shape
    #[error("Schema invalid: {0}")]
    SchemaInvalid(String),

    /// Malformed JSON
    #[error("Parse failure: {0}")]
    Parse(#[from] serde_json::Error),
}

impl UplinkError {
    /// Failure-governor classification of this error.
    pub fn reason(&self) -> FailureReason {
        match self {
            UplinkError::Discovery(_) | UplinkError::PortExhaustion { .. } => {
                FailureReason::UplinkFailed
            }
            UplinkError::Transport(_) | UplinkError::Parse(_) => FailureReason::NoResponse,
            UplinkError::SchemaInvalid(_) => FailureReason::SchemaInvalid,
        }
    }
}

/// Why an acquisition cycle counted as a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureReason {
    /// Beacon discovery or port probing failed
    UplinkFailed,
    /// The status fetch returned nothing usable
    NoResponse,
    /// The payload failed schema validation
    SchemaInvalid,
    /// A cycle task panicked
    Exception,
}

impl FailureReason {
    /// Wire name, matching the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::UplinkFailed => "uplink-failed",
            FailureReason::NoResponse => "no-response",
            FailureReason::SchemaInvalid => "schema-invalid",
            FailureReason::Exception => "exception",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result type for pipeline stages.
pub type Result<T> = std::result::Result<T, UplinkError>;
