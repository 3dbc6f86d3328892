//! Core types for the Fuelwatch uplink engine.
//!
//! This crate provides the domain records, error taxonomy, typed event bus,
//! configuration and logging bootstrap shared by the uplink, telemetry and
//! engine crates.

pub mod config;
pub mod error;
pub mod event;
pub mod logging;
pub mod types;

pub use config::{ConfigError, EngineConfig, LogFormat, LoggingConfig};
pub use error::{FailureReason, Result, UplinkError};
pub use event::{
    Diagnostic, EventBus, EventKind, ScanCompleted, Subscription, UplinkEstablished, UplinkEvent,
    UplinkLost,
};
pub use types::{
    AlertThresholds, Credential, FuelSystem, Readiness, SystemClass, TelemetrySnapshot,
    UplinkState, ValidationResult,
};
