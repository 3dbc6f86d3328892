//! Fuelwatch uplink engine.
//!
//! Owns the uplink lifecycle: discovery, periodic acquisition, signal
//! degradation and failure escalation. Construct one [`UplinkEngine`] per
//! language server to watch; it publishes everything it learns on its
//! [`fuelwatch_core::EventBus`].

pub mod diagnostics;
pub mod engine;
pub mod governor;

pub use diagnostics::{Diagnostics, FailureRecord, MAX_EXCERPT_CHARS};
pub use engine::UplinkEngine;
pub use governor::{FailureAlert, FailureGovernor};
