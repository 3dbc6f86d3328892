//! Readiness classification
//!
//! Per-system readiness compares the fuel fraction against the configured
//! percentage thresholds; boundaries fall on the severe side. Overall
//! readiness aggregates a whole snapshot.

use fuelwatch_core::{AlertThresholds, FuelSystem, Readiness, SystemClass};

/// Classify one fuel level (fraction in `[0, 1]`).
pub fn assess_readiness(fuel_level: f64, thresholds: &AlertThresholds) -> Readiness {
    if fuel_level <= thresholds.critical / 100.0 {
        Readiness::Critical
    } else if fuel_level <= thresholds.warning / 100.0 {
        Readiness::Warning
    } else if fuel_level <= thresholds.caution / 100.0 {
        Readiness::Caution
    } else {
        Readiness::Nominal
    }
}

/// Infer the model family from its label. First match wins.
pub fn classify(label: &str) -> SystemClass {
    let label = label.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| label.contains(n));

    if has(&["flash"]) {
        SystemClass::GeminiFlash
    } else if has(&["gemini", "pro"]) {
        SystemClass::GeminiPro
    } else if has(&["claude", "sonnet", "opus"]) {
        SystemClass::Claude
    } else if has(&["gpt", "oss"]) {
        SystemClass::Gpt
    } else {
        SystemClass::Experimental
    }
}

/// Fleet-wide readiness. Checks run in order; the first that holds wins.
///
/// CAUTION systems on their own leave the fleet NOMINAL.
pub fn assess_overall(systems: &[FuelSystem]) -> Readiness {
    if systems.is_empty() {
        return Readiness::Offline;
    }
    if systems.iter().any(|s| s.readiness == Readiness::Critical) {
        return Readiness::Critical;
    }

    let warnings = systems
        .iter()
        .filter(|s| s.readiness == Readiness::Warning)
        .count();

    if warnings * 2 >= systems.len() {
        Readiness::Warning
    } else if warnings > 0 {
        Readiness::Caution
    } else {
        Readiness::Nominal
    }
}
