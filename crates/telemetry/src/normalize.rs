//! Data Normalizer: raw model configs to [`FuelSystem`] records.
//!
//! Every entry is untrusted. Entries that fail a check are dropped, not
//! repaired, except for fuel levels which are clamped into `[0, 1]`.

use chrono::{DateTime, Utc};
use fuelwatch_core::{AlertThresholds, FuelSystem};
use serde_json::Value;
use tracing::debug;

use crate::pool::assign_quota_pools;
use crate::readiness::{assess_readiness, classify};

/// Entries beyond this many accepted systems are ignored.
pub const MAX_SYSTEMS: usize = 200;
/// Labels are truncated to this many characters.
pub const MAX_LABEL_CHARS: usize = 128;
/// Longest accepted system id.
pub const MAX_SYSTEM_ID_CHARS: usize = 256;

/// `gemini_3-pro high` -> `Gemini 3 Pro High`.
pub fn format_designation(label: &str) -> String {
    label
        .replace(['_', '-'], " ")
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

fn model_configs(response: &Value) -> &[Value] {
    response
        .pointer("/userStatus/cascadeModelConfigData/clientModelConfigs")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn parse_reset_time(quota_info: &Value) -> Option<DateTime<Utc>> {
    let raw = quota_info.get("resetTime")?.as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|eta| eta.with_timezone(&Utc))
}

fn normalize_entry(entry: &Value, thresholds: &AlertThresholds) -> Option<FuelSystem> {
    let entry = entry.as_object()?;
    let quota_info = entry.get("quotaInfo")?;

    let label = entry.get("label")?.as_str()?.trim();
    if label.is_empty() {
        return None;
    }
    let label: String = label.chars().take(MAX_LABEL_CHARS).collect();

    let fraction = quota_info.get("remainingFraction")?.as_f64()?;
    if !fraction.is_finite() {
        return None;
    }
    let fuel_level = fraction.clamp(0.0, 1.0);

    let system_id = entry
        .get("modelOrAlias")
        .and_then(|alias| alias.get("model"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|model| !model.is_empty())
        .unwrap_or(label.as_str())
        .to_string();
    if system_id.is_empty() || system_id.chars().count() > MAX_SYSTEM_ID_CHARS {
        return None;
    }

    Some(FuelSystem {
        system_id,
        designation: format_designation(&label),
        fuel_level,
        replenishment_eta: parse_reset_time(quota_info),
        readiness: assess_readiness(fuel_level, thresholds),
        system_class: classify(&label),
        quota_pool_id: None,
    })
}

/// Normalize a validated status response.
///
/// Output is sorted ascending by fuel level (stable) and carries pool ids.
pub fn normalize(response: &Value, thresholds: &AlertThresholds) -> Vec<FuelSystem> {
    let configs = model_configs(response);

    let mut systems: Vec<FuelSystem> = configs
        .iter()
        .filter_map(|entry| normalize_entry(entry, thresholds))
        .take(MAX_SYSTEMS)
        .collect();

    let rejected = configs.len().saturating_sub(systems.len());
    if rejected > 0 {
        debug!(accepted = systems.len(), rejected, "Dropped model configs");
    }

    systems.sort_by(|a, b| a.fuel_level.total_cmp(&b.fuel_level));
    assign_quota_pools(&mut systems);
    systems
}

#[cfg(test)]
mod tests {
    use super::*;
    use fuelwatch_core::{Readiness, SystemClass};
    use serde_json::json;

    fn response(configs: Value) -> Value {
        json!({ "userStatus": { "cascadeModelConfigData": { "clientModelConfigs": configs } } })
    }

    fn entry(label: &str, fraction: f64) -> Value {
        json!({ "label": label, "quotaInfo": { "remainingFraction": fraction } })
    }

    #[test]
    fn test_format_designation() {
        assert_eq!(format_designation("gemini_3-pro high"), "Gemini 3 Pro High");
        assert_eq!(format_designation("  claude  "), "Claude");
        assert_eq!(format_designation("GPT-OSS"), "GPT OSS");
    }

    #[test]
    fn test_end_to_end_sorted_ascending() {
        let systems = normalize(
            &response(json!([entry("high", 0.9), entry("low", 0.1), entry("mid", 0.5)])),
            &AlertThresholds::default(),
        );
        let ids: Vec<_> = systems.iter().map(|s| s.system_id.as_str()).collect();
        assert_eq!(ids, vec!["low", "mid", "high"]);
        assert_eq!(systems[0].readiness, Readiness::Warning);
        assert_eq!(systems[2].readiness, Readiness::Nominal);
    }

    #[test]
    fn test_fuel_clamped() {
        let systems = normalize(
            &response(json!([entry("under", -0.1), entry("over", 1.5)])),
            &AlertThresholds::default(),
        );
        assert_eq!(systems[0].fuel_level, 0.0);
        assert_eq!(systems[0].readiness, Readiness::Critical);
        assert_eq!(systems[1].fuel_level, 1.0);
    }

    #[test]
    fn test_rejects_bad_labels_and_missing_quota() {
        let configs = json!([
            { "label": 42, "quotaInfo": { "remainingFraction": 0.5 } },
            { "label": "   ", "quotaInfo": { "remainingFraction": 0.5 } },
            { "label": null, "quotaInfo": { "remainingFraction": 0.5 } },
            { "label": "no quota" },
            { "label": "bad fraction", "quotaInfo": { "remainingFraction": "0.5" } },
            { "label": "missing fraction", "quotaInfo": {} },
            "not an object",
            null,
            entry("kept", 0.5)
        ]);
        let systems = normalize(&response(configs), &AlertThresholds::default());
        assert_eq!(systems.len(), 1);
        assert_eq!(systems[0].system_id, "kept");
    }

    #[test]
    fn test_model_id_and_fallbacks() {
        let configs = json!([
            {
                "label": "Claude Sonnet 4.5",
                "modelOrAlias": { "model": " MODEL_CLAUDE_4_5_SONNET " },
                "quotaInfo": { "remainingFraction": 0.3, "resetTime": "2026-10-20T08:00:00Z" }
            },
            {
                "label": "Gemini Flash",
                "modelOrAlias": "not an object",
                "quotaInfo": { "remainingFraction": 0.6, "resetTime": "tomorrow" }
            },
            {
                "label": "Too Long",
                "modelOrAlias": { "model": "x".repeat(MAX_SYSTEM_ID_CHARS + 1) },
                "quotaInfo": { "remainingFraction": 0.6 }
            }
        ]);
        let systems = normalize(&response(configs), &AlertThresholds::default());
        assert_eq!(systems.len(), 2);

        assert_eq!(systems[0].system_id, "MODEL_CLAUDE_4_5_SONNET");
        assert_eq!(systems[0].system_class, SystemClass::Claude);
        assert_eq!(
            systems[0].replenishment_eta.map(|eta| eta.to_rfc3339()),
            Some("2026-10-20T08:00:00+00:00".to_string())
        );

        assert_eq!(systems[1].system_id, "Gemini Flash");
        assert_eq!(systems[1].system_class, SystemClass::GeminiFlash);
        assert!(systems[1].replenishment_eta.is_none());
    }

    #[test]
    fn test_blank_model_falls_back_to_label() {
        let configs = json!([
            { "label": "Blank", "modelOrAlias": { "model": "" }, "quotaInfo": { "remainingFraction": 0.2 } },
            { "label": "Spaces", "modelOrAlias": { "model": "   " }, "quotaInfo": { "remainingFraction": 0.4 } }
        ]);
        let systems = normalize(&response(configs), &AlertThresholds::default());
        let ids: Vec<_> = systems.iter().map(|s| s.system_id.as_str()).collect();
        assert_eq!(ids, vec!["Blank", "Spaces"]);
    }

    #[test]
    fn test_label_truncated() {
        let long = "a".repeat(500);
        let systems = normalize(&response(json!([entry(&long, 0.5)])), &AlertThresholds::default());
        assert_eq!(systems[0].system_id.len(), MAX_LABEL_CHARS);
    }

    #[test]
    fn test_entry_cap() {
        let configs: Vec<Value> = (0..250).map(|i| entry(&format!("m{}", i), 0.5)).collect();
        let systems = normalize(&response(Value::Array(configs)), &AlertThresholds::default());
        assert_eq!(systems.len(), MAX_SYSTEMS);
    }

    #[test]
    fn test_pools_follow_sorted_order() {
        let systems = normalize(
            &response(json!([
                entry("a", 0.875),
                entry("b", 0.2),
                entry("c", 0.875),
                entry("d", 0.2),
                entry("e", 1.0)
            ])),
            &AlertThresholds::default(),
        );
        let pools: Vec<_> = systems
            .iter()
            .map(|s| (s.system_id.as_str(), s.quota_pool_id.as_deref()))
            .collect();
        assert_eq!(
            pools,
            vec![
                ("b", Some("pool-1")),
                ("d", Some("pool-1")),
                ("a", Some("pool-2")),
                ("c", Some("pool-2")),
                ("e", None)
            ]
        );
    }

    #[test]
    fn test_malformed_response_yields_nothing() {
        assert!(normalize(&json!(null), &AlertThresholds::default()).is_empty());
        assert!(normalize(&json!({ "userStatus": 1 }), &AlertThresholds::default()).is_empty());
    }
}
