//! Schema Validator for `GetUserStatus` responses.
//!
//! The payload is untrusted. Validation walks
//! `userStatus.cascadeModelConfigData.clientModelConfigs[]`, stops at the first
//! broken level and names the missing key together with the keys that were
//! present instead, so API drift is visible in diagnostics.

use fuelwatch_core::ValidationResult;
use serde_json::{Map, Value};

const PATH: [&str; 3] = ["userStatus", "cascadeModelConfigData", "clientModelConfigs"];

/// JSON type name used in error messages.
fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn keys_of(object: &Map<String, Value>) -> Vec<String> {
    object.keys().cloned().collect()
}

fn describe_keys(keys: &[String]) -> String {
    if keys.is_empty() {
        "none".to_string()
    } else {
        keys.join(", ")
    }
}

/// Validate the shape of a status response. Never panics.
pub fn validate_server_response(response: &Value) -> ValidationResult {
    let mut result = ValidationResult::default();

    let root = match response.as_object() {
        Some(root) => root,
        None => {
            result.errors.push(format!(
                "Response is not an object (got {})",
                type_name(response)
            ));
            return result;
        }
    };
    result.received_keys = keys_of(root);

    let mut current = root;
    let mut location = String::from("response");
    for (depth, key) in PATH.iter().enumerate() {
        let value = match current.get(*key) {
            Some(value) => value,
            None => {
                result.errors.push(format!(
                    "Missing '{}' in {} (present keys: {})",
                    key,
                    location,
                    describe_keys(&keys_of(current))
                ));
                return result;
            }
        };

        if depth == PATH.len() - 1 {
            match value.as_array() {
                Some(configs) => inspect_configs(configs, &mut result),
                None => {
                    result.errors.push(format!(
                        "'{}' is not an array (got {})",
                        key,
                        type_name(value)
                    ));
                    return result;
                }
            }
        } else {
            match value.as_object() {
                Some(next) => current = next,
                None => {
                    result.errors.push(format!(
                        "'{}' is not an object (got {})",
                        key,
                        type_name(value)
                    ));
                    return result;
                }
            }
            location = format!("'{}'", key);
        }
    }

    result.valid = true;
    result
}

/// Non-fatal checks, first element only.
fn inspect_configs(configs: &[Value], result: &mut ValidationResult) {
    let first = match configs.first() {
        Some(first) => first,
        None => {
            result
                .warnings
                .push("clientModelConfigs is empty; no models reported".to_string());
            return;
        }
    };

    if first.is_null() {
        result
            .warnings
            .push("First model config is null".to_string());
        return;
    }

    if first.get("label").is_none() && first.get("quotaInfo").is_none() {
        result.warnings.push(
            "First model config has neither 'label' nor 'quotaInfo'; the format may have changed"
                .to_string(),
        );
    }
}
