//! Settings loading from configuration files.
//!
//! This module loads [`EngineSettings`] from TOML or JSON and applies
//! environment variable overrides.
//!
//! ## Loading Order
//!
//! 1. Start with default settings.
//! 2. Load from a TOML or JSON file (overriding defaults).
//! 3. Apply environment variable overrides (highest priority).
//!
//! ## Environment Variable Mapping
//!
//! | Env Var | Setting |
//! |---|---|
//! | `AJINJA_DEBUG` | `debug` |
//! | `AJINJA_LOG_LEVEL` | `log_level` |
//! | `AJINJA_CACHE_TEMPLATES` | `cache_templates` |
//! | `AJINJA_MAX_RENDER_DEPTH` | `max_render_depth` (`0` or `none` disables the bound) |
//! | `AJINJA_STRICT_UNDEFINED` | `strict_undefined` |
//!
//! ## Examples
//!
//! ```rust,no_run
//! use ajinja_rs_core::settings_loader;
//!
//! let settings = settings_loader::from_toml_file_with_env("ajinja.toml").unwrap();
//! assert!(settings.cache_templates);
//! ```

use std::path::Path;

use crate::error::JinjaError;
use crate::settings::EngineSettings;

const ENV_PREFIX: &str = "AJINJA_";

/// Loads settings from a TOML string.
///
/// Fields absent from the document keep their default values.
pub fn from_toml_str(toml_str: &str) -> Result<EngineSettings, JinjaError> {
    let toml_value: toml::Value = toml::from_str(toml_str)
        .map_err(|e| JinjaError::ConfigurationError(format!("Failed to parse TOML: {e}")))?;
    merge_over_defaults(toml_to_json(toml_value), "TOML")
}

/// Loads settings from a TOML file.
pub fn from_toml_file(path: impl AsRef<Path>) -> Result<EngineSettings, JinjaError> {
    from_toml_str(&read_config(path.as_ref(), "TOML")?)
}

/// Loads settings from a TOML file and then applies environment variable overrides.
pub fn from_toml_file_with_env(path: impl AsRef<Path>) -> Result<EngineSettings, JinjaError> {
    let mut settings = from_toml_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Loads settings from a JSON string.
pub fn from_json_str(json_str: &str) -> Result<EngineSettings, JinjaError> {
    let json_value: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| JinjaError::ConfigurationError(format!("Failed to parse JSON: {e}")))?;
    merge_over_defaults(json_value, "JSON")
}

/// Loads settings from a JSON file.
pub fn from_json_file(path: impl AsRef<Path>) -> Result<EngineSettings, JinjaError> {
    from_json_str(&read_config(path.as_ref(), "JSON")?)
}

/// Loads settings from a JSON file and then applies environment variable overrides.
pub fn from_json_file_with_env(path: impl AsRef<Path>) -> Result<EngineSettings, JinjaError> {
    let mut settings = from_json_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Loads settings from just environment variables (starting from defaults).
pub fn from_env() -> EngineSettings {
    let mut settings = EngineSettings::default();
    apply_env_overrides(&mut settings);
    settings
}

/// Applies `AJINJA_*` environment variable overrides to a settings struct.
///
/// Boolean variables accept `true`/`1`/`yes` (case-insensitive) as true and
/// anything else as false. An unparsable `AJINJA_MAX_RENDER_DEPTH` is ignored.
pub fn apply_env_overrides(settings: &mut EngineSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

fn apply_overrides_from(settings: &mut EngineSettings, lookup: impl Fn(&str) -> Option<String>) {
    let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

    if let Some(val) = var("DEBUG") {
        settings.debug = parse_flag(&val);
    }

    if let Some(val) = var("LOG_LEVEL") {
        settings.log_level = val;
    }

    if let Some(val) = var("CACHE_TEMPLATES") {
        settings.cache_templates = parse_flag(&val);
    }

    if let Some(val) = var("MAX_RENDER_DEPTH") {
        let val = val.trim();
        if val.eq_ignore_ascii_case("none") || val == "0" {
            settings.max_render_depth = None;
        } else if let Ok(depth) = val.parse::<usize>() {
            settings.max_render_depth = Some(depth);
        }
    }

    if let Some(val) = var("STRICT_UNDEFINED") {
        settings.strict_undefined = parse_flag(&val);
    }
}

// ============================================================
// Helpers
// ============================================================

fn parse_flag(val: &str) -> bool {
    matches!(val.trim().to_lowercase().as_str(), "true" | "1" | "yes")
}

fn read_config(path: &Path, format: &str) -> Result<String, JinjaError> {
    std::fs::read_to_string(path).map_err(|e| {
        JinjaError::ConfigurationError(format!(
            "Failed to read {format} file '{}': {e}",
            path.display()
        ))
    })
}

/// Deserializes `value` on top of the serialized defaults.
fn merge_over_defaults(
    value: serde_json::Value,
    format: &str,
) -> Result<EngineSettings, JinjaError> {
    let default_json = serde_json::to_value(EngineSettings::default()).map_err(|e| {
        JinjaError::ConfigurationError(format!("Failed to serialize default settings: {e}"))
    })?;

    let merged = merge_json(default_json, value);
    serde_json::from_value(merged).map_err(|e| {
        JinjaError::ConfigurationError(format!("Failed to deserialize settings from {format}: {e}"))
    })
}

/// Converts a TOML value to a `serde_json::Value`.
fn toml_to_json(value: toml::Value) -> serde_json::Value {
    match value {
        toml::Value::String(s) => serde_json::Value::String(s),
        toml::Value::Integer(i) => serde_json::json!(i),
        toml::Value::Float(f) => serde_json::json!(f),
        toml::Value::Boolean(b) => serde_json::Value::Bool(b),
        toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
        toml::Value::Array(arr) => {
            serde_json::Value::Array(arr.into_iter().map(toml_to_json).collect())
        }
        toml::Value::Table(table) => serde_json::Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

/// Deep-merges two JSON values. The `override_val` takes precedence.
fn merge_json(base: serde_json::Value, override_val: serde_json::Value) -> serde_json::Value {
    match (base, override_val) {
        (serde_json::Value::Object(mut base_map), serde_json::Value::Object(override_map)) => {
            for (key, override_v) in override_map {
                let merged = match base_map.remove(&key) {
                    Some(base_v) => merge_json(base_v, override_v),
                    None => override_v,
                };
                base_map.insert(key, merged);
            }
            serde_json::Value::Object(base_map)
        }
        (_, override_val) => override_val,
    }
}
