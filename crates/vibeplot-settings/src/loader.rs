//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`BridgeSettings::default()`]
//! 2. If `~/.vibeplot/settings.json` exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{BridgeSettings, LogFormat};

/// Resolve the path to the settings file (`~/.vibeplot/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".vibeplot").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<BridgeSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON, or a merged result that
/// fails [`BridgeSettings::validate`], is an error.
pub fn load_settings_from_path(path: &Path) -> Result<BridgeSettings> {
    let mut settings = merge_file(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn merge_file(path: &Path) -> Result<BridgeSettings> {
    let defaults = serde_json::to_value(BridgeSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `VIBEPLOT_*` environment overrides.
///
/// Values that fail to parse or fall outside their range are ignored with
/// a warning, leaving the file/default value in place.
pub fn apply_env_overrides(settings: &mut BridgeSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary lookup (env vars in production, a map in tests).
pub fn apply_overrides(settings: &mut BridgeSettings, lookup: impl Fn(&str) -> Option<String>) {
    let string = |name: &str| lookup(name).filter(|v| !v.is_empty());
    let ranged_u64 = |name: &str, min: u64, max: u64| {
        let val = lookup(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid numeric env var, ignoring");
        }
        result
    };

    if let Some(v) = string("VIBEPLOT_HOST") {
        settings.host = v;
    }
    if let Some(val) = lookup("VIBEPLOT_PORT") {
        match parse_u16_range(&val, 0, u16::MAX) {
            Some(port) => settings.port = port,
            None => tracing::warn!(key = "VIBEPLOT_PORT", value = %val, "invalid port env var, ignoring"),
        }
    }
    if let Some(v) = string("VIBEPLOT_PEER_URL") {
        settings.peer_url = v;
    }
    if let Some(v) = ranged_u64("VIBEPLOT_STARTUP_TIMEOUT_MS", 1, 600_000) {
        settings.startup_timeout_ms = v;
    }
    if let Some(v) = ranged_u64("VIBEPLOT_SEND_TIMEOUT_MS", 1, 600_000) {
        settings.send_timeout_ms = v;
    }
    if let Some(v) = ranged_u64("VIBEPLOT_WRITE_TIMEOUT_MS", 1, 600_000) {
        settings.write_timeout_ms = v;
    }
    if let Some(v) = string("VIBEPLOT_LOG_LEVEL") {
        settings.log_level = v;
    }
    if let Some(val) = lookup("VIBEPLOT_LOG_FORMAT") {
        match LogFormat::parse(&val) {
            Some(format) => settings.log_format = format,
            None => tracing::warn!(key = "VIBEPLOT_LOG_FORMAT", value = %val, "invalid log format env var, ignoring"),
        }
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::errors::SettingsError;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_simple_override() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": 10});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 10);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"net": {"port": 9753, "host": "localhost"}});
        let source = serde_json::json!({"net": {"port": 9000}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["net"]["port"], 9000);
        assert_eq!(merged["net"]["host"], "localhost");
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"items": [1, 2, 3]});
        let source = serde_json::json!({"items": [4]});
        assert_eq!(deep_merge(target, source)["items"], serde_json::json!([4]));
    }

    // ── load_settings_from_path ─────────────────────────────────────

    #[test]
    fn load_missing_file_returns_defaults() {
        let settings = merge_file(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings, BridgeSettings::default());
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"port": 9900, "sendTimeoutMs": 250}"#).unwrap();

        let settings = merge_file(&path).unwrap();
        assert_eq!(settings.port, 9900);
        assert_eq!(settings.send_timeout_ms, 250);
        assert_eq!(settings.host, "localhost");
        assert_eq!(settings.startup_timeout_ms, 5_000);
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();

        let result = load_settings_from_path(&path);
        assert!(matches!(result.unwrap_err(), SettingsError::Json(_)));
    }

    #[test]
    fn load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"writeTimeoutMs": 0}"#).unwrap();

        let result = load_settings_from_path(&path);
        assert!(matches!(result.unwrap_err(), SettingsError::InvalidValue(_)));
    }

    // ── overrides ───────────────────────────────────────────────────

    #[test]
    fn overrides_apply() {
        let mut settings = BridgeSettings::default();
        apply_overrides(
            &mut settings,
            lookup_from(&[
                ("VIBEPLOT_HOST", "0.0.0.0"),
                ("VIBEPLOT_PORT", "9800"),
                ("VIBEPLOT_SEND_TIMEOUT_MS", "1500"),
                ("VIBEPLOT_LOG_LEVEL", "debug"),
                ("VIBEPLOT_LOG_FORMAT", "json"),
            ]),
        );
        assert_eq!(settings.log_format, LogFormat::Json);
        assert_eq!(settings.host, "0.0.0.0");
        assert_eq!(settings.port, 9800);
        assert_eq!(settings.send_timeout_ms, 1_500);
        assert_eq!(settings.log_level, "debug");
    }

    #[test]
    fn invalid_overrides_ignored() {
        let mut settings = BridgeSettings::default();
        apply_overrides(
            &mut settings,
            lookup_from(&[
                ("VIBEPLOT_HOST", ""),
                ("VIBEPLOT_PORT", "99999"),
                ("VIBEPLOT_STARTUP_TIMEOUT_MS", "0"),
                ("VIBEPLOT_WRITE_TIMEOUT_MS", "soon"),
                ("VIBEPLOT_LOG_FORMAT", "pretty"),
            ]),
        );
        assert_eq!(settings, BridgeSettings::default());
    }

    // ── parsing ─────────────────────────────────────────────────────

    #[test]
    fn parse_u16_bounds() {
        assert_eq!(parse_u16_range("9753", 0, u16::MAX), Some(9753));
        assert_eq!(parse_u16_range("0", 1, u16::MAX), None);
        assert_eq!(parse_u16_range("not_a_number", 0, u16::MAX), None);
    }

    #[test]
    fn parse_u64_bounds() {
        assert_eq!(parse_u64_range("5000", 1, 600_000), Some(5_000));
        assert_eq!(parse_u64_range("700000", 1, 600_000), None);
        assert_eq!(parse_u64_range(" 42 ", 1, 600_000), Some(42));
    }
}
