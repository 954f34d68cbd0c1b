//! Settings resolution.
//!
//! Compiled defaults, then `~/.snkweb/settings.json` merged on top, then
//! `SNK_*` environment variables. In the file, objects merge key by key,
//! arrays and scalars replace, and `null` keeps whatever was there.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::{LogLevel, MIN_POLL_INTERVAL_MS, SnkSettings};

/// Resolve the path to the settings file (`~/.snkweb/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".snkweb").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<SnkSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Unreadable or malformed files are errors,
/// and so is a merged result that fails [`SnkSettings::validate`].
pub fn load_settings_from_path(path: &Path) -> Result<SnkSettings> {
    let parse_err = |source| SettingsError::Parse {
        path: path.to_path_buf(),
        source,
    };
    let defaults = serde_json::to_value(SnkSettings::default())
        .map_err(|e| SettingsError::InvalidValue(format!("defaults: {e}")))?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content).map_err(parse_err)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: SnkSettings = serde_json::from_value(merged).map_err(parse_err)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
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

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are ignored with a warning (fall back to file/default).
pub fn apply_env_overrides(settings: &mut SnkSettings) {
    if let Some(v) = read_env_string("SNK_URL") {
        settings.endpoint = Some(v);
    }
    if let Some(v) = read_env_u64("SNK_HTTP_TIMEOUT_MS", 1_000, 3_600_000) {
        settings.http.timeout_ms = v;
    }
    if let Some(v) = read_env_u64("SNK_POLL_INTERVAL_MS", MIN_POLL_INTERVAL_MS, 600_000) {
        settings.search.poll_interval_ms = v;
    }
    if let Some(v) = read_env_string("SNK_LOG_LEVEL") {
        match parse_log_level(&v) {
            Some(level) => settings.logging.level = level,
            None => tracing::warn!(key = "SNK_LOG_LEVEL", value = %v, "invalid log level, ignoring"),
        }
    }
    if let Some(v) = read_env_bool("SNK_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a log level name (case-insensitive).
pub fn parse_log_level(val: &str) -> Option<LogLevel> {
    match val.to_lowercase().as_str() {
        "trace" => Some(LogLevel::Trace),
        "debug" => Some(LogLevel::Debug),
        "info" => Some(LogLevel::Info),
        "warn" | "warning" => Some(LogLevel::Warn),
        "error" => Some(LogLevel::Error),
        _ => None,
    }
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

pub(crate) fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let result = parse_bool(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({
            "search": {"pollIntervalMs": 1000, "wsPath": "/api/ws/search"}
        });
        let source = serde_json::json!({
            "search": {"pollIntervalMs": 250}
        });
        let merged = deep_merge(target, source);
        assert_eq!(merged["search"]["pollIntervalMs"], 250);
        assert_eq!(merged["search"]["wsPath"], "/api/ws/search");
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"subs": ["PONG", "parse", "search"]});
        let source = serde_json::json!({"subs": ["search"]});
        let merged = deep_merge(target, source);
        assert_eq!(merged["subs"], serde_json::json!(["search"]));
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_new_keys_added() {
        let target = serde_json::json!({"a": 1});
        let source = serde_json::json!({"endpoint": "https://nk"});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["endpoint"], "https://nk");
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let target = serde_json::json!({"a": {"nested": true}});
        let source = serde_json::json!({"a": 42});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 42);
    }

    // ── load_settings_from_path ─────────────────────────────────────

    #[test]
    fn load_missing_file_returns_defaults() {
        let path = Path::new("/nonexistent/snkweb/settings.json");
        let settings = load_settings_from_path(path).unwrap();
        let defaults = SnkSettings::default();
        assert_eq!(settings.search.ws_path, defaults.search.ws_path);
        assert_eq!(settings.http.timeout_ms, defaults.http.timeout_ms);
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"endpoint": "https://nk.example.com", "http": {"timeoutMs": 5000}, "logging": {"level": "debug"}}"#,
        )
        .unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.http.timeout_ms, 5000);
        assert_eq!(settings.http.connect_timeout_ms, 10_000);
        assert_eq!(settings.logging.level, LogLevel::Debug);
        assert_eq!(settings.search.poll_interval_ms, 1_000);
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();

        let result = load_settings_from_path(&path);
        assert!(matches!(result.unwrap_err(), SettingsError::Parse { path: p, .. } if p == path));
    }

    #[test]
    fn load_wrong_type_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"http": {"timeoutMs": "soon"}}"#).unwrap();

        let result = load_settings_from_path(&path);
        assert!(matches!(result.unwrap_err(), SettingsError::Parse { .. }));
    }

    #[test]
    fn load_null_keeps_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"search": {"wsPath": null, "subscriptions": ["search"]}}"#)
            .unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.search.ws_path, "/api/ws/search");
        assert_eq!(settings.search.subscriptions, ["search"]);
    }

    #[test]
    fn load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"search": {"pollIntervalMs": 5}}"#).unwrap();

        let result = load_settings_from_path(&path);
        assert!(matches!(result.unwrap_err(), SettingsError::InvalidValue(_)));
    }

    // ── parsing helpers ─────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        for v in ["true", "1", "YES", "On"] {
            assert_eq!(parse_bool(v), Some(true), "{v}");
        }
        for v in ["false", "0", "no", "OFF"] {
            assert_eq!(parse_bool(v), Some(false), "{v}");
        }
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parse_u64_range_bounds() {
        assert_eq!(parse_u64_range("500", 100, 1000), Some(500));
        assert_eq!(parse_u64_range("100", 100, 1000), Some(100));
        assert_eq!(parse_u64_range("99", 100, 1000), None);
        assert_eq!(parse_u64_range("1001", 100, 1000), None);
        assert_eq!(parse_u64_range("-5", 0, 1000), None);
        assert_eq!(parse_u64_range("abc", 0, 1000), None);
    }

    #[test]
    fn parse_log_level_names() {
        assert_eq!(parse_log_level("TRACE"), Some(LogLevel::Trace));
        assert_eq!(parse_log_level("warning"), Some(LogLevel::Warn));
        assert_eq!(parse_log_level("error"), Some(LogLevel::Error));
        assert_eq!(parse_log_level("loud"), None);
    }

    #[test]
    fn settings_path_under_home() {
        let path = settings_path();
        assert!(path.ends_with(".snkweb/settings.json"));
    }
}
