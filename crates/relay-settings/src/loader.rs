//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`RelaySettings::default()`]
//! 2. If the settings file exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::{LogFormat, RelaySettings};

/// Resolve the settings file path.
///
/// `$RELAY_HOME/settings.json` when `RELAY_HOME` is set, otherwise
/// `~/.relay/settings.json`.
pub fn settings_path() -> PathBuf {
    if let Some(dir) = read_env_string("RELAY_HOME") {
        return PathBuf::from(dir).join("settings.json");
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".relay").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<RelaySettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; a file with invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<RelaySettings> {
    let mut settings = read_settings_file(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Read and merge the settings file over defaults, without env overrides.
pub fn read_settings_file(path: &Path) -> Result<RelaySettings> {
    let defaults = serde_json::to_value(RelaySettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
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

/// Apply `RELAY_*` environment variable overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut RelaySettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary variable source.
///
/// Invalid values are logged and ignored (fall back to file/default).
pub fn apply_overrides_from(
    settings: &mut RelaySettings,
    lookup: impl Fn(&str) -> Option<String>,
) {
    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = read_string(&lookup, "RELAY_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_parsed(&lookup, "RELAY_PORT", |v| parse_u16_range(v, 0, 65535)) {
        settings.server.port = v;
    }
    if let Some(v) = read_parsed(&lookup, "RELAY_SEND_TIMEOUT_MS", |v| {
        parse_u64_range(v, 1, 600_000)
    }) {
        settings.server.send_timeout_ms = v;
    }
    if let Some(v) = read_parsed(&lookup, "RELAY_HEARTBEAT_INTERVAL_MS", |v| {
        parse_u64_range(v, 1_000, 600_000)
    }) {
        settings.server.heartbeat_interval_ms = v;
    }
    if let Some(v) = read_parsed(&lookup, "RELAY_MAX_MESSAGE_SIZE", |v| {
        parse_usize_range(v, 1, 64 * 1024 * 1024)
    }) {
        settings.server.max_message_size = v;
    }

    // ── Hub ─────────────────────────────────────────────────────────
    if let Some(v) = read_string(&lookup, "RELAY_HUB_NAME") {
        settings.hub.name = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read_string(&lookup, "RELAY_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_parsed(&lookup, "RELAY_LOG_FORMAT", LogFormat::parse) {
        settings.logging.format = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Variable readers (thin wrappers) ────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_string(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).filter(|v| !v.is_empty())
}

fn read_parsed<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    let val = read_string(lookup, name)?;
    let result = parse(&val);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid env var, ignoring");
    }
    result
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn apply(pairs: &[(&str, &str)]) -> RelaySettings {
        let env = vars(pairs);
        let mut settings = RelaySettings::default();
        apply_overrides_from(&mut settings, |k| env.get(k).cloned());
        settings
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"server": {"port": 8787, "host": "0.0.0.0"}});
        let source = serde_json::json!({"server": {"port": 9090}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "0.0.0.0");
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
    fn merge_array_replace() {
        let target = serde_json::json!({"items": [1, 2, 3]});
        let source = serde_json::json!({"items": [4]});
        assert_eq!(deep_merge(target, source)["items"], serde_json::json!([4]));
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let target = serde_json::json!({"a": {"nested": true}});
        let source = serde_json::json!({"a": 42});
        assert_eq!(deep_merge(target, source)["a"], 42);
    }

    // ── file loading ────────────────────────────────────────────────

    #[test]
    fn missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let s = read_settings_file(&dir.path().join("nope.json")).unwrap();
        assert_eq!(s.server.port, 8787);
        assert_eq!(s.hub.name, "global");
    }

    #[test]
    fn file_values_merge_over_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"server":{{"port":9100}},"hub":{{"closeReason":"bye"}}}}"#
        )
        .unwrap();
        let s = read_settings_file(file.path()).unwrap();
        assert_eq!(s.server.port, 9100);
        assert_eq!(s.server.host, "0.0.0.0");
        assert_eq!(s.hub.close_reason, "bye");
        assert_eq!(s.hub.name, "global");
    }

    #[test]
    fn invalid_json_is_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();
        let err = read_settings_file(file.path()).unwrap_err();
        assert!(matches!(err, SettingsError::Parse { .. }));
        assert!(err.to_string().contains(&file.path().display().to_string()));
    }

    #[test]
    fn wrong_field_type_is_shape_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"server":{{"port":"http"}}}}"#).unwrap();
        let err = read_settings_file(file.path()).unwrap_err();
        assert!(matches!(err, SettingsError::Shape(_)));
    }

    #[test]
    fn unreadable_path_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory exists but cannot be read as a file.
        let err = read_settings_file(dir.path()).unwrap_err();
        assert!(matches!(err, SettingsError::Read { .. }));
    }

    #[test]
    fn load_rejects_invalid_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"hub":{{"mailboxCapacity":0}}}}"#).unwrap();
        let err = load_settings_from_path(file.path()).unwrap_err();
        assert_eq!(err.field(), Some("hub.mailboxCapacity"));
    }

    // ── env overrides ───────────────────────────────────────────────

    #[test]
    fn env_overrides_server_fields() {
        let s = apply(&[
            ("RELAY_HOST", "127.0.0.1"),
            ("RELAY_PORT", "9000"),
            ("RELAY_SEND_TIMEOUT_MS", "250"),
            ("RELAY_HEARTBEAT_INTERVAL_MS", "15000"),
            ("RELAY_MAX_MESSAGE_SIZE", "4096"),
        ]);
        assert_eq!(s.server.host, "127.0.0.1");
        assert_eq!(s.server.port, 9000);
        assert_eq!(s.server.send_timeout_ms, 250);
        assert_eq!(s.server.heartbeat_interval_ms, 15_000);
        assert_eq!(s.server.max_message_size, 4096);
    }

    #[test]
    fn env_overrides_hub_and_logging() {
        let s = apply(&[
            ("RELAY_HUB_NAME", "lobby"),
            ("RELAY_LOG_LEVEL", "debug"),
            ("RELAY_LOG_FORMAT", "json"),
        ]);
        assert_eq!(s.hub.name, "lobby");
        assert_eq!(s.logging.level, "debug");
        assert_eq!(s.logging.format, LogFormat::Json);
    }

    #[test]
    fn invalid_env_values_ignored() {
        let s = apply(&[
            ("RELAY_PORT", "not-a-port"),
            ("RELAY_SEND_TIMEOUT_MS", "0"),
            ("RELAY_HEARTBEAT_INTERVAL_MS", "10"),
            ("RELAY_LOG_FORMAT", "xml"),
        ]);
        let defaults = RelaySettings::default();
        assert_eq!(s.server.port, defaults.server.port);
        assert_eq!(s.server.send_timeout_ms, defaults.server.send_timeout_ms);
        assert_eq!(
            s.server.heartbeat_interval_ms,
            defaults.server.heartbeat_interval_ms
        );
        assert_eq!(s.logging.format, LogFormat::Compact);
    }

    #[test]
    fn empty_env_values_ignored() {
        let s = apply(&[("RELAY_HUB_NAME", ""), ("RELAY_HOST", "")]);
        assert_eq!(s.hub.name, "global");
        assert_eq!(s.server.host, "0.0.0.0");
    }

    // ── parsing ─────────────────────────────────────────────────────

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_u16_range("8080", 1, 65535), Some(8080));
        assert_eq!(parse_u16_range("0", 1, 65535), None);
        assert_eq!(parse_u16_range("70000", 1, 65535), None);
        assert_eq!(parse_u64_range("5", 1, 10), Some(5));
        assert_eq!(parse_u64_range("11", 1, 10), None);
        assert_eq!(parse_usize_range("abc", 1, 10), None);
    }
}
