//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`DirectorSettings::default()`]
//! 2. If the settings file exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//! 4. Validate
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::DirectorSettings;

/// Resolve the path to the settings file (`~/.director/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".director").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<DirectorSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults (plus env overrides). If the
/// file contains invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<DirectorSettings> {
    let mut settings = read_layers(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn read_layers(path: &Path) -> Result<DirectorSettings> {
    let defaults = serde_json::to_value(DirectorSettings::default()).map_err(SettingsError::Shape)?;
    if !path.exists() {
        debug!(?path, "no settings file, using defaults");
        return serde_json::from_value(defaults).map_err(SettingsError::Shape);
    }

    debug!(?path, "loading settings file");
    let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
        path: path.to_owned(),
        source,
    })?;
    let user: Value = serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
        path: path.to_owned(),
        source,
    })?;
    serde_json::from_value(deep_merge(defaults, user)).map_err(SettingsError::Shape)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
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

/// Apply `DIRECTOR_*` environment overrides. Unparseable or out-of-range
/// values are warned about and leave the setting untouched.
pub fn apply_env_overrides(settings: &mut DirectorSettings) {
    let non_empty = |v: &str| (!v.is_empty()).then(|| v.to_owned());

    if let Some(host) = env_override("DIRECTOR_HOST", non_empty) {
        settings.server.host = host;
    }
    if let Some(port) = env_override("DIRECTOR_PORT", |v| v.parse::<u16>().ok()) {
        settings.server.port = port;
    }
    if let Some(ms) = env_override("DIRECTOR_HEARTBEAT_INTERVAL_MS", |v| {
        parse_u64_range(v, 100, 3_600_000)
    }) {
        settings.heartbeat.interval_ms = ms;
    }
    if let Some(ms) = env_override("DIRECTOR_SETTLE_DELAY_MS", |v| parse_u64_range(v, 0, 600_000)) {
        settings.invocation.settle_delay_ms = ms;
    }
    if let Some(cap) = env_override("DIRECTOR_MAX_RETRIES", parse_retry_cap) {
        settings.invocation.max_retries = cap;
    }
    if let Some(level) = env_override("DIRECTOR_LOG_LEVEL", non_empty) {
        settings.logging.level = level;
    }
    if let Some(json) = env_override("DIRECTOR_LOG_JSON", parse_bool) {
        settings.logging.json = json;
    }
}

fn env_override<T>(key: &str, parse: impl FnOnce(&str) -> Option<T>) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    let parsed = parse(raw.trim());
    if parsed.is_none() {
        warn!(key, value = %raw, "ignoring invalid environment override");
    }
    parsed
}

/// `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`, case-insensitive.
pub fn parse_bool(val: &str) -> Option<bool> {
    const TRUTHY: [&str; 4] = ["true", "1", "yes", "on"];
    const FALSY: [&str; 4] = ["false", "0", "no", "off"];
    let val = val.to_ascii_lowercase();
    if TRUTHY.contains(&val.as_str()) {
        Some(true)
    } else if FALSY.contains(&val.as_str()) {
        Some(false)
    } else {
        None
    }
}

/// A `u64` within `min..=max`.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    val.parse::<u64>().ok().filter(|n| (min..=max).contains(n))
}

/// A retry cap: a non-negative integer, or `unbounded`/`none`/empty for no cap.
///
/// The outer `Option` is `None` when the value is unparseable.
pub fn parse_retry_cap(val: &str) -> Option<Option<u32>> {
    match val.to_ascii_lowercase().as_str() {
        "unbounded" | "none" | "" => Some(None),
        other => other.parse::<u32>().ok().map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"server": {"port": 8000, "host": "localhost"}});
        let source = serde_json::json!({"server": {"port": 9090}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "localhost");
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"items": [1, 2, 3]});
        let source = serde_json::json!({"items": [4, 5]});
        let merged = deep_merge(target, source);
        assert_eq!(merged["items"], serde_json::json!([4, 5]));
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
    fn merge_primitive_replaces_object() {
        let target = serde_json::json!({"a": {"nested": true}});
        let source = serde_json::json!({"a": 42});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 42);
    }

    // ── file layer ──────────────────────────────────────────────────

    #[test]
    fn missing_file_returns_defaults() {
        let settings = read_layers(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings.server.port, 8000);
        assert_eq!(settings.heartbeat.interval_ms, 30_000);
    }

    #[test]
    fn partial_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server": {"port": 9090}, "invocation": {"maxRetries": 3}}"#,
        )
        .unwrap();

        let settings = read_layers(&path).unwrap();
        assert_eq!(settings.server.port, 9090);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.invocation.max_retries, Some(3));
        assert_eq!(settings.invocation.settle_delay_ms, 500);
    }

    #[test]
    fn invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();

        let result = load_settings_from_path(&path);
        assert!(matches!(result, Err(SettingsError::Parse { .. })));
    }

    #[test]
    fn zero_interval_in_file_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"heartbeat": {"intervalMs": 0}}"#).unwrap();

        let settings = read_layers(&path).unwrap();
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::Invalid { .. })
        ));
    }

    // ── parsers ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        for val in &["true", "1", "yes", "on", "TRUE"] {
            assert_eq!(parse_bool(val), Some(true), "failed for {val}");
        }
        for val in &["false", "0", "no", "off", "Off"] {
            assert_eq!(parse_bool(val), Some(false), "failed for {val}");
        }
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parse_u64_bounds() {
        assert_eq!(parse_u64_range("30000", 100, 3_600_000), Some(30_000));
        assert_eq!(parse_u64_range("50", 100, 3_600_000), None);
        assert_eq!(parse_u64_range("abc", 100, 3_600_000), None);
    }

    #[test]
    fn parse_retry_cap_variants() {
        assert_eq!(parse_retry_cap("unbounded"), Some(None));
        assert_eq!(parse_retry_cap("NONE"), Some(None));
        assert_eq!(parse_retry_cap("5"), Some(Some(5)));
        assert_eq!(parse_retry_cap("0"), Some(Some(0)));
        assert_eq!(parse_retry_cap("-1"), None);
        assert_eq!(parse_retry_cap("lots"), None);
    }
}
