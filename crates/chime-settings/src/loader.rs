//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`ChimeSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `CHIME_*` environment overrides
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::ChimeSettings;

/// Resolve the default settings file (`~/.chime/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".chime").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<ChimeSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. A file with invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<ChimeSettings> {
    let malformed = |source| SettingsError::Malformed {
        path: path.to_path_buf(),
        source,
    };
    let defaults = serde_json::to_value(ChimeSettings::default()).map_err(malformed)?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content).map_err(malformed)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: ChimeSettings = serde_json::from_value(merged).map_err(malformed)?;
    apply_env_overrides(&mut settings);
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
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `CHIME_*` process environment overrides.
pub fn apply_env_overrides(settings: &mut ChimeSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary variable lookup.
///
/// Values that fail to parse or fall out of range are logged and ignored,
/// leaving the file or default value in place. Empty strings count as unset.
pub fn apply_overrides<F>(settings: &mut ChimeSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let vars = Vars { lookup };

    if let Some(v) = vars.string("CHIME_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = vars.u16("CHIME_WS_PORT", 0, 65535) {
        settings.server.ws_port = v;
    }
    if let Some(v) = vars.u16("CHIME_HTTP_PORT", 0, 65535) {
        settings.server.http_port = v;
    }
    if let Some(v) = vars.string("CHIME_PUBLIC_HOST") {
        settings.server.public_host = v;
    }
    if let Some(v) = vars.string("CHIME_WATCH_FILE") {
        settings.server.watch_file = PathBuf::from(v);
    }
    if let Some(v) = vars.string("CHIME_PUBLIC_DIR") {
        settings.server.public_dir = Some(PathBuf::from(v));
    }

    if let Some(v) = vars.string("CHIME_SERVER_URL") {
        settings.client.server_url = v;
    }
    if let Some(v) = vars.string("CHIME_SUBMIT_URL") {
        settings.client.submit_url = Some(v);
    }
    if let Some(v) = vars.u64("CHIME_RECONNECT_DELAY_MS", 0, 3_600_000) {
        settings.client.reconnect_delay_ms = v;
    }
    if let Some(v) = vars.u64("CHIME_CONNECT_TIMEOUT_MS", 100, 600_000) {
        settings.client.connect_timeout_ms = v;
    }

    if let Some(v) = vars.string("CHIME_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = vars.bool("CHIME_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions ─────────────────────────────────────────────────

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

/// Parse a string as a `u16` within an inclusive range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.trim().parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

/// Parse a string as a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

// ── Variable readers ───────────────────────────────────────────────────────

struct Vars<F> {
    lookup: F,
}

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn raw(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn string(&self, name: &str) -> Option<String> {
        self.raw(name)
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = self.raw(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u16(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        let val = self.raw(name)?;
        let result = parse_u16_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid u16 env var, ignoring");
        }
        result
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = self.raw(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid u64 env var, ignoring");
        }
        result
    }
}
