//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with [`SockmuxSettings::default()`]
//! 2. If `~/.sockmux/settings.json` exists, deep-merge its values over defaults
//! 3. Apply `SOCKMUX_*` environment overrides
//! 4. Validate the result

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::SockmuxSettings;

/// Resolve the path to the settings file (`~/.sockmux/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".sockmux").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<SockmuxSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; unreadable or malformed JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<SockmuxSettings> {
    let mut settings = read_layered(path)?;
    apply_env_overrides(&mut settings, |name| std::env::var(name).ok());
    settings.validate()?;
    Ok(settings)
}

fn read_layered(path: &Path) -> Result<SockmuxSettings> {
    let defaults = serde_json::to_value(SockmuxSettings::default())?;

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

/// Apply `SOCKMUX_*` overrides read through `lookup`.
///
/// Out-of-range or unparseable values are logged and ignored.
pub fn apply_env_overrides<F>(settings: &mut SockmuxSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    if let Some(v) = env.string("SOCKMUX_WS_PATH") {
        settings.transport.path = v;
    }
    if let Some(v) = env.usize_in("SOCKMUX_ACCEPT_BACKLOG", 1, 65_536) {
        settings.transport.accept_backlog = v;
    }
    if let Some(v) = env.usize_in("SOCKMUX_MAX_MESSAGE_SIZE", 1024, 64 * 1024 * 1024) {
        settings.transport.max_message_size = v;
    }
    if let Some(v) = env.usize_in("SOCKMUX_MAX_BINDINGS", 1, 100_000) {
        settings.server.max_concurrent_bindings = Some(v);
    }
    if let Some(v) = env.bool("SOCKMUX_WARN_UNHANDLED_BIND_ERRORS") {
        settings.server.warn_unhandled_bind_errors = v;
    }
    if let Some(v) = env.string("SOCKMUX_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

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

/// Parse a string as a `usize` within an inclusive range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = self.string(name)?;
        let parsed = parse_bool(&val);
        if parsed.is_none() {
            warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        parsed
    }

    fn usize_in(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        let val = self.string(name)?;
        let parsed = parse_usize_range(&val, min, max);
        if parsed.is_none() {
            warn!(key = name, value = %val, min, max, "invalid integer env var, ignoring");
        }
        parsed
    }
}
