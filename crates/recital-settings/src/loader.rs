//! Settings loading: compiled defaults, user file, environment overrides.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::errors::{Result, SettingsError};
use crate::types::RecitalSettings;

/// Environment variable overriding `defaults.autoPrune`.
pub const ENV_AUTO_PRUNE: &str = "RECITAL_AUTO_PRUNE";
/// Environment variable overriding `defaults.check`.
pub const ENV_CHECK: &str = "RECITAL_CHECK";
/// Environment variable overriding `defaults.verbose`.
pub const ENV_VERBOSE: &str = "RECITAL_VERBOSE";
/// Environment variable overriding `pool.capacity`.
pub const ENV_POOL_CAPACITY: &str = "RECITAL_POOL_CAPACITY";
/// Environment variable overriding `logging.level`.
pub const ENV_LOG: &str = "RECITAL_LOG";

/// Default location of the user settings file: `~/.recital/settings.json`.
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".recital").join("settings.json")
}

/// Load settings from the default path with env overrides applied.
pub fn load_settings() -> Result<RecitalSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from `path`, deep-merged over defaults, then apply env overrides.
///
/// A missing file is not an error: compiled defaults are used.
pub fn load_settings_from_path(path: &Path) -> Result<RecitalSettings> {
    let mut settings = read_file_layer(path)?;
    apply_env_overrides(&mut settings, |var| std::env::var(var).ok())?;
    settings.validate();
    Ok(settings)
}

fn read_file_layer(path: &Path) -> Result<RecitalSettings> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(?path, "no settings file, using defaults");
            return Ok(RecitalSettings::default());
        }
        Err(source) => {
            return Err(SettingsError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    let user: Value = serde_json::from_str(&raw)?;
    let defaults = serde_json::to_value(RecitalSettings::default())?;
    Ok(serde_json::from_value(deep_merge(defaults, user))?)
}

/// Recursively merge `overlay` into `base`.
///
/// Objects merge key by key; any other overlay value replaces the base value.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                let merged = match base.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                let _ = base.insert(key, merged);
            }
            Value::Object(base)
        }
        (_, overlay) => overlay,
    }
}

/// Apply `RECITAL_*` overrides read through `lookup`.
///
/// `lookup` returns the raw value of a variable, or `None` when unset, which
/// lets tests exercise overrides without touching the process environment.
pub fn apply_env_overrides<F>(settings: &mut RecitalSettings, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup(ENV_AUTO_PRUNE) {
        settings.defaults.auto_prune = parse_bool(ENV_AUTO_PRUNE, v)?;
    }
    if let Some(v) = lookup(ENV_CHECK) {
        settings.defaults.check = parse_bool(ENV_CHECK, v)?;
    }
    if let Some(v) = lookup(ENV_VERBOSE) {
        settings.defaults.verbose = parse_bool(ENV_VERBOSE, v)?;
    }
    if let Some(v) = lookup(ENV_POOL_CAPACITY) {
        settings.pool.capacity = v.trim().parse().map_err(|_| SettingsError::Env {
            var: ENV_POOL_CAPACITY,
            value: v.clone(),
            reason: "expected a non-negative integer",
        })?;
    }
    if let Some(v) = lookup(ENV_LOG) {
        settings.logging.level = v;
    }
    Ok(())
}

fn parse_bool(var: &'static str, value: String) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(SettingsError::Env {
            var,
            value,
            reason: "expected a boolean",
        }),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
