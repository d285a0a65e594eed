//! # recital-settings
//!
//! Configuration for the recital narration engine, loaded from three layers
//! (in priority order):
//! 1. **Compiled defaults**: [`RecitalSettings::default()`]
//! 2. **User file**: `~/.recital/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `RECITAL_*` overrides (highest priority)
//!
//! The global singleton is reloadable: [`reload_settings_from_path`] swaps the
//! cached value so later [`get_settings`] calls see fresh data. Thread stores
//! that already exist keep the options they were created with.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, deep_merge, load_settings, load_settings_from_path, settings_path,
};
pub use types::*;

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;

/// Global settings singleton.
static SETTINGS: RwLock<Option<Arc<RecitalSettings>>> = RwLock::new(None);

/// Get the global settings instance.
///
/// On first call, loads settings from `~/.recital/settings.json` with env
/// overrides. If loading fails, compiled defaults are used.
pub fn get_settings() -> Arc<RecitalSettings> {
    if let Some(s) = SETTINGS.read().as_ref() {
        return Arc::clone(s);
    }

    let mut guard = SETTINGS.write();
    // Another thread may have initialized between the two locks.
    if let Some(s) = guard.as_ref() {
        return Arc::clone(s);
    }

    let settings = Arc::new(match load_settings() {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "failed to load settings, using defaults");
            RecitalSettings::default()
        }
    });
    *guard = Some(Arc::clone(&settings));
    settings
}

/// Initialize the global settings with a specific value.
pub fn init_settings(settings: RecitalSettings) {
    *SETTINGS.write() = Some(Arc::new(settings));
}

/// Reload settings from a specific file path, falling back to defaults on error.
pub fn reload_settings_from_path(path: &Path) {
    let new = Arc::new(match load_settings_from_path(path) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, ?path, "failed to reload settings, falling back to defaults");
            RecitalSettings::default()
        }
    });
    *SETTINGS.write() = Some(new);
    tracing::info!(?path, "settings reloaded from disk");
}

#[cfg(test)]
pub(crate) fn reset_settings() {
    *SETTINGS.write() = None;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// Tests that mutate the global SETTINGS static hold this lock.
    static SETTINGS_MUTEX: parking_lot::Mutex<()> = parking_lot::Mutex::new(());

    #[test]
    fn init_settings_sets_custom_value() {
        let _lock = SETTINGS_MUTEX.lock();
        reset_settings();
        let mut custom = RecitalSettings::default();
        custom.pool.capacity = 3;
        init_settings(custom);
        assert_eq!(get_settings().pool.capacity, 3);
        reset_settings();
    }

    #[test]
    fn reload_settings_from_path_updates_cached_value() {
        let _lock = SETTINGS_MUTEX.lock();
        reset_settings();
        init_settings(RecitalSettings::default());
        assert!(get_settings().defaults.auto_prune);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"defaults": {"autoPrune": false}}"#).unwrap();
        reload_settings_from_path(&path);

        let updated = get_settings();
        assert!(!updated.defaults.auto_prune);
        assert_eq!(updated.pool.capacity, 64);
        reset_settings();
    }

    #[test]
    fn reload_from_bad_file_falls_back_to_defaults() {
        let _lock = SETTINGS_MUTEX.lock();
        reset_settings();
        let mut custom = RecitalSettings::default();
        custom.pool.capacity = 7;
        init_settings(custom);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "[1, 2").unwrap();
        reload_settings_from_path(&path);

        assert_eq!(get_settings().pool.capacity, 64);
        reset_settings();
    }

    #[test]
    fn snapshot_survives_reinit() {
        let _lock = SETTINGS_MUTEX.lock();
        reset_settings();
        init_settings(RecitalSettings::default());
        let snapshot = get_settings();

        let mut new = RecitalSettings::default();
        new.defaults.verbose = true;
        init_settings(new);

        assert!(!snapshot.defaults.verbose);
        assert!(get_settings().defaults.verbose);
        reset_settings();
    }
}
