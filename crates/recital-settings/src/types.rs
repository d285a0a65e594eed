//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a partial
//! JSON file only has to name the fields it changes.

use serde::{Deserialize, Serialize};

/// Root settings type for recital.
///
/// ```json
/// {
///   "defaults": { "autoPrune": false, "verbose": true },
///   "pool": { "capacity": 32 }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecitalSettings {
    /// Process-wide narration defaults applied to new thread stores.
    pub defaults: DefaultOptionSettings,
    /// Fragment pool sizing.
    pub pool: PoolSettings,
    /// Verbose-mode frame capture limits.
    pub frames: FrameSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl RecitalSettings {
    /// Correct invalid values in place.
    ///
    /// Called automatically during loading. Bad values are replaced with a
    /// warning rather than rejected.
    pub fn validate(&mut self) {
        if self.frames.max_frames == 0 {
            tracing::warn!("frames.maxFrames is 0, restoring default");
            self.frames.max_frames = FrameSettings::default().max_frames;
        }
        if self.pool.capacity > MAX_POOL_CAPACITY {
            tracing::warn!(
                "pool.capacity ({}) above {MAX_POOL_CAPACITY}, clamping",
                self.pool.capacity
            );
            self.pool.capacity = MAX_POOL_CAPACITY;
        }
        if self.logging.level.trim().is_empty() {
            self.logging.level = LoggingSettings::default().level;
        }
    }
}

/// Upper bound for the per-kind free list length.
pub const MAX_POOL_CAPACITY: usize = 4096;

/// Default values for the three per-thread narration options.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DefaultOptionSettings {
    /// Discard fragments when a narrated call or scope completes normally.
    pub auto_prune: bool,
    /// Render fragment text on every completion, not only on failure.
    pub check: bool,
    /// Correlate failures with stack frames to record source lines.
    pub verbose: bool,
}

impl Default for DefaultOptionSettings {
    fn default() -> Self {
        Self {
            auto_prune: true,
            check: false,
            verbose: false,
        }
    }
}

/// Fragment pool settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PoolSettings {
    /// Maximum retired fragments kept per kind and thread. `0` disables pooling.
    pub capacity: usize,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self { capacity: 64 }
    }
}

/// Frame capture settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FrameSettings {
    /// Maximum number of captured frames considered during correlation.
    pub max_frames: usize,
}

impl Default for FrameSettings {
    fn default() -> Self {
        Self { max_frames: 256 }
    }
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
