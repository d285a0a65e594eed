//! Per-thread narration options and partial updates.

use recital_settings::DefaultOptionSettings;
use serde::{Deserialize, Serialize};

/// Behavior switches for one thread's narration stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NarrationOptions {
    /// Discard fragments when their call or scope completes normally.
    pub auto_prune: bool,
    /// Render fragment text on every completion to surface broken text sources early.
    pub check: bool,
    /// Correlate failures with stack frames so verbose output carries line numbers.
    pub verbose: bool,
}

impl Default for NarrationOptions {
    fn default() -> Self {
        Self {
            auto_prune: true,
            check: false,
            verbose: false,
        }
    }
}

impl NarrationOptions {
    /// Apply the fields set in `update`, returning the resulting options.
    pub fn apply(&mut self, update: OptionsUpdate) -> Self {
        if let Some(v) = update.auto_prune {
            self.auto_prune = v;
        }
        if let Some(v) = update.check {
            self.check = v;
        }
        if let Some(v) = update.verbose {
            self.verbose = v;
        }
        *self
    }
}

impl From<DefaultOptionSettings> for NarrationOptions {
    fn from(s: DefaultOptionSettings) -> Self {
        Self {
            auto_prune: s.auto_prune,
            check: s.check,
            verbose: s.verbose,
        }
    }
}

/// A partial change to [`NarrationOptions`]; `None` leaves a field untouched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OptionsUpdate {
    /// New `auto_prune` value.
    pub auto_prune: Option<bool>,
    /// New `check` value.
    pub check: Option<bool>,
    /// New `verbose` value.
    pub verbose: Option<bool>,
}

impl OptionsUpdate {
    /// An update that changes nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `auto_prune`.
    #[must_use]
    pub fn auto_prune(mut self, value: bool) -> Self {
        self.auto_prune = Some(value);
        self
    }

    /// Set `check`.
    #[must_use]
    pub fn check(mut self, value: bool) -> Self {
        self.check = Some(value);
        self
    }

    /// Set `verbose`.
    #[must_use]
    pub fn verbose(mut self, value: bool) -> Self {
        self.verbose = Some(value);
        self
    }
}
