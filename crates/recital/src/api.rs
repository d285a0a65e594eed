//! Free functions over the process-wide registry.
//!
//! The global registry is built from [`recital_settings::get_settings`] on
//! first use. Code that wants isolation (tests, embedded engines) can own a
//! [`NarrationRegistry`] instead and call the same operations on it.

use std::sync::OnceLock;

use crate::errors::Result;
use crate::options::{NarrationOptions, OptionsUpdate};
use crate::registry::{NarrationQuery, NarrationRegistry, ThreadKey};
use crate::snapshot::FragmentSnapshot;

static GLOBAL: OnceLock<NarrationRegistry> = OnceLock::new();

/// The process-wide registry.
pub fn global() -> &'static NarrationRegistry {
    GLOBAL.get_or_init(|| NarrationRegistry::from_settings(&recital_settings::get_settings()))
}

/// Change the options new thread stores start with; returns the new defaults.
pub fn set_default_options(update: OptionsUpdate) -> NarrationOptions {
    global().set_default_options(update)
}

/// Change one thread's options.
pub fn set_narration_options(
    thread: impl Into<ThreadKey>,
    update: OptionsUpdate,
) -> Result<NarrationOptions> {
    global().set_narration_options(thread, update)
}

/// Rendered narration for `query`, oldest first.
pub fn get_narration(query: &NarrationQuery) -> Result<Vec<String>> {
    global().get_narration(query)
}

/// Detached copies of a thread's fragments, oldest first.
pub fn copy_narration(thread: impl Into<ThreadKey>, from_here: bool) -> Result<Vec<FragmentSnapshot>> {
    global().copy_narration(thread, from_here)
}

/// Discard every thread's fragments.
pub fn reset_all_narrations() {
    global().reset_all();
}

/// Discard a thread's fragments, or only those above the caller with `from_here`.
pub fn reset_narration(thread: impl Into<ThreadKey>, from_here: bool) -> Result<()> {
    global().reset(thread, from_here)
}
