//! Narration scopes: a fragment that lives as long as a guard.

use std::fmt::{self, Display};

use crate::discipline::ActiveFragment;
use crate::errors::{NarrationError, Result};
use crate::fragment::FragmentId;
use crate::text::{TextSource, short_type_name};

/// Guard for a narrated block.
///
/// Settle it explicitly with [`complete`](Self::complete),
/// [`fail`](Self::fail) or [`exit`](Self::exit). A dropped guard settles
/// itself:
///
/// - while the thread panics, it records the panic
/// - when a fragment above it is `Raised` or `PassedThrough`, it is marked
///   `PassedThrough` and kept, which is what leaving a block with `?` needs
/// - otherwise it completes
///
/// A failure handled inside the block leaves its fragments above the guard,
/// so end such a scope with [`complete`](Self::complete), or clear the
/// handled narration with [`reset_narration`](crate::reset_narration) and
/// `from_here` first.
#[must_use = "the scope ends as soon as the guard is dropped"]
pub struct NarrationScope<'r> {
    active: ActiveFragment<'r>,
}

impl<'r> NarrationScope<'r> {
    pub(crate) fn new(active: ActiveFragment<'r>) -> Self {
        Self { active }
    }

    /// Identity of the scope's fragment.
    pub fn id(&self) -> FragmentId {
        self.active.id()
    }

    /// End the scope normally.
    pub fn complete(mut self) -> Result<()> {
        self.active.complete()
    }

    /// End the scope with `error` as the failure.
    pub fn fail<E: Display + ?Sized>(mut self, error: &E) -> Result<()> {
        self.active.fail(short_type_name::<E>(), &error.to_string())
    }

    /// End the scope according to `result`, returning it.
    ///
    /// A render failure of the scope's text replaces `result`.
    pub fn exit<T, E>(self, result: std::result::Result<T, E>) -> std::result::Result<T, E>
    where
        E: Display + From<NarrationError>,
    {
        match result {
            Ok(value) => {
                self.complete()?;
                Ok(value)
            }
            Err(err) => match self.fail(&err) {
                Ok(()) => Err(err),
                Err(render) => Err(E::from(render)),
            },
        }
    }
}

impl fmt::Debug for NarrationScope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NarrationScope").field("id", &self.id()).finish()
    }
}

/// Open a scope on the global registry.
#[track_caller]
pub fn scope(text: impl Into<TextSource>) -> NarrationScope<'static> {
    crate::api::global().scope(text)
}

/// [`scope`] with the enclosing function recorded as the call site.
#[macro_export]
macro_rules! narrate_scope {
    ($text:expr) => {
        $crate::narrate($text).at($crate::call_site!()).scope()
    };
}
