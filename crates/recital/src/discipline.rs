//! Push-on-entry, settle-on-exit bookkeeping shared by narrated calls and scopes.

use std::borrow::Cow;
use std::fmt::Display;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::callsite::CallSite;
use crate::errors::Result;
use crate::fragment::{FragmentId, FragmentKind, FragmentStatus};
use crate::frames::{capture_frames, correlate};
use crate::registry::NarrationRegistry;
use crate::store::{ThreadNarration, render_fragments, with_store};
use crate::text::TextSource;

/// A fragment pushed by a call or scope that has not settled yet.
///
/// Dropping an unsettled fragment settles it: as a failure while the thread
/// is panicking, as passed through when a failure is recorded above it, as a
/// completion otherwise.
pub(crate) struct ActiveFragment<'r> {
    registry: &'r NarrationRegistry,
    store: Arc<Mutex<ThreadNarration>>,
    id: FragmentId,
    settled: bool,
}

impl<'r> ActiveFragment<'r> {
    /// Push a fragment onto the calling thread's stack.
    pub(crate) fn enter(
        registry: &'r NarrationRegistry,
        kind: FragmentKind,
        source: TextSource,
        tags: &[Cow<'static, str>],
        call_site: CallSite,
    ) -> Self {
        let store = registry.current_store();
        let id = store.lock().push(kind, source, tags, call_site);
        Self {
            registry,
            store,
            id,
            settled: false,
        }
    }

    pub(crate) fn id(&self) -> FragmentId {
        self.id
    }

    /// Settle after a normal exit.
    ///
    /// With `check` the text is rendered now and a failing source is
    /// reported, leaving the fragment on the stack. With `auto_prune` the
    /// fragment and anything left above it go back to the pool.
    pub(crate) fn complete(&mut self) -> Result<()> {
        self.settled = true;
        let options = {
            let mut store = self.store.lock();
            let Some(fragment) = store.get_mut(self.id) else {
                return Ok(());
            };
            fragment.set_status(FragmentStatus::Completed);
            store.options()
        };
        if options.check {
            render_fragments(&self.store, &[self.id])?;
        }
        if options.auto_prune {
            let id = self.id;
            let popped = with_store(&self.store, |store| store.pop_until_true(|f| f.id() == id));
            trace!(popped, "narration pruned on completion");
        }
        Ok(())
    }

    /// Settle after a failure observed at this fragment's boundary.
    ///
    /// The topmost fragment is where the failure originated and records its
    /// summary; fragments below it were passed through. The text is rendered
    /// before returning so it survives whatever the failure unwinds.
    pub(crate) fn fail(&mut self, kind: &str, message: &dyn Display) -> Result<()> {
        self.settled = true;
        let correlate_frames = {
            let mut store = self.store.lock();
            let Some(position) = store.position(self.id) else {
                return Ok(());
            };
            let origin = position + 1 == store.depth();
            let verbose = store.options().verbose;
            let fragment = &mut store.fragments_mut()[position];
            if origin {
                fragment.mark_exception(kind, &message.to_string());
                fragment.set_status(FragmentStatus::Raised);
            } else {
                fragment.set_status(FragmentStatus::PassedThrough);
            }
            origin && verbose
        };
        if correlate_frames {
            let frames = capture_frames(self.registry.frame_source(), self.registry.max_frames());
            let annotated = correlate(self.store.lock().fragments_mut(), &frames);
            trace!(annotated, frames = frames.len(), "narration frames correlated");
        }
        render_fragments(&self.store, &[self.id])
    }

    /// Settle as an ancestor of a failure whose error value is not in hand.
    fn pass_through(&mut self) -> Result<()> {
        self.settled = true;
        {
            let mut store = self.store.lock();
            let Some(fragment) = store.get_mut(self.id) else {
                return Ok(());
            };
            fragment.set_status(FragmentStatus::PassedThrough);
        }
        render_fragments(&self.store, &[self.id])
    }

    /// Whether a fragment above this one recorded a failure.
    fn failure_above(&self) -> bool {
        let store = self.store.lock();
        store.position(self.id).is_some_and(|position| {
            store.fragments()[position + 1..].iter().any(|f| {
                matches!(
                    f.status(),
                    FragmentStatus::Raised | FragmentStatus::PassedThrough
                )
            })
        })
    }
}

impl Drop for ActiveFragment<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let result = if std::thread::panicking() {
            self.fail("panic", &"thread panicked")
        } else if self.failure_above() {
            self.pass_through()
        } else {
            self.complete()
        };
        if let Err(err) = result {
            warn!(%err, "narration failure could not be reported from drop");
        }
    }
}
