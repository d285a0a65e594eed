//! One thread's narration stack.
//!
//! A [`ThreadNarration`] is owned by the registry behind an
//! `Arc<Mutex<_>>`. Only the owning thread pushes and pops; other threads
//! may read once the owner's stack has settled.
//!
//! User text thunks never run under the store lock, and are never dropped
//! under it either. [`render_fragments`] takes the thunks out while locked,
//! runs them unlocked, then re-locks to freeze the results onto whichever
//! fragments are still present. Popping parks unrendered sources in the
//! store until [`with_store`] drops them after unlocking.

use std::borrow::Cow;
use std::ops::Range;

use parking_lot::Mutex;
use tracing::trace;

use crate::callsite::CallSite;
use crate::errors::Result;
use crate::fragment::{Fragment, FragmentId, FragmentKind, FragmentStatus};
use crate::options::NarrationOptions;
use crate::pool::FragmentPool;
use crate::text::{TextSource, run_thunk};

/// Narration stack, options and fragment pool of one thread.
#[derive(Debug)]
pub struct ThreadNarration {
    thread_name: Option<String>,
    fragments: Vec<Fragment>,
    options: NarrationOptions,
    pool: FragmentPool,
    next_id: u64,
    retired: Vec<TextSource>,
    exited: bool,
}

impl ThreadNarration {
    /// An empty stack with the given options.
    pub fn new(thread_name: Option<String>, options: NarrationOptions, pool_capacity: usize) -> Self {
        Self {
            thread_name,
            fragments: Vec::new(),
            options,
            pool: FragmentPool::new(pool_capacity),
            next_id: 1,
            retired: Vec::new(),
            exited: false,
        }
    }

    /// Name of the owning thread, if known.
    pub fn thread_name(&self) -> Option<&str> {
        self.thread_name.as_deref()
    }

    pub(crate) fn set_thread_name(&mut self, name: Option<String>) {
        self.thread_name = name;
    }

    /// Whether the owning thread has exited.
    pub fn has_exited(&self) -> bool {
        self.exited
    }

    /// Record that the owning thread exited and free its pool.
    ///
    /// The stack stays readable. Returns the number of pooled fragments freed.
    pub(crate) fn mark_exited(&mut self) -> usize {
        self.exited = true;
        self.pool.drain()
    }

    /// Options in effect for this thread.
    pub fn options(&self) -> NarrationOptions {
        self.options
    }

    /// Mutable access to this thread's options.
    pub fn options_mut(&mut self) -> &mut NarrationOptions {
        &mut self.options
    }

    /// Fragments oldest first.
    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    /// Number of fragments on the stack.
    pub fn depth(&self) -> usize {
        self.fragments.len()
    }

    /// Retired fragments of `kind` waiting in this thread's pool.
    pub fn pooled(&self, kind: FragmentKind) -> usize {
        self.pool.pooled(kind)
    }

    /// Push a fresh fragment and return its identity.
    pub fn push(
        &mut self,
        kind: FragmentKind,
        source: TextSource,
        tags: &[Cow<'static, str>],
        call_site: CallSite,
    ) -> FragmentId {
        let id = FragmentId(self.next_id);
        self.next_id += 1;
        let fragment = self.pool.acquire(kind, id, source, tags, call_site);
        self.fragments.push(fragment);
        trace!(id = id.0, depth = self.fragments.len(), ?kind, "narration push");
        id
    }

    /// Index of the fragment with `id`, searching from the top.
    pub fn position(&self, id: FragmentId) -> Option<usize> {
        self.fragments.iter().rposition(|f| f.id() == id)
    }

    /// Fragment with `id`, if still on the stack.
    pub fn get(&self, id: FragmentId) -> Option<&Fragment> {
        self.position(id).map(|i| &self.fragments[i])
    }

    /// Mutable fragment with `id`, if still on the stack.
    pub fn get_mut(&mut self, id: FragmentId) -> Option<&mut Fragment> {
        let i = self.position(id)?;
        Some(&mut self.fragments[i])
    }

    pub(crate) fn fragments_mut(&mut self) -> &mut [Fragment] {
        &mut self.fragments
    }

    /// Pop the top fragment back into the pool.
    pub(crate) fn pop(&mut self) -> Option<FragmentId> {
        let fragment = self.fragments.pop()?;
        let id = fragment.id();
        trace!(id = id.0, depth = self.fragments.len(), "narration pop");
        if let Some(source) = self.pool.release(fragment) {
            self.retired.push(source);
        }
        Some(id)
    }

    /// Unrendered sources of popped fragments, to be dropped by the caller.
    pub(crate) fn take_retired(&mut self) -> Vec<TextSource> {
        std::mem::take(&mut self.retired)
    }

    /// Return every fragment to the pool.
    pub fn clear(&mut self) {
        while self.pop().is_some() {}
    }

    /// Index of the nearest fragment still executing, from the top.
    pub fn nearest_in_progress(&self) -> Option<usize> {
        self.fragments
            .iter()
            .rposition(|f| f.status() == FragmentStatus::InProgress)
    }

    /// Index range a retrieval covers.
    ///
    /// `from_here` starts at the nearest in-progress fragment and is empty
    /// when nothing is in progress.
    pub fn window(&self, from_here: bool) -> Range<usize> {
        let len = self.fragments.len();
        if !from_here {
            return 0..len;
        }
        match self.nearest_in_progress() {
            Some(start) => start..len,
            None => len..len,
        }
    }

    /// Identities in `window(from_here)` visible to a query for `tags`.
    pub fn select<S: AsRef<str>>(&self, from_here: bool, tags: &[S]) -> Vec<FragmentId> {
        self.fragments[self.window(from_here)]
            .iter()
            .filter(|f| f.matches_tags(tags))
            .map(Fragment::id)
            .collect()
    }
}

/// Run `f` on the locked store, then drop the sources it retired after unlocking.
pub(crate) fn with_store<R>(
    store: &Mutex<ThreadNarration>,
    f: impl FnOnce(&mut ThreadNarration) -> R,
) -> R {
    let (out, retired) = {
        let mut guard = store.lock();
        let out = f(&mut guard);
        (out, guard.take_retired())
    };
    drop(retired);
    out
}

/// Render the fragments with the given ids, running user thunks unlocked.
///
/// Every failing fragment is frozen with a placeholder; the first failure is
/// returned. Fragments removed while the thunks ran are skipped.
pub(crate) fn render_fragments(store: &Mutex<ThreadNarration>, ids: &[FragmentId]) -> Result<()> {
    let pending: Vec<_> = {
        let mut guard = store.lock();
        ids.iter()
            .filter_map(|&id| {
                let fragment = guard.get_mut(id)?;
                let site = fragment.call_site();
                fragment.take_thunk().map(|thunk| (id, site, thunk))
            })
            .collect()
    };
    if pending.is_empty() {
        return Ok(());
    }

    let outcomes: Vec<_> = pending
        .into_iter()
        .map(|(id, site, thunk)| (id, site, run_thunk(thunk)))
        .collect();

    let mut first_error = None;
    let mut guard = store.lock();
    for (id, site, outcome) in outcomes {
        let text = match outcome {
            Ok(text) => text,
            Err(failure) => {
                let placeholder = failure.placeholder();
                if first_error.is_none() {
                    first_error = Some(failure.into_error(site));
                }
                placeholder
            }
        };
        if let Some(fragment) = guard.get_mut(id) {
            fragment.freeze(text);
        }
    }
    first_error.map_or(Ok(()), Err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::NarrationError;
    use assert_matches::assert_matches;

    fn store() -> ThreadNarration {
        ThreadNarration::new(Some("main".into()), NarrationOptions::default(), 8)
    }

    fn push(s: &mut ThreadNarration, text: &'static str) -> FragmentId {
        s.push(FragmentKind::Call, text.into(), &[], CallSite::caller())
    }

    #[test]
    fn push_assigns_increasing_ids() {
        let mut s = store();
        let a = push(&mut s, "a");
        let b = push(&mut s, "b");
        assert!(b > a);
        assert_eq!(s.depth(), 2);
        assert_eq!(s.position(a), Some(0));
        assert_eq!(s.position(b), Some(1));
    }

    #[test]
    fn clear_returns_fragments_to_pool() {
        let mut s = store();
        let _ = push(&mut s, "a");
        let _ = s.push(FragmentKind::Scope, "b".into(), &[], CallSite::caller());
        s.clear();
        assert_eq!(s.depth(), 0);
        assert_eq!(s.pooled(FragmentKind::Call), 1);
        assert_eq!(s.pooled(FragmentKind::Scope), 1);
    }

    #[test]
    fn window_from_here_starts_at_nearest_in_progress() {
        let mut s = store();
        let _ = push(&mut s, "outer");
        let mid = push(&mut s, "mid");
        let inner = push(&mut s, "inner");
        s.get_mut(inner).unwrap().set_status(FragmentStatus::Raised);
        assert_eq!(s.window(false), 0..3);
        assert_eq!(s.window(true), 1..3);
        assert_eq!(s.select(true, &[] as &[&str]), vec![mid, inner]);
    }

    #[test]
    fn window_from_here_is_empty_without_in_progress() {
        let mut s = store();
        let a = push(&mut s, "a");
        s.get_mut(a).unwrap().set_status(FragmentStatus::Completed);
        assert!(s.window(true).is_empty());
    }

    #[test]
    fn render_fragments_freezes_text() {
        let lock = Mutex::new(store());
        let id = lock.lock().push(
            FragmentKind::Call,
            TextSource::computed(|| "late".to_string()),
            &[],
            CallSite::caller(),
        );
        render_fragments(&lock, &[id]).unwrap();
        assert_eq!(lock.lock().get(id).unwrap().rendered_text(), Some("late"));
    }

    #[test]
    fn render_fragments_reports_first_failure() {
        let lock = Mutex::new(store());
        let ok = lock.lock().push(FragmentKind::Call, "fine".into(), &[], CallSite::caller());
        let bad = lock.lock().push(
            FragmentKind::Call,
            TextSource::try_computed(|| "q".parse::<u8>().map(|n| n.to_string())),
            &[],
            CallSite::caller(),
        );
        let err = render_fragments(&lock, &[ok, bad]).unwrap_err();
        assert_matches!(err, NarrationError::Render { ref kind, .. } if kind == "ParseIntError");

        let guard = lock.lock();
        assert_eq!(guard.get(ok).unwrap().rendered_text(), Some("fine"));
        assert!(
            guard
                .get(bad)
                .unwrap()
                .rendered_text()
                .unwrap()
                .starts_with("<narration text unavailable")
        );
    }

    #[test]
    fn popped_sources_are_dropped_after_unlock() {
        struct LocksOnDrop(std::sync::Arc<Mutex<ThreadNarration>>);

        impl Drop for LocksOnDrop {
            fn drop(&mut self) {
                assert_eq!(self.0.lock().depth(), 0);
            }
        }

        impl LocksOnDrop {
            fn text(&self) -> String {
                "unused".to_string()
            }
        }

        let lock = std::sync::Arc::new(Mutex::new(store()));
        let captured = LocksOnDrop(std::sync::Arc::clone(&lock));
        let _ = lock.lock().push(
            FragmentKind::Call,
            TextSource::computed(move || captured.text()),
            &[],
            CallSite::caller(),
        );
        with_store(&lock, ThreadNarration::clear);
        assert_eq!(lock.lock().pooled(FragmentKind::Call), 1);
    }

    #[test]
    fn exit_frees_pool_but_keeps_stack() {
        let mut s = store();
        let a = push(&mut s, "a");
        let _ = push(&mut s, "b");
        let _ = s.pop();
        s.get_mut(a).unwrap().set_status(FragmentStatus::Raised);
        assert_eq!(s.mark_exited(), 1);
        assert!(s.has_exited());
        assert_eq!(s.depth(), 1);
        assert_eq!(s.pooled(FragmentKind::Call), 0);
    }

    #[test]
    fn thunk_may_touch_the_store() {
        let lock = std::sync::Arc::new(Mutex::new(store()));
        let inner = std::sync::Arc::clone(&lock);
        let id = lock.lock().push(
            FragmentKind::Call,
            TextSource::computed(move || format!("depth {}", inner.lock().depth())),
            &[],
            CallSite::caller(),
        );
        render_fragments(&lock, &[id]).unwrap();
        assert_eq!(lock.lock().get(id).unwrap().rendered_text(), Some("depth 1"));
    }
}
