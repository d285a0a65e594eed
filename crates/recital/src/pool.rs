//! Per-kind free lists of retired fragments.
//!
//! The pool lives inside a thread's store, so acquire and release never
//! contend with other threads. Releasing moves the fragment into the free
//! list; the previous owner has nothing left to touch.

use std::borrow::Cow;

use crate::callsite::CallSite;
use crate::fragment::{Fragment, FragmentId, FragmentKind};
use crate::text::TextSource;

/// Free lists for call and scope fragments.
#[derive(Debug)]
pub struct FragmentPool {
    calls: Vec<Fragment>,
    scopes: Vec<Fragment>,
    capacity: usize,
}

impl FragmentPool {
    /// A pool keeping at most `capacity` retired fragments per kind.
    pub fn new(capacity: usize) -> Self {
        Self {
            calls: Vec::new(),
            scopes: Vec::new(),
            capacity,
        }
    }

    /// Hand out a fragment of `kind` reset with the given content.
    pub fn acquire(
        &mut self,
        kind: FragmentKind,
        id: FragmentId,
        source: TextSource,
        tags: &[Cow<'static, str>],
        call_site: CallSite,
    ) -> Fragment {
        let mut fragment = self
            .list_mut(kind)
            .pop()
            .unwrap_or_else(|| Fragment::blank(kind));
        fragment.reset(id, source, tags, call_site);
        fragment
    }

    /// Take back a fragment. Dropped instead when the free list is full.
    ///
    /// Returns the fragment's unrendered text source, if it still had one.
    #[must_use = "the returned source should be dropped outside the store lock"]
    pub fn release(&mut self, mut fragment: Fragment) -> Option<TextSource> {
        let source = fragment.scrub();
        let capacity = self.capacity;
        let list = self.list_mut(fragment.kind());
        if list.len() < capacity {
            list.push(fragment);
        }
        source
    }

    /// Free every retired fragment, returning how many were held.
    pub fn drain(&mut self) -> usize {
        let held = self.calls.len() + self.scopes.len();
        self.calls = Vec::new();
        self.scopes = Vec::new();
        held
    }

    /// Number of retired fragments waiting for reuse.
    pub fn pooled(&self, kind: FragmentKind) -> usize {
        match kind {
            FragmentKind::Call => self.calls.len(),
            FragmentKind::Scope => self.scopes.len(),
        }
    }

    fn list_mut(&mut self, kind: FragmentKind) -> &mut Vec<Fragment> {
        match kind {
            FragmentKind::Call => &mut self.calls,
            FragmentKind::Scope => &mut self.scopes,
        }
    }
}
