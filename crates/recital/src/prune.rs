//! Pruning of a thread's narration stack.

use tracing::debug;

use crate::fragment::Fragment;
use crate::store::ThreadNarration;

impl ThreadNarration {
    /// Pop fragments until one satisfying `predicate` has been popped.
    ///
    /// Does nothing when no fragment on the stack satisfies it. Returns the
    /// number of fragments popped.
    pub fn pop_until_true<P>(&mut self, mut predicate: P) -> usize
    where
        P: FnMut(&Fragment) -> bool,
    {
        let Some(target) = self.fragments().iter().rposition(&mut predicate) else {
            return 0;
        };
        let count = self.depth() - target;
        for _ in 0..count {
            let _ = self.pop();
        }
        count
    }

    /// Discard narration above the caller's current position.
    ///
    /// The anchor is the nearest fragment still in progress. With
    /// `auto_prune` the anchor's own completion will pop it later, so only
    /// what sits above it goes now. Without `auto_prune` nothing would ever
    /// pop the anchor, so it goes too. With nothing in progress the whole
    /// stack is discarded.
    pub fn reset_from_here(&mut self) -> usize {
        let popped = match self.nearest_in_progress() {
            None => {
                let depth = self.depth();
                self.clear();
                depth
            }
            Some(anchor) if self.options().auto_prune => {
                let Some(above) = self.fragments().get(anchor + 1).map(Fragment::id) else {
                    return 0;
                };
                self.pop_until_true(|f| f.id() == above)
            }
            Some(anchor) => {
                let id = self.fragments()[anchor].id();
                self.pop_until_true(|f| f.id() == id)
            }
        };
        debug!(popped, depth = self.depth(), "narration reset from here");
        popped
    }
}

#[cfg(test)]
mod tests {
    use crate::callsite::CallSite;
    use crate::fragment::{FragmentId, FragmentKind, FragmentStatus};
    use crate::options::NarrationOptions;
    use crate::store::ThreadNarration;
    use proptest::prelude::*;

    fn store(auto_prune: bool) -> ThreadNarration {
        let options = NarrationOptions {
            auto_prune,
            ..NarrationOptions::default()
        };
        ThreadNarration::new(None, options, 16)
    }

    fn push(s: &mut ThreadNarration) -> FragmentId {
        s.push(FragmentKind::Call, "f".into(), &[], CallSite::caller())
    }

    fn settle(s: &mut ThreadNarration, id: FragmentId, status: FragmentStatus) {
        s.get_mut(id).unwrap().set_status(status);
    }

    #[test]
    fn pop_until_true_without_match_is_noop() {
        let mut s = store(true);
        let _ = push(&mut s);
        let _ = push(&mut s);
        assert_eq!(s.pop_until_true(|_| false), 0);
        assert_eq!(s.depth(), 2);
    }

    #[test]
    fn pop_until_true_pops_through_target() {
        let mut s = store(true);
        let _ = push(&mut s);
        let target = push(&mut s);
        let _ = push(&mut s);
        let _ = push(&mut s);
        assert_eq!(s.pop_until_true(|f| f.id() == target), 3);
        assert_eq!(s.depth(), 1);
        assert_eq!(s.pooled(FragmentKind::Call), 3);
    }

    #[test]
    fn reset_without_in_progress_clears() {
        let mut s = store(false);
        let a = push(&mut s);
        let b = push(&mut s);
        settle(&mut s, a, FragmentStatus::PassedThrough);
        settle(&mut s, b, FragmentStatus::Raised);
        assert_eq!(s.reset_from_here(), 2);
        assert_eq!(s.depth(), 0);
    }

    #[test]
    fn reset_auto_prune_keeps_anchor() {
        // handler in f1, failure raised from f2 -> f3
        let mut s = store(true);
        let f1 = push(&mut s);
        let f2 = push(&mut s);
        let f3 = push(&mut s);
        settle(&mut s, f3, FragmentStatus::Raised);
        settle(&mut s, f2, FragmentStatus::PassedThrough);
        assert_eq!(s.reset_from_here(), 2);
        assert_eq!(s.depth(), 1);
        assert_eq!(s.fragments()[0].id(), f1);
    }

    #[test]
    fn reset_auto_prune_at_top_is_noop() {
        let mut s = store(true);
        let _ = push(&mut s);
        let _ = push(&mut s);
        assert_eq!(s.reset_from_here(), 0);
        assert_eq!(s.depth(), 2);
    }

    #[test]
    fn reset_without_auto_prune_removes_anchor() {
        let mut s = store(false);
        let f0 = push(&mut s);
        let f1 = push(&mut s);
        let f2 = push(&mut s);
        settle(&mut s, f2, FragmentStatus::Raised);
        assert_eq!(s.reset_from_here(), 2);
        assert_eq!(s.depth(), 1);
        assert_eq!(s.fragments()[0].id(), f0);
        assert!(s.position(f1).is_none());
    }

    proptest! {
        #[test]
        fn pop_until_true_leaves_prefix(depth in 1usize..24, pick in 0usize..24) {
            let mut s = store(true);
            let ids: Vec<_> = (0..depth).map(|_| push(&mut s)).collect();
            let target = ids[pick % depth];
            let popped = s.pop_until_true(|f| f.id() == target);
            prop_assert_eq!(popped, depth - pick % depth);
            prop_assert_eq!(s.depth(), pick % depth);
            let remaining: Vec<_> = s.fragments().iter().map(|f| f.id()).collect();
            prop_assert_eq!(&remaining[..], &ids[..pick % depth]);
        }

        #[test]
        fn reset_never_touches_below_anchor(depth in 1usize..16, anchor in 0usize..16, auto_prune: bool) {
            let mut s = store(auto_prune);
            let ids: Vec<_> = (0..depth).map(|_| push(&mut s)).collect();
            let anchor = anchor % depth;
            for id in &ids[anchor + 1..] {
                settle(&mut s, *id, FragmentStatus::PassedThrough);
            }
            let _ = s.reset_from_here();
            let expected = if auto_prune { anchor + 1 } else { anchor };
            prop_assert_eq!(s.depth(), expected);
            prop_assert!(s.fragments().iter().zip(&ids).all(|(f, id)| f.id() == *id));
        }
    }
}
