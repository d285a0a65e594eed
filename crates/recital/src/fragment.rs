//! Narration fragments and their lifecycle.
//!
//! A [`Fragment`] is one narrated call or scope. It starts `InProgress` and
//! ends in exactly one of three terminal states:
//!
//! | From | To | When |
//! |------|----|------|
//! | `InProgress` | `Completed` | the call or scope returned normally |
//! | `InProgress` | `Raised` | a failure was observed while this fragment was on top |
//! | `InProgress` | `PassedThrough` | a failure from deeper down propagated through |
//!
//! Text is rendered at most once. After rendering the source (and every
//! argument it captured) is dropped and the text is frozen.

use std::borrow::Cow;
use std::fmt::Write as _;

use serde::Serialize;

use crate::callsite::{CallSite, SourceLocation};
use crate::errors::NarrationError;
use crate::text::{TextSource, TextThunk, run_thunk};

/// Identity of one push onto a thread's stack, unique within that stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FragmentId(pub(crate) u64);

/// Lifecycle state of a fragment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentStatus {
    /// The call or scope is still executing.
    InProgress,
    /// A failure originated here.
    Raised,
    /// A failure originated deeper and propagated through here.
    PassedThrough,
    /// The call or scope returned normally.
    Completed,
}

/// Which wrapper pushed a fragment; each kind has its own pool free list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentKind {
    /// Pushed by a narrated call wrapper.
    Call,
    /// Pushed by a narration scope guard.
    Scope,
}

/// One narration unit on a thread's stack.
#[derive(Debug)]
pub struct Fragment {
    id: FragmentId,
    kind: FragmentKind,
    status: FragmentStatus,
    source: Option<TextSource>,
    rendered: Option<String>,
    tags: Vec<Cow<'static, str>>,
    exception_summary: Option<String>,
    call_site: CallSite,
    location: Option<SourceLocation>,
}

impl Fragment {
    /// A blank fragment; [`reset`](Self::reset) gives it content.
    pub(crate) fn blank(kind: FragmentKind) -> Self {
        Self {
            id: FragmentId(0),
            kind,
            status: FragmentStatus::InProgress,
            source: None,
            rendered: None,
            tags: Vec::new(),
            exception_summary: None,
            call_site: CallSite {
                function: None,
                file: "",
                line: 0,
            },
            location: None,
        }
    }

    /// A standalone fragment, not attached to any stack.
    #[track_caller]
    pub fn new(text: impl Into<TextSource>) -> Self {
        let mut fragment = Self::blank(FragmentKind::Call);
        fragment.reset(FragmentId(0), text.into(), &[], CallSite::caller());
        fragment
    }

    /// Bring the fragment to a pristine `InProgress` state with new content.
    pub(crate) fn reset(
        &mut self,
        id: FragmentId,
        source: TextSource,
        tags: &[Cow<'static, str>],
        call_site: CallSite,
    ) {
        self.id = id;
        self.status = FragmentStatus::InProgress;
        self.source = Some(source);
        self.rendered = None;
        self.tags.clear();
        self.tags.extend(tags.iter().cloned());
        self.exception_summary = None;
        self.call_site = call_site;
        self.location = None;
    }

    /// Clear everything a retired fragment holds except reusable capacity.
    ///
    /// An unrendered source is handed back so the caller can drop it outside
    /// the store lock.
    pub(crate) fn scrub(&mut self) -> Option<TextSource> {
        let source = self.source.take();
        self.rendered = None;
        self.tags.clear();
        self.exception_summary = None;
        self.location = None;
        source
    }

    /// Identity assigned at push.
    pub fn id(&self) -> FragmentId {
        self.id
    }

    /// Wrapper kind that pushed this fragment.
    pub fn kind(&self) -> FragmentKind {
        self.kind
    }

    /// Current lifecycle state.
    pub fn status(&self) -> FragmentStatus {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: FragmentStatus) {
        self.status = status;
    }

    /// Tags given at push time.
    pub fn tags(&self) -> &[Cow<'static, str>] {
        &self.tags
    }

    /// Failure summary, set only on the fragment where a failure originated.
    pub fn exception_summary(&self) -> Option<&str> {
        self.exception_summary.as_deref()
    }

    /// Where the fragment was pushed.
    pub fn call_site(&self) -> CallSite {
        self.call_site
    }

    /// Source position found by frame correlation.
    pub fn location(&self) -> Option<&SourceLocation> {
        self.location.as_ref()
    }

    pub(crate) fn set_location(&mut self, location: SourceLocation) {
        self.location = Some(location);
    }

    /// Frozen text, if the fragment has been rendered.
    pub fn rendered_text(&self) -> Option<&str> {
        self.rendered.as_deref()
    }

    /// Record the failure that originated at this fragment.
    pub fn mark_exception(&mut self, kind: &str, message: &str) {
        self.exception_summary = Some(format!("exception type: {kind}, value: '{message}'"));
    }

    /// Whether this fragment is visible to a query for `requested` tags.
    ///
    /// An empty query sees everything and an untagged fragment is always visible.
    pub fn matches_tags<S: AsRef<str>>(&self, requested: &[S]) -> bool {
        requested.is_empty()
            || self.tags.is_empty()
            || requested
                .iter()
                .any(|r| self.tags.iter().any(|t| t.as_ref() == r.as_ref()))
    }

    /// Take the deferred thunk out of the fragment for rendering.
    ///
    /// Literal sources are frozen on the spot and yield `None`, as does a
    /// fragment that is already rendered or whose thunk is already out.
    pub(crate) fn take_thunk(&mut self) -> Option<TextThunk> {
        if self.rendered.is_some() {
            return None;
        }
        match self.source.take()? {
            TextSource::Literal(text) => {
                self.rendered = Some(text.into_owned());
                None
            }
            TextSource::Computed(thunk) => Some(thunk),
        }
    }

    pub(crate) fn freeze(&mut self, text: String) {
        self.source = None;
        self.rendered = Some(text);
    }

    /// Render the fragment, invoking a computed source if it has not run yet.
    ///
    /// A failing source freezes a placeholder text and returns
    /// [`NarrationError::Render`]; later calls return the placeholder.
    pub fn render(&mut self, verbose: bool) -> Result<String, NarrationError> {
        if let Some(thunk) = self.take_thunk() {
            match run_thunk(thunk) {
                Ok(text) => self.freeze(text),
                Err(failure) => {
                    self.freeze(failure.placeholder());
                    return Err(failure.into_error(self.call_site));
                }
            }
        }
        Ok(self.tell(verbose))
    }

    /// Compose the display string from already-rendered state.
    pub fn tell(&self, verbose: bool) -> String {
        compose(
            self.rendered.as_deref().unwrap_or(PENDING_TEXT),
            self.exception_summary.as_deref(),
            verbose.then_some((&self.call_site, self.location.as_ref())),
        )
    }
}

/// Shown for a fragment whose thunk is running when it is read.
pub(crate) const PENDING_TEXT: &str = "<narration text pending>";

pub(crate) fn compose(
    text: &str,
    summary: Option<&str>,
    verbose: Option<(&CallSite, Option<&SourceLocation>)>,
) -> String {
    let mut out = String::with_capacity(text.len() + 32);
    out.push_str(text);
    if let Some(summary) = summary {
        let _ = write!(out, ", but {summary} was raised");
    }
    match verbose {
        Some((_, Some(loc))) => {
            let _ = write!(out, "\n    line {} in {}, {}", loc.line, loc.function, loc.file);
        }
        Some((site, None)) => {
            let _ = write!(out, "\n    in {}, {}", site.function_name(), site.file);
        }
        None => {}
    }
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
