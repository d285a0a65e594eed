//! Detached copies of narration fragments.

use serde::Serialize;

use crate::callsite::{CallSite, SourceLocation};
use crate::fragment::{Fragment, FragmentKind, FragmentStatus, PENDING_TEXT, compose};

/// A fragment as it was when copied; later changes to the stack do not affect it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FragmentSnapshot {
    /// Rendered text, without summary or location.
    pub text: String,
    /// Wrapper kind that pushed the fragment.
    pub kind: FragmentKind,
    /// Status at copy time.
    pub status: FragmentStatus,
    /// Tags given at push time.
    pub tags: Vec<String>,
    /// Failure summary if the failure originated here.
    pub exception_summary: Option<String>,
    /// Where the fragment was pushed.
    pub call_site: CallSite,
    /// Set only when a verbose failure correlated the fragment with a frame.
    pub location: Option<SourceLocation>,
}

impl FragmentSnapshot {
    pub(crate) fn of(fragment: &Fragment) -> Self {
        Self {
            text: fragment.rendered_text().unwrap_or(PENDING_TEXT).to_string(),
            kind: fragment.kind(),
            status: fragment.status(),
            tags: fragment.tags().iter().map(|t| t.to_string()).collect(),
            exception_summary: fragment.exception_summary().map(str::to_string),
            call_site: fragment.call_site(),
            location: fragment.location().cloned(),
        }
    }

    /// The display string, formatted exactly as retrieval would.
    pub fn tell(&self, verbose: bool) -> String {
        compose(
            &self.text,
            self.exception_summary.as_deref(),
            verbose.then_some((&self.call_site, self.location.as_ref())),
        )
    }
}
