//! Error types for the narration engine.

use crate::callsite::CallSite;

/// Errors raised by the narration engine itself.
///
/// Application errors flowing through narrated calls are never wrapped in
/// this type; only failures of the engine's own bookkeeping are.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NarrationError {
    /// A thread selector did not identify a thread known to the registry.
    #[error("the thread argument does not identify a narrating thread: {thread}")]
    InvalidThread {
        /// The selector as given.
        thread: String,
    },

    /// A computed narration text failed to produce its string.
    #[error("narration text failed with {kind}: {message}{}", at_suffix(.location.as_ref()))]
    Render {
        /// Type of the failure raised by the text source (`panic` for panics).
        kind: String,
        /// Message of that failure.
        message: String,
        /// Where the failing fragment was pushed, when known.
        location: Option<CallSite>,
    },
}

fn at_suffix(location: Option<&CallSite>) -> String {
    location.map_or_else(String::new, |site| format!(" (narrated at {site})"))
}

/// Convenience alias for engine results.
pub type Result<T> = std::result::Result<T, NarrationError>;
