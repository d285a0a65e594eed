//! Narration text sources.
//!
//! - [`TextSource`]: what a pushed fragment renders from, either a literal or
//!   a deferred thunk that owns its captured arguments
//! - [`Text`]: the form accepted by [`narrated`](crate::narrated) wrappers,
//!   bound to the wrapped function's arguments on every call

use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use crate::callsite::CallSite;
use crate::errors::NarrationError;

/// Failure of a computed text source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderFailure {
    /// Type name of the failure, or `panic`.
    pub kind: String,
    /// Failure message.
    pub message: String,
}

impl RenderFailure {
    /// Text frozen into a fragment whose source failed, so later reads never retry it.
    pub fn placeholder(&self) -> String {
        format!("<narration text unavailable: {}: {}>", self.kind, self.message)
    }

    pub(crate) fn into_error(self, location: CallSite) -> NarrationError {
        NarrationError::Render {
            kind: self.kind,
            message: self.message,
            location: Some(location),
        }
    }
}

/// Deferred text producer owning its captured arguments.
pub type TextThunk = Box<dyn FnOnce() -> Result<String, RenderFailure> + Send>;

/// Source of a fragment's text.
pub enum TextSource {
    /// Fixed text, used as is.
    Literal(Cow<'static, str>),
    /// Deferred text, produced at most once and only when needed.
    Computed(TextThunk),
}

impl TextSource {
    /// Deferred text from an infallible closure.
    pub fn computed<F>(f: F) -> Self
    where
        F: FnOnce() -> String + Send + 'static,
    {
        Self::Computed(Box::new(move || Ok(f())))
    }

    /// Deferred text from a closure that may fail.
    ///
    /// A failure surfaces as [`NarrationError::Render`] carrying the error's
    /// type name and message.
    pub fn try_computed<F, E>(f: F) -> Self
    where
        F: FnOnce() -> Result<String, E> + Send + 'static,
        E: fmt::Display,
    {
        Self::Computed(Box::new(move || {
            f().map_err(|e| RenderFailure {
                kind: short_type_name::<E>().to_string(),
                message: e.to_string(),
            })
        }))
    }
}

impl fmt::Debug for TextSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(text) => f.debug_tuple("Literal").field(text).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

impl From<&'static str> for TextSource {
    fn from(text: &'static str) -> Self {
        Self::Literal(Cow::Borrowed(text))
    }
}

impl From<String> for TextSource {
    fn from(text: String) -> Self {
        Self::Literal(Cow::Owned(text))
    }
}

/// Text for a wrapped function taking arguments `A`.
///
/// `Computed` receives the same argument value the wrapped function is
/// called with; the value is cloned into the fragment on entry so the text
/// can still be produced after the function consumed its arguments.
pub enum Text<A> {
    /// Fixed text.
    Literal(Cow<'static, str>),
    /// Text computed from the call's arguments.
    Computed(Arc<dyn Fn(&A) -> Result<String, RenderFailure> + Send + Sync>),
}

impl<A> Text<A> {
    /// Text computed from the arguments by an infallible closure.
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&A) -> String + Send + Sync + 'static,
    {
        Self::Computed(Arc::new(move |args: &A| Ok(f(args))))
    }

    /// Text computed from the arguments by a closure that may fail.
    pub fn try_computed<F, E>(f: F) -> Self
    where
        F: Fn(&A) -> Result<String, E> + Send + Sync + 'static,
        E: fmt::Display,
    {
        Self::Computed(Arc::new(move |args: &A| {
            f(args).map_err(|e| RenderFailure {
                kind: short_type_name::<E>().to_string(),
                message: e.to_string(),
            })
        }))
    }

    /// Produce the fragment text source for one call with `args`.
    pub(crate) fn bind(&self, args: &A) -> TextSource
    where
        A: Clone + Send + 'static,
    {
        match self {
            Self::Literal(text) => TextSource::Literal(text.clone()),
            Self::Computed(f) => {
                let f = Arc::clone(f);
                let args = args.clone();
                TextSource::Computed(Box::new(move || f(&args)))
            }
        }
    }
}

impl<A> Clone for Text<A> {
    fn clone(&self) -> Self {
        match self {
            Self::Literal(text) => Self::Literal(text.clone()),
            Self::Computed(f) => Self::Computed(Arc::clone(f)),
        }
    }
}

impl<A> fmt::Debug for Text<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(text) => f.debug_tuple("Literal").field(text).finish(),
            Self::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

impl<A> From<&'static str> for Text<A> {
    fn from(text: &'static str) -> Self {
        Self::Literal(Cow::Borrowed(text))
    }
}

impl<A> From<String> for Text<A> {
    fn from(text: String) -> Self {
        Self::Literal(Cow::Owned(text))
    }
}

/// Run a deferred text thunk, turning errors and panics into a [`RenderFailure`].
pub(crate) fn run_thunk(thunk: TextThunk) -> Result<String, RenderFailure> {
    match catch_unwind(AssertUnwindSafe(thunk)) {
        Ok(result) => result,
        Err(payload) => Err(RenderFailure {
            kind: "panic".to_string(),
            message: panic_message(payload.as_ref()),
        }),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

/// Last path segment of a type's name, without generic arguments.
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
