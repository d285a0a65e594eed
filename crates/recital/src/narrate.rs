//! Narrated calls.
//!
//! ```ignore
//! fn load(path: &Path) -> anyhow::Result<Config> {
//!     recital::narrate!(format!("loading config from {}", path.display()))
//!         .tag("config")
//!         .call(|| parse(path))
//! }
//! ```
//!
//! On `Ok` the fragment is settled quietly. On `Err` or panic it is kept
//! for later retrieval and the error passes through unchanged, unless
//! rendering the fragment's own text failed, in which case that failure is
//! returned instead as `E::from(NarrationError::Render { .. })`.

use std::borrow::Cow;
use std::fmt::{self, Display};
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};

use tracing::warn;

use crate::callsite::CallSite;
use crate::discipline::ActiveFragment;
use crate::errors::NarrationError;
use crate::fragment::FragmentKind;
use crate::registry::NarrationRegistry;
use crate::scope::NarrationScope;
use crate::text::{Text, TextSource, panic_message, short_type_name};

/// A pending narration, finished by [`call`](Self::call) or [`scope`](Self::scope).
#[must_use = "a narration does nothing until it is called or turned into a scope"]
pub struct Narration<'r> {
    registry: &'r NarrationRegistry,
    source: TextSource,
    tags: Vec<Cow<'static, str>>,
    call_site: CallSite,
}

impl<'r> Narration<'r> {
    pub(crate) fn new(registry: &'r NarrationRegistry, source: TextSource, call_site: CallSite) -> Self {
        Self {
            registry,
            source,
            tags: Vec::new(),
            call_site,
        }
    }

    /// Add a retrieval tag.
    pub fn tag(mut self, tag: impl Into<Cow<'static, str>>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Add several retrieval tags.
    pub fn tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Cow<'static, str>>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Override the captured call site.
    pub fn at(mut self, call_site: CallSite) -> Self {
        self.call_site = call_site;
        self
    }

    /// Run `body` under this narration.
    pub fn call<T, E, F>(self, body: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: Display + From<NarrationError>,
    {
        let active = ActiveFragment::enter(
            self.registry,
            FragmentKind::Call,
            self.source,
            &self.tags,
            self.call_site,
        );
        narrate_it(active, body)
    }

    /// Push the fragment now and return a guard that settles it.
    pub fn scope(self) -> NarrationScope<'r> {
        NarrationScope::new(ActiveFragment::enter(
            self.registry,
            FragmentKind::Scope,
            self.source,
            &self.tags,
            self.call_site,
        ))
    }
}

impl fmt::Debug for Narration<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Narration")
            .field("source", &self.source)
            .field("tags", &self.tags)
            .field("call_site", &self.call_site)
            .finish_non_exhaustive()
    }
}

/// Settle `active` according to how `body` ends.
///
/// The name is matched by the backtrace sanitizers, which hide this frame.
#[inline(never)]
fn narrate_it<T, E, F>(mut active: ActiveFragment<'_>, body: F) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E>,
    E: Display + From<NarrationError>,
{
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(value)) => {
            active.complete()?;
            Ok(value)
        }
        Ok(Err(err)) => match active.fail(short_type_name::<E>(), &err) {
            Ok(()) => Err(err),
            Err(render) => {
                warn!(original = %err, %render, "narration text failed while reporting an error");
                Err(E::from(render))
            }
        },
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            if let Err(render) = active.fail("panic", &message) {
                warn!(%render, "narration text failed while a panic unwound");
            }
            resume_unwind(payload)
        }
    }
}

/// A function wrapped so each call is narrated.
///
/// Built by [`narrated`](crate::narrated). The text is bound to the
/// arguments of each call; arguments are passed as one value, a tuple when
/// the function takes several.
pub struct Narrated<'r, A, F> {
    registry: &'r NarrationRegistry,
    text: Text<A>,
    tags: Vec<Cow<'static, str>>,
    call_site: CallSite,
    func: F,
}

impl<'r, A, F> Narrated<'r, A, F> {
    pub(crate) fn new(registry: &'r NarrationRegistry, text: Text<A>, func: F, call_site: CallSite) -> Self {
        Self {
            registry,
            text,
            tags: Vec::new(),
            call_site,
            func,
        }
    }

    /// Add a retrieval tag to every call.
    #[must_use]
    pub fn tag(mut self, tag: impl Into<Cow<'static, str>>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Call the wrapped function with `args`.
    pub fn call<T, E>(&self, args: A) -> Result<T, E>
    where
        F: Fn(A) -> Result<T, E>,
        A: Clone + Send + 'static,
        E: Display + From<NarrationError>,
    {
        let source = self.text.bind(&args);
        let active = ActiveFragment::enter(
            self.registry,
            FragmentKind::Call,
            source,
            &self.tags,
            self.call_site,
        );
        narrate_it(active, || (self.func)(args))
    }
}

impl<A, F> fmt::Debug for Narrated<'_, A, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Narrated")
            .field("text", &self.text)
            .field("tags", &self.tags)
            .field("call_site", &self.call_site)
            .finish_non_exhaustive()
    }
}

/// Narrate a closure call with the global registry.
#[track_caller]
pub fn narrate(text: impl Into<TextSource>) -> Narration<'static> {
    crate::api::global().narrate(text)
}

/// Wrap `func` for narrated calls with the global registry.
#[track_caller]
pub fn narrated<A, F>(text: impl Into<Text<A>>, func: F) -> Narrated<'static, A, F> {
    crate::api::global().narrated(text, func)
}

/// [`narrate`] with the enclosing function recorded as the call site.
#[macro_export]
macro_rules! narrate {
    ($text:expr) => {
        $crate::narrate($text).at($crate::call_site!())
    };
}
