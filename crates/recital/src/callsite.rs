//! Call-site identity captured when a fragment is pushed.
//!
//! A [`CallSite`] names the function and file a fragment belongs to. The
//! frame correlator compares it against captured stack frames, so both sides
//! are normalized the same way: closure segments and symbol hashes are
//! dropped and files are compared by trailing path components.

use std::borrow::Cow;
use std::fmt;
use std::path::Path;

use serde::Serialize;

/// Function, file and line where a narrated call or scope was entered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct CallSite {
    /// Path of the enclosing function, when the `narrate!` family of macros captured it.
    pub function: Option<&'static str>,
    /// Source file as reported by `file!()` or [`std::panic::Location`].
    pub file: &'static str,
    /// Line of the narration entry.
    pub line: u32,
}

impl CallSite {
    /// A call site with a known function name.
    pub const fn new(function: &'static str, file: &'static str, line: u32) -> Self {
        Self {
            function: Some(function),
            file,
            line,
        }
    }

    /// The caller's location, without a function name.
    #[track_caller]
    pub fn caller() -> Self {
        let location = std::panic::Location::caller();
        Self {
            function: None,
            file: location.file(),
            line: location.line(),
        }
    }

    /// Function name for display, `<unknown>` when not captured.
    pub fn function_name(&self) -> &'static str {
        self.function.unwrap_or("<unknown>")
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.function {
            Some(function) => write!(f, "{function}, {}:{}", self.file, self.line),
            None => write!(f, "{}:{}", self.file, self.line),
        }
    }
}

/// Source position attached to a fragment by the frame correlator.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct SourceLocation {
    /// Function the matched frame belongs to.
    pub function: Cow<'static, str>,
    /// Source file of the matched frame.
    pub file: Cow<'static, str>,
    /// Line the frame was executing when the failure was observed.
    pub line: u32,
}

/// Strip the helper item name appended by [`function_name!`](crate::function_name)
/// plus any trailing closure segments.
#[doc(hidden)]
pub fn enclosing_function(type_name: &'static str) -> &'static str {
    let mut name = type_name.strip_suffix("::__recital_here").unwrap_or(type_name);
    while let Some(stripped) = name.strip_suffix("::{{closure}}") {
        name = stripped;
    }
    name
}

/// Normalize a function path or demangled symbol for comparison.
///
/// Removes `{{closure}}` segments anywhere in the path and a trailing
/// `::h<16 hex digits>` symbol hash.
pub fn normalize_function(name: &str) -> Cow<'_, str> {
    let name = strip_symbol_hash(name.trim());
    if name.contains("::{{closure}}") {
        Cow::Owned(name.replace("::{{closure}}", ""))
    } else {
        Cow::Borrowed(name)
    }
}

fn strip_symbol_hash(name: &str) -> &str {
    match name.rsplit_once("::h") {
        Some((head, hash)) if hash.len() == 16 && hash.chars().all(|c| c.is_ascii_hexdigit()) => {
            head
        }
        _ => name,
    }
}

/// Whether two reported source paths refer to the same file.
///
/// Paths are compared by trailing components, so `src/lib.rs` matches
/// `/home/me/project/src/lib.rs` and `./src/lib.rs`.
pub fn same_file(a: &str, b: &str) -> bool {
    let a = Path::new(a.strip_prefix("./").unwrap_or(a));
    let b = Path::new(b.strip_prefix("./").unwrap_or(b));
    a.ends_with(b) || b.ends_with(a)
}

/// Path of the function this macro is expanded in.
#[macro_export]
macro_rules! function_name {
    () => {{
        fn __recital_here() {}
        $crate::callsite::enclosing_function(::std::any::type_name_of_val(&__recital_here))
    }};
}

/// [`CallSite`] for the location this macro is expanded at.
#[macro_export]
macro_rules! call_site {
    () => {
        $crate::CallSite::new($crate::function_name!(), ::std::file!(), ::std::line!())
    };
}
