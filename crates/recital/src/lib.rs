//! # recital
//!
//! Per-thread failure narration. Narrated calls and scopes push a cheap
//! fragment describing what they are doing; on success the fragment is
//! dropped again, on failure it stays so a handler can read the whole story
//! of the call path, oldest first.
//!
//! - **Wrappers**: [`narrate`], [`narrated`], [`scope`] and the
//!   [`narrate!`] / [`narrate_scope!`] macros
//! - **Retrieval**: [`get_narration`], [`copy_narration`] with
//!   [`NarrationQuery`] for tag filters and `from_here` windows
//! - **Housekeeping**: [`reset_narration`], [`reset_all_narrations`],
//!   [`set_default_options`], [`set_narration_options`]
//! - **Registry**: [`NarrationRegistry`] for callers that want their own
//!   isolated set of thread stores
//! - **Backtraces**: [`sanitize`] helpers that hide the wrapper frames
//!
//! ## Usage
//!
//! ```ignore
//! fn fetch(id: u32) -> anyhow::Result<Record> {
//!     recital::narrate!(format!("fetching record {id}")).call(|| db::get(id))
//! }
//!
//! if let Err(err) = fetch(7) {
//!     for line in recital::get_narration(&recital::NarrationQuery::new())? {
//!         eprintln!("{line}");
//!     }
//! }
//! ```
//!
//! Fragment text can be deferred with [`TextSource::computed`]; it is only
//! produced when a failure or a retrieval needs it, and at most once.

#![deny(unsafe_code)]

pub mod api;
pub mod callsite;
pub mod errors;
pub mod fragment;
pub mod frames;
pub mod logging;
pub mod options;
pub mod pool;
pub mod registry;
pub mod sanitize;
pub mod scope;
pub mod snapshot;
pub mod store;
pub mod text;

mod discipline;
mod narrate;
mod prune;

pub use api::{
    copy_narration, get_narration, global, reset_all_narrations, reset_narration,
    set_default_options, set_narration_options,
};
pub use callsite::{CallSite, SourceLocation};
pub use errors::{NarrationError, Result};
pub use fragment::{Fragment, FragmentId, FragmentKind, FragmentStatus};
pub use frames::{BacktraceFrames, Frame, FrameSource};
pub use narrate::{Narrated, Narration, narrate, narrated};
pub use options::{NarrationOptions, OptionsUpdate};
pub use registry::{NarrationQuery, NarrationRegistry, ThreadKey};
pub use scope::{NarrationScope, scope};
pub use snapshot::FragmentSnapshot;
pub use text::{RenderFailure, Text, TextSource};
