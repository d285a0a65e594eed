//! Registry of per-thread narration stores.
//!
//! ## Lookup
//!
//! Stores are keyed by [`ThreadId`] and remember the thread's name so a
//! handler on another thread can read them by name. Read operations never
//! create a store; a thread without one simply has no narration.
//!
//! ## Locking
//!
//! The map is only locked for structural inserts and lookups. Per-store
//! work happens through the store's own mutex after the `Arc` is cloned out
//! of the map, so a thread's narration bookkeeping never contends with
//! other threads. When both are held, the map shard is taken first.
//!
//! ## Thread exit
//!
//! The first time a thread narrates it registers a thread-local watch. When
//! the thread exits the watch frees the store's pool and removes the store
//! if its stack is empty. A store still holding narration stays readable
//! until [`NarrationRegistry::reset_all`] evicts it.

use std::cell::RefCell;
use std::sync::{Arc, Weak};
use std::thread::{self, Thread, ThreadId};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use recital_settings::RecitalSettings;
use tracing::{debug, trace};

use crate::callsite::{CallSite, enclosing_function};
use crate::errors::{NarrationError, Result};
use crate::fragment::FragmentKind;
use crate::frames::{BacktraceFrames, FrameSource};
use crate::narrate::{Narrated, Narration};
use crate::options::{NarrationOptions, OptionsUpdate};
use crate::scope::NarrationScope;
use crate::snapshot::FragmentSnapshot;
use crate::store::{ThreadNarration, render_fragments, with_store};
use crate::text::{Text, TextSource};

/// Default free-list capacity per fragment kind.
pub const DEFAULT_POOL_CAPACITY: usize = 64;

/// Default number of innermost frames captured for correlation.
pub const DEFAULT_MAX_FRAMES: usize = 256;

/// Selects whose narration an operation reads or changes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ThreadKey {
    /// The calling thread.
    #[default]
    Current,
    /// A thread by id.
    Id(ThreadId),
    /// A thread by name; unknown names are an error.
    Name(String),
}

impl From<ThreadId> for ThreadKey {
    fn from(id: ThreadId) -> Self {
        Self::Id(id)
    }
}

impl From<&Thread> for ThreadKey {
    fn from(thread: &Thread) -> Self {
        Self::Id(thread.id())
    }
}

impl From<&str> for ThreadKey {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for ThreadKey {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

/// Parameters of a narration retrieval.
#[derive(Clone, Debug, Default)]
pub struct NarrationQuery {
    thread: ThreadKey,
    from_here: bool,
    tags: Vec<String>,
    verbose: bool,
}

impl NarrationQuery {
    /// All narration of the calling thread.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read another thread's narration.
    #[must_use]
    pub fn thread(mut self, thread: impl Into<ThreadKey>) -> Self {
        self.thread = thread.into();
        self
    }

    /// Start at the nearest fragment still in progress instead of the bottom.
    #[must_use]
    pub fn from_here(mut self, from_here: bool) -> Self {
        self.from_here = from_here;
        self
    }

    /// Only fragments carrying one of `tags`, plus untagged ones. Empty means all.
    #[must_use]
    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Append the call site, and the line when one was correlated, to each entry.
    #[must_use]
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

struct StoreEntry {
    name: Option<String>,
    /// Set once the owning thread has used the store and watches for its exit.
    claimed: bool,
    store: Arc<Mutex<ThreadNarration>>,
}

type Stores = DashMap<ThreadId, StoreEntry>;

/// Removes a thread's store from its registry when the thread exits.
struct ExitWatch {
    stores: Weak<Stores>,
    thread: ThreadId,
}

impl Drop for ExitWatch {
    fn drop(&mut self) {
        let Some(stores) = self.stores.upgrade() else {
            return;
        };
        let evicted = stores.remove_if(&self.thread, |_, entry| {
            let mut store = entry.store.lock();
            let freed = store.mark_exited();
            trace!(freed, "pool freed on thread exit");
            store.depth() == 0
        });
        debug!(thread = ?self.thread, evicted = evicted.is_some(), "narrating thread exited");
    }
}

thread_local! {
    static EXIT_WATCHES: RefCell<Vec<ExitWatch>> = const { RefCell::new(Vec::new()) };
}

fn watch_exit(stores: Weak<Stores>, thread: ThreadId) {
    // Fails only while the thread's locals are being torn down.
    let _ = EXIT_WATCHES.try_with(|watches| watches.borrow_mut().push(ExitWatch { stores, thread }));
}

/// Owner of every thread's narration store and the process defaults.
pub struct NarrationRegistry {
    stores: Arc<Stores>,
    defaults: RwLock<NarrationOptions>,
    pool_capacity: usize,
    max_frames: usize,
    frames: Arc<dyn FrameSource>,
}

impl Default for NarrationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl NarrationRegistry {
    /// A registry with built-in defaults.
    pub fn new() -> Self {
        Self::with_defaults(NarrationOptions::default())
    }

    /// A registry whose new stores start with `defaults`.
    pub fn with_defaults(defaults: NarrationOptions) -> Self {
        Self {
            stores: Arc::new(DashMap::new()),
            defaults: RwLock::new(defaults),
            pool_capacity: DEFAULT_POOL_CAPACITY,
            max_frames: DEFAULT_MAX_FRAMES,
            frames: Arc::new(BacktraceFrames),
        }
    }

    /// A registry configured from loaded settings.
    pub fn from_settings(settings: &RecitalSettings) -> Self {
        let mut registry = Self::with_defaults(settings.defaults.into());
        registry.pool_capacity = settings.pool.capacity;
        registry.max_frames = settings.frames.max_frames;
        registry
    }

    /// Replace the frame source used for verbose correlation.
    #[must_use]
    pub fn with_frame_source(mut self, frames: Arc<dyn FrameSource>) -> Self {
        self.frames = frames;
        self
    }

    /// Set the per-kind pool capacity for stores created from now on.
    #[must_use]
    pub fn with_pool_capacity(mut self, capacity: usize) -> Self {
        self.pool_capacity = capacity;
        self
    }

    pub(crate) fn frame_source(&self) -> &dyn FrameSource {
        self.frames.as_ref()
    }

    pub(crate) fn max_frames(&self) -> usize {
        self.max_frames
    }

    // ── stores ──

    /// The calling thread's store, created from the defaults on first use.
    pub(crate) fn current_store(&self) -> Arc<Mutex<ThreadNarration>> {
        let thread = thread::current();
        if let Some(entry) = self.stores.get(&thread.id())
            && entry.claimed
        {
            return Arc::clone(&entry.store);
        }
        self.claim_store(&thread)
    }

    /// Create or adopt the calling thread's store and watch for the thread's exit.
    ///
    /// A store created on the thread's behalf by another thread learns the
    /// thread's name here.
    fn claim_store(&self, thread: &Thread) -> Arc<Mutex<ThreadNarration>> {
        let id = thread.id();
        let name = thread.name().map(str::to_string);
        let mut entry = self
            .stores
            .entry(id)
            .or_insert_with(|| self.new_entry(id, name.clone()));
        if !entry.claimed {
            entry.claimed = true;
            if entry.name.is_none() && name.is_some() {
                entry.store.lock().set_thread_name(name.clone());
                entry.name = name;
            }
            watch_exit(Arc::downgrade(&self.stores), id);
        }
        Arc::clone(&entry.store)
    }

    fn new_entry(&self, id: ThreadId, name: Option<String>) -> StoreEntry {
        let options = *self.defaults.read();
        debug!(thread = ?id, name = name.as_deref(), ?options, "narration store created");
        StoreEntry {
            store: Arc::new(Mutex::new(ThreadNarration::new(
                name.clone(),
                options,
                self.pool_capacity,
            ))),
            claimed: false,
            name,
        }
    }

    /// The store `thread` selects, without creating one.
    fn find_store(&self, thread: &ThreadKey) -> Result<Option<Arc<Mutex<ThreadNarration>>>> {
        match thread {
            ThreadKey::Current => Ok(self.lookup(thread::current().id())),
            ThreadKey::Id(id) => Ok(self.lookup(*id)),
            ThreadKey::Name(name) => self.find_named(name).map(Some),
        }
    }

    fn find_named(&self, name: &str) -> Result<Arc<Mutex<ThreadNarration>>> {
        self.stores
            .iter()
            .find(|entry| entry.name.as_deref() == Some(name))
            .map(|entry| Arc::clone(&entry.store))
            .ok_or_else(|| NarrationError::InvalidThread {
                thread: name.to_string(),
            })
    }

    fn lookup(&self, id: ThreadId) -> Option<Arc<Mutex<ThreadNarration>>> {
        self.stores.get(&id).map(|entry| Arc::clone(&entry.store))
    }

    // ── options ──

    /// Options new stores start with.
    pub fn default_options(&self) -> NarrationOptions {
        *self.defaults.read()
    }

    /// Change the defaults for stores created from now on.
    pub fn set_default_options(&self, update: OptionsUpdate) -> NarrationOptions {
        let options = self.defaults.write().apply(update);
        debug!(?options, "default narration options changed");
        options
    }

    /// Options in effect for `thread`; the defaults when it has no store.
    pub fn narration_options(&self, thread: impl Into<ThreadKey>) -> Result<NarrationOptions> {
        Ok(match self.find_store(&thread.into())? {
            Some(store) => store.lock().options(),
            None => self.default_options(),
        })
    }

    /// Change one thread's options, creating its store if needed.
    pub fn set_narration_options(
        &self,
        thread: impl Into<ThreadKey>,
        update: OptionsUpdate,
    ) -> Result<NarrationOptions> {
        let store = match thread.into() {
            ThreadKey::Current => self.current_store(),
            ThreadKey::Id(id) if id == thread::current().id() => self.current_store(),
            ThreadKey::Id(id) => Arc::clone(
                &self
                    .stores
                    .entry(id)
                    .or_insert_with(|| self.new_entry(id, None))
                    .store,
            ),
            ThreadKey::Name(name) => self.find_named(&name)?,
        };
        let options = store.lock().options_mut().apply(update);
        debug!(?options, "narration options changed");
        Ok(options)
    }

    // ── reset ──

    /// Discard every thread's fragments.
    ///
    /// Stores of exited threads are evicted, as are stores created for a
    /// thread that never narrated when their options equal the defaults.
    /// Per-thread options of every other thread are kept.
    pub fn reset_all(&self) {
        let stores: Vec<_> = self
            .stores
            .iter()
            .map(|entry| Arc::clone(&entry.store))
            .collect();
        for store in &stores {
            with_store(store, ThreadNarration::clear);
        }
        let defaults = self.default_options();
        self.stores.retain(|_, entry| {
            let store = entry.store.lock();
            !(store.has_exited() || (!entry.claimed && store.options() == defaults))
        });
        debug!(
            stores = stores.len(),
            kept = self.stores.len(),
            "all narrations reset"
        );
    }

    /// Discard `thread`'s fragments, or with `from_here` only those above the
    /// caller's position.
    pub fn reset(&self, thread: impl Into<ThreadKey>, from_here: bool) -> Result<()> {
        let Some(store) = self.find_store(&thread.into())? else {
            return Ok(());
        };
        if from_here {
            let _ = with_store(&store, ThreadNarration::reset_from_here);
        } else {
            with_store(&store, ThreadNarration::clear);
            debug!("narration reset");
        }
        Ok(())
    }

    // ── retrieval ──

    /// Rendered narration, oldest first.
    pub fn get_narration(&self, query: &NarrationQuery) -> Result<Vec<String>> {
        let Some(store) = self.find_store(&query.thread)? else {
            return Ok(Vec::new());
        };
        let ids = store.lock().select(query.from_here, &query.tags);
        render_fragments(&store, &ids)?;
        let guard = store.lock();
        Ok(ids
            .iter()
            .filter_map(|&id| guard.get(id))
            .map(|fragment| fragment.tell(query.verbose))
            .collect())
    }

    /// Detached copies of `thread`'s fragments, oldest first.
    pub fn copy_narration(
        &self,
        thread: impl Into<ThreadKey>,
        from_here: bool,
    ) -> Result<Vec<FragmentSnapshot>> {
        let Some(store) = self.find_store(&thread.into())? else {
            return Ok(Vec::new());
        };
        let none: [&str; 0] = [];
        let ids = store.lock().select(from_here, &none);
        render_fragments(&store, &ids)?;
        let guard = store.lock();
        Ok(ids
            .iter()
            .filter_map(|&id| guard.get(id))
            .map(FragmentSnapshot::of)
            .collect())
    }

    /// Number of fragments on `thread`'s stack.
    pub fn depth(&self, thread: impl Into<ThreadKey>) -> Result<usize> {
        Ok(self
            .find_store(&thread.into())?
            .map_or(0, |store| store.lock().depth()))
    }

    /// Number of thread stores currently held.
    pub fn thread_count(&self) -> usize {
        self.stores.len()
    }

    /// Retired fragments of `kind` in the calling thread's pool.
    pub fn pooled(&self, kind: FragmentKind) -> usize {
        self.lookup(thread::current().id())
            .map_or(0, |store| store.lock().pooled(kind))
    }

    // ── wrappers ──

    /// Narrate a closure call; finish with [`Narration::call`] or [`Narration::scope`].
    #[track_caller]
    pub fn narrate(&self, text: impl Into<TextSource>) -> Narration<'_> {
        Narration::new(self, text.into(), CallSite::caller())
    }

    /// Open a narration scope that lasts until the guard is finished or dropped.
    #[track_caller]
    pub fn scope(&self, text: impl Into<TextSource>) -> NarrationScope<'_> {
        Narration::new(self, text.into(), CallSite::caller()).scope()
    }

    /// Wrap `func` so every call is narrated with `text` bound to the call's arguments.
    #[track_caller]
    pub fn narrated<A, F>(&self, text: impl Into<Text<A>>, func: F) -> Narrated<'_, A, F> {
        let caller = CallSite::caller();
        let site = CallSite::new(
            enclosing_function(std::any::type_name::<F>()),
            caller.file,
            caller.line,
        );
        Narrated::new(self, text.into(), func, site)
    }
}
