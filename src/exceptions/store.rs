//! The process-wide deduplicating exception store.
//!
//! # Thread Safety
//!
//! All bookkeeping lives behind a single mutex: `handle` may be called concurrently from every
//! instrumented catch site while the user dismisses or bans entries. The expensive part, rendering
//! and hashing the trace, happens before the lock is taken, and observer notifications are
//! delivered after it is released, so an observer may call back into the store.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, RwLock},
};

use crate::{
    exceptions::{AnalysisContext, CaughtException, ExceptionObserver, ExceptionRecord, NullObserver},
    inspector::{FrameInspector, HostAdapter, HostModules},
    metadata::method::ModuleId,
    patches::{ActiveOwners, PatchRegistry},
    settings::{Settings, SettingsHandle},
};

/// Name of the module the interceptor itself lives in, unless configured otherwise
pub const DEFAULT_OWN_MODULE: &str = "patchscope";

struct ActiveEntry {
    record: Arc<ExceptionRecord>,
    count: u64,
    first_seen: u64,
}

#[derive(Default)]
struct StoreState {
    active: HashMap<u64, ActiveEntry>,
    banned: HashSet<u64>,
    next_seen: u64,
}

/// One active entry, as shown to the user.
#[derive(Debug, Clone)]
pub struct StoreEntry {
    /// The first record seen with this fingerprint
    pub record: Arc<ExceptionRecord>,
    /// How often the fingerprint occurred since it was last dismissed
    pub count: u64,
}

/// Deduplicating, ban-aware map from fingerprint to occurrence count.
pub struct ExceptionStore {
    state: Mutex<StoreState>,
    observer: Arc<dyn ExceptionObserver>,
    context: Arc<AnalysisContext>,
}

impl ExceptionStore {
    /// Start configuring a store
    #[must_use]
    pub fn builder() -> ExceptionStoreBuilder {
        ExceptionStoreBuilder::default()
    }

    /// Collaborators shared by every record this store creates
    #[must_use]
    pub fn context(&self) -> &Arc<AnalysisContext> {
        &self.context
    }

    /// Record one occurrence of `exception` and hand it back unchanged.
    ///
    /// Banned fingerprints are ignored. The observer is told about the entry exactly when its
    /// count goes from zero to one. Nothing in here fails toward the caller.
    pub fn handle(&self, exception: Arc<CaughtException>) -> Arc<CaughtException> {
        let record = ExceptionRecord::new(Arc::clone(&exception), Arc::clone(&self.context));
        let fingerprint = record.fingerprint();

        let created = {
            let mut state = lock!(self.state);
            if state.banned.contains(&fingerprint) {
                return exception;
            }

            let first_seen = state.next_seen;
            let mut created = None;
            let entry = state.active.entry(fingerprint).or_insert_with(|| {
                let record = Arc::new(record);
                created = Some(Arc::clone(&record));
                ActiveEntry {
                    record,
                    count: 0,
                    first_seen,
                }
            });
            entry.count += 1;
            if created.is_some() {
                state.next_seen += 1;
            }
            created
        };

        if let Some(record) = created {
            self.observer.on_new_exception(&record);
        }
        exception
    }

    /// Dismiss the entry with `record`'s fingerprint.
    ///
    /// ## Returns
    /// `true` if an entry was removed
    pub fn remove(&self, record: &ExceptionRecord) -> bool {
        let removed = lock!(self.state).active.remove(&record.fingerprint());
        let Some(removed) = removed else {
            return false;
        };

        if read_lock!(self.context.settings).sound_on_dismiss {
            self.observer.on_dismissed(&removed.record);
        }
        true
    }

    /// Never show `record`'s fingerprint again in this process, and dismiss it
    pub fn ban(&self, record: &ExceptionRecord) {
        lock!(self.state).banned.insert(record.fingerprint());
        self.remove(record);
    }

    /// Dismiss every active entry; the ban set is kept
    pub fn clear(&self) {
        lock!(self.state).active.clear();
    }

    /// Snapshot of the active entries in first-seen order
    #[must_use]
    pub fn entries(&self) -> Vec<StoreEntry> {
        let state = lock!(self.state);
        let mut entries: Vec<&ActiveEntry> = state.active.values().collect();
        entries.sort_by_key(|entry| entry.first_seen);
        entries
            .into_iter()
            .map(|entry| StoreEntry {
                record: Arc::clone(&entry.record),
                count: entry.count,
            })
            .collect()
    }

    /// Occurrences of `fingerprint` since it was last dismissed, `0` if not active
    #[must_use]
    pub fn count_of(&self, fingerprint: u64) -> u64 {
        lock!(self.state)
            .active
            .get(&fingerprint)
            .map_or(0, |entry| entry.count)
    }

    /// Returns `true` if `fingerprint` is banned
    #[must_use]
    pub fn is_banned(&self, fingerprint: u64) -> bool {
        lock!(self.state).banned.contains(&fingerprint)
    }

    /// The ban set, sorted, for persistence by the host
    #[must_use]
    pub fn banned(&self) -> Vec<u64> {
        let mut banned: Vec<u64> = lock!(self.state).banned.iter().copied().collect();
        banned.sort_unstable();
        banned
    }

    /// Number of active entries
    #[must_use]
    pub fn len(&self) -> usize {
        lock!(self.state).active.len()
    }

    /// Returns `true` if nothing is active
    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock!(self.state).active.is_empty()
    }

    /// The textual report: one block per active record, separated by blank lines
    #[must_use]
    pub fn render(&self) -> String {
        self.entries()
            .iter()
            .map(|entry| entry.record.formatted_trace())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Builder for [`ExceptionStore`].
///
/// Every collaborator has a default, so `ExceptionStore::builder().build()` yields a working
/// store with an empty registry, no host modules and default settings.
#[derive(Default)]
pub struct ExceptionStoreBuilder {
    observer: Option<Arc<dyn ExceptionObserver>>,
    host: Option<Arc<dyn HostAdapter>>,
    registry: Option<Arc<PatchRegistry>>,
    owners: Option<Arc<ActiveOwners>>,
    own_module: Option<ModuleId>,
    settings: Option<SettingsHandle>,
    banned: Vec<u64>,
}

impl ExceptionStoreBuilder {
    /// Receiver of new-entry and dismissal notifications
    #[must_use]
    pub fn observer(mut self, observer: Arc<dyn ExceptionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Host naming and module classification
    #[must_use]
    pub fn host(mut self, host: Arc<dyn HostAdapter>) -> Self {
        self.host = Some(host);
        self
    }

    /// Registry consulted when resolving frames
    #[must_use]
    pub fn registry(mut self, registry: Arc<PatchRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Owner ids per module
    #[must_use]
    pub fn owners(mut self, owners: Arc<ActiveOwners>) -> Self {
        self.owners = Some(owners);
        self
    }

    /// The interceptor's own module, excluded from owner groups
    #[must_use]
    pub fn own_module(mut self, module: ModuleId) -> Self {
        self.own_module = Some(module);
        self
    }

    /// Shared settings
    #[must_use]
    pub fn settings(mut self, settings: SettingsHandle) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Pre-populate the ban set, e.g. from a previous session
    #[must_use]
    pub fn with_banned(mut self, fingerprints: impl IntoIterator<Item = u64>) -> Self {
        self.banned.extend(fingerprints);
        self
    }

    /// Finish the store
    #[must_use]
    pub fn build(self) -> ExceptionStore {
        let context = AnalysisContext {
            inspector: FrameInspector::new(self.registry.unwrap_or_default()),
            host: self
                .host
                .unwrap_or_else(|| Arc::new(HostModules::default())),
            owners: self.owners.unwrap_or_default(),
            own_module: self
                .own_module
                .unwrap_or_else(|| ModuleId::named(DEFAULT_OWN_MODULE)),
            settings: self
                .settings
                .unwrap_or_else(|| Arc::new(RwLock::new(Settings::default()))),
        };

        ExceptionStore {
            state: Mutex::new(StoreState {
                banned: self.banned.into_iter().collect(),
                ..StoreState::default()
            }),
            observer: self.observer.unwrap_or_else(|| Arc::new(NullObserver)),
            context: Arc::new(context),
        }
    }
}
