//! The process-wide interceptor state.
//!
//! A [`Session`] wires the registry, the owner map, the settings, the store and the
//! instrumentation engine together. The host creates one at load time, calls
//! [`Session::startup`] once its methods are available and [`Session::teardown`] on shutdown.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use patchscope::prelude::*;
//!
//! let hooks = TypeName::new("Patchscope", "Hooks");
//! let targets = InstrumentationTargets::new(
//!     "patchscope",
//!     MethodDescriptor::new(hooks.clone(), "Handle").static_method(),
//!     MethodDescriptor::new(hooks, "Transpiler").static_method(),
//! )
//! .namespace("Verse.");
//!
//! let session = Session::builder(targets)
//!     .host(Arc::new(HostModules::new(["Assembly-CSharp"])))
//!     .settings(Settings::first_run())
//!     .build();
//!
//! let error = Arc::new(CaughtException::new("System.Exception").with_message("boom"));
//! session.store().handle(error);
//! assert_eq!(session.store().len(), 1);
//! ```

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    exceptions::{ExceptionObserver, ExceptionStore},
    inspector::HostAdapter,
    instrumentation::{
        InstrumentationEngine, InstrumentationTargets, MethodSource, ScanSummary,
    },
    metadata::method::{MethodDescriptor, ModuleId},
    patches::{ActiveOwners, PatchRegistry},
    settings::{Settings, SettingsHandle},
    trace::CallFrame,
    Result,
};

/// Everything the interceptor keeps for the lifetime of the process.
pub struct Session {
    registry: Arc<PatchRegistry>,
    owners: Arc<ActiveOwners>,
    settings: SettingsHandle,
    settings_path: Option<PathBuf>,
    store: ExceptionStore,
    engine: InstrumentationEngine,
}

impl Session {
    /// Start configuring a session instrumenting `targets`
    #[must_use]
    pub fn builder(targets: InstrumentationTargets) -> SessionBuilder {
        SessionBuilder {
            targets,
            host: None,
            observer: None,
            registry: None,
            own_module: None,
            settings: None,
            settings_path: None,
            banned: Vec::new(),
        }
    }

    /// Instrument the host, if enabled in the settings.
    ///
    /// ## Returns
    /// The scan summary, or `None` if disabled or already started
    pub fn startup(&self, source: &dyn MethodSource) -> Option<ScanSummary> {
        if !read_lock!(self.settings).enabled {
            log::info!("interceptor disabled, not instrumenting");
            return None;
        }
        self.engine.apply(source)
    }

    /// Persist the settings (when loaded from a file) and drop all active entries.
    ///
    /// ## Returns
    /// The ban set, for the host to keep if it wants to
    ///
    /// # Errors
    /// Returns an error if the settings file cannot be written.
    pub fn teardown(&self) -> Result<Vec<u64>> {
        if let Some(path) = &self.settings_path {
            let settings = *read_lock!(self.settings);
            settings.save(path)?;
        }
        self.store.clear();
        Ok(self.store.banned())
    }

    /// Attribute `token` to the module found on `stack`, see
    /// [`ActiveOwners::remember_from_call_stack`]
    pub fn remember_owner(
        &self,
        token: &str,
        stack: &[CallFrame],
        hook: &MethodDescriptor,
    ) -> Option<ModuleId> {
        self.owners.remember_from_call_stack(token, stack, hook)
    }

    /// The exception store; its `handle` is what instrumented catch sites call
    #[must_use]
    pub fn store(&self) -> &ExceptionStore {
        &self.store
    }

    /// The patch registry
    #[must_use]
    pub fn registry(&self) -> &Arc<PatchRegistry> {
        &self.registry
    }

    /// Patch owner ids per module
    #[must_use]
    pub fn owners(&self) -> &Arc<ActiveOwners> {
        &self.owners
    }

    /// The instrumentation engine
    #[must_use]
    pub fn engine(&self) -> &InstrumentationEngine {
        &self.engine
    }

    /// A copy of the current settings
    #[must_use]
    pub fn settings(&self) -> Settings {
        *read_lock!(self.settings)
    }

    /// Change the settings; takes effect for records analyzed afterwards
    pub fn update_settings(&self, update: impl FnOnce(&mut Settings)) {
        update(&mut write_lock!(self.settings));
    }
}

/// Builder for [`Session`].
pub struct SessionBuilder {
    targets: InstrumentationTargets,
    host: Option<Arc<dyn HostAdapter>>,
    observer: Option<Arc<dyn ExceptionObserver>>,
    registry: Option<Arc<PatchRegistry>>,
    own_module: Option<ModuleId>,
    settings: Option<Settings>,
    settings_path: Option<PathBuf>,
    banned: Vec<u64>,
}

impl SessionBuilder {
    /// Host naming and module classification
    #[must_use]
    pub fn host(mut self, host: Arc<dyn HostAdapter>) -> Self {
        self.host = Some(host);
        self
    }

    /// Receiver of store notifications
    #[must_use]
    pub fn observer(mut self, observer: Arc<dyn ExceptionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Share an existing registry, e.g. one the host's patching layer already fills
    #[must_use]
    pub fn registry(mut self, registry: Arc<PatchRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// The interceptor's own module
    #[must_use]
    pub fn own_module(mut self, module: ModuleId) -> Self {
        self.own_module = Some(module);
        self
    }

    /// Use fixed settings
    #[must_use]
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Load settings from `path` (with fallbacks) and save them there on teardown
    #[must_use]
    pub fn settings_file(mut self, path: &Path) -> Self {
        self.settings = Some(Settings::load(path));
        self.settings_path = Some(path.to_path_buf());
        self
    }

    /// Fingerprints banned in an earlier session
    #[must_use]
    pub fn banned(mut self, fingerprints: impl IntoIterator<Item = u64>) -> Self {
        self.banned.extend(fingerprints);
        self
    }

    /// Finish the session
    #[must_use]
    pub fn build(self) -> Session {
        let registry = self.registry.unwrap_or_default();
        let owners = Arc::new(ActiveOwners::new());
        let settings = self.settings.unwrap_or_default().into_handle();

        let mut store = ExceptionStore::builder()
            .registry(Arc::clone(&registry))
            .owners(Arc::clone(&owners))
            .settings(Arc::clone(&settings))
            .with_banned(self.banned);
        if let Some(host) = self.host {
            store = store.host(host);
        }
        if let Some(observer) = self.observer {
            store = store.observer(observer);
        }
        if let Some(module) = self.own_module {
            store = store.own_module(module);
        }

        Session {
            engine: InstrumentationEngine::new(self.targets, Arc::clone(&registry)),
            store: store.build(),
            registry,
            owners,
            settings,
            settings_path: self.settings_path,
        }
    }
}
