//! Exception capture, fingerprinting, attribution and deduplication.
//!
//! # Key Types
//! - [`CaughtException`] - The core's model of one thrown exception and its inner chain
//! - [`ExceptionRecord`] - Lazily analyzed wrapper: formatted trace, fingerprint, report
//! - [`ExceptionReport`], [`OwnerGroup`] - Which third-party modules touched the failing path
//! - [`ExceptionStore`] - Deduplicating, ban-aware store; the target of instrumented catch sites
//! - [`ExceptionObserver`] - Notification collaborator informed about new and dismissed entries
//! - [`AnalysisContext`] - Shared collaborators a record needs to analyze itself
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use patchscope::exceptions::{CaughtException, ExceptionStore, NullObserver};
//!
//! let store = ExceptionStore::builder().observer(Arc::new(NullObserver)).build();
//! let error = Arc::new(CaughtException::new("System.NullReferenceException"));
//!
//! let returned = store.handle(Arc::clone(&error));
//! assert!(Arc::ptr_eq(&returned, &error));
//! assert_eq!(store.entries()[0].count, 1);
//! ```

mod record;
mod report;
mod store;

pub use record::ExceptionRecord;
pub use report::{ExceptionReport, OwnerGroup};
pub use store::{ExceptionStore, ExceptionStoreBuilder, StoreEntry};

use std::sync::Arc;

use crate::{
    inspector::{FrameInspector, HostAdapter},
    metadata::method::ModuleId,
    patches::ActiveOwners,
    settings::SettingsHandle,
    trace::StackSnapshot,
};

/// One thrown exception, as handed over by an instrumented catch site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaughtException {
    /// Qualified name of the exception type
    pub type_name: String,
    /// Message text; `None` when the runtime had none
    pub message: Option<String>,
    /// The wrapped exception, if any
    pub inner: Option<Arc<CaughtException>>,
    /// Where it was thrown
    pub trace: StackSnapshot,
}

impl CaughtException {
    /// An exception of `type_name` without message, inner exception or frames
    #[must_use]
    pub fn new(type_name: impl Into<String>) -> Self {
        CaughtException {
            type_name: type_name.into(),
            message: None,
            inner: None,
            trace: StackSnapshot::default(),
        }
    }

    /// Set the message
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Set the wrapped exception
    #[must_use]
    pub fn with_inner(mut self, inner: CaughtException) -> Self {
        self.inner = Some(Arc::new(inner));
        self
    }

    /// Set the captured stack
    #[must_use]
    pub fn with_trace(mut self, trace: StackSnapshot) -> Self {
        self.trace = trace;
        self
    }

    /// The message, or `""` when absent
    #[must_use]
    pub fn message_text(&self) -> &str {
        self.message.as_deref().unwrap_or_default()
    }
}

/// Notification collaborator of the [`ExceptionStore`].
pub trait ExceptionObserver: Send + Sync {
    /// A fingerprint went from zero to one occurrence. Called exactly once per transition.
    fn on_new_exception(&self, record: &ExceptionRecord);

    /// An entry was dismissed while the dismissal sound is enabled
    fn on_dismissed(&self, _record: &ExceptionRecord) {}
}

/// Observer that ignores every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl ExceptionObserver for NullObserver {
    fn on_new_exception(&self, _record: &ExceptionRecord) {}
}

/// Collaborators an [`ExceptionRecord`] needs to render and attribute itself.
pub struct AnalysisContext {
    /// Resolves frames to original methods and patches
    pub inspector: FrameInspector,
    /// Host naming and module classification
    pub host: Arc<dyn HostAdapter>,
    /// Patch owner ids per module
    pub owners: Arc<ActiveOwners>,
    /// The interceptor's own module, never reported as an owner
    pub own_module: ModuleId,
    /// Read-only view of the user settings
    pub settings: SettingsHandle,
}

impl AnalysisContext {
    /// Whether cleanup hooks take part in rendering and attribution
    #[must_use]
    pub fn include_cleanup_hooks(&self) -> bool {
        read_lock!(self.settings).include_cleanup_hooks
    }
}
