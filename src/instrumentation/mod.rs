//! Startup instrumentation of host methods.
//!
//! The engine walks a fixed universe of candidate methods once, picks those in the host's core
//! namespaces that contain a catch-all handler or a dangerous activation call, rewrites their
//! instruction streams (see [`RewriteRules`]) and hands the results back to the host for
//! installation.
//!
//! # Key Types
//! - [`InstrumentationEngine`] - Runs the scan exactly once
//! - [`InstrumentationTargets`] - Which methods to consider and what to insert
//! - [`MethodSource`] - Host access to candidates, bodies and installation
//! - [`InstructionEditor`] - Label- and region-preserving edits of a [`MethodBody`]
//! - [`GuardedActivator`] - Target of redirected activation calls
//!
//! # Failure Isolation
//!
//! A candidate whose body cannot be read, is malformed, or is rejected on installation is logged
//! and skipped. The scan itself never fails.

mod activator;
mod editor;
mod rewrite;

pub use activator::{possible_context, ActivationContext, GuardedActivator};
pub use editor::InstructionEditor;
pub use rewrite::{ActivatorRedirect, HandlerStart, RewriteCounts, RewriteRules};

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc,
    },
};

use rayon::prelude::*;

use crate::{
    metadata::method::{MethodBody, MethodDescriptor, TypeName},
    patches::{ModificationKind, PatchRegistry},
    Result,
};

/// Host access needed by the engine.
pub trait MethodSource: Send + Sync {
    /// Every method the engine may consider
    fn candidates(&self) -> Vec<MethodDescriptor>;

    /// The current instruction stream of `method`
    ///
    /// # Errors
    /// Any error skips the method.
    fn body(&self, method: &MethodDescriptor) -> Result<MethodBody>;

    /// Replace the instruction stream of `method`
    ///
    /// # Errors
    /// Any error skips the method.
    fn install(&self, method: &MethodDescriptor, body: MethodBody) -> Result<()>;

    /// Returns `true` if `type_name` is a configuration definition type, i.e. a useful context
    /// object for the guarded activator
    fn is_definition_type(&self, _type_name: &TypeName) -> bool {
        false
    }
}

/// Lifecycle of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InstrumentationState {
    /// Nothing has been rewritten
    Uninstrumented = 0,
    /// A scan is running
    Scanning = 1,
    /// The scan has finished
    Patched = 2,
}

impl InstrumentationState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => InstrumentationState::Uninstrumented,
            1 => InstrumentationState::Scanning,
            _ => InstrumentationState::Patched,
        }
    }
}

/// Which methods get instrumented, and with what.
#[derive(Debug, Clone)]
pub struct InstrumentationTargets {
    /// Declaring type full names must start with one of these
    pub namespace_prefixes: Vec<String>,
    /// Methods never instrumented
    pub ignored: HashSet<MethodDescriptor>,
    /// The catch-all exception type
    pub catch_type: TypeName,
    /// The store entry point inserted into catch handlers
    pub handle_entry: MethodDescriptor,
    /// The method recorded as return filter on every instrumented method
    pub rewriter: MethodDescriptor,
    /// Activation calls to guard
    pub redirects: Vec<ActivatorRedirect>,
    /// Patch owner id the engine installs under
    pub owner_id: String,
}

impl InstrumentationTargets {
    /// Targets for the given entry points with no namespace selected yet
    #[must_use]
    pub fn new(
        owner_id: impl Into<String>,
        handle_entry: MethodDescriptor,
        rewriter: MethodDescriptor,
    ) -> Self {
        InstrumentationTargets {
            namespace_prefixes: Vec::new(),
            ignored: HashSet::new(),
            catch_type: TypeName::new("System", "Exception"),
            handle_entry,
            rewriter,
            redirects: Vec::new(),
            owner_id: owner_id.into(),
        }
    }

    /// Consider types whose full name starts with `prefix`, e.g. `"Verse."`
    #[must_use]
    pub fn namespace(mut self, prefix: impl Into<String>) -> Self {
        self.namespace_prefixes.push(prefix.into());
        self
    }

    /// Never instrument `method`
    #[must_use]
    pub fn ignore(mut self, method: MethodDescriptor) -> Self {
        self.ignored.insert(method);
        self
    }

    /// Use a different catch-all type
    #[must_use]
    pub fn catch_type(mut self, catch_type: TypeName) -> Self {
        self.catch_type = catch_type;
        self
    }

    /// Guard calls to `original` by redirecting them to `guarded`
    #[must_use]
    pub fn redirect(mut self, original: MethodDescriptor, guarded: MethodDescriptor) -> Self {
        self.redirects.push(ActivatorRedirect { original, guarded });
        self
    }

    /// Returns `true` if `method` passes the namespace, generic and ignore filters
    #[must_use]
    pub fn selects(&self, method: &MethodDescriptor) -> bool {
        if method.is_generic() || self.ignored.contains(method) {
            return false;
        }
        let type_name = method.declaring_type.full_name();
        self.namespace_prefixes
            .iter()
            .any(|prefix| type_name.starts_with(prefix.as_str()))
    }

    fn rules(&self) -> RewriteRules<'_> {
        RewriteRules {
            catch_type: &self.catch_type,
            handle_entry: &self.handle_entry,
            redirects: &self.redirects,
        }
    }
}

/// What one scan did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Methods passing the target filters
    pub candidates: usize,
    /// Methods rewritten and installed
    pub instrumented: usize,
    /// Methods skipped because of an error
    pub skipped: usize,
    /// Catch handlers instrumented in total
    pub catch_sites: usize,
    /// Activation calls guarded in total
    pub activator_sites: usize,
}

/// Runs the instrumentation scan, once per process.
pub struct InstrumentationEngine {
    state: AtomicU8,
    targets: InstrumentationTargets,
    registry: Arc<PatchRegistry>,
}

impl InstrumentationEngine {
    /// Create an engine recording its modifications in `registry`
    #[must_use]
    pub fn new(targets: InstrumentationTargets, registry: Arc<PatchRegistry>) -> Self {
        InstrumentationEngine {
            state: AtomicU8::new(InstrumentationState::Uninstrumented as u8),
            targets,
            registry,
        }
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> InstrumentationState {
        InstrumentationState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// The configured targets
    #[must_use]
    pub fn targets(&self) -> &InstrumentationTargets {
        &self.targets
    }

    /// Scan `source` and instrument every selected method.
    ///
    /// Bodies are read and rewritten in parallel; installation happens sequentially on the
    /// calling thread. Every installed method is recorded in the registry as a return filter at
    /// the highest priority, owned by the engine's owner id.
    ///
    /// ## Returns
    /// The scan summary, or `None` if a scan already started
    pub fn apply(&self, source: &dyn MethodSource) -> Option<ScanSummary> {
        if self
            .state
            .compare_exchange(
                InstrumentationState::Uninstrumented as u8,
                InstrumentationState::Scanning as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            log::debug!("instrumentation already applied, skipping");
            return None;
        }

        let candidates: Vec<MethodDescriptor> = source
            .candidates()
            .into_iter()
            .filter(|method| self.targets.selects(method))
            .collect();

        let rules = self.targets.rules();
        let rewritten: Vec<(MethodDescriptor, Result<Option<(MethodBody, RewriteCounts)>>)> =
            candidates
                .par_iter()
                .map(|method| (method.clone(), Self::rewrite_one(&rules, method, source)))
                .collect();

        let mut summary = ScanSummary {
            candidates: candidates.len(),
            ..ScanSummary::default()
        };
        for (method, outcome) in rewritten {
            let (body, counts) = match outcome {
                Ok(Some(rewritten)) => rewritten,
                Ok(None) => continue,
                Err(error) => {
                    log::warn!("skipping {}: {}", method.qualified_name(), error);
                    summary.skipped += 1;
                    continue;
                }
            };

            if let Err(error) = source.install(&method, body) {
                log::warn!("skipping {}: {}", method.qualified_name(), error);
                summary.skipped += 1;
                continue;
            }

            self.registry.install(
                &method,
                ModificationKind::ReturnFilter,
                &self.targets.owner_id,
                self.targets.rewriter.clone(),
                i32::MAX,
            );
            summary.instrumented += 1;
            summary.catch_sites += counts.catch_sites;
            summary.activator_sites += counts.activator_sites;
        }

        self.state
            .store(InstrumentationState::Patched as u8, Ordering::Release);
        log::info!(
            "instrumented {} of {} candidate methods ({} catch handlers, {} activator calls, {} skipped)",
            summary.instrumented,
            summary.candidates,
            summary.catch_sites,
            summary.activator_sites,
            summary.skipped
        );
        Some(summary)
    }

    fn rewrite_one(
        rules: &RewriteRules<'_>,
        method: &MethodDescriptor,
        source: &dyn MethodSource,
    ) -> Result<Option<(MethodBody, RewriteCounts)>> {
        let body = source.body(method)?;
        if !rules.applies_to(&body) {
            return Ok(None);
        }
        rules.rewrite(method, body, source)
    }
}
