// Copyright 2025 The patchscope developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # patchscope
//!
//! Runtime exception interception and patch attribution for dynamically patched managed code.
//!
//! Large plugin-driven applications let third-party modules rewrite host methods at runtime:
//! hooks run before or after a method, filter its instruction stream, or clean up after it.
//! When something throws deep inside such a method, the stock stack trace names the host method
//! and nothing else. `patchscope` resolves every frame back to the method the user knows, lists
//! the modifications active on it and who installed them, deduplicates identical failures by a
//! stable fingerprint, and groups the involved modules into a report.
//!
//! ## Features
//!
//! - **Frame resolution** - generated trampolines map back to their original method
//! - **Attributed traces** - every frame lists its hooks, ordered by kind and priority
//! - **Stable fingerprints** - identical failures collapse into one entry with a count
//! - **Owner reports** - contiguous runs of third-party modules along the failing path
//! - **Startup instrumentation** - silent catch-all handlers report before swallowing
//! - **Guarded activation** - null-type activations name the definition responsible
//!
//! ## Architecture
//!
//! - [`metadata::method`] - method identities and abstract method bodies
//! - [`patches`] - the registry of installed modifications and owner ids
//! - [`inspector`] - frame resolution and the host adapter seam
//! - [`trace`] - the trace grammar and fingerprinting
//! - [`exceptions`] - records, reports and the deduplicating store
//! - [`instrumentation`] - the startup rewrite of host methods
//! - [`settings`] - persisted user choices
//! - [`session`] - process-wide wiring with startup and teardown
//!
//! The host runtime is only ever reached through traits ([`inspector::HostAdapter`],
//! [`instrumentation::MethodSource`], [`exceptions::ExceptionObserver`],
//! [`instrumentation::ActivationContext`]), so everything here runs without a live host.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use patchscope::prelude::*;
//!
//! let registry = Arc::new(PatchRegistry::new());
//! let tick = MethodDescriptor::new(TypeName::new("Verse", "Pawn"), "Tick")
//!     .in_module(ModuleId::named("Assembly-CSharp"));
//! let prefix = MethodDescriptor::new(TypeName::new("CoolMod", "Patches"), "Prefix")
//!     .in_module(ModuleId::named("CoolMod"))
//!     .static_method();
//! registry.install(&tick, ModificationKind::Pre, "cool.mod", prefix, 0);
//!
//! let store = ExceptionStore::builder()
//!     .registry(Arc::clone(&registry))
//!     .host(Arc::new(HostModules::new(["Assembly-CSharp"])))
//!     .build();
//!
//! let error = CaughtException::new("System.NullReferenceException")
//!     .with_trace(StackSnapshot::new(vec![CallFrame::managed(tick, 0x12).at("Pawn.cs", 40)]));
//! store.handle(Arc::new(error));
//!
//! let entry = &store.entries()[0];
//! assert!(entry.record.formatted_trace().contains("- prefix cool.mod: Void CoolMod.Patches:Prefix()"));
//! assert_eq!(entry.record.report().owner_groups[0].owner.name, "CoolMod");
//! ```
//!
//! ## Logging
//!
//! Diagnostics go through the [`log`] facade: skipped instrumentation candidates and settings
//! fallbacks are reported at `warn`, scan summaries at `info`. No logger is installed.
#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use patchscope::prelude::*;
///
/// let registry = PatchRegistry::new();
/// assert!(registry.patched_methods().is_empty());
/// ```
pub mod prelude;

/// Method identities, abstract method bodies and exception regions
pub mod metadata;

/// The registry of installed modifications and the owner ids of code modules
pub mod patches;

/// Resolution of call frames to original methods and their patches
pub mod inspector;

/// Stack snapshots, the trace grammar and fingerprints
pub mod trace;

/// Exception records, owner reports and the deduplicating store
pub mod exceptions;

/// Startup instrumentation of host methods
pub mod instrumentation;

/// Persisted user settings
pub mod settings;

/// Process-wide wiring of all components
pub mod session;

/// `patchscope` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
/// This is used consistently throughout the crate for all fallible operations.
///
/// # Examples
///
/// ```rust,no_run
/// use patchscope::{settings::Settings, Result};
///
/// fn enabled(path: &str) -> Result<bool> {
///     Ok(Settings::read_from(std::path::Path::new(path))?.enabled)
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// `patchscope` Error type
///
/// The main error type for all fallible operations in this crate.
pub use error::Error;
