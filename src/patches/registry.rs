//! The live registry of installed modifications.
//!
//! # Thread Safety
//!
//! Targets are stored in a [`DashMap`] so hosts can install hooks from loader threads while the
//! formatter queries from whichever thread caught an exception. Installation order is tracked
//! with an explicit atomic sequence counter rather than relying on container iteration order.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::{
    metadata::method::MethodDescriptor,
    patches::{Modification, ModificationKind, PatchSet},
};

/// Registry of every active modification, keyed by target method.
///
/// Besides the modifications themselves the registry remembers which generated replacement
/// method stands in for which original, so that a frame executing a trampoline can be resolved
/// back to the method the user knows.
#[derive(Default)]
pub struct PatchRegistry {
    /// Target method -> modifications in installation order
    targets: DashMap<MethodDescriptor, Vec<Modification>>,
    /// Generated replacement -> original target
    replacements: DashMap<MethodDescriptor, MethodDescriptor>,
    /// Next installation sequence number
    sequence: AtomicU64,
}

impl PatchRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new modification on `target`.
    ///
    /// ## Arguments
    /// * `target`   - The method being modified
    /// * `kind`     - Which kind of hook is installed
    /// * `owner`    - Patch owner id of the installing party
    /// * `method`   - The hook method
    /// * `priority` - Higher values run first
    ///
    /// ## Returns
    /// The stored modification, including its assigned sequence number
    pub fn install(
        &self,
        target: &MethodDescriptor,
        kind: ModificationKind,
        owner: &str,
        method: MethodDescriptor,
        priority: i32,
    ) -> Modification {
        let modification = Modification {
            kind,
            owner: owner.to_string(),
            method,
            priority,
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
        };

        self.targets
            .entry(target.clone())
            .or_default()
            .push(modification.clone());
        modification
    }

    /// Remove every modification installed by `owner`, on every target.
    ///
    /// Targets left without modifications are dropped together with their replacement mapping.
    ///
    /// ## Returns
    /// Number of modifications removed
    pub fn uninstall_owner(&self, owner: &str) -> usize {
        let mut removed = 0;
        self.targets.retain(|_, modifications| {
            let before = modifications.len();
            modifications.retain(|m| m.owner != owner);
            removed += before - modifications.len();
            !modifications.is_empty()
        });
        self.replacements
            .retain(|_, original| self.targets.contains_key(original));
        removed
    }

    /// Query the sorted modifications of `method`.
    ///
    /// A method without modifications yields an empty [`PatchSet`]; this is not an error.
    #[must_use]
    pub fn patch_set_for(&self, method: &MethodDescriptor) -> PatchSet {
        match self.targets.get(method) {
            Some(modifications) => PatchSet::from_modifications(modifications.iter().cloned()),
            None => PatchSet::default(),
        }
    }

    /// Remember that `replacement` is the generated stand-in executing for `original`
    pub fn register_replacement(&self, replacement: MethodDescriptor, original: MethodDescriptor) {
        self.replacements.insert(replacement, original);
    }

    /// The original method a generated replacement stands in for
    #[must_use]
    pub fn original_of(&self, replacement: &MethodDescriptor) -> Option<MethodDescriptor> {
        self.replacements
            .get(replacement)
            .map(|original| original.value().clone())
    }

    /// All methods that currently carry at least one modification
    #[must_use]
    pub fn patched_methods(&self) -> Vec<MethodDescriptor> {
        self.targets.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Returns `true` if `owner` has at least one active modification
    #[must_use]
    pub fn has_owner(&self, owner: &str) -> bool {
        self.targets
            .iter()
            .any(|entry| entry.value().iter().any(|m| m.owner == owner))
    }
}
