//! Patch registry: which modifications are active on which method, and who installed them.
//!
//! # Key Types
//! - [`ModificationKind`] - pre-call hook, post-call hook, return filter, cleanup hook
//! - [`Modification`] - One installed change to one target method
//! - [`PatchSet`] - All modifications of one target, partitioned by kind and sorted
//! - [`PatchRegistry`] - Live, concurrent map of target method to modifications
//! - [`ActiveOwners`] - Which code module registered which patch owner id
//!
//! # Ordering
//!
//! Within a kind, modifications are ordered by descending priority, ties broken by installation
//! sequence (first installed first). That order is both the execution order in the host and the
//! display order in formatted traces, so it feeds directly into exception fingerprints.
//!
//! # Examples
//!
//! ```rust
//! use patchscope::metadata::method::{MethodDescriptor, TypeName};
//! use patchscope::patches::{ModificationKind, PatchRegistry};
//!
//! let registry = PatchRegistry::new();
//! let target = MethodDescriptor::new(TypeName::new("Verse", "Pawn"), "Tick");
//! let hook = MethodDescriptor::new(TypeName::new("MyMod", "Patches"), "Prefix").static_method();
//!
//! registry.install(&target, ModificationKind::Pre, "my.mod", hook, 400);
//! let patches = registry.patch_set_for(&target);
//! assert_eq!(patches.pre_hooks.len(), 1);
//! assert!(patches.post_hooks.is_empty());
//! ```

mod owners;
mod registry;

pub use owners::ActiveOwners;
pub use registry::PatchRegistry;

use strum::{Display, EnumIter};

use crate::metadata::method::MethodDescriptor;

/// Kind of an installed modification.
///
/// The `Display` form is the label used in attribution lines of formatted traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum ModificationKind {
    /// Runs before the original method and may skip it
    #[strum(serialize = "prefix")]
    Pre,
    /// Runs after the original method
    #[strum(serialize = "postfix")]
    Post,
    /// Rewrites the original's instruction stream or filters its return value
    #[strum(serialize = "transpiler")]
    ReturnFilter,
    /// Runs when the original method exits, including by exception
    #[strum(serialize = "finalizer")]
    Cleanup,
}

impl ModificationKind {
    /// Order in which attribution lines are printed below a frame
    pub const TRACE_ORDER: [ModificationKind; 4] = [
        ModificationKind::ReturnFilter,
        ModificationKind::Pre,
        ModificationKind::Post,
        ModificationKind::Cleanup,
    ];

    /// Order in which a frame's modifications are walked when building an owner report
    pub const ATTRIBUTION_ORDER: [ModificationKind; 4] = [
        ModificationKind::Cleanup,
        ModificationKind::Post,
        ModificationKind::Pre,
        ModificationKind::ReturnFilter,
    ];
}

/// One active code change applied to a target method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modification {
    /// What kind of hook this is
    pub kind: ModificationKind,
    /// Patch owner id of the party that installed it
    pub owner: String,
    /// The hook method that was installed
    pub method: MethodDescriptor,
    /// Higher priorities run (and print) first
    pub priority: i32,
    /// Registry-wide installation counter, breaks priority ties
    pub sequence: u64,
}

/// All modifications of one target method, partitioned by kind.
///
/// Each list is sorted by descending priority, then ascending installation sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchSet {
    /// Hooks running before the original
    pub pre_hooks: Vec<Modification>,
    /// Hooks running after the original
    pub post_hooks: Vec<Modification>,
    /// Instruction rewriters / return filters
    pub return_filters: Vec<Modification>,
    /// Hooks running on exit, including exceptional exit
    pub cleanup_hooks: Vec<Modification>,
}

impl PatchSet {
    /// Partition and sort an unordered collection of modifications
    #[must_use]
    pub fn from_modifications(modifications: impl IntoIterator<Item = Modification>) -> Self {
        let mut set = PatchSet::default();
        for modification in modifications {
            set.list_mut(modification.kind).push(modification);
        }
        for kind in ModificationKind::TRACE_ORDER {
            set.list_mut(kind).sort_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then_with(|| a.sequence.cmp(&b.sequence))
            });
        }
        set
    }

    /// The sorted modifications of one kind
    #[must_use]
    pub fn of_kind(&self, kind: ModificationKind) -> &[Modification] {
        match kind {
            ModificationKind::Pre => &self.pre_hooks,
            ModificationKind::Post => &self.post_hooks,
            ModificationKind::ReturnFilter => &self.return_filters,
            ModificationKind::Cleanup => &self.cleanup_hooks,
        }
    }

    /// Returns `true` if no modification of any kind is present
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pre_hooks.is_empty()
            && self.post_hooks.is_empty()
            && self.return_filters.is_empty()
            && self.cleanup_hooks.is_empty()
    }

    /// Total number of modifications
    #[must_use]
    pub fn len(&self) -> usize {
        self.pre_hooks.len()
            + self.post_hooks.len()
            + self.return_filters.len()
            + self.cleanup_hooks.len()
    }

    fn list_mut(&mut self, kind: ModificationKind) -> &mut Vec<Modification> {
        match kind {
            ModificationKind::Pre => &mut self.pre_hooks,
            ModificationKind::Post => &mut self.post_hooks,
            ModificationKind::ReturnFilter => &mut self.return_filters,
            ModificationKind::Cleanup => &mut self.cleanup_hooks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::method::TypeName;
    use strum::IntoEnumIterator;

    fn hook(name: &str, kind: ModificationKind, priority: i32, sequence: u64) -> Modification {
        Modification {
            kind,
            owner: "owner".to_string(),
            method: MethodDescriptor::new(TypeName::new("Mod", "Hooks"), name),
            priority,
            sequence,
        }
    }

    #[test]
    fn sorts_by_priority_then_sequence() {
        let set = PatchSet::from_modifications(vec![
            hook("low", ModificationKind::Pre, 5, 0),
            hook("tie_second", ModificationKind::Pre, 10, 3),
            hook("tie_first", ModificationKind::Pre, 10, 1),
        ]);

        let names: Vec<&str> = set.pre_hooks.iter().map(|m| m.method.name.as_str()).collect();
        assert_eq!(names, ["tie_first", "tie_second", "low"]);
    }

    #[test]
    fn partitions_by_kind() {
        let set = PatchSet::from_modifications(
            ModificationKind::iter()
                .enumerate()
                .map(|(i, kind)| hook("h", kind, 0, i as u64)),
        );
        for kind in ModificationKind::iter() {
            assert_eq!(set.of_kind(kind).len(), 1);
            assert_eq!(set.of_kind(kind)[0].kind, kind);
        }
        assert_eq!(set.len(), 4);
    }

    #[test]
    fn labels() {
        assert_eq!(ModificationKind::Pre.to_string(), "prefix");
        assert_eq!(ModificationKind::Post.to_string(), "postfix");
        assert_eq!(ModificationKind::ReturnFilter.to_string(), "transpiler");
        assert_eq!(ModificationKind::Cleanup.to_string(), "finalizer");
    }
}
