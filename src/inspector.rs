//! Frame inspection: from a raw call frame to the original method and its patches.
//!
//! The runtime reports the method a frame is *executing*. When a method has been patched, that
//! is a generated replacement, not the method users and patch authors know. The
//! [`FrameInspector`] undoes that redirection through the [`PatchRegistry`] and returns the
//! original together with its [`PatchSet`].
//!
//! Host specifics the core cannot know (how the runtime names methods in traces, which modules
//! belong to the host itself, the ahead-of-time build id) come in through [`HostAdapter`].

use std::{collections::HashSet, sync::Arc};

use crate::{
    metadata::method::{MethodDescriptor, ModuleId},
    patches::{PatchRegistry, PatchSet},
    trace::CallFrame,
};

/// Capabilities the host integration layer provides to the core.
pub trait HostAdapter: Send + Sync {
    /// The qualified name the runtime prints for `method` in a stack trace.
    fn stack_trace_name(&self, method: &MethodDescriptor) -> String {
        method.stack_trace_name()
    }

    /// Ahead-of-time build identifier of the running image, if any
    fn aot_id(&self) -> Option<String> {
        None
    }

    /// Returns `true` if `module` is part of the host itself rather than a third-party module.
    ///
    /// Host modules are never attributed as owners in exception reports.
    fn is_host_module(&self, module: &ModuleId) -> bool;
}

/// A [`HostAdapter`] backed by a fixed list of host module names.
#[derive(Debug, Clone, Default)]
pub struct HostModules {
    modules: HashSet<String>,
    aot_id: Option<String>,
}

impl HostModules {
    /// Create an adapter treating the given module names as host modules
    #[must_use]
    pub fn new<I, S>(modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        HostModules {
            modules: modules.into_iter().map(Into::into).collect(),
            aot_id: None,
        }
    }

    /// Report an ahead-of-time build id
    #[must_use]
    pub fn with_aot_id(mut self, aot_id: impl Into<String>) -> Self {
        self.aot_id = Some(aot_id.into());
        self
    }
}

impl HostAdapter for HostModules {
    fn aot_id(&self) -> Option<String> {
        self.aot_id.clone()
    }

    fn is_host_module(&self, module: &ModuleId) -> bool {
        self.modules.contains(&module.name)
    }
}

/// Resolves frames to original methods and their patches.
///
/// Pure query over the registry; safe to call repeatedly and from any thread.
#[derive(Clone)]
pub struct FrameInspector {
    registry: Arc<PatchRegistry>,
}

impl FrameInspector {
    /// Create an inspector over `registry`
    #[must_use]
    pub fn new(registry: Arc<PatchRegistry>) -> Self {
        FrameInspector { registry }
    }

    /// The registry this inspector reads from
    #[must_use]
    pub fn registry(&self) -> &Arc<PatchRegistry> {
        &self.registry
    }

    /// Resolve the method `frame` is really executing.
    ///
    /// A generated replacement resolves to its original. The returned [`PatchSet`] belongs to
    /// the resolved method and is empty when nothing is installed. Opaque frames yield
    /// `(None, empty)`; callers then render raw offsets.
    #[must_use]
    pub fn resolve(&self, frame: &CallFrame) -> (Option<MethodDescriptor>, PatchSet) {
        let Some(declared) = frame.method.as_ref() else {
            return (None, PatchSet::default());
        };

        let method = self
            .registry
            .original_of(declared)
            .unwrap_or_else(|| declared.clone());
        let patches = self.registry.patch_set_for(&method);
        (Some(method), patches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{metadata::method::TypeName, patches::ModificationKind};

    #[test]
    fn resolves_replacement_to_original() {
        let registry = Arc::new(PatchRegistry::new());
        let original = MethodDescriptor::new(TypeName::new("Verse", "Pawn"), "Tick");
        let replacement = MethodDescriptor::new(TypeName::new("", "DMD<Verse.Pawn:Tick>"), "Tick");
        let hook = MethodDescriptor::new(TypeName::new("Mod", "P"), "Prefix").static_method();
        registry.register_replacement(replacement.clone(), original.clone());
        registry.install(&original, ModificationKind::Pre, "mod", hook, 0);

        let inspector = FrameInspector::new(registry);
        let (method, patches) = inspector.resolve(&CallFrame::managed(replacement, 4));

        assert_eq!(method, Some(original));
        assert_eq!(patches.pre_hooks.len(), 1);
    }

    #[test]
    fn unpatched_method_has_empty_set() {
        let inspector = FrameInspector::new(Arc::new(PatchRegistry::new()));
        let method = MethodDescriptor::new(TypeName::new("Verse", "Pawn"), "Tick");
        let (resolved, patches) = inspector.resolve(&CallFrame::managed(method.clone(), 0));

        assert_eq!(resolved, Some(method));
        assert!(patches.is_empty());
    }

    #[test]
    fn opaque_frame_resolves_to_nothing() {
        let inspector = FrameInspector::new(Arc::new(PatchRegistry::new()));
        let (method, patches) = inspector.resolve(&CallFrame::opaque(0x1000, 0x20));
        assert!(method.is_none());
        assert!(patches.is_empty());
    }

    #[test]
    fn host_modules_adapter() {
        let host = HostModules::new(["Assembly-CSharp"]);
        assert!(host.is_host_module(&ModuleId::named("Assembly-CSharp")));
        assert!(!host.is_host_module(&ModuleId::named("CoolMod")));
        assert_eq!(host.aot_id(), None);
    }
}
