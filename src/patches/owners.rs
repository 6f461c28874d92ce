//! Mapping from code module to the patch owner id it registered.
//!
//! A module can only be identified from the call stack at the moment it asks for patch
//! capability (the constructor of the host's patching facility receives nothing but the owner
//! id string). The host hooks that constructor and forwards the stack it observed here.

use dashmap::DashMap;

use crate::{
    metadata::method::{MethodDescriptor, ModuleId},
    trace::CallFrame,
};

/// Which code module most recently registered which patch owner id.
#[derive(Default)]
pub struct ActiveOwners {
    by_module: DashMap<ModuleId, String>,
}

impl ActiveOwners {
    /// Create an empty owner map
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `module` registered `token`
    pub fn remember(&self, module: ModuleId, token: impl Into<String>) {
        self.by_module.insert(module, token.into());
    }

    /// Record the module that requested patch capability under `token`.
    ///
    /// `stack` is the call stack captured inside `hook` (newest frame first), where `hook` is the
    /// method that runs right after the patch-capability constructor. The walk finds `hook`,
    /// skips the constructor frame that follows it, and attributes `token` to the module of the
    /// next frame. Tokens that are already known are ignored.
    ///
    /// ## Returns
    /// The module that was recorded, if any
    pub fn remember_from_call_stack(
        &self,
        token: &str,
        stack: &[CallFrame],
        hook: &MethodDescriptor,
    ) -> Option<ModuleId> {
        if self.by_module.iter().any(|entry| entry.value() == token) {
            return None;
        }

        let mut index = 0;
        while index < stack.len() {
            let is_hook = stack[index].method.as_ref() == Some(hook);
            index += 1;
            if is_hook {
                break;
            }
        }
        index += 1;

        let module = stack.get(index)?.method.as_ref()?.module.clone();
        self.by_module.insert(module.clone(), token.to_string());
        Some(module)
    }

    /// The patch owner id registered by `module`
    #[must_use]
    pub fn token_for(&self, module: &ModuleId) -> Option<String> {
        self.by_module.get(module).map(|token| token.value().clone())
    }

    /// The module that registered `token`
    #[must_use]
    pub fn module_for(&self, token: &str) -> Option<ModuleId> {
        self.by_module
            .iter()
            .find(|entry| entry.value() == token)
            .map(|entry| entry.key().clone())
    }

    /// Number of known modules
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_module.len()
    }

    /// Returns `true` if no module registered an owner id yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_module.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::method::TypeName;

    fn method(module: &str, type_name: &str, name: &str) -> MethodDescriptor {
        MethodDescriptor::new(TypeName::new("", type_name), name).in_module(ModuleId::named(module))
    }

    #[test]
    fn attributes_frame_after_constructor() {
        let hook = method("patchscope", "RememberOwners", "Postfix");
        let stack = vec![
            CallFrame::managed(hook.clone(), 0),
            CallFrame::managed(method("Patching", "Patcher", ".ctor"), 0),
            CallFrame::managed(method("CoolMod", "CoolMod", ".cctor"), 0),
            CallFrame::managed(method("Host", "Loader", "Load"), 0),
        ];

        let owners = ActiveOwners::new();
        let recorded = owners.remember_from_call_stack("cool.mod", &stack, &hook);

        assert_eq!(recorded, Some(ModuleId::named("CoolMod")));
        assert_eq!(
            owners.token_for(&ModuleId::named("CoolMod")).as_deref(),
            Some("cool.mod")
        );
        assert_eq!(owners.module_for("cool.mod"), Some(ModuleId::named("CoolMod")));
    }

    #[test]
    fn known_token_is_ignored() {
        let hook = method("patchscope", "RememberOwners", "Postfix");
        let owners = ActiveOwners::new();
        owners.remember(ModuleId::named("First"), "shared.id");

        let stack = vec![
            CallFrame::managed(hook.clone(), 0),
            CallFrame::managed(method("Patching", "Patcher", ".ctor"), 0),
            CallFrame::managed(method("Second", "Second", ".cctor"), 0),
        ];
        assert_eq!(owners.remember_from_call_stack("shared.id", &stack, &hook), None);
        assert_eq!(owners.len(), 1);
    }

    #[test]
    fn short_stack_records_nothing() {
        let hook = method("patchscope", "RememberOwners", "Postfix");
        let owners = ActiveOwners::new();
        let stack = vec![
            CallFrame::managed(hook.clone(), 0),
            CallFrame::managed(method("Patching", "Patcher", ".ctor"), 0),
        ];
        assert_eq!(owners.remember_from_call_stack("id", &stack, &hook), None);
        assert!(owners.is_empty());
    }
}
