//! Factories shared by unit tests.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use uguid::Guid;

use crate::{
    exceptions::{ExceptionObserver, ExceptionRecord},
    inspector::HostModules,
    metadata::method::{MethodDescriptor, ModuleId, TypeName},
    patches::{ModificationKind, PatchRegistry},
};

/// Module id with a version derived from the name
pub(crate) fn module(name: &str) -> ModuleId {
    let mut bytes = [0u8; 16];
    for (i, byte) in name.bytes().enumerate() {
        bytes[i % 16] ^= byte;
    }
    ModuleId::new(name, Guid::from_bytes(bytes))
}

/// Method `namespace.type_name.name ()` living in `module_name`
pub(crate) fn method_in(
    module_name: &str,
    namespace: &str,
    type_name: &str,
    name: &str,
) -> MethodDescriptor {
    MethodDescriptor::new(TypeName::new(namespace, type_name), name).in_module(module(module_name))
}

/// Host adapter treating `Host` as the only host module
pub(crate) fn host() -> HostModules {
    HostModules::new(["Host"])
}

/// Registry where `Verse.Pawn.Tick` runs through a replacement and carries one hook of each
/// kind. Returns the replacement descriptor.
pub(crate) fn registry_with_replacement() -> (Arc<PatchRegistry>, MethodDescriptor) {
    let registry = Arc::new(PatchRegistry::new());
    let original = method_in("Host", "Verse", "Pawn", "Tick");
    let replacement = method_in("Generated", "", "DMD<Verse.Pawn:Tick>", "Tick");
    registry.register_replacement(replacement.clone(), original.clone());

    for (kind, name) in [
        (ModificationKind::Cleanup, "Finalizer"),
        (ModificationKind::Post, "Postfix"),
        (ModificationKind::Pre, "Prefix"),
        (ModificationKind::ReturnFilter, "Transpiler"),
    ] {
        registry.install(
            &original,
            kind,
            "cool.mod",
            method_in("CoolMod", "CoolMod", "Patches", name).static_method(),
            0,
        );
    }
    (registry, replacement)
}

/// Observer counting notifications
#[derive(Default)]
pub(crate) struct CountingObserver {
    pub(crate) new_exceptions: AtomicUsize,
    pub(crate) dismissed: AtomicUsize,
    pub(crate) fingerprints: Mutex<Vec<u64>>,
}

impl CountingObserver {
    pub(crate) fn new_count(&self) -> usize {
        self.new_exceptions.load(Ordering::SeqCst)
    }

    pub(crate) fn dismissed_count(&self) -> usize {
        self.dismissed.load(Ordering::SeqCst)
    }
}

impl ExceptionObserver for CountingObserver {
    fn on_new_exception(&self, record: &ExceptionRecord) {
        self.new_exceptions.fetch_add(1, Ordering::SeqCst);
        self.fingerprints
            .lock()
            .unwrap()
            .push(record.fingerprint());
    }

    fn on_dismissed(&self, _record: &ExceptionRecord) {
        self.dismissed.fetch_add(1, Ordering::SeqCst);
    }
}
