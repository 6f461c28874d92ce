//! Value-typed identity of compiled methods and the types they mention.
//!
//! A [`MethodDescriptor`] replaces the mutable runtime reflection handle a host would normally
//! hand out. It is cheap to clone, immutable once built, and hashes on the declaring type name
//! plus signature, which makes it usable as a map key across the registry, the inspector and
//! the attribution walk.
//!
//! # Examples
//!
//! ```rust
//! use patchscope::metadata::method::{MethodDescriptor, ModuleId, TypeName};
//!
//! let tick = MethodDescriptor::new(TypeName::new("Verse", "Pawn"), "Tick")
//!     .in_module(ModuleId::named("Assembly-CSharp"));
//! assert_eq!(tick.stack_trace_name(), "Verse.Pawn.Tick ()");
//! assert_eq!(tick.short_description(), "Pawn.Tick ()");
//! ```

use std::{
    fmt,
    hash::{Hash, Hasher},
};

use bitflags::bitflags;
use uguid::Guid;

bitflags! {
    /// Modifiers of a method that influence rendering and candidate selection.
    ///
    /// Only [`MethodFlags::STATIC`] participates in method identity; the remaining flags are
    /// descriptive.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MethodFlags: u8 {
        /// Defined on type, else per instance
        const STATIC = 0x01;
        /// Method does not provide an implementation
        const ABSTRACT = 0x02;
        /// Method is virtual
        const VIRTUAL = 0x04;
        /// Method has its own generic parameters
        const GENERIC = 0x08;
        /// Method is an instance or type constructor
        const CONSTRUCTOR = 0x10;
    }
}

/// A loaded code module, the unit patches are attributed to.
///
/// Identity is the module name; the version id is carried along to synthesize anonymized
/// source file names.
#[derive(Debug, Clone, Eq)]
pub struct ModuleId {
    /// Simple name of the module, e.g. `Assembly-CSharp`
    pub name: String,
    /// Module version id, rendered without separators in anonymized file names
    pub version_id: Guid,
}

impl ModuleId {
    /// Create a module identity with an explicit version id
    #[must_use]
    pub fn new(name: impl Into<String>, version_id: Guid) -> Self {
        ModuleId {
            name: name.into(),
            version_id,
        }
    }

    /// Create a module identity with a zero version id
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(name, Guid::ZERO)
    }

    /// The version id in 32 lowercase hex digits without separators
    #[must_use]
    pub fn version_token(&self) -> String {
        self.version_id.to_string().replace('-', "")
    }
}

impl PartialEq for ModuleId {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Hash for ModuleId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Name of a type as the runtime reports it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeName {
    /// Namespace, empty for the global namespace
    pub namespace: String,
    /// Simple name including the generic arity marker (e.g. ``List`1``) and nesting (`Outer+Inner`)
    pub name: String,
    /// Generic arguments of a constructed generic type
    pub generic_arguments: Vec<TypeName>,
}

impl TypeName {
    /// Create a non-generic type name
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        TypeName {
            namespace: namespace.into(),
            name: name.into(),
            generic_arguments: Vec::new(),
        }
    }

    /// The `System.Void` pseudo type
    #[must_use]
    pub fn void() -> Self {
        Self::new("System", "Void")
    }

    /// Attach generic arguments to this type
    #[must_use]
    pub fn with_generic_arguments(mut self, arguments: Vec<TypeName>) -> Self {
        self.generic_arguments = arguments;
        self
    }

    /// Namespace-qualified name
    #[must_use]
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    /// Returns `true` for constructed generic types, open generic definitions and types nested
    /// inside either
    #[must_use]
    pub fn is_generic(&self) -> bool {
        !self.generic_arguments.is_empty() || self.has_arity_marker()
    }

    fn has_arity_marker(&self) -> bool {
        self.name
            .split('`')
            .skip(1)
            .any(|rest| rest.starts_with(|c: char| c.is_ascii_digit()))
    }

    /// Returns `true` for `System.Void`
    #[must_use]
    pub fn is_void(&self) -> bool {
        self.namespace == "System" && self.name == "Void"
    }

    /// Compact rendering: simple name followed by the short form of every generic argument.
    #[must_use]
    pub fn short_description(&self) -> String {
        let mut result = self.name.clone();
        if !self.generic_arguments.is_empty() {
            let arguments: Vec<String> = self
                .generic_arguments
                .iter()
                .map(TypeName::short_description)
                .collect();
            result.push('<');
            result.push_str(&arguments.join(", "));
            result.push('>');
        }
        result
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

/// One declared parameter of a method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParameterDescriptor {
    /// Declared type, without the by-ref marker
    pub type_name: TypeName,
    /// Declared parameter name
    pub name: String,
    /// `ref`/`out` parameter
    pub by_ref: bool,
}

impl ParameterDescriptor {
    /// The runtime's simple type name, `&`-suffixed for by-ref parameters
    #[must_use]
    pub fn type_display_name(&self) -> String {
        if self.by_ref {
            format!("{}&", self.type_name.name)
        } else {
            self.type_name.name.clone()
        }
    }
}

/// Immutable identity of one compiled method.
///
/// Two descriptors are equal iff they denote the same method: same module, declaring type,
/// name, static-ness, return type and parameter types. Parameter names and the descriptive
/// [`MethodFlags`] do not participate.
#[derive(Debug, Clone)]
pub struct MethodDescriptor {
    /// Type declaring the method
    pub declaring_type: TypeName,
    /// Method name (`.ctor` for constructors)
    pub name: String,
    /// Declared return type
    pub return_type: TypeName,
    /// Declared parameters, in order
    pub parameters: Vec<ParameterDescriptor>,
    /// Module that contains the method's code
    pub module: ModuleId,
    /// Static / virtual / generic modifiers
    pub flags: MethodFlags,
}

impl MethodDescriptor {
    /// Start describing an instance method returning `void` without parameters
    #[must_use]
    pub fn new(declaring_type: TypeName, name: impl Into<String>) -> Self {
        MethodDescriptor {
            declaring_type,
            name: name.into(),
            return_type: TypeName::void(),
            parameters: Vec::new(),
            module: ModuleId::named(""),
            flags: MethodFlags::empty(),
        }
    }

    /// Set the return type
    #[must_use]
    pub fn returns(mut self, return_type: TypeName) -> Self {
        self.return_type = return_type;
        self
    }

    /// Append a parameter
    #[must_use]
    pub fn parameter(mut self, type_name: TypeName, name: impl Into<String>) -> Self {
        self.parameters.push(ParameterDescriptor {
            type_name,
            name: name.into(),
            by_ref: false,
        });
        self
    }

    /// Append a `ref`/`out` parameter
    #[must_use]
    pub fn ref_parameter(mut self, type_name: TypeName, name: impl Into<String>) -> Self {
        self.parameters.push(ParameterDescriptor {
            type_name,
            name: name.into(),
            by_ref: true,
        });
        self
    }

    /// Set the module containing this method
    #[must_use]
    pub fn in_module(mut self, module: ModuleId) -> Self {
        self.module = module;
        self
    }

    /// Add modifiers
    #[must_use]
    pub fn with_flags(mut self, flags: MethodFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// Mark the method static
    #[must_use]
    pub fn static_method(self) -> Self {
        self.with_flags(MethodFlags::STATIC)
    }

    /// Returns `true` for static methods
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(MethodFlags::STATIC)
    }

    /// Returns `true` if the method or its declaring type is generic
    #[must_use]
    pub fn is_generic(&self) -> bool {
        self.flags.contains(MethodFlags::GENERIC) || self.declaring_type.is_generic()
    }

    /// `Namespace.Type.Method`, as used in the headline of a formatted trace
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.declaring_type.full_name(), self.name)
    }

    /// The name the runtime prints for this method inside a stack trace:
    /// `Namespace.Type.Method (ParamType name, ...)`
    #[must_use]
    pub fn stack_trace_name(&self) -> String {
        format!("{} ({})", self.qualified_name(), self.joined_parameters())
    }

    /// The rendering used for attribution lines:
    /// `ReturnType Namespace.Type:Method(ParamType name, ...)`
    #[must_use]
    pub fn patch_signature(&self) -> String {
        format!(
            "{} {}:{}({})",
            self.return_type.name,
            self.declaring_type.full_name(),
            self.name,
            self.joined_parameters()
        )
    }

    /// Human oriented one-liner: `static virtual int Type.Method (Type name)`
    #[must_use]
    pub fn short_description(&self) -> String {
        let mut result = String::new();
        if self.flags.contains(MethodFlags::STATIC) {
            result.push_str("static ");
        }
        if self.flags.contains(MethodFlags::ABSTRACT) {
            result.push_str("abstract ");
        }
        if self.flags.contains(MethodFlags::VIRTUAL) {
            result.push_str("virtual ");
        }
        if !self.return_type.is_void() {
            result.push_str(&self.return_type.short_description());
            result.push(' ');
        }
        let parameters: Vec<String> = self
            .parameters
            .iter()
            .map(|p| format!("{} {}", p.type_name.short_description(), p.name))
            .collect();
        result.push_str(&format!(
            "{}.{} ({})",
            self.declaring_type.short_description(),
            self.name,
            parameters.join(", ")
        ));
        result
    }

    fn joined_parameters(&self) -> String {
        self.parameters
            .iter()
            .map(|p| format!("{} {}", p.type_display_name(), p.name))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl PartialEq for MethodDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.module == other.module
            && self.declaring_type == other.declaring_type
            && self.name == other.name
            && self.is_static() == other.is_static()
            && self.return_type == other.return_type
            && self.parameters.len() == other.parameters.len()
            && self
                .parameters
                .iter()
                .zip(&other.parameters)
                .all(|(a, b)| a.type_name == b.type_name && a.by_ref == b.by_ref)
    }
}

impl Eq for MethodDescriptor {}

impl Hash for MethodDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.module.hash(state);
        self.declaring_type.hash(state);
        self.name.hash(state);
        self.is_static().hash(state);
        self.return_type.hash(state);
        for parameter in &self.parameters {
            parameter.type_name.hash(state);
            parameter.by_ref.hash(state);
        }
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short_description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn int() -> TypeName {
        TypeName::new("System", "Int32")
    }

    #[test]
    fn identity_ignores_parameter_names() {
        let a = MethodDescriptor::new(TypeName::new("Verse", "Thing"), "TakeDamage")
            .parameter(int(), "amount");
        let b = MethodDescriptor::new(TypeName::new("Verse", "Thing"), "TakeDamage")
            .parameter(int(), "dmg");

        assert_eq!(a, b);
        let set: HashSet<_> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn identity_respects_static_and_parameter_types() {
        let instance = MethodDescriptor::new(TypeName::new("Verse", "Thing"), "Spawn");
        let statik = instance.clone().static_method();
        let overload = instance.clone().parameter(int(), "count");

        assert_ne!(instance, statik);
        assert_ne!(instance, overload);
    }

    #[test]
    fn descriptive_flags_do_not_change_identity() {
        let plain = MethodDescriptor::new(TypeName::new("Verse", "Thing"), "Tick");
        let virt = plain.clone().with_flags(MethodFlags::VIRTUAL);
        assert_eq!(plain, virt);
    }

    #[test]
    fn renderings() {
        let method = MethodDescriptor::new(TypeName::new("MyMod", "Patches"), "Prefix")
            .returns(TypeName::new("System", "Boolean"))
            .parameter(TypeName::new("Verse", "Pawn"), "__instance")
            .ref_parameter(int(), "__result")
            .static_method();

        assert_eq!(
            method.patch_signature(),
            "Boolean MyMod.Patches:Prefix(Pawn __instance, Int32& __result)"
        );
        assert_eq!(
            method.stack_trace_name(),
            "MyMod.Patches.Prefix (Pawn __instance, Int32& __result)"
        );
        assert_eq!(
            method.short_description(),
            "static Boolean Patches.Prefix (Pawn __instance, Int32 __result)"
        );
    }

    #[test]
    fn generic_short_description() {
        let list = TypeName::new("System.Collections.Generic", "List`1")
            .with_generic_arguments(vec![TypeName::new("Verse", "Thing")]);
        assert_eq!(list.short_description(), "List`1<Thing>");
        assert!(list.is_generic());
    }

    #[test]
    fn open_generic_definitions_are_generic() {
        let open = TypeName::new("Verse", "Cache`1");
        assert!(open.is_generic());
        assert_eq!(open.short_description(), "Cache`1");
        assert!(TypeName::new("Verse", "Cache`2+Entry").is_generic());
        assert!(!TypeName::new("Verse", "Pawn").is_generic());
        assert!(!TypeName::new("Verse", "Odd`Name").is_generic());
    }

    #[test]
    fn module_version_token() {
        let module = ModuleId::new(
            "Core",
            uguid::guid!("01234567-89ab-cdef-0123-456789abcdef"),
        );
        assert_eq!(module.version_token(), "0123456789abcdef0123456789abcdef");
        assert_eq!(module, ModuleId::named("Core"));
    }
}
