//! # patchscope Prelude
//!
//! The most commonly used types of the crate, for glob import.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all patchscope operations
pub use crate::Error;

/// The result type used throughout patchscope
pub use crate::Result;

// ================================================================================================
// Method Identity
// ================================================================================================

/// Method identities and the names they are rendered with
pub use crate::metadata::method::{MethodDescriptor, MethodFlags, ModuleId, TypeName};

/// Abstract method bodies
pub use crate::metadata::method::{ExceptionHandler, Instruction, MethodBody, OpCode, Operand};

// ================================================================================================
// Patches and Traces
// ================================================================================================

/// The modification registry
pub use crate::patches::{ActiveOwners, Modification, ModificationKind, PatchRegistry, PatchSet};

/// Frame resolution and the host seam
pub use crate::inspector::{FrameInspector, HostAdapter, HostModules};

/// Stack snapshots and their rendering
pub use crate::trace::{CallFrame, StackSnapshot, TraceFingerprint, TraceFormatter};

// ================================================================================================
// Exceptions
// ================================================================================================

/// Records, reports and the store
pub use crate::exceptions::{
    CaughtException, ExceptionObserver, ExceptionRecord, ExceptionReport, ExceptionStore,
    NullObserver, OwnerGroup,
};

// ================================================================================================
// Instrumentation and Session
// ================================================================================================

/// The startup rewrite
pub use crate::instrumentation::{
    ActivationContext, GuardedActivator, InstrumentationEngine, InstrumentationTargets,
    MethodSource,
};

/// Settings and process-wide wiring
pub use crate::{session::Session, settings::Settings};
