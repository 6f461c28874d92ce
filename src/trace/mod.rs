//! Call stacks as captured by the host, and their textual rendering.
//!
//! # Key Types
//! - [`CallFrame`] - One raw frame: offsets, address, declared method, source position
//! - [`StackSnapshot`] - Frames of one throw site plus prior async continuation segments
//! - [`TraceFormatter`] - Renders snapshots in the fixed trace grammar, with patch attribution
//! - [`TraceFingerprint`] - Stable hash of a rendered trace, the deduplication key
//!
//! # Format Stability
//!
//! The rendered text is the sole input of exception fingerprints. Any change to field order,
//! separators or number formatting changes every fingerprint, so such changes must bump
//! [`TRACE_FORMAT_VERSION`], which is mixed into each fingerprint.

mod fingerprint;
mod formatter;

pub use fingerprint::TraceFingerprint;
pub use formatter::{TraceFormatter, SEGMENT_SEPARATOR};

use crate::metadata::method::MethodDescriptor;

/// Version of the trace text grammar
pub const TRACE_FORMAT_VERSION: u32 = 1;

/// Method index value the runtime uses for "no index"
pub const METHOD_INDEX_ABSENT: u32 = 0x00FF_FFFF;

/// One entry of a captured call stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallFrame {
    /// Managed instruction offset; `None` when the frame only has native information
    pub il_offset: Option<u32>,
    /// Offset into the jitted native code
    pub native_offset: u32,
    /// Start address of the jitted method
    pub method_address: u64,
    /// Secondary method index, [`METHOD_INDEX_ABSENT`] when not available
    pub method_index: u32,
    /// Name of an internal runtime transition, if the runtime provided one
    pub internal_name: Option<String>,
    /// The method as declared by the runtime; `None` for opaque transitions. May be a generated
    /// replacement, which the [`crate::inspector::FrameInspector`] resolves.
    pub method: Option<MethodDescriptor>,
    /// Source file; names starting with `<` are anonymized
    pub file_name: Option<String>,
    /// Source line, `0` when unknown
    pub line_number: u32,
}

impl CallFrame {
    /// A managed frame with a known instruction offset
    #[must_use]
    pub fn managed(method: MethodDescriptor, il_offset: u32) -> Self {
        CallFrame {
            il_offset: Some(il_offset),
            native_offset: 0,
            method_address: 0,
            method_index: METHOD_INDEX_ABSENT,
            internal_name: None,
            method: Some(method),
            file_name: None,
            line_number: 0,
        }
    }

    /// A frame of a known method that only carries native position information
    #[must_use]
    pub fn native(method: MethodDescriptor, method_address: u64, native_offset: u32) -> Self {
        CallFrame {
            il_offset: None,
            native_offset,
            method_address,
            method_index: METHOD_INDEX_ABSENT,
            internal_name: None,
            method: Some(method),
            file_name: None,
            line_number: 0,
        }
    }

    /// A frame without a resolvable managed method
    #[must_use]
    pub fn opaque(method_address: u64, native_offset: u32) -> Self {
        CallFrame {
            il_offset: None,
            native_offset,
            method_address,
            method_index: METHOD_INDEX_ABSENT,
            internal_name: None,
            method: None,
            file_name: None,
            line_number: 0,
        }
    }

    /// Attach a source position
    #[must_use]
    pub fn at(mut self, file_name: impl Into<String>, line_number: u32) -> Self {
        self.file_name = Some(file_name.into());
        self.line_number = line_number;
        self
    }

    /// Attach the runtime's name for an internal transition
    #[must_use]
    pub fn internal(mut self, name: impl Into<String>) -> Self {
        self.internal_name = Some(name.into());
        self
    }

    /// Attach a secondary method index
    #[must_use]
    pub fn with_method_index(mut self, method_index: u32) -> Self {
        self.method_index = method_index;
        self
    }
}

/// Frames of one throw site, newest first, plus the segments captured at earlier async
/// continuation boundaries (oldest first).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackSnapshot {
    /// Frames of this segment, newest first
    pub frames: Vec<CallFrame>,
    /// Segments captured before this one, each rendered as its own section
    pub captured: Vec<StackSnapshot>,
}

impl StackSnapshot {
    /// A single-segment snapshot
    #[must_use]
    pub fn new(frames: Vec<CallFrame>) -> Self {
        StackSnapshot {
            frames,
            captured: Vec::new(),
        }
    }

    /// Prepend segments captured at earlier continuation boundaries
    #[must_use]
    pub fn with_captured(mut self, captured: Vec<StackSnapshot>) -> Self {
        self.captured = captured;
        self
    }

    /// The oldest frame of this segment
    #[must_use]
    pub fn oldest(&self) -> Option<&CallFrame> {
        self.frames.last()
    }

    /// Returns `true` if this segment has no frames
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
