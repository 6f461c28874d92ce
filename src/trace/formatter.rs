//! Rendering of stack snapshots in the trace grammar.
//!
//! # Grammar
//!
//! One line per frame, frames joined by `\n`:
//!
//! ```text
//!   at <method-or-raw> <position> in <file>:<line> <attribution>*
//! ```
//!
//! - `<method-or-raw>`: the host's qualified name, or for opaque frames the internal name, or
//!   `<0x{address:05x} + 0x{native:05x}> <unknown method>`
//! - `<position>`: ` [0x{il:05x}]`, or ` <0x{address:05x} + 0x{native:05x}>` followed by
//!   ` {index}` when the frame has no managed offset
//! - `<file>`: anonymized names (leading `<`) become `<{module version}>` or
//!   `<{module version}#{aot id}>`
//! - `<attribution>`: `\n     - {kind} {owner}: {hook signature}` for every modification, kinds
//!   in the order transpiler, prefix, postfix, finalizer
//!
//! Segments captured at earlier async boundaries come first, each followed by
//! [`SEGMENT_SEPARATOR`].

use std::fmt::Write;

use crate::{
    inspector::{FrameInspector, HostAdapter},
    metadata::method::MethodDescriptor,
    patches::{ModificationKind, PatchSet},
    trace::{CallFrame, StackSnapshot, METHOD_INDEX_ABSENT},
};

/// Separator appended after every earlier segment of a multi-segment trace
pub const SEGMENT_SEPARATOR: &str =
    "\n--- End of stack trace from previous location where exception was thrown ---\n";

const UNKNOWN_FILE: &str = "<filename unknown>";

/// Renders [`StackSnapshot`]s, annotating each frame with the modifications active on it.
pub struct TraceFormatter<'a> {
    inspector: &'a FrameInspector,
    host: &'a dyn HostAdapter,
    include_cleanup: bool,
    annotate: bool,
}

impl<'a> TraceFormatter<'a> {
    /// Create an annotating formatter that omits cleanup hooks
    #[must_use]
    pub fn new(inspector: &'a FrameInspector, host: &'a dyn HostAdapter) -> Self {
        TraceFormatter {
            inspector,
            host,
            include_cleanup: false,
            annotate: true,
        }
    }

    /// Also list cleanup hooks (`finalizer` lines)
    #[must_use]
    pub fn include_cleanup(mut self, include: bool) -> Self {
        self.include_cleanup = include;
        self
    }

    /// Render frames only, without attribution lines
    #[must_use]
    pub fn plain(mut self) -> Self {
        self.annotate = false;
        self
    }

    /// Render a snapshot and the segments it captured
    #[must_use]
    pub fn format(&self, snapshot: &StackSnapshot) -> String {
        let mut segments: Vec<&[CallFrame]> =
            snapshot.captured.iter().map(|s| s.frames.as_slice()).collect();
        segments.push(&snapshot.frames);
        self.render_segments(&segments)
    }

    /// Render a chain of snapshots, oldest segment first
    #[must_use]
    pub fn format_chain(&self, chain: &[StackSnapshot]) -> String {
        let segments: Vec<&[CallFrame]> = chain.iter().map(|s| s.frames.as_slice()).collect();
        self.render_segments(&segments)
    }

    /// Render a single frame line, including its attribution lines
    #[must_use]
    pub fn format_frame(&self, frame: &CallFrame) -> String {
        let mut out = String::new();
        self.append_frame(&mut out, frame);
        out
    }

    fn render_segments(&self, segments: &[&[CallFrame]]) -> String {
        let mut out = String::new();
        if let Some((current, earlier)) = segments.split_last() {
            for segment in earlier {
                if self.append_frames(&mut out, segment) {
                    out.push_str(SEGMENT_SEPARATOR);
                }
            }
            self.append_frames(&mut out, current);
        }
        out
    }

    fn append_frames(&self, out: &mut String, frames: &[CallFrame]) -> bool {
        if frames.is_empty() {
            return false;
        }
        for (index, frame) in frames.iter().enumerate() {
            if index > 0 {
                out.push('\n');
            }
            self.append_frame(out, frame);
        }
        true
    }

    fn append_frame(&self, out: &mut String, frame: &CallFrame) {
        out.push_str("  at ");

        let (method, patches) = self.inspector.resolve(frame);
        let Some(method) = method else {
            match &frame.internal_name {
                Some(name) => out.push_str(name),
                None => {
                    let _ = write!(
                        out,
                        "<0x{:05x} + 0x{:05x}> <unknown method>",
                        frame.method_address, frame.native_offset
                    );
                }
            }
            return;
        };

        out.push_str(&self.host.stack_trace_name(&method));
        match frame.il_offset {
            None => {
                let _ = write!(
                    out,
                    " <0x{:05x} + 0x{:05x}>",
                    frame.method_address, frame.native_offset
                );
                if frame.method_index != METHOD_INDEX_ABSENT {
                    let _ = write!(out, " {}", frame.method_index);
                }
            }
            Some(il_offset) => {
                let _ = write!(out, " [0x{il_offset:05x}]");
            }
        }

        let _ = write!(
            out,
            " in {}:{} ",
            self.file_name(frame, &method),
            frame.line_number
        );

        if self.annotate {
            self.append_patches(out, &patches);
        }
    }

    fn file_name(&self, frame: &CallFrame, method: &MethodDescriptor) -> String {
        let file_name = frame.file_name.as_deref().unwrap_or(UNKNOWN_FILE);
        if !file_name.starts_with('<') {
            return file_name.to_string();
        }

        let version = method.module.version_token();
        match (frame.il_offset, self.host.aot_id()) {
            (None, Some(aot_id)) => format!("<{version}#{aot_id}>"),
            _ => format!("<{version}>"),
        }
    }

    fn append_patches(&self, out: &mut String, patches: &PatchSet) {
        for kind in ModificationKind::TRACE_ORDER {
            if kind == ModificationKind::Cleanup && !self.include_cleanup {
                continue;
            }
            for modification in patches.of_kind(kind) {
                let _ = write!(
                    out,
                    "\n     - {} {}: {}",
                    kind,
                    modification.owner,
                    modification.method.patch_signature()
                );
            }
        }
    }
}
