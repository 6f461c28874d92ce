//! Exception handler representation for abstract method bodies.
//!
//! Regions are expressed as half-open instruction index ranges instead of byte offsets, so an
//! edit that inserts instructions only needs to shift indices (see
//! [`crate::instrumentation::InstructionEditor`]).

use bitflags::bitflags;

use crate::metadata::method::TypeName;

bitflags! {
    /// Exception handler flags defining the type of exception handling clause.
    ///
    /// These flags determine how the exception handler processes exceptions and
    /// control flow within try/catch/finally blocks.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ExceptionHandlerFlags: u16 {
        /// A typed exception clause.
        ///
        /// The `catch_type` field names the exception type this handler catches.
        const EXCEPTION = 0x0000;

        /// An exception filter and handler clause.
        const FILTER = 0x0001;

        /// A finally clause.
        const FINALLY = 0x0002;

        /// A fault clause (finally that executes only on exception).
        const FAULT = 0x0004;
    }
}

/// Exception handler defining try/catch/finally blocks within a method.
///
/// # Layout
///
/// ```text
/// try {
///     // instructions[try_start..try_end]
/// }
/// catch (CatchType) {
///     // instructions[handler_start..handler_end]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Flags describing the type of exception handler (catch, filter, finally, fault).
    pub flags: ExceptionHandlerFlags,
    /// Index of the first instruction of the try block.
    pub try_start: usize,
    /// Index one past the last instruction of the try block.
    pub try_end: usize,
    /// Index of the first instruction of the handler.
    pub handler_start: usize,
    /// Index one past the last instruction of the handler.
    pub handler_end: usize,
    /// If flags == EXCEPTION, then this type will handle the exception.
    pub catch_type: Option<TypeName>,
    /// Index of the first filter instruction for filter-based handlers.
    pub filter_start: usize,
}

impl ExceptionHandler {
    /// Create a typed catch clause
    #[must_use]
    pub fn catch(
        try_range: std::ops::Range<usize>,
        handler_range: std::ops::Range<usize>,
        catch_type: TypeName,
    ) -> Self {
        ExceptionHandler {
            flags: ExceptionHandlerFlags::EXCEPTION,
            try_start: try_range.start,
            try_end: try_range.end,
            handler_start: handler_range.start,
            handler_end: handler_range.end,
            catch_type: Some(catch_type),
            filter_start: 0,
        }
    }

    /// Create a finally clause
    #[must_use]
    pub fn finally(try_range: std::ops::Range<usize>, handler_range: std::ops::Range<usize>) -> Self {
        ExceptionHandler {
            flags: ExceptionHandlerFlags::FINALLY,
            try_start: try_range.start,
            try_end: try_range.end,
            handler_start: handler_range.start,
            handler_end: handler_range.end,
            catch_type: None,
            filter_start: 0,
        }
    }

    /// Returns `true` for typed catch clauses
    #[must_use]
    pub fn is_catch(&self) -> bool {
        self.flags.bits() == ExceptionHandlerFlags::EXCEPTION.bits()
    }

    /// Returns `true` if this is a typed catch clause for exactly `catch_type`
    #[must_use]
    pub fn catches(&self, catch_type: &TypeName) -> bool {
        self.is_catch() && self.catch_type.as_ref() == Some(catch_type)
    }

    /// Shift every boundary strictly greater than `index` by one, as required when an
    /// instruction is inserted at `index`.
    ///
    /// A region starting at `index` keeps starting there, so the inserted instruction becomes
    /// its first instruction. A region ending at `index` keeps ending there.
    pub(crate) fn shift_after(&mut self, index: usize) {
        for boundary in [
            &mut self.try_start,
            &mut self.try_end,
            &mut self.handler_start,
            &mut self.handler_end,
        ] {
            if *boundary > index {
                *boundary += 1;
            }
        }
        if self.flags.contains(ExceptionHandlerFlags::FILTER) && self.filter_start > index {
            self.filter_start += 1;
        }
    }
}
