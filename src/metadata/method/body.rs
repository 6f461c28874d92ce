//! Abstract method bodies: an instruction stream plus its exception regions.
//!
//! # Examples
//!
//! ```rust
//! use patchscope::metadata::method::{ExceptionHandler, Instruction, MethodBody, OpCode, TypeName};
//!
//! // try { nop; leave } catch (Exception) { pop; leave } ret
//! let body = MethodBody::new(
//!     vec![
//!         Instruction::new(OpCode::Nop),
//!         Instruction::new(OpCode::Leave),
//!         Instruction::new(OpCode::Pop),
//!         Instruction::new(OpCode::Leave),
//!         Instruction::new(OpCode::Ret),
//!     ],
//!     vec![ExceptionHandler::catch(0..2, 2..4, TypeName::new("System", "Exception"))],
//! );
//! assert!(body.validate().is_ok());
//! assert!(body.has_catch(&TypeName::new("System", "Exception")));
//! ```

use std::collections::HashSet;

use crate::{
    metadata::method::{ExceptionHandler, ExceptionHandlerFlags, Instruction, TypeName},
    Result,
};

/// Describes the instruction stream of one method.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodBody {
    /// The instructions, in execution layout order
    pub instructions: Vec<Instruction>,
    /// A list of exception handlers this method has
    pub exception_handlers: Vec<ExceptionHandler>,
}

impl MethodBody {
    /// Create a body from instructions and exception regions
    #[must_use]
    pub fn new(instructions: Vec<Instruction>, exception_handlers: Vec<ExceptionHandler>) -> Self {
        MethodBody {
            instructions,
            exception_handlers,
        }
    }

    /// Number of instructions
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Returns `true` if the body has no instructions
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Returns `true` if any catch clause handles exactly `catch_type`
    #[must_use]
    pub fn has_catch(&self, catch_type: &TypeName) -> bool {
        self.exception_handlers
            .iter()
            .any(|handler| handler.catches(catch_type))
    }

    /// Check that all exception regions lie inside the stream and that every branch target
    /// refers to a label attached to some instruction.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] describing the first inconsistency found.
    pub fn validate(&self) -> Result<()> {
        let len = self.instructions.len();
        for (index, handler) in self.exception_handlers.iter().enumerate() {
            if handler.try_start > handler.try_end || handler.try_end > len {
                return Err(malformed_error!(
                    "Exception handler {} has an invalid try range {}..{} (body has {} instructions)",
                    index,
                    handler.try_start,
                    handler.try_end,
                    len
                ));
            }
            if handler.handler_start > handler.handler_end || handler.handler_end > len {
                return Err(malformed_error!(
                    "Exception handler {} has an invalid handler range {}..{} (body has {} instructions)",
                    index,
                    handler.handler_start,
                    handler.handler_end,
                    len
                ));
            }
            if handler.flags.contains(ExceptionHandlerFlags::FILTER) && handler.filter_start >= len
            {
                return Err(malformed_error!(
                    "Exception handler {} has filter start {} outside the body",
                    index,
                    handler.filter_start
                ));
            }
        }

        let defined: HashSet<_> = self
            .instructions
            .iter()
            .flat_map(|instruction| instruction.labels.iter().copied())
            .collect();
        for (index, instruction) in self.instructions.iter().enumerate() {
            for target in instruction.branch_targets() {
                if !defined.contains(&target) {
                    return Err(malformed_error!(
                        "Instruction {} ({}) branches to undefined label L{}",
                        index,
                        instruction.opcode,
                        target.0
                    ));
                }
            }
        }

        Ok(())
    }
}
