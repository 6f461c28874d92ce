//! In-place editing of abstract method bodies.
//!
//! The editor owns a validated [`MethodBody`] and keeps it consistent while instructions are
//! inserted: branch labels of a displaced instruction move onto the inserted one, and exception
//! region boundaries after the insertion point shift by one.

use crate::{
    metadata::method::{Instruction, MethodBody, Operand},
    Error, Result,
};

/// Editing cursor over one method body.
///
/// # Examples
///
/// ```rust
/// use patchscope::instrumentation::InstructionEditor;
/// use patchscope::metadata::method::{Instruction, MethodBody, OpCode};
///
/// # fn example() -> patchscope::Result<()> {
/// let body = MethodBody::new(vec![Instruction::new(OpCode::Ret)], Vec::new());
/// let mut editor = InstructionEditor::new(body)?;
/// editor.insert(0, Instruction::new(OpCode::Nop))?;
/// let body = editor.commit()?;
/// assert_eq!(body.len(), 2);
/// # Ok(())
/// # }
/// ```
pub struct InstructionEditor {
    body: MethodBody,
    modified: bool,
}

impl InstructionEditor {
    /// Start editing `body`.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] if the body is inconsistent to begin with.
    pub fn new(body: MethodBody) -> Result<Self> {
        body.validate()?;
        Ok(InstructionEditor {
            body,
            modified: false,
        })
    }

    /// The body in its current state
    #[must_use]
    pub fn body(&self) -> &MethodBody {
        &self.body
    }

    /// Number of instructions in the current state
    #[must_use]
    pub fn len(&self) -> usize {
        self.body.len()
    }

    /// Returns `true` if the body has no instructions
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// The instruction at `index`, if any
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Instruction> {
        self.body.instructions.get(index)
    }

    /// Index of the first instruction at or after `from` matching `predicate`
    pub fn locate<P>(&self, from: usize, mut predicate: P) -> Option<usize>
    where
        P: FnMut(&Instruction) -> bool,
    {
        self.body
            .instructions
            .iter()
            .enumerate()
            .skip(from)
            .find(|(_, instruction)| predicate(instruction))
            .map(|(index, _)| index)
    }

    /// Insert `instruction` before the instruction currently at `index`.
    ///
    /// Labels of the displaced instruction move to `instruction`, so branches that targeted the
    /// old instruction now execute the inserted one first. Region boundaries greater than `index`
    /// shift by one; a region starting at `index` now starts with `instruction`. `index` may equal
    /// the body length to append.
    ///
    /// # Errors
    /// Returns [`Error::OutOfBounds`] if `index` is past the end of the body.
    pub fn insert(&mut self, index: usize, mut instruction: Instruction) -> Result<()> {
        let len = self.body.len();
        if index > len {
            return Err(Error::OutOfBounds { index, len });
        }

        if let Some(displaced) = self.body.instructions.get_mut(index) {
            instruction.labels.append(&mut displaced.labels);
        }
        self.body.instructions.insert(index, instruction);
        for handler in &mut self.body.exception_handlers {
            handler.shift_after(index);
        }
        self.modified = true;
        Ok(())
    }

    /// Replace the operand of the instruction at `index`
    ///
    /// # Errors
    /// Returns [`Error::OutOfBounds`] if there is no instruction at `index`.
    pub fn set_operand(&mut self, index: usize, operand: Operand) -> Result<()> {
        let len = self.body.len();
        let instruction = self
            .body
            .instructions
            .get_mut(index)
            .ok_or(Error::OutOfBounds { index, len })?;
        instruction.operand = operand;
        self.modified = true;
        Ok(())
    }

    /// Returns `true` once any edit was made
    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Finish editing and hand back the body.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] if the edits left the body inconsistent.
    pub fn commit(self) -> Result<MethodBody> {
        self.body.validate()?;
        Ok(self.body)
    }
}
