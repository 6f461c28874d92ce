//! The two rewrite rules applied to every instrumented method.
//!
//! # Catch rule
//!
//! At the first instruction of every catch clause for the catch-all type, a call to the store's
//! handle entry is inserted. The entry takes the exception on the stack and returns it, so the
//! handler continues as before. A handler that starts with `pop` discards the exception without
//! looking at it and is left alone.
//!
//! # Activator rule
//!
//! Calls to a dangerous activation method are redirected to a guarded wrapper that takes one
//! extra context argument: `this` for instance methods, or the first definition-typed parameter
//! of a static method. Static methods without such a parameter keep the unguarded call.

use crate::{
    instrumentation::{InstructionEditor, MethodSource},
    metadata::method::{
        Instruction, MethodBody, MethodDescriptor, OpCode, Operand, TypeName,
    },
    Result,
};

/// A call the activator rule redirects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivatorRedirect {
    /// The unguarded activation method
    pub original: MethodDescriptor,
    /// The guarded replacement; takes the original's arguments plus a trailing context object
    pub guarded: MethodDescriptor,
}

/// How the first instruction of a catch handler treats the caught exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerStart {
    /// The exception is consumed by the handler; a handle call can be inserted in front
    Rewritable,
    /// The handler drops the exception immediately (`pop`); left untouched
    DiscardsException,
}

impl HandlerStart {
    /// Classify the first instruction of a handler
    #[must_use]
    pub fn classify(instruction: &Instruction) -> Self {
        if instruction.opcode == OpCode::Pop {
            HandlerStart::DiscardsException
        } else {
            HandlerStart::Rewritable
        }
    }
}

/// Everything the rules need to know about the host.
pub struct RewriteRules<'a> {
    /// Catch clauses for exactly this type are instrumented
    pub catch_type: &'a TypeName,
    /// The store's handle entry point
    pub handle_entry: &'a MethodDescriptor,
    /// Activation calls to redirect
    pub redirects: &'a [ActivatorRedirect],
}

/// Changes applied to one method body
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewriteCounts {
    /// Catch handlers that now call the handle entry
    pub catch_sites: usize,
    /// Activation calls redirected to the guarded wrapper
    pub activator_sites: usize,
}

impl RewriteRules<'_> {
    /// Returns `true` if `body` contains anything these rules would act on
    #[must_use]
    pub fn applies_to(&self, body: &MethodBody) -> bool {
        body.has_catch(self.catch_type)
            || body
                .instructions
                .iter()
                .any(|instruction| self.redirect_for(instruction).is_some())
    }

    /// Apply both rules to `body`.
    ///
    /// ## Returns
    /// The rewritten body and what changed, or `None` if neither rule applied
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the body is inconsistent before or after editing.
    pub fn rewrite(
        &self,
        method: &MethodDescriptor,
        body: MethodBody,
        source: &dyn MethodSource,
    ) -> Result<Option<(MethodBody, RewriteCounts)>> {
        let mut editor = InstructionEditor::new(body)?;
        let counts = RewriteCounts {
            activator_sites: self.redirect_activations(&mut editor, method, source)?,
            catch_sites: self.instrument_catches(&mut editor)?,
        };

        if !editor.is_modified() {
            return Ok(None);
        }
        Ok(Some((editor.commit()?, counts)))
    }

    fn redirect_for(&self, instruction: &Instruction) -> Option<&ActivatorRedirect> {
        if instruction.opcode != OpCode::Call {
            return None;
        }
        let called = instruction.called_method()?;
        self.redirects
            .iter()
            .find(|redirect| &redirect.original == called)
    }

    fn redirect_activations(
        &self,
        editor: &mut InstructionEditor,
        method: &MethodDescriptor,
        source: &dyn MethodSource,
    ) -> Result<usize> {
        let context_argument = if method.is_static() {
            method
                .parameters
                .iter()
                .position(|parameter| {
                    !parameter.type_name.is_generic()
                        && !parameter.by_ref
                        && source.is_definition_type(&parameter.type_name)
                })
                .and_then(|index| u16::try_from(index).ok())
        } else {
            Some(0)
        };
        let Some(context_argument) = context_argument else {
            return Ok(0);
        };

        let mut sites = 0;
        let mut index = 0;
        while let Some(found) = editor.locate(index, |i| self.redirect_for(i).is_some()) {
            let guarded = editor
                .get(found)
                .and_then(|instruction| self.redirect_for(instruction))
                .map(|redirect| redirect.guarded.clone());
            let Some(guarded) = guarded else {
                break;
            };

            editor.insert(found, Instruction::load_argument(context_argument))?;
            editor.set_operand(found + 1, Operand::Method(guarded))?;
            sites += 1;
            index = found + 2;
        }
        Ok(sites)
    }

    fn instrument_catches(&self, editor: &mut InstructionEditor) -> Result<usize> {
        let mut sites = 0;
        let mut index = 0;
        while let Some(start) = self.next_catch_start(editor, index) {
            let classification = editor.get(start).map(HandlerStart::classify);
            if classification != Some(HandlerStart::Rewritable) {
                index = start + 1;
                continue;
            }

            editor.insert(start, Instruction::call(self.handle_entry.clone()))?;
            sites += 1;
            index = start + 2;
        }
        Ok(sites)
    }

    fn next_catch_start(&self, editor: &InstructionEditor, from: usize) -> Option<usize> {
        editor
            .body()
            .exception_handlers
            .iter()
            .filter(|handler| handler.catches(self.catch_type))
            .map(|handler| handler.handler_start)
            .filter(|&start| start >= from && start < editor.len())
            .min()
    }
}
