//! Guarded object activation.
//!
//! Redirected activation calls land here. A null type is the usual symptom of a misspelled or
//! missing class reference in some configuration definition; the guarded wrapper turns the
//! runtime's unhelpful argument error into one that names the definition responsible.

use crate::{Error, Result};

/// The context object a redirected call passes along, as seen by the host.
pub trait ActivationContext {
    /// The object's rendering if it is itself a configuration definition
    fn definition(&self) -> Option<String>;

    /// Renderings of definitions the object references through its fields, in declaration order
    fn referenced_definitions(&self) -> Vec<String> {
        Vec::new()
    }

    /// Plain rendering of the object
    fn describe(&self) -> String;
}

/// The most specific description of `context`: the object itself if it is a definition, else the
/// first definition it references, else the object.
#[must_use]
pub fn possible_context(context: Option<&dyn ActivationContext>) -> Option<String> {
    let context = context?;
    context
        .definition()
        .or_else(|| context.referenced_definitions().into_iter().next())
        .or_else(|| Some(context.describe()))
}

/// Wrapper around the host's activator that rejects null types with a descriptive error.
#[derive(Debug, Default, Clone, Copy)]
pub struct GuardedActivator;

impl GuardedActivator {
    /// Guarded `create_instance(type)`.
    ///
    /// # Errors
    /// Returns [`Error::NullTypeActivation`] if `type_handle` is `None`.
    pub fn create_instance<T, R>(
        type_handle: Option<T>,
        context: Option<&dyn ActivationContext>,
        construct: impl FnOnce(T) -> R,
    ) -> Result<R> {
        match type_handle {
            Some(type_handle) => Ok(construct(type_handle)),
            None => Err(null_type(
                "Activator.CreateInstance(type) called with a null type".to_string(),
                context,
            )),
        }
    }

    /// Guarded `create_instance(type, arguments)`. `None` arguments render as `null`.
    ///
    /// # Errors
    /// Returns [`Error::NullTypeActivation`] if `type_handle` is `None`.
    pub fn create_instance_with<T, R>(
        type_handle: Option<T>,
        arguments: &[Option<String>],
        context: Option<&dyn ActivationContext>,
        construct: impl FnOnce(T) -> R,
    ) -> Result<R> {
        match type_handle {
            Some(type_handle) => Ok(construct(type_handle)),
            None => {
                let objects: Vec<&str> = arguments
                    .iter()
                    .map(|argument| argument.as_deref().unwrap_or("null"))
                    .collect();
                Err(null_type(
                    format!(
                        "Activator.CreateInstance(type, object[]) called with a null type, objects=[{}]",
                        objects.join(", ")
                    ),
                    context,
                ))
            }
        }
    }
}

fn null_type(mut message: String, context: Option<&dyn ActivationContext>) -> Error {
    if let Some(info) = possible_context(context) {
        message.push_str(", possible context=");
        message.push_str(&info);
    }
    Error::NullTypeActivation(message)
}
