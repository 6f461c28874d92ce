//! Method identities, bodies and exception regions.
//!
//! # Key Types
//! - [`MethodDescriptor`] - Immutable, hashable identity of a compiled method
//! - [`ModuleId`] - The code module a method lives in, the unit of attribution
//! - [`TypeName`], [`ParameterDescriptor`] - Type and parameter names as the runtime prints them
//! - [`MethodBody`] - An abstract instruction stream plus its exception regions
//! - [`Instruction`], [`OpCode`], [`Operand`], [`Label`] - Elements of the instruction stream
//! - [`ExceptionHandler`], [`ExceptionHandlerFlags`] - try/catch/finally/fault regions

mod body;
mod descriptor;
mod exceptions;
mod instruction;

pub use body::MethodBody;
pub use descriptor::{MethodDescriptor, MethodFlags, ModuleId, ParameterDescriptor, TypeName};
pub use exceptions::{ExceptionHandler, ExceptionHandlerFlags};
pub use instruction::{Instruction, Label, OpCode, Operand};
