//! Elements of an abstract instruction stream.
//!
//! Only the opcodes the instrumentation rules inspect or emit are named; everything else a host
//! hands over is carried through untouched as [`OpCode::Other`].

use std::fmt;

use crate::metadata::method::{MethodDescriptor, TypeName};

/// Symbolic branch target attached to an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub u32);

/// Operation performed by an [`Instruction`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OpCode {
    /// No operation
    Nop,
    /// Discard the top of the evaluation stack
    Pop,
    /// Duplicate the top of the evaluation stack
    Dup,
    /// Push a null reference
    Ldnull,
    /// Push argument 0 (`this` for instance methods)
    Ldarg0,
    /// Push the argument named by [`Operand::Argument`]
    Ldarg,
    /// Push the local named by [`Operand::Local`]
    Ldloc,
    /// Pop into the local named by [`Operand::Local`]
    Stloc,
    /// Push a string literal
    Ldstr,
    /// Static call to [`Operand::Method`]
    Call,
    /// Virtual call to [`Operand::Method`]
    Callvirt,
    /// Construct an object with the constructor in [`Operand::Method`]
    Newobj,
    /// Unconditional branch
    Br,
    /// Branch if true
    Brtrue,
    /// Branch if false
    Brfalse,
    /// Leave a protected region
    Leave,
    /// Throw the exception on the stack
    Throw,
    /// Rethrow the current exception
    Rethrow,
    /// End of a finally or fault handler
    Endfinally,
    /// Return from the method
    Ret,
    /// Any opcode the rules never look at, carried by mnemonic
    Other(String),
}

impl OpCode {
    /// Mnemonic as used in disassembly listings
    #[must_use]
    pub fn mnemonic(&self) -> &str {
        match self {
            OpCode::Nop => "nop",
            OpCode::Pop => "pop",
            OpCode::Dup => "dup",
            OpCode::Ldnull => "ldnull",
            OpCode::Ldarg0 => "ldarg.0",
            OpCode::Ldarg => "ldarg",
            OpCode::Ldloc => "ldloc",
            OpCode::Stloc => "stloc",
            OpCode::Ldstr => "ldstr",
            OpCode::Call => "call",
            OpCode::Callvirt => "callvirt",
            OpCode::Newobj => "newobj",
            OpCode::Br => "br",
            OpCode::Brtrue => "brtrue",
            OpCode::Brfalse => "brfalse",
            OpCode::Leave => "leave",
            OpCode::Throw => "throw",
            OpCode::Rethrow => "rethrow",
            OpCode::Endfinally => "endfinally",
            OpCode::Ret => "ret",
            OpCode::Other(mnemonic) => mnemonic,
        }
    }

    /// Returns `true` for opcodes whose operand is a branch target
    #[must_use]
    pub fn is_branch(&self) -> bool {
        matches!(
            self,
            OpCode::Br | OpCode::Brtrue | OpCode::Brfalse | OpCode::Leave
        )
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Operand of an [`Instruction`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// No operand
    None,
    /// Method reference of a call or constructor
    Method(MethodDescriptor),
    /// Type reference
    Type(TypeName),
    /// Argument index
    Argument(u16),
    /// Local variable index
    Local(u16),
    /// Branch target
    Target(Label),
    /// Switch targets
    Targets(Vec<Label>),
    /// Integer literal
    Int(i64),
    /// String literal
    String(String),
}

/// One instruction of an abstract method body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// The operation
    pub opcode: OpCode,
    /// The operation's operand
    pub operand: Operand,
    /// Branch targets that resolve to this instruction
    pub labels: Vec<Label>,
}

impl Instruction {
    /// Create an instruction without operand
    #[must_use]
    pub fn new(opcode: OpCode) -> Self {
        Instruction {
            opcode,
            operand: Operand::None,
            labels: Vec::new(),
        }
    }

    /// Create an instruction with an operand
    #[must_use]
    pub fn with_operand(opcode: OpCode, operand: Operand) -> Self {
        Instruction {
            opcode,
            operand,
            labels: Vec::new(),
        }
    }

    /// `call method`
    #[must_use]
    pub fn call(method: MethodDescriptor) -> Self {
        Self::with_operand(OpCode::Call, Operand::Method(method))
    }

    /// Push argument `index`
    #[must_use]
    pub fn load_argument(index: u16) -> Self {
        if index == 0 {
            Self::new(OpCode::Ldarg0)
        } else {
            Self::with_operand(OpCode::Ldarg, Operand::Argument(index))
        }
    }

    /// Attach a label to this instruction
    #[must_use]
    pub fn labeled(mut self, label: Label) -> Self {
        self.labels.push(label);
        self
    }

    /// The called method, if this is a `call` or `callvirt`
    #[must_use]
    pub fn called_method(&self) -> Option<&MethodDescriptor> {
        match (&self.opcode, &self.operand) {
            (OpCode::Call | OpCode::Callvirt, Operand::Method(method)) => Some(method),
            _ => None,
        }
    }

    /// Labels this instruction may transfer control to
    #[must_use]
    pub fn branch_targets(&self) -> Vec<Label> {
        match &self.operand {
            Operand::Target(label) => vec![*label],
            Operand::Targets(labels) => labels.clone(),
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode)?;
        match &self.operand {
            Operand::None => Ok(()),
            Operand::Method(method) => write!(f, " {}", method.patch_signature()),
            Operand::Type(type_name) => write!(f, " {type_name}"),
            Operand::Argument(index) | Operand::Local(index) => write!(f, " {index}"),
            Operand::Target(label) => write!(f, " L{}", label.0),
            Operand::Targets(labels) => {
                let labels: Vec<String> = labels.iter().map(|l| format!("L{}", l.0)).collect();
                write!(f, " ({})", labels.join(", "))
            }
            Operand::Int(value) => write!(f, " {value}"),
            Operand::String(value) => write!(f, " \"{value}\""),
        }
    }
}
