//! Error types for the DL compiler.
//!
//! Using thiserror for more idiomatic error handling.

use thiserror::Error;

use crate::inter::Opcode;
use crate::semantic::Type;

/// Main error type for DL compilation.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("syntax error at line {line}: {message}")]
    Syntax { line: u32, message: String },

    #[error("semantic error at line {line}: {message}")]
    Semantic { line: u32, message: String },

    /// The lowering table has no entry for this opcode/type shape.
    #[error("no lowering for {op:?} over {ty:?} operands")]
    UnsupportedLowering { op: Opcode, ty: Type },

    /// An operand resolved to neither a label, a constant, a register nor a
    /// spill slot. Signals a defect in an earlier phase, never user input.
    #[error("internal invariant violated: {reason}")]
    InvalidOperand { reason: String },

    /// A program fault hit while interpreting the IR (division by zero,
    /// unreadable input).
    #[error("runtime fault: {reason}")]
    Runtime { reason: String },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl CompileError {
    pub fn syntax(line: u32, message: impl Into<String>) -> Self {
        Self::Syntax { line, message: message.into() }
    }

    pub fn semantic(line: u32, message: impl Into<String>) -> Self {
        Self::Semantic { line, message: message.into() }
    }

    pub fn invalid_operand(reason: impl Into<String>) -> Self {
        Self::InvalidOperand { reason: reason.into() }
    }

    /// Source line the diagnostic points at, for front-end errors.
    pub fn line(&self) -> Option<u32> {
        match self {
            Self::Syntax { line, .. } | Self::Semantic { line, .. } => Some(*line),
            _ => None,
        }
    }
}

/// Result type alias for compile operations.
pub type CompileResult<T> = Result<T, CompileError>;
