use std::fmt;

use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

use crate::vm::chunk::OpCode;

// ============= Compile-time errors (with miette diagnostics) =============

/// Where a syntax error was detected, as shown after `Error` in the diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorLocation {
    /// At a concrete token: ` at 'lexeme'`.
    Lexeme(String),
    /// At end of input: ` at end`.
    End,
}

impl fmt::Display for ErrorLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lexeme(lexeme) => write!(f, " at '{lexeme}'"),
            Self::End => write!(f, " at end"),
        }
    }
}

#[derive(Error, Debug, Diagnostic)]
pub enum CompileError {
    #[error("[line {line} Error: {message}")]
    #[diagnostic(code(lox::scan))]
    Scan {
        message: String,
        line: usize,
        #[label("here")]
        span: SourceSpan,
        #[source_code]
        src: miette::NamedSource<String>,
    },

    #[error("[line {line} Error{location}: {message}")]
    #[diagnostic(code(lox::parse))]
    Parse {
        message: String,
        location: ErrorLocation,
        line: usize,
        #[label("here")]
        span: SourceSpan,
        #[source_code]
        src: miette::NamedSource<String>,
    },
}

impl CompileError {
    pub fn scan(message: impl Into<String>, line: usize, offset: usize, len: usize) -> Self {
        Self::Scan {
            message: message.into(),
            line,
            span: SourceSpan::new(offset.into(), len),
            src: miette::NamedSource::new("input", String::new()),
        }
    }

    pub fn parse(
        message: impl Into<String>,
        location: ErrorLocation,
        line: usize,
        offset: usize,
        len: usize,
    ) -> Self {
        Self::Parse {
            message: message.into(),
            location,
            line,
            span: SourceSpan::new(offset.into(), len),
            src: miette::NamedSource::new("input", String::new()),
        }
    }

    /// Attach source code for fancy miette diagnostics
    pub fn with_source_code(self, name: impl Into<String>, source: impl Into<String>) -> Self {
        let src = miette::NamedSource::new(name.into(), source.into());
        match self {
            Self::Scan {
                message,
                line,
                span,
                ..
            } => Self::Scan {
                message,
                line,
                span,
                src,
            },
            Self::Parse {
                message,
                location,
                line,
                span,
                ..
            } => Self::Parse {
                message,
                location,
                line,
                span,
                src,
            },
        }
    }

    pub fn line(&self) -> usize {
        match self {
            Self::Scan { line, .. } | Self::Parse { line, .. } => *line,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Scan { message, .. } | Self::Parse { message, .. } => message,
        }
    }
}

/// The constant pool cannot be addressed by a three-byte operand any more.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Too many constants in one chunk.")]
pub struct ConstantPoolOverflow;

// ============= Runtime errors (simple, no miette) =============

/// What went wrong while executing an instruction.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    #[error("Operands must be numbers.")]
    OperandsMustBeNumbers,
    #[error("Operand must be a number.")]
    OperandMustBeNumber,
    #[error("Stack underflow.")]
    StackUnderflow,
    #[error("Unknown opcode {0}.")]
    UnknownOpcode(u8),
    #[error("Truncated operand for {0}.")]
    TruncatedOperand(OpCode),
    #[error("Constant index {0} out of range.")]
    ConstantOutOfRange(usize),
    #[error("Reached end of code without a return.")]
    MissingReturn,
}

/// A fault together with the source line of the instruction that raised it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{fault}\n[line {line}] in script")]
pub struct RuntimeError {
    pub fault: Fault,
    pub line: usize,
}

impl RuntimeError {
    pub fn new(fault: Fault, line: usize) -> Self {
        Self { fault, line }
    }
}

// ============= Tests =============
