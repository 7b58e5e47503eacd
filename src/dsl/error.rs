use std::time::Duration;

use thiserror::Error;

/// A compilation error with the source line it was raised on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {message}")]
pub struct CompileError {
    pub message: String,
    pub line: usize,
    pub kind: ErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed number, bad string literal, unrecognized character.
    Lexical,
    /// Unexpected token, illegal binding kind, malformed record.
    Syntax,
    /// Duplicate variable/type in one scope, unknown type name.
    Declaration,
    /// Unknown variable, record field or built-in.
    UndefinedReference,
    /// Too few or too many arguments to a built-in.
    Arity,
    /// Operand mismatch, non-bool condition, incompatible assignment.
    Type,
}

impl ErrorKind {
    pub fn label(self) -> &'static str {
        match self {
            ErrorKind::Lexical => "lexical",
            ErrorKind::Syntax => "syntax",
            ErrorKind::Declaration => "declaration",
            ErrorKind::UndefinedReference => "undefined",
            ErrorKind::Arity => "arity",
            ErrorKind::Type => "type",
        }
    }
}

impl CompileError {
    fn new(kind: ErrorKind, message: impl Into<String>, line: usize) -> Self {
        Self {
            message: message.into(),
            line,
            kind,
        }
    }

    pub fn lexical(message: impl Into<String>, line: usize) -> Self {
        Self::new(ErrorKind::Lexical, message, line)
    }

    pub fn syntax(message: impl Into<String>, line: usize) -> Self {
        Self::new(ErrorKind::Syntax, message, line)
    }

    pub fn declaration(message: impl Into<String>, line: usize) -> Self {
        Self::new(ErrorKind::Declaration, message, line)
    }

    pub fn undefined(message: impl Into<String>, line: usize) -> Self {
        Self::new(ErrorKind::UndefinedReference, message, line)
    }

    pub fn arity(message: impl Into<String>, line: usize) -> Self {
        Self::new(ErrorKind::Arity, message, line)
    }

    pub fn type_error(message: impl Into<String>, line: usize) -> Self {
        Self::new(ErrorKind::Type, message, line)
    }

    /// Format the error with the offending source line underneath.
    pub fn format_with_source(&self, source: &str) -> String {
        let mut out = format!("[{}] line {}: {}", self.kind.label(), self.line, self.message);
        if let Some(text) = source.lines().nth(self.line.saturating_sub(1)) {
            out.push_str("\n    ");
            out.push_str(text.trim_end());
        }
        out
    }
}

/// Errors raised while executing bytecode.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error("unknown function '{name}'")]
    UnknownFunction { name: String },
    #[error("execution time limit of {limit:?} exceeded")]
    Timeout { limit: Duration },
    #[error("undefined variable '{name}'")]
    UndefinedVariable { name: String },
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer overflow in '{op}'")]
    Overflow { op: String },
    #[error("expected {expected}, found {found}")]
    Type { expected: String, found: String },
    #[error("invalid argument to '{function}': {message}")]
    InvalidArgument { function: String, message: String },
    #[error("'{name}' expects {expected} arguments, got {found}")]
    Arity {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("malformed bytecode: {message}")]
    MalformedBytecode { message: String },
    #[error("jump target {target} is outside the program ({len} instructions)")]
    InvalidJumpTarget { target: usize, len: usize },
    #[error("'{what}' is only available inside a binding")]
    Unsupported { what: String },
    #[error("'{what}' cannot be evaluated outside a running program")]
    NotConstant { what: String },
}

impl RuntimeError {
    pub fn malformed(message: impl Into<String>) -> Self {
        RuntimeError::MalformedBytecode {
            message: message.into(),
        }
    }

    pub fn invalid_argument(function: &str, message: impl Into<String>) -> Self {
        RuntimeError::InvalidArgument {
            function: function.to_string(),
            message: message.into(),
        }
    }

    pub fn type_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        RuntimeError::Type {
            expected: expected.into(),
            found: found.into(),
        }
    }
}
