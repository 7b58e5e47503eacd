use serde::Serialize;
use thiserror::Error;

use crate::dsl::error::{CompileError, RuntimeError};

/// Structured error for everything above the DSL layer. Serializes as
/// `{"code": "...", "detail": {...}}` so callers can match on the code.
#[derive(Debug, Clone, Serialize, Error)]
#[serde(tag = "code", content = "detail")]
pub enum AppError {
    #[error("{kind} error on line {line}: {message}")]
    CompileError {
        kind: String,
        line: usize,
        message: String,
    },
    #[error("Runtime error: {message}")]
    RuntimeError { message: String },
    #[error("{what} not found")]
    NotFound { what: String },
    #[error("{message}")]
    ValidationError { message: String },
    #[error("I/O error: {message}")]
    IoError { message: String },
    #[error("JSON error: {message}")]
    JsonError { message: String },
}

impl From<CompileError> for AppError {
    fn from(e: CompileError) -> Self {
        AppError::CompileError {
            kind: e.kind.label().to_string(),
            line: e.line,
            message: e.message,
        }
    }
}

impl From<RuntimeError> for AppError {
    fn from(e: RuntimeError) -> Self {
        AppError::RuntimeError {
            message: e.to_string(),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::IoError {
            message: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::JsonError {
            message: e.to_string(),
        }
    }
}

impl From<String> for AppError {
    fn from(s: String) -> Self {
        AppError::ValidationError { message: s }
    }
}

impl From<&str> for AppError {
    fn from(s: &str) -> Self {
        AppError::ValidationError {
            message: s.to_string(),
        }
    }
}
