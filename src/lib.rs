//! Signalize: a small typed scripting language for UI bindings, compiled to
//! bytecode and run on a time-limited VM.

pub mod bind;
pub mod cache;
pub mod dsl;
pub mod error;
pub mod settings;

pub use bind::{compile_bindings, BindExecuter, BindOutcome, BindingKind, ConfigEntry};
pub use cache::ProgramCache;
pub use dsl::bytecode::{Bytecode, DEFAULT_SEPARATOR};
pub use dsl::compile_source;
pub use dsl::compiler::compile_to_bytecode;
pub use dsl::error::{CompileError, ErrorKind, RuntimeError};
pub use dsl::parser::{parse, Globals};
pub use dsl::value::Value;
pub use dsl::vm::Executer;
pub use error::AppError;
