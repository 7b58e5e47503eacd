//! UI bindings: `kind: { ... }` clauses evaluated against a configuration
//! snapshot.

pub mod config;
pub mod executer;
pub mod grammar;

pub use config::{ConfigEntry, ConfigValue, SelectedOption, SharedConfig};
pub use executer::{BindExecuter, BindOutcome, ConfigHost};
pub use grammar::{compile_bindings, BindingKind, BindingProgram};
