//! Compiled-program cache keyed by source text.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::bind::grammar::{self, BindingProgram};
use crate::dsl::bytecode::Bytecode;
use crate::dsl::error::CompileError;
use crate::dsl::parser::Globals;

/// Memoizes compiled programs and binding programs. Safe to share between
/// threads; the compiled code is handed out behind `Arc`.
#[derive(Debug, Default)]
pub struct ProgramCache {
    programs: Mutex<HashMap<String, Arc<Bytecode>>>,
    bindings: Mutex<HashMap<String, Arc<BindingProgram>>>,
}

/// Globals are baked into the compiled header, so they are part of the key.
fn program_key(source: &str, globals: &Globals) -> String {
    let mut key = source.to_string();
    for (name, value) in globals {
        let _ = write!(key, "\0{name}:{}={value}", value.type_name());
    }
    key
}

impl ProgramCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compile(
        &self,
        source: &str,
        globals: &Globals,
    ) -> Result<Arc<Bytecode>, CompileError> {
        let key = program_key(source, globals);
        if let Some(program) = self.programs.lock().get(&key) {
            tracing::trace!("program cache hit");
            return Ok(Arc::clone(program));
        }
        // compiled outside the lock; a racing compile of the same source is harmless
        let program = Arc::new(crate::dsl::compile_source(source, globals)?);
        self.programs.lock().insert(key, Arc::clone(&program));
        Ok(program)
    }

    pub fn get_or_compile_bindings(&self, source: &str) -> Result<Arc<BindingProgram>, CompileError> {
        if let Some(program) = self.bindings.lock().get(source) {
            return Ok(Arc::clone(program));
        }
        let program = Arc::new(grammar::compile_bindings(source)?);
        self.bindings
            .lock()
            .insert(source.to_string(), Arc::clone(&program));
        Ok(program)
    }

    /// Drop every cached program compiled from `source`. Returns how many
    /// entries were removed.
    pub fn invalidate(&self, source: &str) -> usize {
        let mut programs = self.programs.lock();
        let before = programs.len();
        programs.retain(|key, _| key.split('\0').next() != Some(source));
        let removed = before - programs.len();
        drop(programs);
        removed + usize::from(self.bindings.lock().remove(source).is_some())
    }

    pub fn clear(&self) {
        self.programs.lock().clear();
        self.bindings.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.programs.lock().len() + self.bindings.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
