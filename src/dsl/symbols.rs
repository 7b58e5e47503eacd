//! Lexical scope stack used while parsing.

use indexmap::IndexMap;

use super::ast::{Declared, RecordFields, Type};
use super::error::CompileError;
use super::value::Value;

/// Variables and record types declared directly in one block.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    pub variables: IndexMap<String, Declared>,
    pub types: IndexMap<String, RecordFields>,
}

#[derive(Debug, Default)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter a block, optionally pre-populated with bound variables (globals).
    pub fn push_scope(&mut self, initial: Vec<Declared>) {
        let variables = initial
            .into_iter()
            .map(|d| (d.name.clone(), d))
            .collect();
        self.scopes.push(Scope {
            variables,
            types: IndexMap::new(),
        });
    }

    pub fn pop_scope(&mut self) -> Scope {
        self.scopes.pop().unwrap_or_default()
    }

    /// Declare a variable in the innermost scope with its type's zero value.
    pub fn add_variable(&mut self, ty: Type, name: &str, line: usize) -> Result<(), CompileError> {
        if self.is_type_name(name) {
            return Err(CompileError::declaration(
                format!("'{name}' is a type name and cannot be used as a variable"),
                line,
            ));
        }
        if self.variable_exists_in_current_scope(name) {
            return Err(CompileError::declaration(
                format!("variable '{name}' is already declared in this scope"),
                line,
            ));
        }
        let value = self.zero_value(&ty, line)?;
        self.current_mut(line)?.variables.insert(
            name.to_string(),
            Declared {
                name: name.to_string(),
                ty,
                value,
                bound: false,
            },
        );
        Ok(())
    }

    /// Declare a record type in the innermost scope.
    pub fn add_type(
        &mut self,
        name: &str,
        fields: RecordFields,
        line: usize,
    ) -> Result<(), CompileError> {
        if Type::from_keyword(name).is_some() || self.get_variable(name).is_some() {
            return Err(CompileError::declaration(
                format!("illegal identifier '{name}' reused as a type name"),
                line,
            ));
        }
        let scope = self.current_mut(line)?;
        if scope.types.contains_key(name) {
            return Err(CompileError::declaration(
                format!("type '{name}' is already declared in this scope"),
                line,
            ));
        }
        scope.types.insert(name.to_string(), fields);
        Ok(())
    }

    /// Innermost declaration of `name`.
    pub fn get_variable(&self, name: &str) -> Option<&Declared> {
        self.scopes.iter().rev().find_map(|s| s.variables.get(name))
    }

    pub fn get_type(&self, name: &str) -> Option<&RecordFields> {
        self.scopes.iter().rev().find_map(|s| s.types.get(name))
    }

    pub fn variable_exists(&self, name: &str) -> bool {
        self.get_variable(name).is_some()
    }

    /// Declared in the innermost scope, ignoring outer ones.
    pub fn variable_exists_in_current_scope(&self, name: &str) -> bool {
        self.scopes
            .last()
            .is_some_and(|s| s.variables.contains_key(name))
    }

    pub fn is_type_name(&self, name: &str) -> bool {
        Type::from_keyword(name).is_some() || self.get_type(name).is_some()
    }

    /// Primitive type names followed by every record type visible from here.
    pub fn type_list(&self) -> Vec<String> {
        let mut names: Vec<String> = Type::SIMPLE.iter().map(ToString::to_string).collect();
        for scope in &self.scopes {
            names.extend(scope.types.keys().cloned());
        }
        names
    }

    pub fn zero_value(&self, ty: &Type, line: usize) -> Result<Value, CompileError> {
        match ty {
            Type::Record(name) => self
                .get_type(name)
                .map(Value::zero_record)
                .ok_or_else(|| CompileError::declaration(format!("unknown type '{name}'"), line)),
            other => Ok(Value::zero(other)),
        }
    }

    fn current_mut(&mut self, line: usize) -> Result<&mut Scope, CompileError> {
        self.scopes
            .last_mut()
            .ok_or_else(|| CompileError::declaration("declaration outside of any block", line))
    }
}
