//! Binding VM: the base [`Executer`] with a host that resolves `@` variables
//! against a configuration snapshot and implements the binding builtins.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;

use super::config::{self, ConfigEntry, ConfigValue};
use super::grammar::{BindingKind, BindingProgram, CompiledBinding};
use crate::dsl::bytecode::Bytecode;
use crate::dsl::error::RuntimeError;
use crate::dsl::value::Value;
use crate::dsl::vm::{Executer, Host};

pub const DEFAULT_TIME_LIMIT: Duration = Duration::from_secs(1);

/// Host backed by a borrowed snapshot and a simple `name → text` table.
pub struct ConfigHost<'a> {
    symbols: &'a HashMap<String, String>,
    config: &'a mut [ConfigEntry],
}

impl<'a> ConfigHost<'a> {
    pub fn new(symbols: &'a HashMap<String, String>, config: &'a mut [ConfigEntry]) -> Self {
        Self { symbols, config }
    }

    fn selected_option(&self, container: &str, key: &str) -> Option<&config::SelectedOption> {
        config::find(&*self.config, container, key).and_then(|e| e.selected_option.as_ref())
    }
}

fn text_arg<'v>(function: &str, args: &'v [Value], index: usize) -> Result<&'v str, RuntimeError> {
    match args.get(index) {
        Some(Value::Str(s)) => Ok(s.as_str()),
        Some(other) => Err(RuntimeError::type_mismatch("string", other.type_name())),
        None => Err(RuntimeError::invalid_argument(
            function,
            format!("missing argument {}", index + 1),
        )),
    }
}

impl Host for ConfigHost<'_> {
    fn resolve(&mut self, name: &str) -> Result<Value, RuntimeError> {
        let text = match name.split_once('.') {
            Some((container, key)) => {
                config::find(&*self.config, container, key).map(|e| e.value.as_text())
            }
            None => self.symbols.get(name).cloned(),
        };
        Ok(Value::Str(text.unwrap_or_default()))
    }

    fn call(&mut self, name: &str, args: &[Value]) -> Option<Result<Value, RuntimeError>> {
        match name {
            "GetSelectedOptionId" => Some(self.selected_option_id(args)),
            "GetSelectedOptionExtraValue" => Some(self.selected_option_extra(args)),
            "SetValue" => Some(self.set_value(args)),
            _ => None,
        }
    }
}

impl ConfigHost<'_> {
    fn selected_option_id(&self, args: &[Value]) -> Result<Value, RuntimeError> {
        let container = text_arg("GetSelectedOptionId", args, 0)?;
        let key = text_arg("GetSelectedOptionId", args, 1)?;
        let id = self
            .selected_option(container, key)
            .map(|o| o.id.clone())
            .unwrap_or_default();
        Ok(Value::Str(id))
    }

    fn selected_option_extra(&self, args: &[Value]) -> Result<Value, RuntimeError> {
        let container = text_arg("GetSelectedOptionExtraValue", args, 0)?;
        let key = text_arg("GetSelectedOptionExtraValue", args, 1)?;
        let index = match args.get(2) {
            Some(Value::Int(n)) => *n,
            Some(other) => return Err(RuntimeError::type_mismatch("int", other.type_name())),
            None => 0,
        };
        let extra = self
            .selected_option(container, key)
            .zip(usize::try_from(index).ok())
            .and_then(|(o, i)| o.extra_values.get(i).cloned())
            .unwrap_or_default();
        Ok(Value::Str(extra))
    }

    /// Overwrite the first matching entry; no match leaves the snapshot alone.
    fn set_value(&mut self, args: &[Value]) -> Result<Value, RuntimeError> {
        let container = text_arg("SetValue", args, 0)?;
        let key = text_arg("SetValue", args, 1)?;
        let value = text_arg("SetValue", args, 2)?;
        match config::find_mut(&mut *self.config, container, key) {
            Some(entry) => {
                tracing::info!(container, key, value, "configuration value set");
                entry.value = ConfigValue::Text(value.to_string());
            }
            None => tracing::debug!(container, key, "SetValue matched no entry"),
        }
        Ok(Value::Void)
    }
}

/// What a binding produced.
#[derive(Debug, Clone, PartialEq)]
pub enum BindOutcome {
    Value(Value),
    Map(IndexMap<String, Value>),
    /// `click`, or a kind the element does not bind.
    Nothing,
}

impl BindOutcome {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            BindOutcome::Value(value) => value.to_json(),
            BindOutcome::Map(entries) => serde_json::Value::Object(
                entries.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            BindOutcome::Nothing => serde_json::Value::Null,
        }
    }
}

/// Runs the bindings of one element against a borrowed snapshot. Writes made
/// by `SetValue` land directly in the caller's entries.
pub struct BindExecuter<'a> {
    program: Arc<BindingProgram>,
    symbols: HashMap<String, String>,
    config: &'a mut [ConfigEntry],
    time_limit: Duration,
    output: String,
}

impl<'a> BindExecuter<'a> {
    pub fn new(
        program: Arc<BindingProgram>,
        symbols: &HashMap<String, String>,
        config: &'a mut [ConfigEntry],
    ) -> Self {
        Self {
            program,
            symbols: symbols.clone(),
            config,
            time_limit: DEFAULT_TIME_LIMIT,
            output: String::new(),
        }
    }

    /// Decode the JSON text form produced by [`BindingProgram::to_json`].
    pub fn from_text(
        text: &str,
        separator: &str,
        symbols: &HashMap<String, String>,
        config: &'a mut [ConfigEntry],
    ) -> Result<Self, RuntimeError> {
        let json: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| RuntimeError::malformed(format!("binding program: {e}")))?;
        let program = BindingProgram::from_json(&json, separator)?;
        Ok(Self::new(Arc::new(program), symbols, config))
    }

    pub fn with_time_limit(mut self, time_limit: Duration) -> Self {
        self.time_limit = time_limit;
        self
    }

    /// Text written by `Write`/`WriteLn` across every execution so far.
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Evaluate the binding of `kind`.
    pub fn execute_bytecode(&mut self, kind: BindingKind) -> Result<BindOutcome, RuntimeError> {
        let program = Arc::clone(&self.program);
        let Some(binding) = program.get(kind) else {
            return Ok(BindOutcome::Nothing);
        };
        tracing::debug!(%kind, "executing binding");
        match (kind, binding) {
            (BindingKind::Visible | BindingKind::Enabled, CompiledBinding::Expr(code)) => {
                match self.evaluate(code)? {
                    value @ Value::Bool(_) => Ok(BindOutcome::Value(value)),
                    other => Err(RuntimeError::type_mismatch("bool", other.type_name())),
                }
            }
            (BindingKind::Click, CompiledBinding::Expr(code)) => {
                self.evaluate(code)?;
                Ok(BindOutcome::Nothing)
            }
            (_, CompiledBinding::Expr(code)) => Ok(BindOutcome::Value(self.evaluate(code)?)),
            (_, CompiledBinding::Map(entries)) => {
                let mut results = IndexMap::with_capacity(entries.len());
                for (name, code) in entries {
                    results.insert(name.clone(), self.evaluate(code)?);
                }
                Ok(BindOutcome::Map(results))
            }
        }
    }

    /// Evaluate every binding in declaration order.
    pub fn execute_all(&mut self) -> Result<IndexMap<BindingKind, BindOutcome>, RuntimeError> {
        let kinds: Vec<_> = self.program.kinds().collect();
        kinds
            .into_iter()
            .map(|kind| Ok((kind, self.execute_bytecode(kind)?)))
            .collect()
    }

    fn evaluate(&mut self, code: &Arc<Bytecode>) -> Result<Value, RuntimeError> {
        let host = ConfigHost::new(&self.symbols, &mut *self.config);
        let mut vm = Executer::with_host(Arc::clone(code), host);
        let result = vm.run(self.time_limit)?;
        self.output.push_str(vm.output());
        Ok(result.unwrap_or(Value::Void))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::panic)]
mod tests {
    use super::*;
    use crate::bind::config::SelectedOption;
    use crate::bind::grammar::compile_bindings;

    fn snapshot() -> Vec<ConfigEntry> {
        vec![
            ConfigEntry::new("ui", "mode", ConfigValue::Text("dark".into())),
            ConfigEntry::new("ui", "count", ConfigValue::Number(7_i64.into())),
            ConfigEntry::new("form", "size", ConfigValue::Text("L".into())).with_selected_option(
                SelectedOption {
                    id: "large".into(),
                    extra_values: vec!["40".into(), "42".into()],
                },
            ),
        ]
    }

    fn run(source: &str, kind: BindingKind, config: &mut [ConfigEntry]) -> BindOutcome {
        let program = Arc::new(compile_bindings(source).unwrap());
        let symbols = HashMap::from([("user".to_string(), "ada".to_string())]);
        BindExecuter::new(program, &symbols, config)
            .execute_bytecode(kind)
            .unwrap()
    }

    #[test]
    fn visible_reads_the_snapshot() {
        let mut config = snapshot();
        let outcome = run("visible: { @ui.mode == 'dark' }", BindingKind::Visible, &mut config);
        assert_eq!(outcome, BindOutcome::Value(Value::Bool(true)));
    }

    #[test]
    fn unmatched_lookup_is_empty() {
        let mut config = snapshot();
        let outcome = run("value: { @ui.nothing }", BindingKind::Value, &mut config);
        assert_eq!(outcome, BindOutcome::Value(Value::Str(String::new())));
    }

    #[test]
    fn plain_names_use_the_symbol_table() {
        let mut config = snapshot();
        let outcome = run("value: { 'hi ' + @user }", BindingKind::Value, &mut config);
        assert_eq!(outcome, BindOutcome::Value(Value::Str("hi ada".into())));
    }

    #[test]
    fn visible_must_be_bool() {
        let mut config = snapshot();
        let program = Arc::new(compile_bindings("visible: { @ui.mode }").unwrap());
        let err = BindExecuter::new(program, &HashMap::new(), &mut config)
            .execute_bytecode(BindingKind::Visible)
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Type { .. }));
    }

    #[test]
    fn css_collects_a_map() {
        let mut config = snapshot();
        let outcome = run(
            r#"css: { "dark": @ui.mode == 'dark', "big": StrToInt(@ui.count) > 10 }"#,
            BindingKind::Css,
            &mut config,
        );
        let BindOutcome::Map(map) = outcome else {
            panic!("css yields a map");
        };
        assert_eq!(map["dark"], Value::Bool(true));
        assert_eq!(map["big"], Value::Bool(false));
    }

    #[test]
    fn selected_option_queries() {
        let mut config = snapshot();
        let outcome = run(
            "value: { GetSelectedOptionId('form', 'size') + '/' + GetSelectedOptionExtraValue('form', 'size', 1) }",
            BindingKind::Value,
            &mut config,
        );
        assert_eq!(outcome, BindOutcome::Value(Value::Str("large/42".into())));
        let outcome = run(
            "value: { GetSelectedOptionExtraValue('form', 'size', 9) }",
            BindingKind::Value,
            &mut config,
        );
        assert_eq!(outcome, BindOutcome::Value(Value::Str(String::new())));
    }

    #[test]
    fn click_mutates_the_callers_snapshot() {
        let mut config = snapshot();
        let outcome = run(
            "click: { SetValue('ui', 'mode', 'light') }",
            BindingKind::Click,
            &mut config,
        );
        assert_eq!(outcome, BindOutcome::Nothing);
        assert_eq!(config[0].value, ConfigValue::Text("light".into()));
    }

    #[test]
    fn set_value_without_match_is_a_no_op() {
        let mut config = snapshot();
        let before = config.clone();
        run("click: { SetValue('nope', 'x', 'y') }", BindingKind::Click, &mut config);
        assert_eq!(config, before);
    }

    #[test]
    fn unbound_kind_yields_nothing() {
        let mut config = snapshot();
        assert_eq!(
            run("visible: { true }", BindingKind::Style, &mut config),
            BindOutcome::Nothing
        );
    }

    #[test]
    fn text_form_round_trips_through_the_executer() {
        let program = compile_bindings("enabled: { @ui.count == '7' }").unwrap();
        let text = program.to_json("||").to_string();
        let mut config = snapshot();
        let mut bind = BindExecuter::from_text(&text, "||", &HashMap::new(), &mut config).unwrap();
        assert_eq!(
            bind.execute_bytecode(BindingKind::Enabled).unwrap(),
            BindOutcome::Value(Value::Bool(true))
        );
    }
}
