//! Binding source: `kind: { ... }` clauses compiled to one program per kind.
//!
//! ```text
//! bindings := clause (',' clause)*
//! clause   := KIND ':' '{' body '}'
//! body     := expr                                  (visible enabled value click)
//!           | (STRING ':' expr (',' STRING ':' expr)*)?   (css style options)
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::dsl::ast::Node;
use crate::dsl::bytecode::Bytecode;
use crate::dsl::compiler;
use crate::dsl::error::{CompileError, RuntimeError};
use crate::dsl::lexer::{SpannedToken, Token};
use crate::dsl::parser::Parser;
use crate::dsl::typeck;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingKind {
    Visible,
    Enabled,
    Css,
    Style,
    Options,
    Value,
    Click,
}

impl BindingKind {
    pub const ALL: [BindingKind; 7] = [
        BindingKind::Visible,
        BindingKind::Enabled,
        BindingKind::Css,
        BindingKind::Style,
        BindingKind::Options,
        BindingKind::Value,
        BindingKind::Click,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BindingKind::Visible => "visible",
            BindingKind::Enabled => "enabled",
            BindingKind::Css => "css",
            BindingKind::Style => "style",
            BindingKind::Options => "options",
            BindingKind::Value => "value",
            BindingKind::Click => "click",
        }
    }

    /// Kinds whose body is a `"name": expr` map rather than one expression.
    pub fn is_map(self) -> bool {
        matches!(
            self,
            BindingKind::Css | BindingKind::Style | BindingKind::Options
        )
    }
}

impl fmt::Display for BindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BindingKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BindingKind::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| format!("unknown binding kind '{s}'"))
    }
}

/// Parsed, type-checked binding bodies.
#[derive(Debug, Clone, PartialEq)]
pub enum BindingBody {
    Expr(Node),
    Map(IndexMap<String, Node>),
}

/// Compiled binding bodies.
#[derive(Debug, Clone, PartialEq)]
pub enum CompiledBinding {
    Expr(Arc<Bytecode>),
    Map(IndexMap<String, Arc<Bytecode>>),
}

/// Every binding declared on one element, keyed by kind in source order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindingProgram {
    bindings: IndexMap<BindingKind, CompiledBinding>,
}

/// Parse binding source into one body per kind.
pub fn parse_bindings(source: &str) -> Result<IndexMap<BindingKind, BindingBody>, CompileError> {
    let mut parser = Parser::new(source);
    parser.symbols.push_scope(Vec::new());
    let mut bindings = IndexMap::new();

    if parser.lexer.peek()?.token == Token::Eof {
        return Ok(bindings);
    }
    loop {
        let (name, line) = parser.expect_ident()?;
        let kind: BindingKind = name
            .parse()
            .map_err(|message: String| CompileError::syntax(message, line))?;
        if bindings.contains_key(&kind) {
            return Err(CompileError::syntax(
                format!("binding '{kind}' declared twice"),
                line,
            ));
        }
        parser.lexer.expect(&Token::Colon)?;
        parser.lexer.expect(&Token::LBrace)?;
        let body = if kind.is_map() {
            BindingBody::Map(parse_map_body(&mut parser)?)
        } else {
            let expr = parser.parse_expr()?;
            typeck::check(&expr)?;
            BindingBody::Expr(expr)
        };
        parser.lexer.expect(&Token::RBrace)?;
        bindings.insert(kind, body);

        if !parser.lexer.optional_match(&Token::Comma)? {
            break;
        }
    }
    parser.expect_eof()?;
    Ok(bindings)
}

fn parse_map_body(parser: &mut Parser<'_>) -> Result<IndexMap<String, Node>, CompileError> {
    let mut entries = IndexMap::new();
    if parser.lexer.peek()?.token == Token::RBrace {
        return Ok(entries);
    }
    loop {
        let SpannedToken { token, line } = parser.lexer.advance()?;
        let Token::Str(name) = token else {
            return Err(CompileError::syntax(
                format!("expected a quoted name, found {}", token.describe()),
                line,
            ));
        };
        if entries.contains_key(&name) {
            return Err(CompileError::syntax(format!("'{name}' listed twice"), line));
        }
        parser.lexer.expect(&Token::Colon)?;
        let expr = parser.parse_expr()?;
        typeck::check(&expr)?;
        entries.insert(name, expr);
        if !parser.lexer.optional_match(&Token::Comma)? {
            break;
        }
    }
    Ok(entries)
}

/// Parse and compile binding source.
pub fn compile_bindings(source: &str) -> Result<BindingProgram, CompileError> {
    let parsed = parse_bindings(source)?;
    let bindings = parsed
        .into_iter()
        .map(|(kind, body)| {
            let compiled = match body {
                BindingBody::Expr(expr) => CompiledBinding::Expr(Arc::new(compiler::compile(&expr))),
                BindingBody::Map(entries) => CompiledBinding::Map(
                    entries
                        .iter()
                        .map(|(name, expr)| (name.clone(), Arc::new(compiler::compile(expr))))
                        .collect(),
                ),
            };
            (kind, compiled)
        })
        .collect();
    let program = BindingProgram { bindings };
    tracing::debug!(bindings = program.len(), "compiled bindings");
    Ok(program)
}

impl BindingProgram {
    pub fn get(&self, kind: BindingKind) -> Option<&CompiledBinding> {
        self.bindings.get(&kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = BindingKind> + '_ {
        self.bindings.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Text form: `{"visible": "<bytecode>", "css": {"name": "<bytecode>"}}`.
    pub fn to_json(&self, separator: &str) -> serde_json::Value {
        let object = self
            .bindings
            .iter()
            .map(|(kind, binding)| {
                let value = match binding {
                    CompiledBinding::Expr(code) => serde_json::Value::from(code.encode(separator)),
                    CompiledBinding::Map(entries) => serde_json::Value::Object(
                        entries
                            .iter()
                            .map(|(name, code)| {
                                (name.clone(), serde_json::Value::from(code.encode(separator)))
                            })
                            .collect(),
                    ),
                };
                (kind.name().to_string(), value)
            })
            .collect();
        serde_json::Value::Object(object)
    }

    /// Inverse of [`BindingProgram::to_json`].
    pub fn from_json(json: &serde_json::Value, separator: &str) -> Result<Self, RuntimeError> {
        let serde_json::Value::Object(object) = json else {
            return Err(RuntimeError::malformed("binding program must be an object"));
        };
        let mut bindings = IndexMap::new();
        for (name, value) in object {
            let kind: BindingKind = name.parse().map_err(RuntimeError::malformed)?;
            let compiled = match (kind.is_map(), value) {
                (false, serde_json::Value::String(text)) => {
                    CompiledBinding::Expr(Arc::new(Bytecode::decode(text, separator)?))
                }
                (true, serde_json::Value::Object(entries)) => {
                    let mut map = IndexMap::new();
                    for (entry, text) in entries {
                        let text = text.as_str().ok_or_else(|| {
                            RuntimeError::malformed(format!("'{kind}.{entry}' must be a string"))
                        })?;
                        map.insert(entry.clone(), Arc::new(Bytecode::decode(text, separator)?));
                    }
                    CompiledBinding::Map(map)
                }
                _ => {
                    return Err(RuntimeError::malformed(format!(
                        "unexpected body for binding '{kind}'"
                    )))
                }
            };
            bindings.insert(kind, compiled);
        }
        Ok(Self { bindings })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::panic)]
mod tests {
    use super::*;
    use crate::dsl::error::ErrorKind;

    #[test]
    fn kinds_parse_from_names() {
        assert_eq!("css".parse::<BindingKind>(), Ok(BindingKind::Css));
        assert!("hover".parse::<BindingKind>().is_err());
        assert!(BindingKind::Options.is_map());
        assert!(!BindingKind::Click.is_map());
    }

    #[test]
    fn clauses_in_source_order() {
        let parsed = parse_bindings(
            r#"visible: { @ui.show == 'yes' }, css: { "active": true, "wide": 1 > 2 }"#,
        )
        .unwrap();
        let kinds: Vec<_> = parsed.keys().copied().collect();
        assert_eq!(kinds, vec![BindingKind::Visible, BindingKind::Css]);
        let BindingBody::Map(css) = &parsed[&BindingKind::Css] else {
            panic!("css should be a map");
        };
        assert_eq!(css.keys().collect::<Vec<_>>(), vec!["active", "wide"]);
    }

    #[test]
    fn empty_source_has_no_bindings() {
        assert!(compile_bindings("").unwrap().is_empty());
        let program = compile_bindings("style: { }").unwrap();
        assert_eq!(program.get(BindingKind::Style), Some(&CompiledBinding::Map(IndexMap::new())));
    }

    #[test]
    fn illegal_kind_is_a_syntax_error() {
        let err = compile_bindings("hover: { true }").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Syntax);
    }

    #[test]
    fn duplicate_kind_is_rejected() {
        let err = compile_bindings("visible: { true }, visible: { false }").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Syntax);
        assert!(err.message.contains("twice"));
    }

    #[test]
    fn map_keys_must_be_strings() {
        let err = compile_bindings("css: { active: true }").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Syntax);
    }

    #[test]
    fn bodies_are_type_checked() {
        let err = compile_bindings("value: { 'a' - 1 }").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Type);
    }

    #[test]
    fn json_form_decodes_to_the_same_program() {
        let program =
            compile_bindings(r#"enabled: { !false }, options: { "a": 'x' + "y" }"#).unwrap();
        let json = program.to_json("||");
        assert!(json["enabled"].is_string());
        assert!(json["options"]["a"].is_string());
        assert_eq!(BindingProgram::from_json(&json, "||").unwrap(), program);
    }
}
