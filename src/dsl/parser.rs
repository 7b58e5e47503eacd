use indexmap::IndexMap;

use super::ast::*;
use super::builtins;
use super::error::CompileError;
use super::lexer::{Lexer, SpannedToken, Token};
use super::symbols::SymbolTable;
use super::typeck;
use super::value::Value;

/// Named values visible to a program before its first statement.
pub type Globals = IndexMap<String, Value>;

/// Parse and type-check a whole program. The result is always a `Stream` node
/// whose declared slots start with `globals`, already bound.
pub fn parse(source: &str, globals: &Globals) -> Result<Node, CompileError> {
    let mut parser = Parser::new(source);
    let root = parser.parse_program(globals)?;
    typeck::check(&root)?;
    Ok(root)
}

/// Parse and type-check a single expression with no variables in scope.
pub fn parse_expression(source: &str) -> Result<Node, CompileError> {
    let mut parser = Parser::new(source);
    parser.symbols.push_scope(Vec::new());
    let expr = parser.parse_expr()?;
    parser.expect_eof()?;
    typeck::check(&expr)?;
    Ok(expr)
}

pub(crate) struct Parser<'a> {
    pub(crate) lexer: Lexer<'a>,
    pub(crate) symbols: SymbolTable,
}

fn primitive_type(token: &Token) -> Option<Type> {
    match token {
        Token::IntTy => Some(Type::Int),
        Token::FloatTy => Some(Type::Float),
        Token::StringTy => Some(Type::String),
        Token::BoolTy => Some(Type::Bool),
        Token::VoidTy => Some(Type::Void),
        _ => None,
    }
}

/// Insert the implicit int/float conversion needed to store `node` as `target`.
fn coerce(node: Node, target: &Type) -> Node {
    match (node.ty(), target) {
        (Type::Int, Type::Float) => convert("IntToFloat", node, Type::Float),
        (Type::Float, Type::Int) => convert("FloatToInt", node, Type::Int),
        _ => node,
    }
}

fn convert(function: &str, node: Node, ty: Type) -> Node {
    let line = node.line;
    Node::new(
        NodeKind::Call {
            name: function.to_string(),
            args: vec![node],
            ty,
        },
        line,
    )
}

/// Widen the int side of a mixed int/float pair.
fn widen(left: Node, right: Node) -> (Node, Node) {
    match (left.ty(), right.ty()) {
        (Type::Int, Type::Float) => (coerce(left, &Type::Float), right),
        (Type::Float, Type::Int) => (left, coerce(right, &Type::Float)),
        _ => (left, right),
    }
}

fn binary(op: BinOp, left: Node, right: Node, line: usize) -> Node {
    let (left, right) = if op.is_logical() {
        (left, right)
    } else {
        widen(left, right)
    };
    let ty = op.infer(&left.ty(), &right.ty());
    Node::new(
        NodeKind::Operator {
            op,
            left: Box::new(left),
            right: Box::new(right),
            ty,
        },
        line,
    )
}

impl<'a> Parser<'a> {
    pub(crate) fn new(source: &'a str) -> Self {
        Self {
            lexer: Lexer::new(source),
            symbols: SymbolTable::new(),
        }
    }

    // ── Helpers ────────────────────────────────────────────────────

    pub(crate) fn expect_ident(&mut self) -> Result<(String, usize), CompileError> {
        let SpannedToken { token, line } = self.lexer.advance()?;
        match token {
            Token::Ident(name) => Ok((name, line)),
            other => Err(CompileError::syntax(
                format!("expected identifier, found {}", other.describe()),
                line,
            )),
        }
    }

    pub(crate) fn expect_eof(&mut self) -> Result<(), CompileError> {
        let tok = self.lexer.peek()?;
        if tok.token == Token::Eof {
            Ok(())
        } else {
            Err(CompileError::syntax(
                format!("unexpected {} after expression", tok.token.describe()),
                tok.line,
            ))
        }
    }

    fn peek_token(&mut self) -> Result<Token, CompileError> {
        Ok(self.lexer.peek()?.token.clone())
    }

    // ── Statements ─────────────────────────────────────────────────

    fn parse_program(&mut self, globals: &Globals) -> Result<Node, CompileError> {
        let declared = globals
            .iter()
            .map(|(name, value)| {
                let ty = value.ty();
                if !matches!(ty, Type::Int | Type::Float | Type::String | Type::Bool) {
                    return Err(CompileError::declaration(
                        format!("global '{name}' must be an int, float, string or bool"),
                        0,
                    ));
                }
                Ok(Declared {
                    name: name.clone(),
                    ty,
                    value: value.clone(),
                    bound: true,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.symbols.push_scope(declared);
        let mut statements = Vec::new();
        while self.peek_token()? != Token::Eof {
            if let Some(stmt) = self.parse_statement()? {
                statements.push(stmt);
            }
        }
        Ok(Node::new(NodeKind::Stream(self.close_stream(statements)), 1))
    }

    fn close_stream(&mut self, statements: Vec<Node>) -> Stream {
        let scope = self.symbols.pop_scope();
        Stream {
            statements,
            declared: scope.variables.into_values().collect(),
            types: scope.types,
        }
    }

    /// `{ statement* }` in a fresh scope.
    fn parse_block(&mut self) -> Result<Stream, CompileError> {
        self.lexer.expect(&Token::LBrace)?;
        self.symbols.push_scope(Vec::new());
        let mut statements = Vec::new();
        loop {
            let SpannedToken { token, line } = self.lexer.peek()?.clone();
            match token {
                Token::RBrace => {
                    self.lexer.advance()?;
                    break;
                }
                Token::Eof => {
                    return Err(CompileError::syntax("unclosed block, expected '}'", line));
                }
                _ => {
                    if let Some(stmt) = self.parse_statement()? {
                        statements.push(stmt);
                    }
                }
            }
        }
        Ok(self.close_stream(statements))
    }

    /// `None` for statements that declare something but run nothing (records).
    fn parse_statement(&mut self) -> Result<Option<Node>, CompileError> {
        let SpannedToken { token, line } = self.lexer.peek()?.clone();
        let stmt = match token {
            Token::If => self.parse_if()?,
            Token::While => self.parse_while()?,
            Token::Record => {
                self.parse_record()?;
                return Ok(None);
            }
            Token::LBrace => Node::new(NodeKind::Stream(self.parse_block()?), line),
            Token::VoidTy => {
                return Err(CompileError::declaration(
                    "variables cannot be declared void",
                    line,
                ))
            }
            Token::IntTy | Token::FloatTy | Token::StringTy | Token::BoolTy => {
                self.lexer.advance()?;
                let ty = primitive_type(&token).unwrap_or(Type::Void);
                self.parse_declaration(ty, line)?
            }
            Token::Ident(name) => {
                let next = self.lexer.lookahead()?.token.clone();
                match next {
                    Token::LParen => {
                        self.lexer.advance()?;
                        let call = self.parse_call(name, line)?;
                        self.lexer.expect(&Token::Semicolon)?;
                        call
                    }
                    Token::Ident(_) => {
                        if self.symbols.get_type(&name).is_none() {
                            let after = self.lexer.lookahead2()?.token.clone();
                            return Err(if matches!(after, Token::Semicolon | Token::Eq) {
                                CompileError::declaration(format!("unknown type '{name}'"), line)
                            } else {
                                CompileError::syntax(
                                    format!("unexpected identifier after '{name}'"),
                                    line,
                                )
                            });
                        }
                        self.lexer.advance()?;
                        self.parse_declaration(Type::Record(name), line)?
                    }
                    _ => self.parse_assignment()?,
                }
            }
            other => {
                return Err(CompileError::syntax(
                    format!("unexpected {} at start of statement", other.describe()),
                    line,
                ))
            }
        };
        Ok(Some(stmt))
    }

    fn parse_if(&mut self) -> Result<Node, CompileError> {
        let line = self.lexer.expect(&Token::If)?.line;
        let condition = self.parse_expr()?;
        let then_branch = self.parse_block()?;
        let else_branch = if self.lexer.optional_match(&Token::Else)? {
            if self.peek_token()? == Token::If {
                let nested = self.parse_if()?;
                Some(Stream {
                    statements: vec![nested],
                    ..Stream::default()
                })
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };
        Ok(Node::new(
            NodeKind::If {
                condition: Box::new(condition),
                then_branch,
                else_branch,
            },
            line,
        ))
    }

    fn parse_while(&mut self) -> Result<Node, CompileError> {
        let line = self.lexer.expect(&Token::While)?.line;
        let condition = self.parse_expr()?;
        let body = self.parse_block()?;
        Ok(Node::new(
            NodeKind::While {
                condition: Box::new(condition),
                body,
            },
            line,
        ))
    }

    /// `record Name { type field; ... }`. Record-typed fields are flattened
    /// into dotted leaf paths.
    fn parse_record(&mut self) -> Result<(), CompileError> {
        let line = self.lexer.expect(&Token::Record)?.line;
        let (name, name_line) = self.expect_ident()?;
        self.lexer.expect(&Token::LBrace)?;
        let mut fields = RecordFields::new();
        while !self.lexer.optional_match(&Token::RBrace)? {
            let SpannedToken {
                token: type_token,
                line: field_line,
            } = self.lexer.advance()?;
            let (field, _) = self.expect_ident()?;
            let leaves: Vec<(String, Type)> = match (primitive_type(&type_token), type_token) {
                (Some(Type::Void), _) => {
                    return Err(CompileError::declaration(
                        format!("field '{field}' cannot be void"),
                        field_line,
                    ))
                }
                (Some(ty), _) => vec![(field.clone(), ty)],
                (None, Token::Ident(type_name)) => self
                    .symbols
                    .get_type(&type_name)
                    .ok_or_else(|| {
                        CompileError::declaration(format!("unknown type '{type_name}'"), field_line)
                    })?
                    .iter()
                    .map(|(path, ty)| (format!("{field}.{path}"), ty.clone()))
                    .collect(),
                (None, other) => {
                    return Err(CompileError::syntax(
                        format!("expected a field type, found {}", other.describe()),
                        field_line,
                    ))
                }
            };
            for (path, ty) in leaves {
                if fields.insert(path.clone(), ty).is_some() {
                    return Err(CompileError::declaration(
                        format!("duplicate field '{path}' in record '{name}'"),
                        field_line,
                    ));
                }
            }
            self.lexer.expect(&Token::Semicolon)?;
        }
        if fields.is_empty() {
            return Err(CompileError::syntax(
                format!("record '{name}' has no fields"),
                line,
            ));
        }
        self.lexer.optional_match(&Token::Semicolon)?;
        self.symbols.add_type(&name, fields, name_line)
    }

    /// `type name [= expr];` with the type token already consumed.
    fn parse_declaration(&mut self, ty: Type, line: usize) -> Result<Node, CompileError> {
        let (name, name_line) = self.expect_ident()?;
        let init = if self.lexer.optional_match(&Token::Eq)? {
            if matches!(ty, Type::Record(_)) {
                return Err(CompileError::syntax(
                    format!("record variable '{name}' cannot have an initializer"),
                    name_line,
                ));
            }
            let value = self.parse_expr()?;
            Some(Box::new(coerce(value, &ty)))
        } else {
            None
        };
        self.lexer.expect(&Token::Semicolon)?;
        // Registered after the initializer so `int x = x;` reads the outer x.
        self.symbols.add_variable(ty.clone(), &name, name_line)?;
        Ok(Node::new(NodeKind::Declaration { name, ty, init }, line))
    }

    fn parse_assignment(&mut self) -> Result<Node, CompileError> {
        let (name, line) = self.expect_ident()?;
        let target = self.parse_variable_ref(name, line)?;
        self.lexer.expect(&Token::Eq)?;
        let value = self.parse_expr()?;
        let value = coerce(value, &target.ty());
        self.lexer.expect(&Token::Semicolon)?;
        Ok(Node::new(
            NodeKind::Assignment {
                target: Box::new(target),
                value: Box::new(value),
            },
            line,
        ))
    }

    /// A variable, or a record leaf when followed by `.field(.field)*`.
    fn parse_variable_ref(&mut self, name: String, line: usize) -> Result<Node, CompileError> {
        let ty = self
            .symbols
            .get_variable(&name)
            .map(|d| d.ty.clone())
            .ok_or_else(|| CompileError::undefined(format!("undefined variable '{name}'"), line))?;
        if self.peek_token()? != Token::Dot {
            return Ok(Node::new(NodeKind::Variable { name, ty }, line));
        }
        let Type::Record(record) = &ty else {
            return Err(CompileError::type_error(
                format!("'{name}' is a {ty}, not a record"),
                line,
            ));
        };
        let mut segments = Vec::new();
        while self.lexer.optional_match(&Token::Dot)? {
            segments.push(self.expect_ident()?.0);
        }
        let path = segments.join(".");
        let leaf = self
            .symbols
            .get_type(record)
            .and_then(|fields| fields.get(&path))
            .cloned()
            .ok_or_else(|| {
                CompileError::undefined(format!("record '{record}' has no field '{path}'"), line)
            })?;
        Ok(Node::new(
            NodeKind::VariableInRecord {
                name,
                path,
                ty: leaf,
            },
            line,
        ))
    }

    // ── Expressions ────────────────────────────────────────────────
    //
    // logical    := relational (('&&' | '||') relational)*
    // relational := term (cmp term)? ('?' expr ':' expr)?
    // term       := factor (('+' | '-') factor)*
    // factor     := unary (('*' | '/') unary)*
    // unary      := ('-' | '!') unary | primary

    pub(crate) fn parse_expr(&mut self) -> Result<Node, CompileError> {
        self.parse_logical()
    }

    fn parse_logical(&mut self) -> Result<Node, CompileError> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.peek_token()? {
                Token::And => BinOp::And,
                Token::Or => BinOp::Or,
                _ => break,
            };
            let line = self.lexer.advance()?.line;
            let right = self.parse_relational()?;
            left = binary(op, left, right, line);
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> Result<Node, CompileError> {
        let left = self.parse_term()?;
        let op = match self.peek_token()? {
            Token::EqEq => Some(BinOp::Eq),
            Token::Ne => Some(BinOp::Ne),
            Token::Gt => Some(BinOp::Gt),
            Token::Lt => Some(BinOp::Lt),
            Token::Ge => Some(BinOp::Ge),
            Token::Le => Some(BinOp::Le),
            _ => None,
        };
        let node = match op {
            Some(op) => {
                let line = self.lexer.advance()?.line;
                let right = self.parse_term()?;
                binary(op, left, right, line)
            }
            None => left,
        };
        if self.peek_token()? != Token::Question {
            return Ok(node);
        }
        let line = self.lexer.advance()?.line;
        let then_branch = self.parse_expr()?;
        self.lexer.expect(&Token::Colon)?;
        let else_branch = self.parse_expr()?;
        let (then_branch, else_branch) = widen(then_branch, else_branch);
        let ty = if then_branch.ty() == else_branch.ty() {
            then_branch.ty()
        } else {
            Type::Void
        };
        Ok(Node::new(
            NodeKind::Ternary {
                condition: Box::new(node),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
                ty,
            },
            line,
        ))
    }

    fn parse_term(&mut self) -> Result<Node, CompileError> {
        let mut left = self.parse_factor()?;
        loop {
            let op = match self.peek_token()? {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            let line = self.lexer.advance()?.line;
            let right = self.parse_factor()?;
            left = binary(op, left, right, line);
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> Result<Node, CompileError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek_token()? {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                _ => break,
            };
            let line = self.lexer.advance()?.line;
            let right = self.parse_unary()?;
            left = binary(op, left, right, line);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Node, CompileError> {
        let logical = match self.peek_token()? {
            Token::Minus => false,
            Token::Bang => true,
            _ => return self.parse_primary(),
        };
        let line = self.lexer.advance()?.line;
        let operand = self.parse_unary()?;
        Ok(Node::new(
            NodeKind::Negate {
                operand: Box::new(operand),
                logical,
            },
            line,
        ))
    }

    fn parse_primary(&mut self) -> Result<Node, CompileError> {
        let SpannedToken { token, line } = self.lexer.advance()?;
        let kind = match token {
            Token::Int(n) => NodeKind::Value(Value::Int(n)),
            Token::Float(f) => NodeKind::Value(Value::Float(f)),
            Token::Str(s) => NodeKind::Value(Value::Str(s)),
            Token::Bool(b) => NodeKind::Value(Value::Bool(b)),
            Token::Null => NodeKind::Value(Value::Null),
            Token::BindVariable(name) => NodeKind::BindVariable { name },
            Token::LParen => {
                let inner = self.parse_expr()?;
                self.lexer.expect(&Token::RParen)?;
                return Ok(inner);
            }
            Token::Ident(name) => {
                return if self.peek_token()? == Token::LParen {
                    self.parse_call(name, line)
                } else {
                    self.parse_variable_ref(name, line)
                };
            }
            other => {
                return Err(CompileError::syntax(
                    format!("unexpected {} in expression", other.describe()),
                    line,
                ))
            }
        };
        Ok(Node::new(kind, line))
    }

    /// `Name(args)` with the name already consumed.
    fn parse_call(&mut self, name: String, line: usize) -> Result<Node, CompileError> {
        self.lexer.expect(&Token::LParen)?;
        let mut args = Vec::new();
        if !self.lexer.optional_match(&Token::RParen)? {
            loop {
                args.push(self.parse_expr()?);
                if !self.lexer.optional_match(&Token::Comma)? {
                    self.lexer.expect(&Token::RParen)?;
                    break;
                }
            }
        }
        build_call(name, args, line)
    }
}

/// Check a call against the builtin catalog, filling in trailing defaults.
fn build_call(name: String, mut args: Vec<Node>, line: usize) -> Result<Node, CompileError> {
    let sig = builtins::signature(&name)
        .ok_or_else(|| CompileError::undefined(format!("unknown function '{name}'"), line))?;
    if args.len() > sig.params.len() {
        return Err(CompileError::arity(
            format!(
                "too many parameters for '{name}': expected at most {}, got {}",
                sig.params.len(),
                args.len()
            ),
            line,
        ));
    }
    let supplied = args.len();
    for param in sig.params.iter().skip(supplied) {
        let Some(default) = &param.default else {
            return Err(CompileError::arity(
                format!(
                    "too few parameters for '{name}': expected at least {}, got {supplied}",
                    sig.required()
                ),
                line,
            ));
        };
        args.push(Node::new(NodeKind::Value(default.clone()), line));
    }
    for (i, (arg, param)) in args.iter().zip(&sig.params).enumerate() {
        let found = arg.ty();
        if found != param.ty {
            return Err(CompileError::type_error(
                format!(
                    "parameter {} of '{name}' expects {}, got {found}",
                    i + 1,
                    param.ty
                ),
                arg.line,
            ));
        }
    }
    if builtins::takes_reference(&name) && args.iter().any(|a| a.lvalue_name().is_none()) {
        return Err(CompileError::type_error(
            format!("'{name}' needs a variable as its argument"),
            line,
        ));
    }
    if name == "Concat" {
        let required = sig.required();
        while args.len() > required
            && args
                .last()
                .is_some_and(|a| matches!(&a.kind, NodeKind::Value(Value::Str(s)) if s.is_empty()))
        {
            args.pop();
        }
    }
    Ok(Node::new(
        NodeKind::Call {
            name,
            args,
            ty: sig.ret,
        },
        line,
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::dsl::error::ErrorKind;

    fn parse_ok(source: &str) -> Stream {
        match parse(source, &Globals::new()).unwrap().kind {
            NodeKind::Stream(stream) => stream,
            other => panic!("expected stream, got {other:?}"),
        }
    }

    fn parse_err(source: &str) -> CompileError {
        parse(source, &Globals::new()).unwrap_err()
    }

    #[test]
    fn declaration_with_widening() {
        let stream = parse_ok("float x = 1;");
        let NodeKind::Declaration { init: Some(init), ty, .. } = &stream.statements[0].kind else {
            panic!("expected declaration");
        };
        assert_eq!(*ty, Type::Float);
        assert!(matches!(&init.kind, NodeKind::Call { name, .. } if name == "IntToFloat"));
        assert_eq!(stream.declared[0].name, "x");
        assert!(!stream.declared[0].bound);
    }

    #[test]
    fn mixed_arithmetic_promotes_int_side() {
        let expr = parse_expression("1 + 2.5").unwrap();
        assert_eq!(expr.ty(), Type::Float);
        let NodeKind::Operator { left, .. } = &expr.kind else {
            panic!("expected operator");
        };
        assert!(matches!(&left.kind, NodeKind::Call { name, .. } if name == "IntToFloat"));
    }

    #[test]
    fn comparison_is_bool() {
        assert_eq!(parse_expression("1 < 2.0").unwrap().ty(), Type::Bool);
        assert_eq!(parse_expression("'a' == 'b'").unwrap().ty(), Type::Bool);
    }

    #[test]
    fn logical_operators_are_left_associative() {
        let expr = parse_expression("true || false && false").unwrap();
        let NodeKind::Operator { op, left, .. } = &expr.kind else {
            panic!("expected operator");
        };
        assert_eq!(*op, BinOp::And);
        assert!(matches!(&left.kind, NodeKind::Operator { op: BinOp::Or, .. }));
    }

    #[test]
    fn ternary() {
        let expr = parse_expression("1 > 2 ? 'a' : 'b'").unwrap();
        assert!(matches!(expr.kind, NodeKind::Ternary { .. }));
        assert_eq!(expr.ty(), Type::String);
        assert_eq!(parse_expression("true ? 1 : 2.5").unwrap().ty(), Type::Float);
        assert_eq!(
            parse_expression("true ? 1 : 'x'").unwrap_err().kind,
            ErrorKind::Type
        );
    }

    #[test]
    fn string_to_int_is_a_type_error() {
        let err = parse_err("int x = \"hello\";");
        assert_eq!(err.kind, ErrorKind::Type);
        assert_eq!(err.line, 1);
    }

    #[test]
    fn only_plus_works_on_strings() {
        assert_eq!(parse_expression("'a' + 'b'").unwrap().ty(), Type::String);
        assert_eq!(parse_expression("'a' - 'b'").unwrap_err().kind, ErrorKind::Type);
        assert_eq!(parse_expression("'a' + 1").unwrap_err().kind, ErrorKind::Type);
    }

    #[test]
    fn default_parameters_are_filled() {
        let expr = parse_expression("Pos('abc', 'b')").unwrap();
        let NodeKind::Call { args, ty, .. } = &expr.kind else {
            panic!("expected call");
        };
        assert_eq!(*ty, Type::Int);
        assert_eq!(args.len(), 3);
        assert_eq!(args[2].kind, NodeKind::Value(Value::Int(0)));
    }

    #[test]
    fn concat_trims_trailing_defaults() {
        let expr = parse_expression("Concat('a', 'b')").unwrap();
        let NodeKind::Call { args, .. } = &expr.kind else {
            panic!("expected call");
        };
        assert_eq!(args.len(), 2);
        let expr = parse_expression("Concat('a', 'b', 'c', '')").unwrap();
        let NodeKind::Call { args, .. } = &expr.kind else {
            panic!("expected call");
        };
        assert_eq!(args.len(), 3);
    }

    #[test]
    fn arity_errors() {
        assert_eq!(parse_expression("Pos('a')").unwrap_err().kind, ErrorKind::Arity);
        assert_eq!(
            parse_expression("Length('a', 'b')").unwrap_err().kind,
            ErrorKind::Arity
        );
        assert_eq!(
            parse_expression("Round(1)").unwrap_err().kind,
            ErrorKind::Type
        );
        assert_eq!(
            parse_expression("Nope(1)").unwrap_err().kind,
            ErrorKind::UndefinedReference
        );
    }

    #[test]
    fn inc_needs_a_variable() {
        parse_ok("int i = 0; Inc(i);");
        assert_eq!(parse_err("Inc(1);").kind, ErrorKind::Type);
    }

    #[test]
    fn undefined_variable() {
        let err = parse_err("int x = 1;\ny = 2;");
        assert_eq!(err.kind, ErrorKind::UndefinedReference);
        assert_eq!(err.line, 2);
    }

    #[test]
    fn duplicate_declaration_in_same_block() {
        assert_eq!(parse_err("int x; int x;").kind, ErrorKind::Declaration);
        parse_ok("int x; { int x; }");
    }

    #[test]
    fn if_else_if_chain() {
        let stream = parse_ok("int x = 1; if x > 0 { x = 2; } else if x < 0 { x = 3; } else { x = 4; }");
        let NodeKind::If { else_branch: Some(otherwise), .. } = &stream.statements[1].kind else {
            panic!("expected if/else");
        };
        assert!(matches!(otherwise.statements[0].kind, NodeKind::If { .. }));
    }

    #[test]
    fn condition_must_be_bool() {
        assert_eq!(parse_err("if 1 { }").kind, ErrorKind::Type);
        assert_eq!(parse_err("while 'x' { }").kind, ErrorKind::Type);
    }

    #[test]
    fn records_flatten_nested_fields() {
        let stream = parse_ok(
            "record Address { string city; int zip; }
             record Person { string name; Address home; }
             Person p;
             p.home.city = 'Oslo';",
        );
        let fields = stream.types.get("Person").unwrap();
        assert_eq!(
            fields.keys().cloned().collect::<Vec<_>>(),
            vec!["name", "home.city", "home.zip"]
        );
        let NodeKind::Assignment { target, .. } = &stream.statements[1].kind else {
            panic!("expected assignment");
        };
        assert_eq!(target.lvalue_name().as_deref(), Some("p.home.city"));
        assert_eq!(target.ty(), Type::String);
    }

    #[test]
    fn record_errors() {
        let base = "record P { int x; } ";
        assert_eq!(parse_err(&format!("{base}P p = 1;")).kind, ErrorKind::Syntax);
        assert_eq!(
            parse_err(&format!("{base}P p; p.y = 1;")).kind,
            ErrorKind::UndefinedReference
        );
        assert_eq!(parse_err("Q q;").kind, ErrorKind::Declaration);
        assert_eq!(parse_err("record R { }").kind, ErrorKind::Syntax);
        assert_eq!(parse_err("int R; record R { int a; }").kind, ErrorKind::Declaration);
    }

    #[test]
    fn globals_are_bound_slots() {
        let mut globals = Globals::new();
        globals.insert("limit".into(), Value::Int(3));
        let root = parse("int y = limit + 1;", &globals).unwrap();
        let NodeKind::Stream(stream) = root.kind else {
            panic!("expected stream");
        };
        assert_eq!(stream.declared[0].name, "limit");
        assert!(stream.declared[0].bound);
        assert_eq!(stream.declared[0].value, Value::Int(3));
    }

    #[test]
    fn bind_variables_are_strings() {
        let expr = parse_expression("@ui.color == 'red'").unwrap();
        assert_eq!(expr.ty(), Type::Bool);
    }

    #[test]
    fn trailing_tokens_rejected() {
        assert_eq!(parse_expression("1 2").unwrap_err().kind, ErrorKind::Syntax);
        assert_eq!(parse_err("int x = 1").kind, ErrorKind::Syntax);
    }
}
