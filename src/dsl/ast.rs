//! AST node types for the Signalize language.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::value::Value;

/// Static type of an expression or declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Type {
    Void,
    Int,
    Float,
    String,
    Bool,
    /// Named record type declared with `record Name { ... }`.
    Record(String),
}

impl Type {
    /// The fixed set of primitive types, independent of any declared record.
    pub const SIMPLE: [Type; 5] = [Type::Void, Type::Int, Type::Float, Type::String, Type::Bool];

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Float)
    }

    /// Signature letter used by the built-in catalog (`v i f s b`).
    pub fn from_signature_char(c: char) -> Option<Type> {
        match c {
            'v' => Some(Type::Void),
            'i' => Some(Type::Int),
            'f' => Some(Type::Float),
            's' => Some(Type::String),
            'b' => Some(Type::Bool),
            _ => None,
        }
    }

    pub fn from_keyword(word: &str) -> Option<Type> {
        match word {
            "void" => Some(Type::Void),
            "int" => Some(Type::Int),
            "float" => Some(Type::Float),
            "string" => Some(Type::String),
            "bool" => Some(Type::Bool),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Int => write!(f, "int"),
            Type::Float => write!(f, "float"),
            Type::String => write!(f, "string"),
            Type::Bool => write!(f, "bool"),
            Type::Record(name) => write!(f, "{name}"),
        }
    }
}

/// Flattened record layout: dotted leaf path → leaf type, in declaration order.
pub type RecordFields = IndexMap<String, Type>;

/// A variable declared directly in a stream, with the value its frame slot
/// starts out with. `bound` is true for slots that are visible as soon as the
/// frame is entered (globals); locals become visible when their declaration runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declared {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: Type,
    pub value: Value,
    #[serde(default)]
    pub bound: bool,
}

/// A lexical block: statements plus everything declared directly inside it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Stream {
    pub statements: Vec<Node>,
    pub declared: Vec<Declared>,
    pub types: IndexMap<String, RecordFields>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Typed literal.
    Value(Value),
    Variable {
        name: String,
        ty: Type,
    },
    /// `person.address.city`: `path` is the dotted leaf path, `ty` the leaf type.
    VariableInRecord {
        name: String,
        path: String,
        ty: Type,
    },
    /// `@container.key` or `@key`, resolved by the binding host at runtime.
    BindVariable {
        name: String,
    },
    /// `-x` when `logical` is false, `!x` when true.
    Negate {
        operand: Box<Node>,
        logical: bool,
    },
    Operator {
        op: BinOp,
        left: Box<Node>,
        right: Box<Node>,
        ty: Type,
    },
    Ternary {
        condition: Box<Node>,
        then_branch: Box<Node>,
        else_branch: Box<Node>,
        ty: Type,
    },
    If {
        condition: Box<Node>,
        then_branch: Stream,
        else_branch: Option<Stream>,
    },
    While {
        condition: Box<Node>,
        body: Stream,
    },
    Stream(Stream),
    Declaration {
        name: String,
        ty: Type,
        init: Option<Box<Node>>,
    },
    Assignment {
        target: Box<Node>,
        value: Box<Node>,
    },
    /// Call of a built-in function (`internalFunctionCall`).
    Call {
        name: String,
        args: Vec<Node>,
        ty: Type,
    },
}

impl Node {
    pub fn new(kind: NodeKind, line: usize) -> Self {
        Self { kind, line }
    }

    /// Inferred type of the node. Statements are `void`.
    pub fn ty(&self) -> Type {
        match &self.kind {
            NodeKind::Value(v) => v.ty(),
            NodeKind::Variable { ty, .. }
            | NodeKind::VariableInRecord { ty, .. }
            | NodeKind::Operator { ty, .. }
            | NodeKind::Ternary { ty, .. }
            | NodeKind::Call { ty, .. } => ty.clone(),
            NodeKind::BindVariable { .. } => Type::String,
            NodeKind::Negate { operand, .. } => operand.ty(),
            NodeKind::If { .. }
            | NodeKind::While { .. }
            | NodeKind::Stream(_)
            | NodeKind::Declaration { .. }
            | NodeKind::Assignment { .. } => Type::Void,
        }
    }

    /// Name written by an assignment to this node, if it is an lvalue.
    pub fn lvalue_name(&self) -> Option<String> {
        match &self.kind {
            NodeKind::Variable { name, .. } => Some(name.clone()),
            NodeKind::VariableInRecord { name, path, .. } => Some(format!("{name}.{path}")),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    And,
    Or,
}

impl BinOp {
    pub const ALL: [BinOp; 12] = [
        BinOp::Add,
        BinOp::Sub,
        BinOp::Mul,
        BinOp::Div,
        BinOp::Eq,
        BinOp::Ne,
        BinOp::Gt,
        BinOp::Lt,
        BinOp::Ge,
        BinOp::Le,
        BinOp::And,
        BinOp::Or,
    ];

    /// Bytecode spelling of the operator.
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Gt => ">",
            BinOp::Lt => "<",
            BinOp::Ge => ">=",
            BinOp::Le => "<=",
            BinOp::And => "and",
            BinOp::Or => "or",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<BinOp> {
        Self::ALL.into_iter().find(|op| op.symbol() == symbol)
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Gt | BinOp::Lt | BinOp::Ge | BinOp::Le
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinOp::And | BinOp::Or)
    }

    /// Result type for the given operand types, `void` when the combination is illegal.
    ///
    /// Mixed int/float operands are expected to have been widened already.
    pub fn infer(self, left: &Type, right: &Type) -> Type {
        if self.is_comparison() {
            return match (left, right) {
                (Type::Record(_) | Type::Void, _) | (_, Type::Record(_) | Type::Void) => Type::Void,
                (l, r) if l == r => Type::Bool,
                _ => Type::Void,
            };
        }
        match (self, left, right) {
            (BinOp::And | BinOp::Or, Type::Bool, Type::Bool) => Type::Bool,
            (BinOp::Add, Type::String, Type::String) => Type::String,
            (BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div, Type::Int, Type::Int) => Type::Int,
            (BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div, Type::Float, Type::Float) => {
                Type::Float
            }
            _ => Type::Void,
        }
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}
