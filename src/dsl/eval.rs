//! Direct evaluation of pure expression trees, without compiling them.

use super::ast::{Node, NodeKind};
use super::builtins;
use super::error::RuntimeError;
use super::ops;
use super::value::Value;

fn not_constant(what: impl Into<String>) -> RuntimeError {
    RuntimeError::NotConstant { what: what.into() }
}

/// Evaluate a literal-only expression. Variables, binding variables,
/// statements and builtins with side effects are rejected.
pub fn evaluate(node: &Node) -> Result<Value, RuntimeError> {
    match &node.kind {
        NodeKind::Value(value) => Ok(value.clone()),
        NodeKind::Negate { operand, logical } => ops::negate(evaluate(operand)?, *logical),
        NodeKind::Operator {
            op, left, right, ..
        } => {
            let left = evaluate(left)?;
            let right = evaluate(right)?;
            ops::binary(*op, left, right)
        }
        NodeKind::Ternary {
            condition,
            then_branch,
            else_branch,
            ..
        } => {
            if evaluate(condition)?.is_truthy() {
                evaluate(then_branch)
            } else {
                evaluate(else_branch)
            }
        }
        NodeKind::Call { name, args, .. } => {
            if !builtins::is_pure(name) {
                return Err(not_constant(name.as_str()));
            }
            let values = args.iter().map(evaluate).collect::<Result<Vec<_>, _>>()?;
            // pure builtins never write output
            builtins::call(name, values, &mut String::new())
        }
        NodeKind::Variable { name, .. } => Err(not_constant(name.as_str())),
        NodeKind::VariableInRecord { .. } => {
            Err(not_constant(node.lvalue_name().unwrap_or_default()))
        }
        NodeKind::BindVariable { name } => Err(not_constant(format!("@{name}"))),
        NodeKind::If { .. }
        | NodeKind::While { .. }
        | NodeKind::Stream(_)
        | NodeKind::Declaration { .. }
        | NodeKind::Assignment { .. } => Err(not_constant("statement")),
    }
}
