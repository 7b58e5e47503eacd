//! Post-parse type check.
//!
//! The parser infers a type for every node as it builds the tree; illegal
//! combinations are recorded as `void`. This pass walks the finished tree and
//! turns those into errors, along with non-bool conditions and assignments
//! whose sides cannot be converted.

use super::ast::*;
use super::error::CompileError;

pub fn check(node: &Node) -> Result<(), CompileError> {
    match &node.kind {
        NodeKind::Value(_)
        | NodeKind::Variable { .. }
        | NodeKind::VariableInRecord { .. }
        | NodeKind::BindVariable { .. } => Ok(()),
        NodeKind::Negate { operand, logical } => {
            check(operand)?;
            let ty = operand.ty();
            if *logical && ty != Type::Bool {
                return Err(CompileError::type_error(
                    format!("'!' needs a bool operand, got {ty}"),
                    node.line,
                ));
            }
            if !*logical && !ty.is_numeric() {
                return Err(CompileError::type_error(
                    format!("'-' needs an int or float operand, got {ty}"),
                    node.line,
                ));
            }
            Ok(())
        }
        NodeKind::Operator {
            op,
            left,
            right,
            ty,
        } => {
            check(left)?;
            check(right)?;
            if *ty == Type::Void {
                return Err(CompileError::type_error(
                    format!(
                        "operator '{op}' cannot be applied to {} and {}",
                        left.ty(),
                        right.ty()
                    ),
                    node.line,
                ));
            }
            Ok(())
        }
        NodeKind::Ternary {
            condition,
            then_branch,
            else_branch,
            ty,
        } => {
            check_condition(condition, "?:")?;
            check(then_branch)?;
            check(else_branch)?;
            if *ty == Type::Void {
                return Err(CompileError::type_error(
                    format!(
                        "branches of '?:' have incompatible types {} and {}",
                        then_branch.ty(),
                        else_branch.ty()
                    ),
                    node.line,
                ));
            }
            Ok(())
        }
        NodeKind::If {
            condition,
            then_branch,
            else_branch,
        } => {
            check_condition(condition, "if")?;
            check_stream(then_branch)?;
            else_branch.as_ref().map_or(Ok(()), check_stream)
        }
        NodeKind::While { condition, body } => {
            check_condition(condition, "while")?;
            check_stream(body)
        }
        NodeKind::Stream(stream) => check_stream(stream),
        NodeKind::Declaration { name, ty, init } => match init {
            Some(init) => {
                check(init)?;
                check_assignable(ty, &init.ty(), name, node.line)
            }
            None => Ok(()),
        },
        NodeKind::Assignment { target, value } => {
            check(value)?;
            let name = target.lvalue_name().unwrap_or_default();
            check_assignable(&target.ty(), &value.ty(), &name, node.line)
        }
        NodeKind::Call { args, .. } => args.iter().try_for_each(check),
    }
}

fn check_stream(stream: &Stream) -> Result<(), CompileError> {
    stream.statements.iter().try_for_each(check)
}

fn check_condition(condition: &Node, construct: &str) -> Result<(), CompileError> {
    check(condition)?;
    let ty = condition.ty();
    if ty == Type::Bool {
        Ok(())
    } else {
        Err(CompileError::type_error(
            format!("condition of '{construct}' must be bool, got {ty}"),
            condition.line,
        ))
    }
}

/// Equal non-void types, or any int/float pair.
pub fn assignable(target: &Type, value: &Type) -> bool {
    (target == value && *target != Type::Void) || (target.is_numeric() && value.is_numeric())
}

fn check_assignable(
    target: &Type,
    value: &Type,
    name: &str,
    line: usize,
) -> Result<(), CompileError> {
    if assignable(target, value) {
        Ok(())
    } else {
        Err(CompileError::type_error(
            format!("cannot assign {value} to '{name}' of type {target}"),
            line,
        ))
    }
}
