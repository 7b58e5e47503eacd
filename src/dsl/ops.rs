//! Primitive operator semantics shared by the VM and the direct AST evaluator.

use super::ast::BinOp;
use super::error::RuntimeError;
use super::value::Value;

fn overflow(op: BinOp) -> RuntimeError {
    RuntimeError::Overflow {
        op: op.symbol().to_string(),
    }
}

fn mismatch(op: BinOp, left: &Value, right: &Value) -> RuntimeError {
    RuntimeError::type_mismatch(
        format!("operands for '{}'", op.symbol()),
        format!("{} and {}", left.type_name(), right.type_name()),
    )
}

pub fn negate(value: Value, logical: bool) -> Result<Value, RuntimeError> {
    match (value, logical) {
        (Value::Bool(b), true) => Ok(Value::Bool(!b)),
        (Value::Int(n), false) => n
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| overflow(BinOp::Sub)),
        (Value::Float(f), false) => Ok(Value::Float(-f)),
        (other, true) => Err(RuntimeError::type_mismatch("bool", other.type_name())),
        (other, false) => Err(RuntimeError::type_mismatch("int or float", other.type_name())),
    }
}

/// Runtime `negate` instruction: the operand decides between `-` and `!`.
pub fn negate_any(value: Value) -> Result<Value, RuntimeError> {
    let logical = matches!(value, Value::Bool(_));
    negate(value, logical)
}

pub fn binary(op: BinOp, left: Value, right: Value) -> Result<Value, RuntimeError> {
    match op {
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => arithmetic(op, left, right),
        BinOp::Eq => Ok(Value::Bool(equals(&left, &right))),
        BinOp::Ne => Ok(Value::Bool(!equals(&left, &right))),
        BinOp::Gt | BinOp::Lt | BinOp::Ge | BinOp::Le => compare(op, &left, &right),
        BinOp::And | BinOp::Or => match (&left, &right) {
            (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(if op == BinOp::And {
                *a && *b
            } else {
                *a || *b
            })),
            _ => Err(mismatch(op, &left, &right)),
        },
    }
}

fn arithmetic(op: BinOp, left: Value, right: Value) -> Result<Value, RuntimeError> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => {
            let result = match op {
                BinOp::Add => a.checked_add(b),
                BinOp::Sub => a.checked_sub(b),
                BinOp::Mul => a.checked_mul(b),
                _ => {
                    if b == 0 {
                        return Err(RuntimeError::DivisionByZero);
                    }
                    a.checked_div(b)
                }
            };
            result.map(Value::Int).ok_or_else(|| overflow(op))
        }
        (Value::Str(mut a), Value::Str(b)) if op == BinOp::Add => {
            a.push_str(&b);
            Ok(Value::Str(a))
        }
        (l, r) => match (l.as_float(), r.as_float()) {
            (Some(a), Some(b)) => Ok(Value::Float(match op {
                BinOp::Add => a + b,
                BinOp::Sub => a - b,
                BinOp::Mul => a * b,
                _ => a / b,
            })),
            _ => Err(mismatch(op, &l, &r)),
        },
    }
}

#[allow(clippy::float_cmp)]
fn equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            left.as_float() == right.as_float()
        }
        _ => left == right,
    }
}

fn compare(op: BinOp, left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    use std::cmp::Ordering;

    let ordering: Option<Ordering> = match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => left
            .as_float()
            .zip(right.as_float())
            .and_then(|(a, b)| a.partial_cmp(&b)),
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => return Err(mismatch(op, left, right)),
    };
    // NaN compares false with everything
    let Some(ordering) = ordering else {
        return Ok(Value::Bool(false));
    };
    Ok(Value::Bool(match op {
        BinOp::Gt => ordering == Ordering::Greater,
        BinOp::Lt => ordering == Ordering::Less,
        BinOp::Ge => ordering != Ordering::Less,
        _ => ordering != Ordering::Greater,
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn int_arithmetic_stays_int() {
        assert_eq!(
            binary(BinOp::Div, Value::Int(7), Value::Int(2)).unwrap(),
            Value::Int(3)
        );
        assert_eq!(
            binary(BinOp::Mul, Value::Int(6), Value::Int(7)).unwrap(),
            Value::Int(42)
        );
    }

    #[test]
    fn division_by_zero() {
        assert_eq!(
            binary(BinOp::Div, Value::Int(1), Value::Int(0)),
            Err(RuntimeError::DivisionByZero)
        );
    }

    #[test]
    fn overflow_is_reported() {
        assert!(matches!(
            binary(BinOp::Add, Value::Int(i64::MAX), Value::Int(1)),
            Err(RuntimeError::Overflow { .. })
        ));
    }

    #[test]
    fn strings_concatenate_but_do_not_subtract() {
        assert_eq!(
            binary(BinOp::Add, Value::Str("a".into()), Value::Str("b".into())).unwrap(),
            Value::Str("ab".into())
        );
        assert!(binary(BinOp::Sub, Value::Str("a".into()), Value::Str("b".into())).is_err());
    }

    #[test]
    fn mixed_numeric_comparison() {
        assert_eq!(
            binary(BinOp::Eq, Value::Int(2), Value::Float(2.0)).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            binary(BinOp::Lt, Value::Float(1.5), Value::Int(2)).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn negation() {
        assert_eq!(negate_any(Value::Bool(true)).unwrap(), Value::Bool(false));
        assert_eq!(negate_any(Value::Int(4)).unwrap(), Value::Int(-4));
        assert!(negate_any(Value::Str("x".into())).is_err());
    }
}
