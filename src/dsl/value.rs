//! Runtime values shared by the AST, the bytecode and the VM.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::ast::{RecordFields, Type};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Value {
    Void,
    Null,
    Int(i64),
    Float(f64),
    #[serde(rename = "string")]
    Str(String),
    Bool(bool),
    /// Flattened record: dotted leaf path → leaf value.
    Record(IndexMap<String, Value>),
}

impl Value {
    /// Zero value for a primitive type. Records are built with [`Value::zero_record`].
    pub fn zero(ty: &Type) -> Value {
        match ty {
            Type::Int => Value::Int(0),
            Type::Float => Value::Float(0.0),
            Type::String => Value::Str(String::new()),
            Type::Bool => Value::Bool(false),
            Type::Void | Type::Record(_) => Value::Void,
        }
    }

    pub fn zero_record(fields: &RecordFields) -> Value {
        Value::Record(
            fields
                .iter()
                .map(|(path, ty)| (path.clone(), Value::zero(ty)))
                .collect(),
        )
    }

    /// Static type of a literal. `null` has no type of its own.
    pub fn ty(&self) -> Type {
        match self {
            Value::Void | Value::Null => Type::Void,
            Value::Int(_) => Type::Int,
            Value::Float(_) => Type::Float,
            Value::Str(_) => Type::String,
            Value::Bool(_) => Type::Bool,
            Value::Record(_) => Type::Record(String::new()),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Void => "void",
            Value::Null => "null",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Bool(_) => "bool",
            Value::Record(_) => "record",
        }
    }

    /// Truthiness used by conditional jumps and `?:`.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Record(fields) => !fields.is_empty(),
            Value::Void | Value::Null => false,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Convert a JSON scalar (from a globals file or the CLI) into a value.
    pub fn from_json(json: &serde_json::Value) -> Option<Value> {
        match json {
            serde_json::Value::Null => Some(Value::Null),
            serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Value::Int)
                .or_else(|| n.as_f64().map(Value::Float)),
            serde_json::Value::String(s) => Some(Value::Str(s.clone())),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Void | Value::Null => serde_json::Value::Null,
            Value::Int(n) => serde_json::Value::from(*n),
            Value::Float(f) => serde_json::Value::from(*f),
            Value::Str(s) => serde_json::Value::from(s.as_str()),
            Value::Bool(b) => serde_json::Value::from(*b),
            Value::Record(fields) => serde_json::Value::Object(
                fields.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => Ok(()),
            Value::Null => write!(f, "null"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Record(fields) => {
                write!(f, "{{")?;
                for (i, (k, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn zero_values() {
        assert_eq!(Value::zero(&Type::Int), Value::Int(0));
        assert_eq!(Value::zero(&Type::Float), Value::Float(0.0));
        assert_eq!(Value::zero(&Type::String), Value::Str(String::new()));
        assert_eq!(Value::zero(&Type::Bool), Value::Bool(false));
    }

    #[test]
    fn zero_record_has_every_leaf() {
        let mut fields = RecordFields::new();
        fields.insert("name".into(), Type::String);
        fields.insert("address.zip".into(), Type::Int);
        let Value::Record(leaves) = Value::zero_record(&fields) else {
            panic!("expected record");
        };
        assert_eq!(leaves.get("address.zip"), Some(&Value::Int(0)));
        assert_eq!(leaves.get("name"), Some(&Value::Str(String::new())));
    }

    #[test]
    fn truthiness() {
        assert!(Value::Int(3).is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::Str(String::new()).is_truthy());
        assert!(Value::Str("x".into()).is_truthy());
        assert!(!Value::Null.is_truthy());
    }

    #[test]
    fn serializes_with_kind_tag() {
        let json = serde_json::to_string(&Value::Str("hi".into())).unwrap();
        assert_eq!(json, r#"{"kind":"string","value":"hi"}"#);
        let back: Value = serde_json::from_str(r#"{"kind":"int","value":4}"#).unwrap();
        assert_eq!(back, Value::Int(4));
    }

    #[test]
    fn json_scalars() {
        assert_eq!(Value::from_json(&serde_json::json!(2)), Some(Value::Int(2)));
        assert_eq!(Value::from_json(&serde_json::json!(2.5)), Some(Value::Float(2.5)));
        assert_eq!(Value::from_json(&serde_json::json!([1])), None);
    }
}
