//! Flat prefix-order instruction list and its separator-delimited text form.
//!
//! Every instruction is a short text tag with an optional payload:
//!
//! | text                | instruction                                   |
//! |---------------------|-----------------------------------------------|
//! | `n:42`, `n:2.5`     | numeric literal (int when it is all digits)   |
//! | `s:text`            | string literal                                |
//! | `b:true`, `null`    | bool / null literal                           |
//! | `id:x`, `id:p.a.b`  | load a variable or record leaf                |
//! | `@:ui.color`        | load a binding variable from the host         |
//! | `=x`                | assign the next expression                    |
//! | `var:x:1`           | make a local visible, `1` = next is its value |
//! | `fc:Name:2`         | call a builtin with the next 2 expressions    |
//! | `if:T`              | evaluate condition, jump to T when false      |
//! | `jmp:T`             | jump to T                                     |
//! | `?:E:T`             | `cond then else`: else at E, end at T         |
//! | `ts##N##[...]`      | block of the next N instructions + its slots  |
//! | `negate`, `+`, `and`| operators, operands follow                    |
//!
//! Inside an encoded program, `\` and the first character of the separator
//! are escaped with a backslash so payloads can contain either.

use std::fmt;
use std::str::FromStr;

use super::ast::{BinOp, Declared};
use super::error::RuntimeError;

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Null,
    Load(String),
    BindLoad(String),
    Assign(String),
    Declare { name: String, init: bool },
    Call { name: String, argc: usize },
    JumpIfFalse(usize),
    Jump(usize),
    Select { otherwise: usize, end: usize },
    Block { count: usize, declared: Vec<Declared> },
    Negate,
    Binary(BinOp),
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Int(n) => write!(f, "n:{n}"),
            Instruction::Float(x) => write!(f, "n:{x:?}"),
            Instruction::Str(s) => write!(f, "s:{s}"),
            Instruction::Bool(b) => write!(f, "b:{b}"),
            Instruction::Null => write!(f, "null"),
            Instruction::Load(name) => write!(f, "id:{name}"),
            Instruction::BindLoad(name) => write!(f, "@:{name}"),
            Instruction::Assign(name) => write!(f, "={name}"),
            Instruction::Declare { name, init } => write!(f, "var:{name}:{}", u8::from(*init)),
            Instruction::Call { name, argc } => write!(f, "fc:{name}:{argc}"),
            Instruction::JumpIfFalse(target) => write!(f, "if:{target}"),
            Instruction::Jump(target) => write!(f, "jmp:{target}"),
            Instruction::Select { otherwise, end } => write!(f, "?:{otherwise}:{end}"),
            Instruction::Block { count, declared } => {
                let slots = serde_json::to_string(declared).map_err(|_| fmt::Error)?;
                write!(f, "ts##{count}##{slots}")
            }
            Instruction::Negate => write!(f, "negate"),
            Instruction::Binary(op) => write!(f, "{}", op.symbol()),
        }
    }
}

fn index(text: &str, what: &str) -> Result<usize, RuntimeError> {
    text.parse()
        .map_err(|_| RuntimeError::malformed(format!("bad {what} '{text}'")))
}

fn is_int_literal(text: &str) -> bool {
    let digits = text.strip_prefix(['+', '-']).unwrap_or(text);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

impl FromStr for Instruction {
    type Err = RuntimeError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        match text {
            "null" => return Ok(Instruction::Null),
            "negate" => return Ok(Instruction::Negate),
            _ => {}
        }
        if let Some(op) = BinOp::from_symbol(text) {
            return Ok(Instruction::Binary(op));
        }
        if let Some(rest) = text.strip_prefix("ts##") {
            let (count, slots) = rest
                .split_once("##")
                .ok_or_else(|| RuntimeError::malformed(format!("bad block header '{text}'")))?;
            let declared = serde_json::from_str(slots)
                .map_err(|e| RuntimeError::malformed(format!("bad block slots: {e}")))?;
            return Ok(Instruction::Block {
                count: index(count, "block length")?,
                declared,
            });
        }
        if let Some(payload) = text.strip_prefix("n:") {
            if is_int_literal(payload) {
                return payload
                    .parse()
                    .map(Instruction::Int)
                    .map_err(|_| RuntimeError::malformed(format!("int out of range '{payload}'")));
            }
            return payload
                .parse()
                .map(Instruction::Float)
                .map_err(|_| RuntimeError::malformed(format!("bad number '{payload}'")));
        }
        if let Some(payload) = text.strip_prefix("s:") {
            return Ok(Instruction::Str(payload.to_string()));
        }
        if let Some(payload) = text.strip_prefix("b:") {
            return match payload {
                "true" => Ok(Instruction::Bool(true)),
                "false" => Ok(Instruction::Bool(false)),
                _ => Err(RuntimeError::malformed(format!("bad bool '{payload}'"))),
            };
        }
        if let Some(name) = text.strip_prefix("id:") {
            return Ok(Instruction::Load(name.to_string()));
        }
        if let Some(name) = text.strip_prefix("@:") {
            return Ok(Instruction::BindLoad(name.to_string()));
        }
        if let Some(rest) = text.strip_prefix("var:") {
            let (name, init) = rest
                .rsplit_once(':')
                .ok_or_else(|| RuntimeError::malformed(format!("bad declaration '{text}'")))?;
            return Ok(Instruction::Declare {
                name: name.to_string(),
                init: init == "1",
            });
        }
        if let Some(rest) = text.strip_prefix("fc:") {
            let (name, argc) = rest
                .rsplit_once(':')
                .ok_or_else(|| RuntimeError::malformed(format!("bad call '{text}'")))?;
            return Ok(Instruction::Call {
                name: name.to_string(),
                argc: index(argc, "argument count")?,
            });
        }
        if let Some(target) = text.strip_prefix("if:") {
            return Ok(Instruction::JumpIfFalse(index(target, "jump target")?));
        }
        if let Some(target) = text.strip_prefix("jmp:") {
            return Ok(Instruction::Jump(index(target, "jump target")?));
        }
        if let Some(rest) = text.strip_prefix("?:") {
            let (otherwise, end) = rest
                .split_once(':')
                .ok_or_else(|| RuntimeError::malformed(format!("bad select '{text}'")))?;
            return Ok(Instruction::Select {
                otherwise: index(otherwise, "jump target")?,
                end: index(end, "jump target")?,
            });
        }
        if let Some(name) = text.strip_prefix('=') {
            if !name.is_empty() {
                return Ok(Instruction::Assign(name.to_string()));
            }
        }
        Err(RuntimeError::malformed(format!("unknown instruction '{text}'")))
    }
}

/// Default separator between encoded instructions.
pub const DEFAULT_SEPARATOR: &str = "||";

pub fn check_separator(separator: &str) -> Result<char, RuntimeError> {
    match separator.chars().next() {
        None => Err(RuntimeError::malformed("separator must not be empty")),
        Some('\\') => Err(RuntimeError::malformed("separator must not start with '\\'")),
        Some(first) => Ok(first),
    }
}

fn escape(text: &str, special: char, out: &mut String) {
    for c in text.chars() {
        if c == '\\' || c == special {
            out.push('\\');
        }
        out.push(c);
    }
}

/// Split on unescaped separators, removing the escapes.
fn split_escaped(text: &str, separator: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut rest = text;
    while let Some(c) = rest.chars().next() {
        if c == '\\' {
            rest = &rest[1..];
            if let Some(escaped) = rest.chars().next() {
                current.push(escaped);
                rest = &rest[escaped.len_utf8()..];
            }
        } else if let Some(after) = rest.strip_prefix(separator) {
            pieces.push(std::mem::take(&mut current));
            rest = after;
        } else {
            current.push(c);
            rest = &rest[c.len_utf8()..];
        }
    }
    pieces.push(current);
    pieces
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Bytecode {
    pub instructions: Vec<Instruction>,
}

impl Bytecode {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self { instructions }
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Text form with instructions joined by `separator`.
    pub fn encode(&self, separator: &str) -> String {
        let special = separator.chars().next().unwrap_or('\\');
        let mut out = String::new();
        for (i, instruction) in self.instructions.iter().enumerate() {
            if i > 0 {
                out.push_str(separator);
            }
            escape(&instruction.to_string(), special, &mut out);
        }
        out
    }

    pub fn decode(text: &str, separator: &str) -> Result<Self, RuntimeError> {
        check_separator(separator)?;
        if text.is_empty() {
            return Ok(Self::default());
        }
        let instructions = split_escaped(text, separator)
            .iter()
            .map(|piece| piece.parse())
            .collect::<Result<Vec<Instruction>, _>>()?;
        let program = Self { instructions };
        program.validate()?;
        Ok(program)
    }

    /// Every jump lands inside the program (or just past its end) and every
    /// block fits in what follows its header.
    pub fn validate(&self) -> Result<(), RuntimeError> {
        let len = self.len();
        let check = |target: usize| {
            if target <= len {
                Ok(())
            } else {
                Err(RuntimeError::InvalidJumpTarget { target, len })
            }
        };
        for (at, instruction) in self.instructions.iter().enumerate() {
            match instruction {
                Instruction::JumpIfFalse(target) | Instruction::Jump(target) => check(*target)?,
                Instruction::Select { otherwise, end } => {
                    check(*end)?;
                    if *otherwise > *end || *otherwise <= at {
                        return Err(RuntimeError::InvalidJumpTarget {
                            target: *otherwise,
                            len,
                        });
                    }
                }
                Instruction::Block { count, .. } => check(at + 1 + count)?,
                _ => {}
            }
        }
        Ok(())
    }
}

impl fmt::Display for Bytecode {
    /// One instruction per line, prefixed with its index.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, instruction) in self.instructions.iter().enumerate() {
            writeln!(f, "{i:>4}  {instruction}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::dsl::ast::Type;
    use crate::dsl::value::Value;
    use pretty_assertions::assert_eq;

    #[test]
    fn instruction_text() {
        assert_eq!(Instruction::Float(2.0).to_string(), "n:2.0");
        assert_eq!(Instruction::Int(-3).to_string(), "n:-3");
        assert_eq!(
            Instruction::Declare {
                name: "x".into(),
                init: true
            }
            .to_string(),
            "var:x:1"
        );
        assert_eq!(Instruction::Binary(BinOp::And).to_string(), "and");
    }

    #[test]
    fn numbers_decode_by_shape() {
        assert_eq!("n:7".parse::<Instruction>().unwrap(), Instruction::Int(7));
        assert_eq!("n:7.0".parse::<Instruction>().unwrap(), Instruction::Float(7.0));
        assert_eq!("n:1e3".parse::<Instruction>().unwrap(), Instruction::Float(1000.0));
    }

    #[test]
    fn equality_operator_is_not_an_assignment() {
        assert_eq!(
            "==".parse::<Instruction>().unwrap(),
            Instruction::Binary(BinOp::Eq)
        );
        assert_eq!(
            "=x".parse::<Instruction>().unwrap(),
            Instruction::Assign("x".into())
        );
    }

    #[test]
    fn separator_inside_string_survives() {
        let program = Bytecode::new(vec![
            Instruction::Call {
                name: "Write".into(),
                argc: 1,
            },
            Instruction::Str("a||b\\c".into()),
        ]);
        let text = program.encode("||");
        assert_eq!(text, "fc:Write:1||s:a\\|\\|b\\\\c");
        assert_eq!(Bytecode::decode(&text, "||").unwrap(), program);
    }

    #[test]
    fn block_header_carries_slots() {
        let program = Bytecode::new(vec![
            Instruction::Block {
                count: 1,
                declared: vec![Declared {
                    name: "limit".into(),
                    ty: Type::Int,
                    value: Value::Int(3),
                    bound: true,
                }],
            },
            Instruction::Load("limit".into()),
        ]);
        let text = program.encode(";");
        assert!(text.starts_with("ts##1##["));
        assert_eq!(Bytecode::decode(&text, ";").unwrap(), program);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(Bytecode::decode("n:1", "").is_err());
        assert!(Bytecode::decode("n:1", "\\").is_err());
        assert!(Bytecode::decode("bogus", "||").is_err());
        assert!(matches!(
            Bytecode::decode("jmp:9", "||"),
            Err(RuntimeError::InvalidJumpTarget { target: 9, len: 1 })
        ));
        assert!(Bytecode::decode("ts##5##[]||n:1", "||").is_err());
    }

    #[test]
    fn empty_program() {
        assert!(Bytecode::decode("", "||").unwrap().is_empty());
    }
}
