use std::sync::LazyLock;

use rand::Rng;
use regex::Regex;

use super::ast::Type;
use super::error::RuntimeError;
use super::value::Value;

/// Built-in function: single source of truth for name, signature and docs.
/// The parser, the VM and the CLI `functions` listing all read from this table.
///
/// `signature` is a compact string: the first letter is the return type, the
/// following letters are parameter types (`v i f s b`), and any `:literal`
/// suffixes are defaults for the trailing parameters, left to right.
#[derive(Debug, Clone)]
pub struct BuiltinFn {
    pub name: &'static str,
    pub signature: &'static str,
    pub category: &'static str,
    pub description: &'static str,
}

/// All built-in functions available in the language.
pub static BUILTINS: &[BuiltinFn] = &[
    // ── Numeric conversion ──────────────────────────────────────
    BuiltinFn {
        name: "Round", signature: "if",
        category: "convert", description: "Round to the nearest integer",
    },
    BuiltinFn {
        name: "Floor", signature: "if",
        category: "convert", description: "Round down to an integer",
    },
    BuiltinFn {
        name: "Ceil", signature: "if",
        category: "convert", description: "Round up to an integer",
    },
    BuiltinFn {
        name: "Frac", signature: "ff",
        category: "convert", description: "Fractional part, keeping the sign",
    },
    BuiltinFn {
        name: "FloatToInt", signature: "if",
        category: "convert", description: "Truncate a float towards zero",
    },
    BuiltinFn {
        name: "IntToFloat", signature: "fi",
        category: "convert", description: "Widen an int to a float",
    },
    BuiltinFn {
        name: "StrToInt", signature: "is",
        category: "convert", description: "Parse the leading integer of a string, 0 if none",
    },
    BuiltinFn {
        name: "StrToFloat", signature: "fs",
        category: "convert", description: "Parse the leading number of a string, 0.0 if none",
    },
    BuiltinFn {
        name: "IntToStr", signature: "si",
        category: "convert", description: "Format an int",
    },
    BuiltinFn {
        name: "FloatToStr", signature: "sf",
        category: "convert", description: "Format a float",
    },
    BuiltinFn {
        name: "BoolToStr", signature: "sb",
        category: "convert", description: "\"true\" or \"false\"",
    },
    BuiltinFn {
        name: "StrToBool", signature: "bs",
        category: "convert", description: "True for \"true\" (any case) or \"1\"",
    },
    // ── Strings ─────────────────────────────────────────────────
    BuiltinFn {
        name: "Uppercase", signature: "ss",
        category: "string", description: "Upper-case copy",
    },
    BuiltinFn {
        name: "Lowercase", signature: "ss",
        category: "string", description: "Lower-case copy",
    },
    BuiltinFn {
        name: "Trim", signature: "ss",
        category: "string", description: "Strip leading and trailing whitespace",
    },
    BuiltinFn {
        name: "Pos", signature: "issi:0",
        category: "string", description: "Index of needle in haystack from offset, -1 if absent",
    },
    BuiltinFn {
        name: "Copy", signature: "ssii",
        category: "string", description: "Substring from a 0-based start, at most count characters",
    },
    BuiltinFn {
        name: "Length", signature: "is",
        category: "string", description: "Number of characters",
    },
    BuiltinFn {
        name: "StrReplace", signature: "ssss",
        category: "string", description: "Replace every search with replace in subject",
    },
    BuiltinFn {
        name: "Chr", signature: "si",
        category: "string", description: "Character for a code point",
    },
    BuiltinFn {
        name: "Ord", signature: "is",
        category: "string", description: "Code point of the first character, 0 if empty",
    },
    BuiltinFn {
        name: "Concat", signature: "sssssssssss:\"\":\"\":\"\":\"\":\"\":\"\":\"\":\"\"",
        category: "string", description: "Join up to ten strings",
    },
    // ── Tests ───────────────────────────────────────────────────
    BuiltinFn {
        name: "IsNumeric", signature: "bs",
        category: "test", description: "Whether the string is a decimal number, optionally with an exponent",
    },
    BuiltinFn {
        name: "IsInteger", signature: "bs",
        category: "test", description: "Whether the string is an optionally signed integer",
    },
    BuiltinFn {
        name: "IsBool", signature: "bs",
        category: "test", description: "Whether the string is true, false (any case), 1 or 0",
    },
    BuiltinFn {
        name: "Odd", signature: "bf",
        category: "test", description: "Whether the rounded value is odd",
    },
    // ── Math ────────────────────────────────────────────────────
    BuiltinFn {
        name: "Random", signature: "ii",
        category: "math", description: "Uniform random int in [0, n)",
    },
    // ── Variables (by reference) ────────────────────────────────
    BuiltinFn {
        name: "Inc", signature: "vi",
        category: "reference", description: "Increment an int variable in place",
    },
    BuiltinFn {
        name: "Dec", signature: "vi",
        category: "reference", description: "Decrement an int variable in place",
    },
    // ── Output ──────────────────────────────────────────────────
    BuiltinFn {
        name: "Write", signature: "vs",
        category: "io", description: "Append text to the output buffer",
    },
    BuiltinFn {
        name: "WriteLn", signature: "vs:\"\"",
        category: "io", description: "Append text and a newline to the output buffer",
    },
    // ── Binding host ────────────────────────────────────────────
    BuiltinFn {
        name: "GetSelectedOptionId", signature: "sss",
        category: "bind", description: "Selected option id of container.key",
    },
    BuiltinFn {
        name: "GetSelectedOptionExtraValue", signature: "sssi",
        category: "bind", description: "Extra value at index of the selected option",
    },
    BuiltinFn {
        name: "SetValue", signature: "vsss",
        category: "bind", description: "Overwrite the value of container.key",
    },
];

/// Look up a builtin by exact name.
pub fn lookup_builtin(name: &str) -> Option<&'static BuiltinFn> {
    BUILTINS.iter().find(|b| b.name == name)
}

pub fn exists(name: &str) -> bool {
    lookup_builtin(name).is_some()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub ty: Type,
    pub default: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub ret: Type,
    pub params: Vec<Param>,
}

impl Signature {
    /// Number of leading parameters without a default.
    pub fn required(&self) -> usize {
        self.params.iter().take_while(|p| p.default.is_none()).count()
    }
}

impl BuiltinFn {
    /// Decode the compact signature string. `None` only for a malformed table entry.
    pub fn signature(&self) -> Option<Signature> {
        let mut parts = self.signature.split(':');
        let mut letters = parts.next()?.chars();
        let ret = Type::from_signature_char(letters.next()?)?;
        let mut params = letters
            .map(|c| {
                Type::from_signature_char(c).map(|ty| Param { ty, default: None })
            })
            .collect::<Option<Vec<_>>>()?;
        let defaults = parts.map(parse_default).collect::<Option<Vec<_>>>()?;
        let first_defaulted = params.len().checked_sub(defaults.len())?;
        for (param, default) in params.iter_mut().skip(first_defaulted).zip(defaults) {
            param.default = Some(default);
        }
        Some(Signature { ret, params })
    }
}

fn parse_default(literal: &str) -> Option<Value> {
    if let Some(text) = literal.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        return Some(Value::Str(text.to_string()));
    }
    match literal {
        "true" => return Some(Value::Bool(true)),
        "false" => return Some(Value::Bool(false)),
        _ => {}
    }
    if literal.contains('.') {
        literal.parse().ok().map(Value::Float)
    } else {
        literal.parse().ok().map(Value::Int)
    }
}

/// Signature of a builtin by name (`getBuiltinFunctionSignature`).
pub fn signature(name: &str) -> Option<Signature> {
    lookup_builtin(name).and_then(BuiltinFn::signature)
}

pub fn return_type(name: &str) -> Option<Type> {
    signature(name).map(|s| s.ret)
}

/// Builtins whose single argument is a variable updated in place.
pub fn takes_reference(name: &str) -> bool {
    lookup_builtin(name).is_some_and(|b| b.category == "reference")
}

/// Builtins that need a binding host to run.
pub fn needs_host(name: &str) -> bool {
    lookup_builtin(name).is_some_and(|b| b.category == "bind")
}

/// Builtins safe to evaluate without executing a program: no output, no variables.
pub fn is_pure(name: &str) -> bool {
    lookup_builtin(name).is_some_and(|b| !matches!(b.category, "reference" | "bind" | "io"))
}

static INTEGER: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^[+-]?\d+$").ok());
static NUMERIC: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?$").ok());

fn matches(re: &LazyLock<Option<Regex>>, text: &str) -> bool {
    re.as_ref().is_some_and(|re| re.is_match(text))
}

struct Args {
    name: &'static str,
    values: std::vec::IntoIter<Value>,
}

impl Args {
    fn next(&mut self) -> Result<Value, RuntimeError> {
        self.values.next().ok_or_else(|| RuntimeError::Arity {
            name: self.name.to_string(),
            expected: self.values.len() + 1,
            found: 0,
        })
    }

    fn int(&mut self) -> Result<i64, RuntimeError> {
        let v = self.next()?;
        v.as_int()
            .ok_or_else(|| RuntimeError::type_mismatch("int", v.type_name()))
    }

    fn float(&mut self) -> Result<f64, RuntimeError> {
        let v = self.next()?;
        match v {
            Value::Float(f) => Ok(f),
            other => Err(RuntimeError::type_mismatch("float", other.type_name())),
        }
    }

    fn string(&mut self) -> Result<String, RuntimeError> {
        match self.next()? {
            Value::Str(s) => Ok(s),
            other => Err(RuntimeError::type_mismatch("string", other.type_name())),
        }
    }

    fn boolean(&mut self) -> Result<bool, RuntimeError> {
        let v = self.next()?;
        v.as_bool()
            .ok_or_else(|| RuntimeError::type_mismatch("bool", v.type_name()))
    }
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn float_to_int(name: &str, f: f64) -> Result<Value, RuntimeError> {
    if !f.is_finite() || f < i64::MIN as f64 || f >= i64::MAX as f64 {
        return Err(RuntimeError::invalid_argument(
            name,
            format!("{f} does not fit in an int"),
        ));
    }
    Ok(Value::Int(f as i64))
}

/// Leading `[+-]?digits` of a string; `0` when there are no digits.
fn parse_int_prefix(text: &str) -> Result<i64, RuntimeError> {
    let trimmed = text.trim_start();
    let sign_len = usize::from(trimmed.starts_with(['+', '-']));
    let digits = trimmed
        .get(sign_len..)
        .map_or(0, |rest| rest.bytes().take_while(u8::is_ascii_digit).count());
    if digits == 0 {
        return Ok(0);
    }
    trimmed
        .get(..sign_len + digits)
        .unwrap_or("0")
        .parse()
        .map_err(|_| RuntimeError::invalid_argument("StrToInt", format!("'{text}' is out of range")))
}

/// Leading `[+-]?digits[.digits]` of a string; `0.0` when there is no number.
fn parse_float_prefix(text: &str) -> f64 {
    let trimmed = text.trim_start();
    let mut end = usize::from(trimmed.starts_with(['+', '-']));
    let mut seen_dot = false;
    for b in trimmed.bytes().skip(end) {
        match b {
            b'0'..=b'9' => end += 1,
            b'.' if !seen_dot => {
                seen_dot = true;
                end += 1;
            }
            _ => break,
        }
    }
    trimmed
        .get(..end)
        .and_then(|prefix| prefix.parse().ok())
        .unwrap_or(0.0)
}

/// `Pos`: character index of `needle` in `haystack` at or after `offset`, else -1.
fn position(haystack: &str, needle: &str, offset: i64) -> i64 {
    let Ok(offset) = usize::try_from(offset) else {
        return -1;
    };
    let Some((start, _)) = haystack
        .char_indices()
        .chain(std::iter::once((haystack.len(), ' ')))
        .nth(offset)
    else {
        return -1;
    };
    haystack
        .get(start..)
        .and_then(|rest| rest.find(needle))
        .map_or(-1, |byte| {
            let chars = haystack.get(..start + byte).map_or(0, |s| s.chars().count());
            i64::try_from(chars).unwrap_or(-1)
        })
}

fn substring(text: &str, start: i64, count: i64) -> String {
    let start = usize::try_from(start.max(0)).unwrap_or(0);
    let count = usize::try_from(count.max(0)).unwrap_or(0);
    text.chars().skip(start).take(count).collect()
}

/// Run a builtin that does not touch variables or the binding host.
/// Text produced by `Write`/`WriteLn` is appended to `output`.
pub fn call(name: &str, args: Vec<Value>, output: &mut String) -> Result<Value, RuntimeError> {
    let Some(builtin) = lookup_builtin(name) else {
        return Err(RuntimeError::UnknownFunction {
            name: name.to_string(),
        });
    };
    if matches!(builtin.category, "reference" | "bind") {
        return Err(RuntimeError::Unsupported {
            what: name.to_string(),
        });
    }
    let mut a = Args {
        name: builtin.name,
        values: args.into_iter(),
    };
    let value = match builtin.name {
        "Round" => float_to_int(name, a.float()?.round())?,
        "Floor" => float_to_int(name, a.float()?.floor())?,
        "Ceil" => float_to_int(name, a.float()?.ceil())?,
        "FloatToInt" => float_to_int(name, a.float()?.trunc())?,
        "Frac" => Value::Float(a.float()?.fract()),
        #[allow(clippy::cast_precision_loss)]
        "IntToFloat" => Value::Float(a.int()? as f64),
        "StrToInt" => Value::Int(parse_int_prefix(&a.string()?)?),
        "StrToFloat" => Value::Float(parse_float_prefix(&a.string()?)),
        "IntToStr" => Value::Str(a.int()?.to_string()),
        "FloatToStr" => Value::Str(a.float()?.to_string()),
        "BoolToStr" => Value::Str(a.boolean()?.to_string()),
        "StrToBool" => {
            let s = a.string()?;
            Value::Bool(s.eq_ignore_ascii_case("true") || s == "1")
        }
        "Uppercase" => Value::Str(a.string()?.to_uppercase()),
        "Lowercase" => Value::Str(a.string()?.to_lowercase()),
        "Trim" => Value::Str(a.string()?.trim().to_string()),
        "Pos" => {
            let haystack = a.string()?;
            let needle = a.string()?;
            Value::Int(position(&haystack, &needle, a.int()?))
        }
        "Copy" => {
            let text = a.string()?;
            let start = a.int()?;
            Value::Str(substring(&text, start, a.int()?))
        }
        "Length" => Value::Int(i64::try_from(a.string()?.chars().count()).unwrap_or(i64::MAX)),
        "StrReplace" => {
            let search = a.string()?;
            let replace = a.string()?;
            let subject = a.string()?;
            if search.is_empty() {
                Value::Str(subject)
            } else {
                Value::Str(subject.replace(&search, &replace))
            }
        }
        "Chr" => {
            let code = a.int()?;
            let c = u32::try_from(code)
                .ok()
                .and_then(char::from_u32)
                .ok_or_else(|| {
                    RuntimeError::invalid_argument(name, format!("{code} is not a character"))
                })?;
            Value::Str(c.to_string())
        }
        "Ord" => Value::Int(a.string()?.chars().next().map_or(0, |c| i64::from(u32::from(c)))),
        "Concat" => {
            let mut joined = String::new();
            for v in a.values.by_ref() {
                match v {
                    Value::Str(s) => joined.push_str(&s),
                    other => return Err(RuntimeError::type_mismatch("string", other.type_name())),
                }
            }
            Value::Str(joined)
        }
        "IsNumeric" => Value::Bool(matches(&NUMERIC, &a.string()?)),
        "IsInteger" => Value::Bool(matches(&INTEGER, &a.string()?)),
        "IsBool" => {
            let s = a.string()?;
            Value::Bool(
                s.eq_ignore_ascii_case("true")
                    || s.eq_ignore_ascii_case("false")
                    || s == "1"
                    || s == "0",
            )
        }
        // f64::round is half away from zero, like Round
        #[allow(clippy::float_cmp)]
        "Odd" => Value::Bool((a.float()?.round() % 2.0).abs() == 1.0),
        "Random" => {
            let n = a.int()?;
            if n <= 0 {
                return Err(RuntimeError::invalid_argument(
                    name,
                    format!("upper bound must be positive, got {n}"),
                ));
            }
            Value::Int(rand::thread_rng().gen_range(0..n))
        }
        "Write" => {
            output.push_str(&a.string()?);
            Value::Void
        }
        "WriteLn" => {
            output.push_str(&a.string()?);
            output.push('\n');
            Value::Void
        }
        other => {
            return Err(RuntimeError::UnknownFunction {
                name: other.to_string(),
            })
        }
    };
    Ok(value)
}
