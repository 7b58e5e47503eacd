#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;

use signalize::dsl::ast::Type;
use signalize::dsl::compiler::compile;
use signalize::dsl::eval::evaluate;
use signalize::dsl::parser::parse_expression;
use signalize::{
    compile_source, compile_to_bytecode, parse, ErrorKind, Executer, Globals, RuntimeError, Value,
};

fn execute_expression(src: &str) -> Value {
    let ast = parse_expression(src).unwrap();
    let mut vm = Executer::from_program(Arc::new(compile(&ast)));
    vm.evaluate_ast().unwrap()
}

fn run(src: &str) -> Executer {
    let program = compile_source(src, &Globals::new()).unwrap();
    let mut vm = Executer::from_program(Arc::new(program));
    assert!(vm.execute(Duration::from_secs(1)), "{:?}", vm.last_error());
    vm
}

const PURE_EXPRESSIONS: &[&str] = &[
    "1 + 2 * 3",
    "(1 + 2) * 3",
    "7 / 2",
    "7 / 2.0",
    "1.5 + 2",
    "3 - 4.25 * 2",
    "-(2 + 3) * 1.5",
    "10 - 2 - 3",
    "2 > 1.5",
    "1 == 1.0",
    "'ab' + 'cd'",
    "'a' < 'b'",
    "!(3 >= 4) && (2 != 2 || true)",
    "1 < 2 ? 'yes' : 'no'",
    "false ? 1 : 2.5",
    "Round(2.5) + Floor(-1.5) + Ceil(0.1)",
    "Frac(3.75)",
    "Uppercase('mixed') + Lowercase('CASE')",
    "Pos('abcabc', 'c', 3)",
    "Copy('signalize', 3, 4)",
    "StrReplace('a', 'o', 'banana')",
    "Concat('x', IntToStr(4), 'y')",
    "StrToBool('TRUE') && IsInteger('-12') && !IsNumeric('1.2.3')",
    "Odd(3.0) ? Chr(65) : Chr(66)",
    "Ord('a') + Length('four')",
];

#[test]
fn compiled_results_match_direct_evaluation() {
    for src in PURE_EXPRESSIONS {
        let ast = parse_expression(src).unwrap();
        let direct = evaluate(&ast).unwrap();
        assert_eq!(execute_expression(src), direct, "{src}");
    }
}

#[test]
fn mixed_arithmetic_is_promoted_to_float() {
    for src in ["1 + 2.0", "2.0 * 3", "6 / 4.0", "1 - 0.5"] {
        let ast = parse_expression(src).unwrap();
        assert_eq!(ast.ty(), Type::Float, "{src}");
        assert!(matches!(execute_expression(src), Value::Float(_)), "{src}");
    }
    assert_eq!(execute_expression("1 + 2"), Value::Int(3));
    assert_eq!(execute_expression("1 + 2.5"), Value::Float(3.5));
}

#[test]
fn comparisons_are_bool() {
    for op in ["==", "!=", ">", "<", ">=", "<="] {
        for (l, r) in [("1", "2"), ("1.5", "2"), ("2", "1.5"), ("'a'", "'b'")] {
            let src = format!("{l} {op} {r}");
            let ast = parse_expression(&src).unwrap();
            assert_eq!(ast.ty(), Type::Bool, "{src}");
            assert!(matches!(execute_expression(&src), Value::Bool(_)), "{src}");
        }
    }
}

#[test]
fn comparing_mismatched_types_is_a_type_error() {
    let err = parse_expression("1 == 'one'").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Type);
}

#[test]
fn compiling_is_deterministic() {
    let src = "record P { int x; float y; } P p; int i = 0; \
               while i < 3 { p.x = p.x + i; Inc(i); } \
               if p.x > 2 { WriteLn(IntToStr(p.x)); } else { p.y = 1.5; }";
    let ast = parse(src, &Globals::new()).unwrap();
    let first = compile_to_bytecode(&ast, "||");
    let second = compile_to_bytecode(&parse(src, &Globals::new()).unwrap(), "||");
    assert_eq!(first, second);
    assert_eq!(first, compile_to_bytecode(&ast, "||"));
}

#[test]
fn if_runs_exactly_one_branch() {
    for (flag, expected) in [("true", "then"), ("false", "else")] {
        let vm = run(&format!(
            "bool f = {flag}; if f {{ Write('then'); }} else {{ Write('else'); }} Write('!');"
        ));
        assert_eq!(vm.output(), format!("{expected}!"));
    }
    let vm = run("if 1 > 2 { Write('skipped'); } Write('after');");
    assert_eq!(vm.output(), "after");
}

#[test]
fn while_runs_until_its_condition_fails() {
    let vm = run("int n = 0; int sum = 0; while n < 5 { sum = sum + n; Inc(n); }");
    assert_eq!(vm.variable("sum"), Some(Value::Int(10)));
    assert_eq!(vm.variable("n"), Some(Value::Int(5)));

    let vm = run("int n = 9; while n < 5 { Inc(n); } Write('done');");
    assert_eq!(vm.variable("n"), Some(Value::Int(9)));
    assert_eq!(vm.output(), "done");
}

#[test]
fn block_locals_do_not_leak() {
    let err = parse("if true { int inner = 1; } inner = 2;", &Globals::new()).unwrap_err();
    assert_eq!(err.kind, ErrorKind::UndefinedReference);

    let vm = run("int x = 1; if true { int x = 5; x = x + 1; } int y = x;");
    assert_eq!(vm.variable("y"), Some(Value::Int(1)));
}

#[test]
fn concat_and_pos_boundaries() {
    assert_eq!(execute_expression("Concat('a', 'b')"), Value::Str("ab".into()));
    assert_eq!(execute_expression("Pos('abcabc', 'b', 0)"), Value::Int(1));
    assert_eq!(execute_expression("Pos('abc', 'x', 0)"), Value::Int(-1));
}

#[test]
fn infinite_loop_times_out() {
    let program = compile_source("int i = 0; while true { Inc(i); }", &Globals::new()).unwrap();
    let mut vm = Executer::from_program(Arc::new(program));
    let started = Instant::now();
    assert!(!vm.execute(Duration::from_millis(1)));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(matches!(vm.last_error(), Some(RuntimeError::Timeout { .. })));
}

#[test]
fn string_into_int_is_rejected() {
    let err = parse("int x = \"hello\";", &Globals::new()).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Type);
    assert_eq!(err.line, 1);
}

#[test]
fn defaults_are_seen_at_call_time() {
    let vm = run("int p = Pos('abcabc', 'c'); WriteLn();");
    assert_eq!(vm.variable("p"), Some(Value::Int(2)));
    assert_eq!(vm.output(), "\n");

    // bytecode that leaves the defaulted argument out entirely
    let mut vm = Executer::new("fc:Pos:2||s:abcabc||s:b", "||").unwrap();
    assert_eq!(vm.evaluate_ast().unwrap(), Value::Int(1));
}

#[test]
fn globals_are_visible_to_the_program() {
    let globals = Globals::from([
        ("limit".to_string(), Value::Int(3)),
        ("label".to_string(), Value::Str("n=".into())),
    ]);
    let program = compile_source("string s = label + IntToStr(limit * 2);", &globals).unwrap();
    let mut vm = Executer::from_program(Arc::new(program));
    assert!(vm.execute(Duration::ZERO));
    assert_eq!(vm.variable("s"), Some(Value::Str("n=6".into())));
}

#[test]
fn text_bytecode_survives_a_custom_separator() {
    let program = compile_source("string s = 'a;b' + '\\\\';", &Globals::new()).unwrap();
    let text = program.encode(";");
    let mut vm = Executer::new(&text, ";").unwrap();
    assert!(vm.execute(Duration::ZERO));
    assert_eq!(vm.variable("s"), Some(Value::Str("a;b\\".into())));
}
