use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;

use super::ast::Declared;
use super::builtins;
use super::bytecode::{Bytecode, Instruction};
use super::error::RuntimeError;
use super::ops;
use super::value::Value;

/// Environment a program runs against: binding variables and host-provided
/// builtins. The host sees every call first and returns `None` to defer to
/// the builtin catalog.
pub trait Host {
    fn resolve(&mut self, name: &str) -> Result<Value, RuntimeError>;

    fn call(&mut self, name: &str, args: &[Value]) -> Option<Result<Value, RuntimeError>>;
}

/// Host for plain programs: no binding variables, no extra functions.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHost;

impl Host for NoHost {
    fn resolve(&mut self, name: &str) -> Result<Value, RuntimeError> {
        Err(RuntimeError::Unsupported {
            what: format!("@{name}"),
        })
    }

    fn call(&mut self, _name: &str, _args: &[Value]) -> Option<Result<Value, RuntimeError>> {
        None
    }
}

#[derive(Debug, Clone)]
struct Slot {
    value: Value,
    /// Locals exist from block entry but are only visible once declared.
    live: bool,
}

#[derive(Debug, Clone, Default)]
struct Frame {
    slots: IndexMap<String, Slot>,
}

impl Frame {
    fn from_header(declared: &[Declared]) -> Self {
        Self {
            slots: declared
                .iter()
                .map(|d| {
                    (
                        d.name.clone(),
                        Slot {
                            value: d.value.clone(),
                            live: d.bound,
                        },
                    )
                })
                .collect(),
        }
    }
}

/// `n` or `p.a.b` → (`p`, Some(`a.b`)).
fn split_path(name: &str) -> (&str, Option<&str>) {
    match name.split_once('.') {
        Some((base, path)) => (base, Some(path)),
        None => (name, None),
    }
}

/// Executes decoded bytecode. Reusable: every run starts from a clean state.
pub struct Executer<H: Host = NoHost> {
    program: Arc<Bytecode>,
    ip: usize,
    frames: Vec<Frame>,
    /// Outermost frame as it was when the program finished.
    finished: Option<Frame>,
    deadline: Option<Instant>,
    limit: Duration,
    output: String,
    last_value: Option<Value>,
    last_error: Option<RuntimeError>,
    host: H,
}

impl Executer<NoHost> {
    /// Decode `bytecode` split on `separator`.
    pub fn new(bytecode: &str, separator: &str) -> Result<Self, RuntimeError> {
        Ok(Self::from_program(Arc::new(Bytecode::decode(bytecode, separator)?)))
    }

    pub fn from_program(program: Arc<Bytecode>) -> Self {
        Self::with_host(program, NoHost)
    }
}

impl<H: Host> Executer<H> {
    pub fn with_host(program: Arc<Bytecode>, host: H) -> Self {
        Self {
            program,
            ip: 0,
            frames: Vec::new(),
            finished: None,
            deadline: None,
            limit: Duration::ZERO,
            output: String::new(),
            last_value: None,
            last_error: None,
            host,
        }
    }

    /// Run the whole program. Returns false on any runtime error (including
    /// the time limit), which is then available from [`Executer::last_error`].
    /// A zero `time_limit` disables the limit.
    pub fn execute(&mut self, time_limit: Duration) -> bool {
        match self.run(time_limit) {
            Ok(_) => true,
            Err(error) => {
                tracing::warn!(%error, ip = self.ip, "execution failed");
                self.last_error = Some(error);
                false
            }
        }
    }

    /// Run the whole program and return the value of the last top-level
    /// statement or expression.
    pub fn run(&mut self, time_limit: Duration) -> Result<Option<Value>, RuntimeError> {
        self.reset();
        if !time_limit.is_zero() {
            self.deadline = Some(Instant::now() + time_limit);
        }
        self.limit = time_limit;
        let program = Arc::clone(&self.program);
        let code = program.instructions.as_slice();
        tracing::debug!(instructions = code.len(), ?time_limit, "executing program");
        while self.ip < code.len() {
            self.step(code)?;
        }
        Ok(self.last_value.clone())
    }

    /// Evaluate the expression at the start of the program without a time
    /// limit. Starts from a clean state, so it may follow [`Executer::execute`].
    pub fn evaluate_ast(&mut self) -> Result<Value, RuntimeError> {
        self.reset();
        let program = Arc::clone(&self.program);
        self.eval(&program.instructions)
    }

    fn reset(&mut self) {
        self.ip = 0;
        self.frames.clear();
        self.finished = None;
        self.deadline = None;
        self.output.clear();
        self.last_value = None;
        self.last_error = None;
    }

    pub fn result(&self) -> Option<&Value> {
        self.last_value.as_ref()
    }

    /// Text written by `Write`/`WriteLn` during the last run.
    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn last_error(&self) -> Option<&RuntimeError> {
        self.last_error.as_ref()
    }

    /// Current value of a visible variable, or of a top-level variable once
    /// the program has finished.
    pub fn variable(&self, name: &str) -> Option<Value> {
        let (base, path) = split_path(name);
        let slot = self.find(base).or_else(|| {
            self.finished
                .as_ref()
                .and_then(|f| f.slots.get(base))
                .filter(|s| s.live)
        })?;
        match (path, &slot.value) {
            (None, value) => Some(value.clone()),
            (Some(path), Value::Record(fields)) => fields.get(path).cloned(),
            (Some(_), _) => None,
        }
    }

    // ── Dispatch ───────────────────────────────────────────────────

    fn fetch<'c>(&mut self, code: &'c [Instruction]) -> Result<&'c Instruction, RuntimeError> {
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(RuntimeError::Timeout { limit: self.limit });
            }
        }
        let instruction = code
            .get(self.ip)
            .ok_or_else(|| RuntimeError::malformed("unexpected end of program"))?;
        self.ip += 1;
        Ok(instruction)
    }

    fn jump(&mut self, target: usize, len: usize) -> Result<(), RuntimeError> {
        if target > len {
            return Err(RuntimeError::InvalidJumpTarget { target, len });
        }
        self.ip = target;
        Ok(())
    }

    /// Execute one statement: a block, a conditional or unconditional jump,
    /// or an expression whose value becomes the last result.
    fn step(&mut self, code: &[Instruction]) -> Result<(), RuntimeError> {
        tracing::trace!(ip = self.ip, depth = self.frames.len(), "statement");
        match self.fetch(code)? {
            Instruction::Block { count, declared } => {
                let end = self.ip + count;
                if end > code.len() {
                    return Err(RuntimeError::InvalidJumpTarget {
                        target: end,
                        len: code.len(),
                    });
                }
                self.frames.push(Frame::from_header(declared));
                while self.ip < end {
                    self.step(code)?;
                }
                let frame = self.frames.pop();
                if self.frames.is_empty() {
                    self.finished = frame;
                }
            }
            Instruction::JumpIfFalse(target) => {
                if !self.eval(code)?.is_truthy() {
                    self.jump(*target, code.len())?;
                }
            }
            Instruction::Jump(target) => self.jump(*target, code.len())?,
            other => {
                let value = self.eval_fetched(other, code)?;
                self.last_value = Some(value);
            }
        }
        Ok(())
    }

    fn eval(&mut self, code: &[Instruction]) -> Result<Value, RuntimeError> {
        let instruction = self.fetch(code)?;
        self.eval_fetched(instruction, code)
    }

    fn eval_fetched(
        &mut self,
        instruction: &Instruction,
        code: &[Instruction],
    ) -> Result<Value, RuntimeError> {
        match instruction {
            Instruction::Int(n) => Ok(Value::Int(*n)),
            Instruction::Float(f) => Ok(Value::Float(*f)),
            Instruction::Str(s) => Ok(Value::Str(s.clone())),
            Instruction::Bool(b) => Ok(Value::Bool(*b)),
            Instruction::Null => Ok(Value::Null),
            Instruction::Load(name) => self.read(name),
            Instruction::BindLoad(name) => self.host.resolve(name),
            Instruction::Assign(name) => {
                let value = self.eval(code)?;
                self.write(name, value)?;
                Ok(Value::Void)
            }
            Instruction::Declare { name, init } => {
                // evaluated before the slot goes live: `int x = x;` reads the outer x
                let value = if *init { Some(self.eval(code)?) } else { None };
                self.declare(name, value)?;
                Ok(Value::Void)
            }
            Instruction::Call { name, argc } => self.call(name, *argc, code),
            Instruction::Select { otherwise, end } => {
                if self.eval(code)?.is_truthy() {
                    let value = self.eval(code)?;
                    self.jump(*end, code.len())?;
                    Ok(value)
                } else {
                    self.jump(*otherwise, code.len())?;
                    self.eval(code)
                }
            }
            Instruction::Negate => {
                let operand = self.eval(code)?;
                ops::negate_any(operand)
            }
            Instruction::Binary(op) => {
                let left = self.eval(code)?;
                let right = self.eval(code)?;
                ops::binary(*op, left, right)
            }
            Instruction::Block { .. } | Instruction::JumpIfFalse(_) | Instruction::Jump(_) => Err(
                RuntimeError::malformed(format!("'{instruction}' cannot appear inside an expression")),
            ),
        }
    }

    fn call(&mut self, name: &str, argc: usize, code: &[Instruction]) -> Result<Value, RuntimeError> {
        if builtins::takes_reference(name) {
            return self.call_by_reference(name, argc, code);
        }
        let mut args = Vec::with_capacity(argc);
        for _ in 0..argc {
            args.push(self.eval(code)?);
        }
        if let Some(sig) = builtins::signature(name) {
            if argc < sig.required() || argc > sig.params.len() {
                return Err(RuntimeError::Arity {
                    name: name.to_string(),
                    expected: sig.params.len(),
                    found: argc,
                });
            }
            // trailing defaults the compiler left out
            if name != "Concat" {
                args.extend(sig.params.iter().skip(argc).filter_map(|p| p.default.clone()));
            }
        }
        if let Some(result) = self.host.call(name, &args) {
            return result;
        }
        builtins::call(name, args, &mut self.output)
    }

    /// `Inc(x)` / `Dec(x)`: the argument must be a variable load.
    fn call_by_reference(
        &mut self,
        name: &str,
        argc: usize,
        code: &[Instruction],
    ) -> Result<Value, RuntimeError> {
        if argc != 1 {
            return Err(RuntimeError::Arity {
                name: name.to_string(),
                expected: 1,
                found: argc,
            });
        }
        let Instruction::Load(target) = self.fetch(code)? else {
            return Err(RuntimeError::invalid_argument(
                name,
                "argument must be a variable",
            ));
        };
        let current = self.read(target)?;
        let Value::Int(n) = current else {
            return Err(RuntimeError::type_mismatch("int", current.type_name()));
        };
        let next = if name == "Inc" {
            n.checked_add(1)
        } else {
            n.checked_sub(1)
        }
        .ok_or_else(|| RuntimeError::Overflow {
            op: name.to_string(),
        })?;
        self.write(target, Value::Int(next))?;
        Ok(Value::Void)
    }

    // ── Variables ──────────────────────────────────────────────────

    fn find(&self, name: &str) -> Option<&Slot> {
        self.frames
            .iter()
            .rev()
            .find_map(|f| f.slots.get(name).filter(|s| s.live))
    }

    fn find_mut(&mut self, name: &str) -> Option<&mut Slot> {
        self.frames
            .iter_mut()
            .rev()
            .find_map(|f| f.slots.get_mut(name).filter(|s| s.live))
    }

    fn read(&self, name: &str) -> Result<Value, RuntimeError> {
        let undefined = || RuntimeError::UndefinedVariable {
            name: name.to_string(),
        };
        let (base, path) = split_path(name);
        let slot = self.find(base).ok_or_else(undefined)?;
        match (path, &slot.value) {
            (None, value) => Ok(value.clone()),
            (Some(path), Value::Record(fields)) => fields.get(path).cloned().ok_or_else(undefined),
            (Some(_), _) => Err(undefined()),
        }
    }

    fn write(&mut self, name: &str, value: Value) -> Result<(), RuntimeError> {
        let undefined = || RuntimeError::UndefinedVariable {
            name: name.to_string(),
        };
        let (base, path) = split_path(name);
        let slot = self.find_mut(base).ok_or_else(undefined)?;
        match (path, &mut slot.value) {
            (None, current) => *current = value,
            (Some(path), Value::Record(fields)) => {
                *fields.get_mut(path).ok_or_else(undefined)? = value;
            }
            (Some(_), _) => return Err(undefined()),
        }
        Ok(())
    }

    fn declare(&mut self, name: &str, value: Option<Value>) -> Result<(), RuntimeError> {
        let frame = self
            .frames
            .last_mut()
            .ok_or_else(|| RuntimeError::malformed(format!("declaration of '{name}' outside a block")))?;
        match frame.slots.get_mut(name) {
            Some(slot) => {
                slot.live = true;
                if let Some(value) = value {
                    slot.value = value;
                }
            }
            None => {
                frame.slots.insert(
                    name.to_string(),
                    Slot {
                        value: value.unwrap_or(Value::Null),
                        live: true,
                    },
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::dsl::compiler::compile;
    use crate::dsl::parser::{parse, parse_expression, Globals};
    use pretty_assertions::assert_eq;

    fn program(src: &str) -> Executer {
        let ast = parse(src, &Globals::new()).unwrap();
        Executer::from_program(Arc::new(compile(&ast)))
    }

    fn run(src: &str) -> Executer {
        let mut exec = program(src);
        assert!(exec.execute(Duration::from_secs(5)), "{:?}", exec.last_error());
        exec
    }

    fn eval(src: &str) -> Value {
        let ast = parse_expression(src).unwrap();
        let mut exec = Executer::from_program(Arc::new(compile(&ast)));
        exec.evaluate_ast().unwrap()
    }

    #[test]
    fn arithmetic_and_promotion() {
        assert_eq!(eval("1 + 2 * 3"), Value::Int(7));
        assert_eq!(eval("7 / 2"), Value::Int(3));
        assert_eq!(eval("1 + 0.5"), Value::Float(1.5));
        assert_eq!(eval("-(2 - 5)"), Value::Int(3));
    }

    #[test]
    fn strings_and_builtins() {
        assert_eq!(eval("Concat('a', 'b')"), Value::Str("ab".into()));
        assert_eq!(eval("Pos('abcabc', 'b', 0)"), Value::Int(1));
        assert_eq!(eval("Pos('abc', 'x')"), Value::Int(-1));
        assert_eq!(eval("Uppercase('a' + 'b')"), Value::Str("AB".into()));
    }

    #[test]
    fn ternary_takes_one_branch() {
        assert_eq!(eval("2 > 1 ? 'yes' : 'no'"), Value::Str("yes".into()));
        assert_eq!(eval("2 < 1 ? 'yes' : 'no'"), Value::Str("no".into()));
        assert_eq!(eval("(1 > 2 ? 1 : 2) + 10"), Value::Int(12));
    }

    #[test]
    fn while_loop_counts() {
        let exec = run("int i = 0; int sum = 0; while i < 5 { Inc(i); sum = sum + i; }");
        assert_eq!(exec.variable("sum"), Some(Value::Int(15)));
        assert_eq!(exec.variable("i"), Some(Value::Int(5)));
    }

    #[test]
    fn if_else_chain() {
        let exec = run(
            "int x = -3; string s;
             if x > 0 { s = 'pos'; } else if x < 0 { s = 'neg'; } else { s = 'zero'; }",
        );
        assert_eq!(exec.variable("s"), Some(Value::Str("neg".into())));
    }

    #[test]
    fn shadowing_initializer_reads_outer_binding() {
        let exec = run("int x = 1; int y = 0; { int x = x + 10; y = x; } y = y + x;");
        assert_eq!(exec.variable("y"), Some(Value::Int(12)));
        assert_eq!(exec.variable("x"), Some(Value::Int(1)));
    }

    #[test]
    fn inner_declaration_invisible_before_it_runs() {
        let exec = run("int x = 1; int y; { y = x; int x = 5; }");
        assert_eq!(exec.variable("y"), Some(Value::Int(1)));
    }

    #[test]
    fn records() {
        let exec = run(
            "record Point { int x; int y; }
             Point p;
             p.x = 3;
             p.y = p.x * 2;",
        );
        assert_eq!(exec.variable("p.y"), Some(Value::Int(6)));
    }

    #[test]
    fn write_collects_output() {
        let exec = run("int i = 0; while i < 3 { Write(IntToStr(i)); Inc(i); } WriteLn();");
        assert_eq!(exec.output(), "012\n");
    }

    #[test]
    fn globals_are_visible() {
        let mut globals = Globals::new();
        globals.insert("name".into(), Value::Str("world".into()));
        let ast = parse("string greeting = 'hello ' + name;", &globals).unwrap();
        let mut exec = Executer::from_program(Arc::new(compile(&ast)));
        assert!(exec.execute(Duration::ZERO));
        assert_eq!(
            exec.variable("greeting"),
            Some(Value::Str("hello world".into()))
        );
    }

    #[test]
    fn infinite_loop_times_out() {
        let mut exec = program("while true { }");
        assert!(!exec.execute(Duration::from_millis(1)));
        assert!(matches!(
            exec.last_error(),
            Some(RuntimeError::Timeout { .. })
        ));
    }

    #[test]
    fn division_by_zero_fails_execution() {
        let mut exec = program("int z = 0; int x = 1 / z;");
        assert!(!exec.execute(Duration::ZERO));
        assert_eq!(exec.last_error(), Some(&RuntimeError::DivisionByZero));
    }

    #[test]
    fn unknown_function_in_bytecode() {
        let mut exec = Executer::new("fc:Nope:0", "||").unwrap();
        assert!(!exec.execute(Duration::ZERO));
        assert!(matches!(
            exec.last_error(),
            Some(RuntimeError::UnknownFunction { .. })
        ));
    }

    #[test]
    fn evaluate_after_execute_starts_over() {
        let ast = parse_expression("Length('abc') + 1").unwrap();
        let mut exec = Executer::from_program(Arc::new(compile(&ast)));
        assert!(exec.execute(Duration::from_millis(50)));
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(exec.evaluate_ast().unwrap(), Value::Int(4));
        assert_eq!(exec.evaluate_ast().unwrap(), Value::Int(4));
    }

    #[test]
    fn decoded_program_fills_defaults() {
        let mut exec = Executer::new("fc:Pos:2||s:abc||s:c", "||").unwrap();
        assert_eq!(exec.evaluate_ast().unwrap(), Value::Int(2));
    }

    #[test]
    fn bind_variables_need_a_host() {
        let mut exec = Executer::new("@:ui.color", "||").unwrap();
        assert!(!exec.execute(Duration::ZERO));
        assert!(matches!(
            exec.last_error(),
            Some(RuntimeError::Unsupported { .. })
        ));
    }

    #[test]
    fn reruns_start_clean() {
        let mut exec = program("WriteLn('once');");
        assert!(exec.execute(Duration::ZERO));
        assert!(exec.execute(Duration::ZERO));
        assert_eq!(exec.output(), "once\n");
    }
}
