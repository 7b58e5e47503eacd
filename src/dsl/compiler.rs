use super::ast::{Node, NodeKind, Stream};
use super::bytecode::{Bytecode, Instruction};
use super::value::Value;

/// Lower a type-checked tree to prefix-order bytecode. Never fails: every
/// error the language has is raised by the parser.
pub fn compile(root: &Node) -> Bytecode {
    let mut compiler = Compiler::new();
    compiler.compile_node(root);
    Bytecode::new(compiler.code)
}

/// `compileToBytecode`: compile and encode with the given separator.
pub fn compile_to_bytecode(root: &Node, separator: &str) -> String {
    compile(root).encode(separator)
}

struct Compiler {
    code: Vec<Instruction>,
}

impl Compiler {
    fn new() -> Self {
        Self { code: Vec::new() }
    }

    fn emit(&mut self, instruction: Instruction) {
        self.code.push(instruction);
    }

    fn current_offset(&self) -> usize {
        self.code.len()
    }

    /// Point the jump at `idx` to the current end of code.
    fn patch_jump(&mut self, idx: usize) {
        let target = self.current_offset();
        match self.code.get_mut(idx) {
            Some(Instruction::JumpIfFalse(dest) | Instruction::Jump(dest)) => *dest = target,
            _ => {}
        }
    }

    fn compile_node(&mut self, node: &Node) {
        match &node.kind {
            NodeKind::Value(value) => self.emit(match value {
                Value::Int(n) => Instruction::Int(*n),
                Value::Float(f) => Instruction::Float(*f),
                Value::Str(s) => Instruction::Str(s.clone()),
                Value::Bool(b) => Instruction::Bool(*b),
                Value::Void | Value::Null | Value::Record(_) => Instruction::Null,
            }),
            NodeKind::Variable { .. } | NodeKind::VariableInRecord { .. } => {
                self.emit(Instruction::Load(node.lvalue_name().unwrap_or_default()));
            }
            NodeKind::BindVariable { name } => self.emit(Instruction::BindLoad(name.clone())),
            NodeKind::Negate { operand, .. } => {
                self.emit(Instruction::Negate);
                self.compile_node(operand);
            }
            NodeKind::Operator {
                op, left, right, ..
            } => {
                self.emit(Instruction::Binary(*op));
                self.compile_node(left);
                self.compile_node(right);
            }
            NodeKind::Ternary {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                let select = self.current_offset();
                self.emit(Instruction::Select {
                    otherwise: 0,
                    end: 0,
                }); // placeholder
                self.compile_node(condition);
                self.compile_node(then_branch);
                let else_start = self.current_offset();
                self.compile_node(else_branch);
                let end = self.current_offset();
                if let Some(Instruction::Select { otherwise, end: dest }) = self.code.get_mut(select)
                {
                    *otherwise = else_start;
                    *dest = end;
                }
            }
            NodeKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let jump_else = self.current_offset();
                self.emit(Instruction::JumpIfFalse(0)); // placeholder
                self.compile_node(condition);
                self.compile_stream(then_branch);

                if let Some(else_stream) = else_branch {
                    let jump_end = self.current_offset();
                    self.emit(Instruction::Jump(0)); // placeholder
                    self.patch_jump(jump_else);
                    self.compile_stream(else_stream);
                    self.patch_jump(jump_end);
                } else {
                    self.patch_jump(jump_else);
                }
            }
            NodeKind::While { condition, body } => {
                let start = self.current_offset();
                self.emit(Instruction::JumpIfFalse(0)); // placeholder
                self.compile_node(condition);
                self.compile_stream(body);
                self.emit(Instruction::Jump(start));
                self.patch_jump(start);
            }
            NodeKind::Stream(stream) => self.compile_stream(stream),
            NodeKind::Declaration { name, init, .. } => {
                self.emit(Instruction::Declare {
                    name: name.clone(),
                    init: init.is_some(),
                });
                if let Some(init) = init {
                    self.compile_node(init);
                }
            }
            NodeKind::Assignment { target, value } => {
                self.emit(Instruction::Assign(target.lvalue_name().unwrap_or_default()));
                self.compile_node(value);
            }
            NodeKind::Call { name, args, .. } => {
                self.emit(Instruction::Call {
                    name: name.clone(),
                    argc: args.len(),
                });
                for arg in args {
                    self.compile_node(arg);
                }
            }
        }
    }

    /// Block header followed by the statements; the header's length is
    /// backpatched once the statements are emitted.
    fn compile_stream(&mut self, stream: &Stream) {
        let header = self.current_offset();
        self.emit(Instruction::Block {
            count: 0,
            declared: stream.declared.clone(),
        });
        for statement in &stream.statements {
            self.compile_node(statement);
        }
        let len = self.current_offset() - header - 1;
        if let Some(Instruction::Block { count, .. }) = self.code.get_mut(header) {
            *count = len;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::dsl::ast::BinOp;
    use crate::dsl::parser::{parse, parse_expression, Globals};
    use pretty_assertions::assert_eq;

    fn compile_src(src: &str) -> Bytecode {
        compile(&parse(src, &Globals::new()).unwrap())
    }

    #[test]
    fn prefix_order() {
        let code = compile(&parse_expression("1 + 2 * 3").unwrap());
        assert_eq!(
            code.instructions,
            vec![
                Instruction::Binary(BinOp::Add),
                Instruction::Int(1),
                Instruction::Binary(BinOp::Mul),
                Instruction::Int(2),
                Instruction::Int(3),
            ]
        );
    }

    #[test]
    fn encoded_expression() {
        let ast = parse_expression("Concat('a', 'b')").unwrap();
        assert_eq!(compile_to_bytecode(&ast, "||"), "fc:Concat:2||s:a||s:b");
    }

    #[test]
    fn if_else_branches_are_backpatched() {
        let code = compile_src("int x = 0; if x > 0 { x = 1; } else { x = 2; }");
        let ins = &code.instructions;
        let if_at = ins
            .iter()
            .position(|i| matches!(i, Instruction::JumpIfFalse(_)))
            .unwrap();
        let jmp_at = ins
            .iter()
            .position(|i| matches!(i, Instruction::Jump(_)))
            .unwrap();
        // false branch starts right after the unconditional jump
        assert_eq!(ins[if_at], Instruction::JumpIfFalse(jmp_at + 1));
        // the jump skips the else block entirely
        assert_eq!(ins[jmp_at], Instruction::Jump(ins.len()));
        assert!(matches!(ins[jmp_at + 1], Instruction::Block { count: 2, .. }));
    }

    #[test]
    fn if_without_else_jumps_past_then_branch() {
        let code = compile_src("bool b = true; if b { Write('x'); }");
        let ins = &code.instructions;
        let if_at = ins
            .iter()
            .position(|i| matches!(i, Instruction::JumpIfFalse(_)))
            .unwrap();
        assert_eq!(ins[if_at], Instruction::JumpIfFalse(ins.len()));
    }

    #[test]
    fn while_loops_back_to_its_test() {
        let code = compile_src("int i = 0; while i < 3 { Inc(i); }");
        let ins = &code.instructions;
        let test_at = ins
            .iter()
            .position(|i| matches!(i, Instruction::JumpIfFalse(_)))
            .unwrap();
        assert_eq!(ins.last(), Some(&Instruction::Jump(test_at)));
        assert_eq!(ins[test_at], Instruction::JumpIfFalse(ins.len()));
    }

    #[test]
    fn ternary_select_targets() {
        let code = compile(&parse_expression("true ? 1 : 2").unwrap());
        assert_eq!(
            code.instructions,
            vec![
                Instruction::Select { otherwise: 3, end: 4 },
                Instruction::Bool(true),
                Instruction::Int(1),
                Instruction::Int(2),
            ]
        );
    }

    #[test]
    fn stream_header_counts_its_body() {
        let code = compile_src("int a = 1; { int b = a; }");
        assert!(matches!(
            &code.instructions[0],
            Instruction::Block { count, .. } if *count == code.len() - 1
        ));
        assert!(matches!(code.instructions[3], Instruction::Block { count: 2, .. }));
    }

    #[test]
    fn compiling_twice_is_identical() {
        let ast = parse("int x = 2; while x > 0 { Dec(x); }", &Globals::new()).unwrap();
        assert_eq!(compile_to_bytecode(&ast, "||"), compile_to_bytecode(&ast, "||"));
    }
}
