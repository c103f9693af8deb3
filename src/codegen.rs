//! Typed AST to x86-64 assembly. A pure stack machine: every expression
//! node, once generated, leaves exactly one 8-byte value on top of the
//! runtime stack; statements balance the stack back to where they found it.

use std::fmt::Write as _;

use arrayvec::ArrayVec;

use crate::ast::{BinOp, Node, NodeKind};
use crate::types::Type;

const REGISTERS_8BYTE: [&str; 6] = ["rdi", "rsi", "rdx", "rcx", "r8", "r9"];
const REGISTERS_1BYTE: [&str; 6] = ["dil", "sil", "dl", "cl", "r8b", "r9b"];

pub fn generate(program: &Node<'_>) -> String {
    let mut codegen = Codegen::new();
    codegen.program(program);
    codegen.out
}

struct Codegen {
    out: String,
    label_counter: u32,
}

fn align(target: u64, unit: u64) -> u64 {
    (target + unit) & !(unit - 1)
}

impl Codegen {
    fn new() -> Self {
        Codegen {
            out: String::new(),
            label_counter: 0,
        }
    }

    fn next_label(&mut self) -> u32 {
        let label = self.label_counter;
        self.label_counter += 1;
        label
    }

    fn program(&mut self, node: &Node<'_>) {
        let NodeKind::Program(items) = &node.kind else {
            unreachable!("parser always produces a Program node at the root");
        };

        writeln!(self.out, ".intel_syntax noprefix").unwrap();

        writeln!(self.out, ".data").unwrap();
        for item in items {
            if let NodeKind::GlobalVariableDefinition(_) = &item.kind {
                self.generate(item);
            }
        }

        writeln!(self.out, ".text").unwrap();
        for item in items {
            if let NodeKind::FunctionDefinition { .. } = &item.kind {
                self.generate(item);
            }
        }
    }

    /// Dispatches on node kind. `GlobalVariableDefinition`, `FunctionDefinition`
    /// and `Program` only ever appear directly under `Program` and are handled
    /// there, so reaching them here is an internal invariant violation.
    fn generate(&mut self, node: &Node<'_>) {
        match &node.kind {
            NodeKind::Number(value) => self.number(*value),
            NodeKind::LocalVariable(_) => self.local_variable(node),
            NodeKind::Address(_) => self.address(node),
            NodeKind::Dereference(inner) => self.dereference(node, inner),
            NodeKind::Binary(op, lhs, rhs) => self.binary(*op, lhs, rhs),
            NodeKind::Assign(lhs, rhs) => self.assign(node, lhs, rhs),
            NodeKind::Block(statements) => self.block(statements),
            NodeKind::If(cond, then_branch, else_branch) => {
                self.if_statement(cond, then_branch, *else_branch)
            }
            NodeKind::While(cond, body) => self.while_statement(cond, body),
            NodeKind::For(init, cond, step, body) => self.for_statement(*init, *cond, *step, body),
            NodeKind::Return(value) => self.return_statement(value),
            NodeKind::FunctionCall(name, arguments) => self.function_call(name, arguments),
            NodeKind::FunctionDefinition {
                name,
                parameters,
                body,
                scope,
            } => self.function_definition(name, parameters, body, scope),
            NodeKind::GlobalVariableDefinition(variable) => {
                writeln!(self.out, "{}:", variable.name).unwrap();
                writeln!(self.out, "  .zero {}", variable.ty.size()).unwrap();
            }
            NodeKind::Program(_) => unreachable!("Program only appears at the root"),
        }
    }

    fn number(&mut self, value: i64) {
        writeln!(self.out, "  push {value}").unwrap();
    }

    /// Pushes the address of an lvalue node (`LocalVariable`, `Dereference`
    /// or `Address`) without loading through it.
    fn address(&mut self, node: &Node<'_>) {
        match &node.kind {
            NodeKind::Address(inner) => self.address(inner),
            NodeKind::Dereference(inner) => self.generate(inner),
            NodeKind::LocalVariable(variable) => {
                if variable.is_global {
                    writeln!(self.out, "  lea rax, {}[rip]", variable.name).unwrap();
                } else {
                    writeln!(self.out, "  mov rax, rbp").unwrap();
                    writeln!(self.out, "  sub rax, {}", variable.offset).unwrap();
                }
                writeln!(self.out, "  push rax").unwrap();
            }
            _ => unreachable!("address() is only called on lvalue nodes"),
        }
    }

    fn load(&mut self, ty: &Type<'_>) {
        writeln!(self.out, "  pop rax").unwrap();
        if ty.size() == 1 {
            writeln!(self.out, "  movsx rax, BYTE PTR [rax]").unwrap();
        } else {
            writeln!(self.out, "  mov rax, [rax]").unwrap();
        }
        writeln!(self.out, "  push rax").unwrap();
    }

    fn store(&mut self, ty: &Type<'_>) {
        writeln!(self.out, "  pop rdi").unwrap();
        writeln!(self.out, "  pop rax").unwrap();
        if ty.size() == 1 {
            writeln!(self.out, "  mov [rax], dil").unwrap();
        } else {
            writeln!(self.out, "  mov [rax], rdi").unwrap();
        }
        writeln!(self.out, "  push rdi").unwrap();
    }

    fn local_variable(&mut self, node: &Node<'_>) {
        self.address(node);
        let ty = node.ty.expect("expression node must have a type");
        if !matches!(ty, Type::Array(_, _)) {
            self.load(ty);
        }
    }

    fn dereference(&mut self, node: &Node<'_>, inner: &Node<'_>) {
        self.generate(inner);
        let ty = node.ty.expect("expression node must have a type");
        if !matches!(ty, Type::Array(_, _)) {
            self.load(ty);
        }
    }

    fn assign(&mut self, node: &Node<'_>, lhs: &Node<'_>, rhs: &Node<'_>) {
        self.address(lhs);
        self.generate(rhs);
        let ty = node.ty.expect("expression node must have a type");
        self.store(ty);
    }

    fn binary(&mut self, op: BinOp, lhs: &Node<'_>, rhs: &Node<'_>) {
        match op {
            BinOp::AddPointer => return self.pointer_scaled(lhs, rhs, "add"),
            BinOp::SubPointer => return self.pointer_scaled(lhs, rhs, "sub"),
            BinOp::DiffPointer => return self.diff_pointer(lhs, rhs),
            _ => {}
        }

        self.generate(lhs);
        self.generate(rhs);
        writeln!(self.out, "  pop rdi").unwrap();
        writeln!(self.out, "  pop rax").unwrap();
        match op {
            BinOp::Add => writeln!(self.out, "  add rax, rdi").unwrap(),
            BinOp::Sub => writeln!(self.out, "  sub rax, rdi").unwrap(),
            BinOp::Mul => writeln!(self.out, "  imul rax, rdi").unwrap(),
            BinOp::Div => {
                writeln!(self.out, "  cqo").unwrap();
                writeln!(self.out, "  idiv rdi").unwrap();
            }
            BinOp::Eq => self.set_compare("sete"),
            BinOp::Ne => self.set_compare("setne"),
            BinOp::Lt => self.set_compare("setl"),
            BinOp::Le => self.set_compare("setle"),
            BinOp::AddPointer | BinOp::SubPointer | BinOp::DiffPointer => unreachable!(),
        }
        writeln!(self.out, "  push rax").unwrap();
    }

    fn set_compare(&mut self, set: &str) {
        writeln!(self.out, "  cmp rax, rdi").unwrap();
        writeln!(self.out, "  {set} al").unwrap();
        writeln!(self.out, "  movzb rax, al").unwrap();
    }

    fn pointer_scaled(&mut self, lhs: &Node<'_>, rhs: &Node<'_>, op: &str) {
        self.generate(lhs);
        self.generate(rhs);
        let pointee_size = lhs
            .ty
            .expect("expression node must have a type")
            .pointee()
            .expect("pointer arithmetic lhs must be pointer-like")
            .size();
        writeln!(self.out, "  pop rdi").unwrap();
        writeln!(self.out, "  pop rax").unwrap();
        writeln!(self.out, "  imul rdi, {pointee_size}").unwrap();
        writeln!(self.out, "  {op} rax, rdi").unwrap();
        writeln!(self.out, "  push rax").unwrap();
    }

    fn diff_pointer(&mut self, lhs: &Node<'_>, rhs: &Node<'_>) {
        self.generate(lhs);
        self.generate(rhs);
        let pointee_size = lhs
            .ty
            .expect("expression node must have a type")
            .pointee()
            .expect("pointer difference lhs must be pointer-like")
            .size();
        writeln!(self.out, "  pop rdi").unwrap();
        writeln!(self.out, "  pop rax").unwrap();
        writeln!(self.out, "  sub rax, rdi").unwrap();
        writeln!(self.out, "  mov rdi, {pointee_size}").unwrap();
        writeln!(self.out, "  cqo").unwrap();
        writeln!(self.out, "  idiv rdi").unwrap();
        writeln!(self.out, "  push rax").unwrap();
    }

    fn block(&mut self, statements: &[&Node<'_>]) {
        for statement in statements {
            self.generate(statement);
            if statement.produces_value() {
                writeln!(self.out, "  pop rax").unwrap();
            }
        }
    }

    fn if_statement(&mut self, cond: &Node<'_>, then_branch: &Node<'_>, else_branch: Option<&Node<'_>>) {
        let label = self.next_label();
        self.generate(cond);
        writeln!(self.out, "  pop rax").unwrap();
        writeln!(self.out, "  cmp rax, 0").unwrap();
        if let Some(else_branch) = else_branch {
            writeln!(self.out, "  je .Lelse{label}").unwrap();
            self.generate(then_branch);
            if then_branch.produces_value() {
                writeln!(self.out, "  pop rax").unwrap();
            }
            writeln!(self.out, "  jmp .Lend{label}").unwrap();
            writeln!(self.out, ".Lelse{label}:").unwrap();
            self.generate(else_branch);
            if else_branch.produces_value() {
                writeln!(self.out, "  pop rax").unwrap();
            }
            writeln!(self.out, ".Lend{label}:").unwrap();
        } else {
            writeln!(self.out, "  je .Lend{label}").unwrap();
            self.generate(then_branch);
            if then_branch.produces_value() {
                writeln!(self.out, "  pop rax").unwrap();
            }
            writeln!(self.out, ".Lend{label}:").unwrap();
        }
    }

    fn while_statement(&mut self, cond: &Node<'_>, body: &Node<'_>) {
        let label = self.next_label();
        writeln!(self.out, ".Lbegin{label}:").unwrap();
        self.generate(cond);
        writeln!(self.out, "  pop rax").unwrap();
        writeln!(self.out, "  cmp rax, 0").unwrap();
        writeln!(self.out, "  je .Lend{label}").unwrap();
        self.generate(body);
        if body.produces_value() {
            writeln!(self.out, "  pop rax").unwrap();
        }
        writeln!(self.out, "  jmp .Lbegin{label}").unwrap();
        writeln!(self.out, ".Lend{label}:").unwrap();
    }

    fn for_statement(&mut self, init: Option<&Node<'_>>, cond: Option<&Node<'_>>, step: Option<&Node<'_>>, body: &Node<'_>) {
        let label = self.next_label();
        if let Some(init) = init {
            self.generate(init);
            if init.produces_value() {
                writeln!(self.out, "  pop rax").unwrap();
            }
        }
        writeln!(self.out, ".Lbegin{label}:").unwrap();
        if let Some(cond) = cond {
            self.generate(cond);
            writeln!(self.out, "  pop rax").unwrap();
            writeln!(self.out, "  cmp rax, 0").unwrap();
            writeln!(self.out, "  je .Lend{label}").unwrap();
        }
        self.generate(body);
        if body.produces_value() {
            writeln!(self.out, "  pop rax").unwrap();
        }
        if let Some(step) = step {
            self.generate(step);
            if step.produces_value() {
                writeln!(self.out, "  pop rax").unwrap();
            }
        }
        writeln!(self.out, "  jmp .Lbegin{label}").unwrap();
        writeln!(self.out, ".Lend{label}:").unwrap();
    }

    fn return_statement(&mut self, value: &Node<'_>) {
        self.generate(value);
        writeln!(self.out, "  pop rax").unwrap();
        writeln!(self.out, "  mov rsp, rbp").unwrap();
        writeln!(self.out, "  pop rbp").unwrap();
        writeln!(self.out, "  ret").unwrap();
    }

    fn function_call(&mut self, name: &str, arguments: &[&Node<'_>]) {
        for argument in arguments {
            self.generate(argument);
        }
        let mut registers: ArrayVec<&'static str, 6> = ArrayVec::new();
        for i in 0..arguments.len() {
            registers.push(REGISTERS_8BYTE[i]);
        }
        for register in registers.iter().rev() {
            writeln!(self.out, "  pop {register}").unwrap();
        }

        let label = self.next_label();
        writeln!(self.out, "  mov rax, rsp").unwrap();
        writeln!(self.out, "  and rax, 15").unwrap();
        writeln!(self.out, "  jnz .Lcall{label}").unwrap();
        writeln!(self.out, "  mov rax, 0").unwrap();
        writeln!(self.out, "  call {name}").unwrap();
        writeln!(self.out, "  jmp .Lend{label}").unwrap();
        writeln!(self.out, ".Lcall{label}:").unwrap();
        writeln!(self.out, "  sub rsp, 8").unwrap();
        writeln!(self.out, "  mov rax, 0").unwrap();
        writeln!(self.out, "  call {name}").unwrap();
        writeln!(self.out, "  add rsp, 8").unwrap();
        writeln!(self.out, ".Lend{label}:").unwrap();
        writeln!(self.out, "  push rax").unwrap();
    }

    fn function_definition(
        &mut self,
        name: &str,
        parameters: &[&crate::ast::LocalVariable<'_>],
        body: &Node<'_>,
        scope: &crate::ast::Scope<'_>,
    ) {
        writeln!(self.out, ".global {name}").unwrap();
        writeln!(self.out, "{name}:").unwrap();

        let frame_size = scope.frame_size();
        writeln!(self.out, "  push rbp").unwrap();
        writeln!(self.out, "  mov rbp, rsp").unwrap();
        writeln!(self.out, "  sub rsp, {}", align(frame_size, 8)).unwrap();

        for (i, parameter) in parameters.iter().enumerate() {
            let register = if parameter.ty.size() == 1 {
                REGISTERS_1BYTE[i]
            } else {
                REGISTERS_8BYTE[i]
            };
            writeln!(self.out, "  mov [rbp-{}], {register}", parameter.offset).unwrap();
        }

        self.generate(body);
    }
}
