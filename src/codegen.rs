//! Code generation: lower the parsed AST into AT&T x86-64 assembly.
//!
//! The emitter uses a single-accumulator model: every expression leaves its
//! value in `%eax`. Binary operators park the left operand on the machine
//! stack while the right one is evaluated, then combine with the right value
//! in `%edi`. Locals live in a fixed frame below `%rbp`, one 4-byte slot per
//! distinct declared name, laid out before any instruction is emitted.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, trace};

use crate::ast::{BinaryOp, Expr, Function, Program, Stmt};
use crate::error::{CompileError, CompileResult};

const SLOT_SIZE: i32 = 4;
const FRAME_ALIGN: i32 = 16;

/// Emit assembly for every function in the program.
pub fn generate(program: &Program) -> CompileResult<String> {
  CodeGen::default().generate(program)
}

/// Owns the label counter for one compilation, so labels stay unique
/// across all functions of the output.
#[derive(Debug, Default)]
pub struct CodeGen {
  labels: usize,
}

impl CodeGen {
  pub fn generate(&mut self, program: &Program) -> CompileResult<String> {
    let mut asm = String::new();
    asm.push_str("    .text\n");
    for func in &program.functions {
      self.emit_function(func, &mut asm)?;
    }
    Ok(asm)
  }

  fn new_label(&mut self) -> String {
    let label = format!(".L{}", self.labels);
    self.labels += 1;
    trace!(%label, "allocated label");
    label
  }

  fn emit_function(&mut self, func: &Function, asm: &mut String) -> CompileResult<()> {
    let frame = Frame::layout(func);
    debug!(
      function = %func.name,
      slots = frame.offsets.len(),
      frame_size = frame.size,
      "lowering function"
    );

    asm.push_str(&format!("    .globl {}\n", func.name));
    asm.push_str(&format!("{}:\n", func.name));
    asm.push_str("    push %rbp\n");
    asm.push_str("    mov %rsp, %rbp\n");
    if frame.size > 0 {
      asm.push_str(&format!("    sub ${}, %rsp\n", frame.size));
    }

    let mut ctx = FnCtx {
      name: &func.name,
      frame: &frame,
      asm,
    };
    for stmt in &func.body {
      self.emit_stmt(stmt, &mut ctx)?;
    }

    // Falling off the end returns 0.
    ctx.asm.push_str("    mov $0, %eax\n");
    emit_epilogue(ctx.asm);
    Ok(())
  }

  fn emit_stmt(&mut self, stmt: &Stmt, ctx: &mut FnCtx) -> CompileResult<()> {
    match stmt {
      Stmt::Decl { name, init } => {
        let offset = ctx.offset_of(name)?;
        match init {
          Some(init) => {
            self.emit_expr(init, ctx)?;
            ctx.asm.push_str(&format!("    mov %eax, {offset}(%rbp)\n"));
          }
          None => ctx.asm.push_str(&format!("    movl $0, {offset}(%rbp)\n")),
        }
      }
      Stmt::Expr { expr } => self.emit_expr(expr, ctx)?,
      Stmt::Return { expr } => {
        self.emit_expr(expr, ctx)?;
        emit_epilogue(ctx.asm);
      }
      Stmt::If { cond, then, els } => {
        let else_label = self.new_label();
        let end_label = self.new_label();
        self.emit_expr(cond, ctx)?;
        ctx.asm.push_str("    cmp $0, %eax\n");
        ctx.asm.push_str(&format!("    je {else_label}\n"));
        self.emit_stmt(then, ctx)?;
        ctx.asm.push_str(&format!("    jmp {end_label}\n"));
        ctx.asm.push_str(&format!("{else_label}:\n"));
        if let Some(els) = els {
          self.emit_stmt(els, ctx)?;
        }
        ctx.asm.push_str(&format!("{end_label}:\n"));
      }
      Stmt::While { cond, body } => {
        let top_label = self.new_label();
        let end_label = self.new_label();
        ctx.asm.push_str(&format!("{top_label}:\n"));
        self.emit_expr(cond, ctx)?;
        ctx.asm.push_str("    cmp $0, %eax\n");
        ctx.asm.push_str(&format!("    je {end_label}\n"));
        self.emit_stmt(body, ctx)?;
        ctx.asm.push_str(&format!("    jmp {top_label}\n"));
        ctx.asm.push_str(&format!("{end_label}:\n"));
      }
      Stmt::Block { body } => {
        for stmt in body {
          self.emit_stmt(stmt, ctx)?;
        }
      }
    }
    Ok(())
  }

  /// Emit code leaving the value of `node` in `%eax`.
  fn emit_expr(&mut self, node: &Expr, ctx: &mut FnCtx) -> CompileResult<()> {
    match node {
      Expr::Num { value } => ctx.asm.push_str(&format!("    mov ${value}, %eax\n")),
      Expr::Var { name } => {
        let offset = ctx.offset_of(name)?;
        ctx.asm.push_str(&format!("    mov {offset}(%rbp), %eax\n"));
      }
      Expr::Binary {
        op: BinaryOp::Assign,
        lhs,
        rhs,
      } => {
        let Expr::Var { name } = lhs.as_ref() else {
          return Err(ctx.error(format!("cannot assign to {lhs}")));
        };
        let offset = ctx.offset_of(name)?;
        self.emit_expr(rhs, ctx)?;
        ctx.asm.push_str(&format!("    mov %eax, {offset}(%rbp)\n"));
      }
      Expr::Binary {
        op: BinaryOp::Neg,
        lhs,
        rhs,
      } => {
        if **lhs != Expr::number(0) {
          return Err(ctx.error(format!("negation must have a zero left operand, got {lhs}")));
        }
        self.emit_expr(rhs, ctx)?;
        ctx.asm.push_str("    neg %eax\n");
      }
      Expr::Binary {
        op: op @ (BinaryOp::And | BinaryOp::Or),
        lhs,
        rhs,
      } => self.emit_logical(*op, lhs, rhs, ctx)?,
      Expr::Binary { op, lhs, rhs } => {
        let Some(seq) = arith_sequence(*op) else {
          return Err(ctx.error(format!("operator '{op}' has no arithmetic lowering")));
        };
        self.emit_expr(lhs, ctx)?;
        ctx.asm.push_str("    push %rax\n");
        self.emit_expr(rhs, ctx)?;
        ctx.asm.push_str("    mov %eax, %edi\n");
        ctx.asm.push_str("    pop %rax\n");
        for instr in seq {
          ctx.asm.push_str(&format!("    {instr}\n"));
        }
      }
    }
    Ok(())
  }

  /// Short-circuit `&&` / `||`: the right operand is only reached when the
  /// left one does not already decide the result. Both yield 0 or 1.
  fn emit_logical(
    &mut self,
    op: BinaryOp,
    lhs: &Expr,
    rhs: &Expr,
    ctx: &mut FnCtx,
  ) -> CompileResult<()> {
    let (jump, short_value) = match op {
      BinaryOp::And => ("je", 0),
      _ => ("jne", 1),
    };
    let short_label = self.new_label();
    let end_label = self.new_label();

    self.emit_expr(lhs, ctx)?;
    ctx.asm.push_str("    cmp $0, %eax\n");
    ctx.asm.push_str(&format!("    {jump} {short_label}\n"));
    self.emit_expr(rhs, ctx)?;
    ctx.asm.push_str("    cmp $0, %eax\n");
    ctx.asm.push_str("    setne %al\n");
    ctx.asm.push_str("    movzbl %al, %eax\n");
    ctx.asm.push_str(&format!("    jmp {end_label}\n"));
    ctx.asm.push_str(&format!("{short_label}:\n"));
    ctx.asm.push_str(&format!("    mov ${short_value}, %eax\n"));
    ctx.asm.push_str(&format!("{end_label}:\n"));
    Ok(())
  }
}

/// Instructions combining left (`%eax`) and right (`%edi`) into `%eax`.
fn arith_sequence(op: BinaryOp) -> Option<&'static [&'static str]> {
  let seq: &[&str] = match op {
    BinaryOp::Add => &["add %edi, %eax"],
    BinaryOp::Sub => &["sub %edi, %eax"],
    BinaryOp::Mul => &["imul %edi, %eax"],
    BinaryOp::Div => &["cltd", "idiv %edi"],
    BinaryOp::Rem => &["cltd", "idiv %edi", "mov %edx, %eax"],
    BinaryOp::Eq => &["cmp %edi, %eax", "sete %al", "movzbl %al, %eax"],
    BinaryOp::Ne => &["cmp %edi, %eax", "setne %al", "movzbl %al, %eax"],
    BinaryOp::Lt => &["cmp %edi, %eax", "setl %al", "movzbl %al, %eax"],
    BinaryOp::Le => &["cmp %edi, %eax", "setle %al", "movzbl %al, %eax"],
    BinaryOp::Gt => &["cmp %edi, %eax", "setg %al", "movzbl %al, %eax"],
    BinaryOp::Ge => &["cmp %edi, %eax", "setge %al", "movzbl %al, %eax"],
    BinaryOp::And | BinaryOp::Or | BinaryOp::Assign | BinaryOp::Neg => return None,
  };
  Some(seq)
}

/// Release the frame and return; shared by `return` and the fall-through exit.
fn emit_epilogue(asm: &mut String) {
  asm.push_str("    mov %rbp, %rsp\n");
  asm.push_str("    pop %rbp\n");
  asm.push_str("    ret\n");
}

/// Stack slots for one function, keyed by variable name.
///
/// Names are flat per function: the same name declared in two nested blocks
/// shares one slot.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Frame {
  pub offsets: BTreeMap<String, i32>,
  pub size: i32,
}

impl Frame {
  pub fn layout(func: &Function) -> Self {
    let mut names = BTreeSet::new();
    for stmt in &func.body {
      collect_decls(stmt, &mut names);
    }

    let offsets: BTreeMap<_, _> = names
      .into_iter()
      .zip(1..)
      .map(|(name, slot): (&str, i32)| (name.to_string(), -slot * SLOT_SIZE))
      .collect();
    let used = offsets.len() as i32 * SLOT_SIZE;
    let size = (used + FRAME_ALIGN - 1) / FRAME_ALIGN * FRAME_ALIGN;
    Self { offsets, size }
  }

  pub fn offset(&self, name: &str) -> Option<i32> {
    self.offsets.get(name).copied()
  }
}

fn collect_decls<'a>(stmt: &'a Stmt, names: &mut BTreeSet<&'a str>) {
  match stmt {
    Stmt::Decl { name, .. } => {
      names.insert(name.as_str());
    }
    Stmt::Block { body } => body.iter().for_each(|stmt| collect_decls(stmt, names)),
    Stmt::If { then, els, .. } => {
      collect_decls(then, names);
      if let Some(els) = els {
        collect_decls(els, names);
      }
    }
    Stmt::While { body, .. } => collect_decls(body, names),
    Stmt::Expr { .. } | Stmt::Return { .. } => {}
  }
}

/// Per-function lowering state.
struct FnCtx<'a> {
  name: &'a str,
  frame: &'a Frame,
  asm: &'a mut String,
}

impl FnCtx<'_> {
  fn offset_of(&self, name: &str) -> CompileResult<i32> {
    self
      .frame
      .offset(name)
      .ok_or_else(|| self.error(format!("undeclared variable '{name}'")))
  }

  fn error(&self, message: String) -> CompileError {
    CompileError::codegen(self.name, message)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::parser::parse;
  use crate::tokenizer::Lexer;

  fn asm_for(source: &str) -> CompileResult<String> {
    let program = parse(Lexer::new(source)).unwrap();
    generate(&program)
  }

  fn function(body: Vec<Stmt>) -> Function {
    Function {
      name: "f".to_string(),
      body,
    }
  }

  fn decl(name: &str) -> Stmt {
    Stmt::Decl {
      name: name.to_string(),
      init: None,
    }
  }

  #[test]
  fn frame_collects_nested_declarations() {
    let func = function(vec![
      decl("b"),
      Stmt::If {
        cond: Expr::number(1),
        then: Box::new(decl("a")),
        els: Some(Box::new(Stmt::Block {
          body: vec![decl("c")],
        })),
      },
      Stmt::While {
        cond: Expr::number(0),
        body: Box::new(decl("d")),
      },
      decl("b"),
    ]);
    let frame = Frame::layout(&func);
    assert_eq!(frame.offsets.len(), 4);
    assert_eq!(frame.size, 16);
    let mut offsets: Vec<_> = frame.offsets.values().copied().collect();
    offsets.sort_unstable();
    assert_eq!(offsets, [-16, -12, -8, -4]);
  }

  #[test]
  fn frame_size_rounds_to_sixteen() {
    let names = ["a", "b", "c", "d", "e"];
    let frame = Frame::layout(&function(names.iter().map(|n| decl(n)).collect()));
    assert_eq!(frame.size, 32);
    assert_eq!(Frame::layout(&function(vec![])).size, 0);
  }

  #[test]
  fn empty_program_is_just_text_section() {
    assert_eq!(generate(&Program::default()).unwrap(), "    .text\n");
  }

  #[test]
  fn function_without_locals_skips_frame_reservation() {
    let asm = asm_for("int main() { }").unwrap();
    assert_eq!(
      asm,
      "    .text\n    .globl main\nmain:\n    push %rbp\n    mov %rsp, %rbp\n    mov $0, %eax\n    mov %rbp, %rsp\n    pop %rbp\n    ret\n"
    );
  }

  #[test]
  fn return_inlines_epilogue() {
    let asm = asm_for("int main() { int x = 5; return x; }").unwrap();
    assert!(asm.contains("    sub $16, %rsp\n"));
    assert!(asm.contains(
      "    mov -4(%rbp), %eax\n    mov %rbp, %rsp\n    pop %rbp\n    ret\n    mov $0, %eax\n"
    ));
    assert_eq!(asm.matches("    ret\n").count(), 2);
  }

  #[test]
  fn uninitialised_declaration_stores_zero() {
    let asm = asm_for("int main() { int x; return x; }").unwrap();
    assert!(asm.contains("    movl $0, -4(%rbp)\n"));
  }

  #[test]
  fn undeclared_variable_is_named() {
    let err = asm_for("int f(){ return y; }").unwrap_err();
    assert!(matches!(&err, CompileError::Codegen { function, .. } if function == "f"));
    assert!(err.message().contains("'y'"));
  }

  #[test]
  fn assignment_to_undeclared_variable_fails() {
    let err = asm_for("int main(){ z = 1; }").unwrap_err();
    assert_eq!(err.message(), "undeclared variable 'z'");
  }

  #[test]
  fn if_without_else_jumps_to_empty_else_label() {
    let asm = asm_for("int main() { if (0) return 1; return 2; }").unwrap();
    assert!(asm.contains("    cmp $0, %eax\n    je .L0\n"));
    assert!(asm.contains("    jmp .L1\n.L0:\n.L1:\n"));
  }

  #[test]
  fn while_tests_at_top() {
    let asm = asm_for("int main() { int i = 3; while (i) i = i - 1; return i; }").unwrap();
    let top = asm.find(".L0:\n").unwrap();
    let exit = asm.find("    je .L1\n").unwrap();
    let back = asm.find("    jmp .L0\n").unwrap();
    let end = asm.find(".L1:\n").unwrap();
    assert!(top < exit && exit < back && back < end);
  }

  #[test]
  fn and_skips_right_operand_when_left_is_zero() {
    let asm = asm_for("int main() { return 0 && (1/0); }").unwrap();
    let branch = asm.find("    je .L0\n").unwrap();
    let divide = asm.find("    idiv %edi\n").unwrap();
    let short = asm.find(".L0:\n").unwrap();
    // Division sits between the short-circuit branch and its target.
    assert!(branch < divide && divide < short);
    assert!(asm[short..].contains("    mov $0, %eax\n.L1:\n"));
  }

  #[test]
  fn or_short_circuits_to_one() {
    let asm = asm_for("int main() { return 1 || 0; }").unwrap();
    assert!(asm.contains("    jne .L0\n"));
    assert!(asm.contains(".L0:\n    mov $1, %eax\n.L1:\n"));
  }

  #[test]
  fn labels_are_unique_across_functions() {
    let asm = asm_for("int a() { if (1) return 1; } int b() { while (0) { } }").unwrap();
    for label in [".L0:", ".L1:", ".L2:", ".L3:"] {
      assert_eq!(asm.matches(label).count(), 1, "{label}");
    }
  }

  #[test]
  fn comparisons_materialise_booleans() {
    let asm = asm_for("int main() { return 1 > 2; }").unwrap();
    assert!(asm.contains("    cmp %edi, %eax\n    setg %al\n    movzbl %al, %eax\n"));
  }

  #[test]
  fn remainder_takes_edx() {
    let asm = asm_for("int main() { return 7 % 3; }").unwrap();
    assert!(asm.contains("    cltd\n    idiv %edi\n    mov %edx, %eax\n"));
  }

  #[test]
  fn negation_lowers_operand_only() {
    let asm = asm_for("int main() { return -5; }").unwrap();
    assert!(asm.contains("    mov $5, %eax\n    neg %eax\n"));
    assert!(!asm.contains("push %rax"));
  }

  #[test]
  fn malformed_nodes_are_reported() {
    let bad_assign = function(vec![Stmt::Expr {
      expr: Expr::assign(Expr::number(1), Expr::number(2)),
    }]);
    let program = Program {
      functions: vec![bad_assign],
    };
    let err = generate(&program).unwrap_err();
    assert_eq!(err.message(), "cannot assign to 1");

    let bad_neg = function(vec![Stmt::Return {
      expr: Expr::binary(BinaryOp::Neg, Expr::number(3), Expr::number(2)),
    }]);
    let program = Program {
      functions: vec![bad_neg],
    };
    assert!(matches!(generate(&program), Err(CompileError::Codegen { .. })));
  }

  #[test]
  fn redeclaration_in_nested_block_shares_slot() {
    let asm = asm_for("int main() { int x = 1; { int x = 2; } return x; }").unwrap();
    assert!(asm.contains("    sub $16, %rsp\n"));
    assert_eq!(asm.matches("mov %eax, -4(%rbp)").count(), 2);
  }
}
