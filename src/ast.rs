//! Syntax tree produced by the parser and consumed by the code generator.
//!
//! Every node is owned by its parent through a `Box` or `Vec`; the tree has
//! no sharing and no back references.

use std::fmt;

/// Operators carried by `Expr::Binary`.
///
/// `Assign` requires a `Var` on the left. `Neg` is unary minus encoded as a
/// binary node whose left operand is a synthesized zero literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
  Add,
  Sub,
  Mul,
  Div,
  Rem,
  Eq,
  Ne,
  Lt,
  Le,
  Gt,
  Ge,
  And,
  Or,
  Assign,
  Neg,
}

impl BinaryOp {
  pub fn symbol(self) -> &'static str {
    match self {
      Self::Add => "+",
      Self::Sub => "-",
      Self::Mul => "*",
      Self::Div => "/",
      Self::Rem => "%",
      Self::Eq => "==",
      Self::Ne => "!=",
      Self::Lt => "<",
      Self::Le => "<=",
      Self::Gt => ">",
      Self::Ge => ">=",
      Self::And => "&&",
      Self::Or => "||",
      Self::Assign => "=",
      Self::Neg => "neg",
    }
  }
}

impl fmt::Display for BinaryOp {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.symbol())
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
  Num {
    value: i32,
  },
  Var {
    name: String,
  },
  Binary {
    op: BinaryOp,
    lhs: Box<Expr>,
    rhs: Box<Expr>,
  },
}

impl Expr {
  pub fn number(value: i32) -> Self {
    Self::Num { value }
  }

  pub fn var(name: impl Into<String>) -> Self {
    Self::Var { name: name.into() }
  }

  pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
    Self::Binary {
      op,
      lhs: Box::new(lhs),
      rhs: Box::new(rhs),
    }
  }

  pub fn assign(lhs: Expr, rhs: Expr) -> Self {
    Self::binary(BinaryOp::Assign, lhs, rhs)
  }

  pub fn unary_neg(operand: Expr) -> Self {
    Self::binary(BinaryOp::Neg, Self::number(0), operand)
  }
}

/// Fully parenthesised rendering, handy for checking tree shape.
impl fmt::Display for Expr {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Num { value } => write!(f, "{value}"),
      Self::Var { name } => f.write_str(name),
      Self::Binary {
        op: BinaryOp::Neg,
        rhs,
        ..
      } => write!(f, "(-{rhs})"),
      Self::Binary { op, lhs, rhs } => write!(f, "({lhs} {op} {rhs})"),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
  Decl {
    name: String,
    init: Option<Expr>,
  },
  Expr {
    expr: Expr,
  },
  Return {
    expr: Expr,
  },
  If {
    cond: Expr,
    then: Box<Stmt>,
    els: Option<Box<Stmt>>,
  },
  While {
    cond: Expr,
    body: Box<Stmt>,
  },
  Block {
    body: Vec<Stmt>,
  },
}

/// A parameterless `int` function. The outer braces are flattened away, so
/// `body` holds the top-level statements directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
  pub name: String,
  pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
  pub functions: Vec<Function>,
}
