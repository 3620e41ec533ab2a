//! Recursive-descent parser producing a `Program` of functions.
//!
//! The parser mirrors the classic chibicc structure: one helper per
//! precedence level, each looping for left-associative operators, with
//! assignment recursing on its right operand. Statements sit on top and
//! dispatch on their leading keyword. The token source is the lazy `Lexer`,
//! so the parser only ever looks at one token.

use tracing::debug;

use crate::ast::{BinaryOp, Expr, Function, Program, Stmt};
use crate::error::{CompileError, CompileResult};
use crate::tokenizer::{Lexer, Token, TokenKind, describe_token};

/// Deepest nesting of statements, parentheses, unary minus, assignments and
/// binary operator chains accepted before parsing gives up.
pub const MAX_DEPTH: usize = 128;

/// Parse every function in the token source until end of input.
pub fn parse(lexer: Lexer<'_>) -> CompileResult<Program> {
  let mut stream = TokenStream::new(lexer);
  let mut program = Program::default();

  while !stream.is_eof() {
    let function = parse_function(&mut stream)?;
    debug!(
      function = %function.name,
      statements = function.body.len(),
      "parsed function"
    );
    program.functions.push(function);
  }

  Ok(program)
}

// function = "int" ident "(" ")" block
fn parse_function(stream: &mut TokenStream) -> CompileResult<Function> {
  stream.skip(TokenKind::KwInt, "int")?;
  let name = stream.get_ident()?;
  stream.skip(TokenKind::LParen, "(")?;
  stream.skip(TokenKind::RParen, ")")?;
  let body = parse_block(stream)?;
  Ok(Function { name, body })
}

// block = "{" stmt* "}"
fn parse_block(stream: &mut TokenStream) -> CompileResult<Vec<Stmt>> {
  stream.skip(TokenKind::LBrace, "{")?;
  let mut body = Vec::new();
  while !stream.peek().is(TokenKind::RBrace) && !stream.is_eof() {
    body.push(parse_stmt(stream)?);
  }
  stream.skip(TokenKind::RBrace, "}")?;
  Ok(body)
}

fn parse_stmt(stream: &mut TokenStream) -> CompileResult<Stmt> {
  stream.enter()?;
  let stmt = parse_stmt_kind(stream);
  stream.leave(1);
  stmt
}

fn parse_stmt_kind(stream: &mut TokenStream) -> CompileResult<Stmt> {
  match stream.peek().kind {
    TokenKind::KwInt => parse_decl(stream),
    TokenKind::KwReturn => {
      stream.advance();
      let expr = parse_expr(stream)?;
      stream.skip(TokenKind::Semicolon, ";")?;
      Ok(Stmt::Return { expr })
    }
    TokenKind::KwIf => {
      stream.advance();
      let cond = parse_condition(stream)?;
      let then = Box::new(parse_stmt(stream)?);
      let els = if stream.equal(TokenKind::KwElse) {
        Some(Box::new(parse_stmt(stream)?))
      } else {
        None
      };
      Ok(Stmt::If { cond, then, els })
    }
    TokenKind::KwWhile => {
      stream.advance();
      let cond = parse_condition(stream)?;
      let body = Box::new(parse_stmt(stream)?);
      Ok(Stmt::While { cond, body })
    }
    TokenKind::LBrace => Ok(Stmt::Block {
      body: parse_block(stream)?,
    }),
    _ => parse_expr_stmt(stream),
  }
}

// decl = "int" ident ("=" expr)? ";"
fn parse_decl(stream: &mut TokenStream) -> CompileResult<Stmt> {
  stream.skip(TokenKind::KwInt, "int")?;
  let name = stream.get_ident()?;
  let init = if stream.equal(TokenKind::Assign) {
    Some(parse_expr(stream)?)
  } else {
    None
  };
  stream.skip(TokenKind::Semicolon, ";")?;
  Ok(Stmt::Decl { name, init })
}

fn parse_condition(stream: &mut TokenStream) -> CompileResult<Expr> {
  stream.skip(TokenKind::LParen, "(")?;
  let cond = parse_expr(stream)?;
  stream.skip(TokenKind::RParen, ")")?;
  Ok(cond)
}

fn parse_expr_stmt(stream: &mut TokenStream) -> CompileResult<Stmt> {
  let expr = parse_assign(stream)?;
  stream.skip(TokenKind::Semicolon, ";")?;
  Ok(Stmt::Expr { expr })
}

fn parse_expr(stream: &mut TokenStream) -> CompileResult<Expr> {
  parse_assign(stream)
}

fn parse_assign(stream: &mut TokenStream) -> CompileResult<Expr> {
  let node = parse_logic_or(stream)?;

  if stream.peek().is(TokenKind::Assign) {
    if !matches!(node, Expr::Var { .. }) {
      return Err(stream.error_here("left side of assignment must be a variable"));
    }
    stream.advance();
    stream.enter()?;
    let rhs = parse_assign(stream)?;
    stream.leave(1);
    return Ok(Expr::assign(node, rhs));
  }

  Ok(node)
}

/// Shared loop for the left-associative binary levels: keep folding while
/// the current token maps to an operator of this level.
fn parse_left_assoc(
  stream: &mut TokenStream,
  operand: fn(&mut TokenStream) -> CompileResult<Expr>,
  level: fn(TokenKind) -> Option<BinaryOp>,
) -> CompileResult<Expr> {
  let mut node = operand(stream)?;
  let mut folds = 0;

  // Every fold deepens the left spine of the tree.
  while let Some(op) = level(stream.peek().kind) {
    stream.enter()?;
    folds += 1;
    stream.advance();
    let rhs = operand(stream)?;
    node = Expr::binary(op, node, rhs);
  }

  stream.leave(folds);
  Ok(node)
}

fn parse_logic_or(stream: &mut TokenStream) -> CompileResult<Expr> {
  parse_left_assoc(stream, parse_logic_and, |kind| match kind {
    TokenKind::OrOr => Some(BinaryOp::Or),
    _ => None,
  })
}

fn parse_logic_and(stream: &mut TokenStream) -> CompileResult<Expr> {
  parse_left_assoc(stream, parse_equality, |kind| match kind {
    TokenKind::AndAnd => Some(BinaryOp::And),
    _ => None,
  })
}

fn parse_equality(stream: &mut TokenStream) -> CompileResult<Expr> {
  parse_left_assoc(stream, parse_relational, |kind| match kind {
    TokenKind::Eq => Some(BinaryOp::Eq),
    TokenKind::Ne => Some(BinaryOp::Ne),
    _ => None,
  })
}

fn parse_relational(stream: &mut TokenStream) -> CompileResult<Expr> {
  parse_left_assoc(stream, parse_add, |kind| match kind {
    TokenKind::Lt => Some(BinaryOp::Lt),
    TokenKind::Le => Some(BinaryOp::Le),
    TokenKind::Gt => Some(BinaryOp::Gt),
    TokenKind::Ge => Some(BinaryOp::Ge),
    _ => None,
  })
}

fn parse_add(stream: &mut TokenStream) -> CompileResult<Expr> {
  parse_left_assoc(stream, parse_mul, |kind| match kind {
    TokenKind::Plus => Some(BinaryOp::Add),
    TokenKind::Minus => Some(BinaryOp::Sub),
    _ => None,
  })
}

fn parse_mul(stream: &mut TokenStream) -> CompileResult<Expr> {
  parse_left_assoc(stream, parse_unary, |kind| match kind {
    TokenKind::Star => Some(BinaryOp::Mul),
    TokenKind::Slash => Some(BinaryOp::Div),
    TokenKind::Percent => Some(BinaryOp::Rem),
    _ => None,
  })
}

fn parse_unary(stream: &mut TokenStream) -> CompileResult<Expr> {
  if stream.peek().is(TokenKind::Minus) {
    stream.enter()?;
    stream.advance();
    let operand = parse_unary(stream)?;
    stream.leave(1);
    return Ok(Expr::unary_neg(operand));
  }

  parse_primary(stream)
}

fn parse_primary(stream: &mut TokenStream) -> CompileResult<Expr> {
  match stream.peek().kind {
    TokenKind::LParen => {
      stream.enter()?;
      stream.advance();
      let node = parse_expr(stream)?;
      stream.skip(TokenKind::RParen, ")")?;
      stream.leave(1);
      Ok(node)
    }
    TokenKind::Ident => Ok(Expr::var(stream.get_ident()?)),
    TokenKind::Num => Ok(Expr::number(stream.get_number()?)),
    _ => {
      let got = describe_token(stream.peek());
      Err(stream.error_here(format!("unexpected token \"{got}\" in expression")))
    }
  }
}

/// Single-token lookahead over the lexer.
struct TokenStream<'a> {
  lexer: Lexer<'a>,
  depth: usize,
}

impl<'a> TokenStream<'a> {
  fn new(lexer: Lexer<'a>) -> Self {
    Self { lexer, depth: 0 }
  }

  /// Go one nesting level deeper, failing at the current token past `MAX_DEPTH`.
  fn enter(&mut self) -> CompileResult<()> {
    self.depth += 1;
    if self.depth > MAX_DEPTH {
      return Err(self.error_here(format!("nesting deeper than {MAX_DEPTH} levels")));
    }
    Ok(())
  }

  fn leave(&mut self, levels: usize) {
    self.depth -= levels;
  }

  fn peek(&self) -> &Token {
    self.lexer.peek()
  }

  fn advance(&mut self) {
    self.lexer.next_token();
  }

  /// Consume the current token if it has the given kind.
  fn equal(&mut self, kind: TokenKind) -> bool {
    if self.peek().is(kind) {
      self.advance();
      return true;
    }
    false
  }

  fn skip(&mut self, kind: TokenKind, expected: &str) -> CompileResult<()> {
    if self.equal(kind) {
      Ok(())
    } else {
      let got = describe_token(self.peek());
      Err(self.error_here(format!("expected \"{expected}\", but got \"{got}\"")))
    }
  }

  /// Parse the current token as an integer literal.
  fn get_number(&mut self) -> CompileResult<i32> {
    let token = self.peek();
    if !token.is(TokenKind::Num) {
      let got = describe_token(token);
      return Err(self.error_here(format!("expected a number, but got \"{got}\"")));
    }
    let Some(value) = token.value else {
      let text = token.text.clone();
      return Err(self.error_here(format!("integer literal {text} is out of range")));
    };
    self.advance();
    Ok(value)
  }

  /// Parse the current token as an identifier.
  fn get_ident(&mut self) -> CompileResult<String> {
    let token = self.peek();
    if !token.is(TokenKind::Ident) {
      let got = describe_token(token);
      return Err(self.error_here(format!("expected an identifier, but got \"{got}\"")));
    }
    let name = token.text.clone();
    self.advance();
    Ok(name)
  }

  fn is_eof(&self) -> bool {
    self.peek().is(TokenKind::End)
  }

  fn error_here(&self, message: impl Into<String>) -> CompileError {
    let token = self.peek();
    CompileError::at(self.lexer.source(), token.line, token.loc, message)
  }
}
