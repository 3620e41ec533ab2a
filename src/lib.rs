//! Crate root: wires together the compilation pipeline.
//!
//! The stages are small and composable so they can be evolved independently:
//! - `tokenizer` performs lexical analysis, producing tokens lazily.
//! - `parser` owns all syntactic knowledge and returns a `Program` of functions.
//! - `codegen` lowers the program into x86-64 AT&T assembly.
//! - `error` centralises reporting utilities shared by the other modules.
//!
//! Each call to [`compile`] owns its own lexer, tree and label counter, so
//! independent compilations can run on separate threads.

pub mod ast;
pub mod error;
pub mod parser;
pub mod tokenizer;

mod codegen;

use tracing::debug;

pub use error::{CompileError, CompileResult};

/// Parse a source string into its syntax tree.
pub fn parse_program(source: &str) -> CompileResult<ast::Program> {
  parser::parse(tokenizer::Lexer::new(source))
}

/// Compile a source string into AT&T assembly.
pub fn compile(source: &str) -> CompileResult<String> {
  let program = parse_program(source)?;
  debug!(functions = program.functions.len(), "parsed program");
  let asm = codegen::generate(&program)?;
  debug!(bytes = asm.len(), "generated assembly");
  Ok(asm)
}
