//! Shared error utilities used across the compilation pipeline.
//!
//! Diagnostics stay lightweight: a parse error quotes the offending source
//! line and points at the token with a caret, a codegen error names the
//! function being lowered.

use snafu::Snafu;

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Snafu)]
pub enum CompileError {
  /// The current token cannot satisfy the grammar rule in play.
  #[snafu(display("line {line}: {message}\n{snippet}"))]
  Parse {
    line: usize,
    message: String,
    snippet: String,
  },
  /// Lowering hit a name or node it cannot translate.
  #[snafu(display("in function '{function}': {message}"))]
  Codegen { function: String, message: String },
}

impl CompileError {
  /// Construct a parse error anchored at a byte offset in the source.
  pub fn at(source: &str, line: usize, loc: usize, message: impl Into<String>) -> Self {
    let safe_loc = loc.min(source.len());
    let line_start = source[..safe_loc].rfind('\n').map_or(0, |idx| idx + 1);
    let line_end = source[safe_loc..]
      .find('\n')
      .map_or(source.len(), |idx| safe_loc + idx);
    let source_line = &source[line_start..line_end];
    let char_offset = source[line_start..safe_loc].chars().count() + 1; // account for opening quote
    let marker = format!("{}^", " ".repeat(char_offset));
    let message = message.into();
    Self::Parse {
      line,
      snippet: format!("'{source_line}'\n{marker} {message}"),
      message,
    }
  }

  pub fn codegen(function: &str, message: impl Into<String>) -> Self {
    Self::Codegen {
      function: function.to_string(),
      message: message.into(),
    }
  }

  /// Source line the error is anchored at, when one is known.
  pub fn line(&self) -> Option<usize> {
    match self {
      Self::Parse { line, .. } => Some(*line),
      Self::Codegen { .. } => None,
    }
  }

  pub fn message(&self) -> &str {
    match self {
      Self::Parse { message, .. } | Self::Codegen { message, .. } => message,
    }
  }
}
