//! Lexical analysis: turns the raw input string into tokens on demand.
//!
//! The lexer is lazy. It keeps a cursor into the immutable source and produces
//! one token per `next_token` call, remembering the last one for `peek`.
//! Multi-character punctuators are matched before single-character ones to
//! avoid ambiguity. Characters the language does not know become `Unknown`
//! tokens; only the parser decides whether that is an error.

use tracing::trace;

/// Kinds of tokens recognised by the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
  End,
  Ident,
  Num,
  KwInt,
  KwReturn,
  KwIf,
  KwElse,
  KwWhile,
  Plus,
  Minus,
  Star,
  Slash,
  Percent,
  LParen,
  RParen,
  LBrace,
  RBrace,
  Semicolon,
  Comma,
  Assign,
  Eq,
  Ne,
  Lt,
  Le,
  Gt,
  Ge,
  AndAnd,
  OrOr,
  Unknown,
}

const KEYWORDS: [(&str, TokenKind); 5] = [
  ("int", TokenKind::KwInt),
  ("return", TokenKind::KwReturn),
  ("if", TokenKind::KwIf),
  ("else", TokenKind::KwElse),
  ("while", TokenKind::KwWhile),
];

const PUNCTUATORS: [(&str, TokenKind); 20] = [
  ("==", TokenKind::Eq),
  ("!=", TokenKind::Ne),
  ("<=", TokenKind::Le),
  (">=", TokenKind::Ge),
  ("&&", TokenKind::AndAnd),
  ("||", TokenKind::OrOr),
  ("+", TokenKind::Plus),
  ("-", TokenKind::Minus),
  ("*", TokenKind::Star),
  ("/", TokenKind::Slash),
  ("%", TokenKind::Percent),
  ("(", TokenKind::LParen),
  (")", TokenKind::RParen),
  ("{", TokenKind::LBrace),
  ("}", TokenKind::RBrace),
  (";", TokenKind::Semicolon),
  (",", TokenKind::Comma),
  ("=", TokenKind::Assign),
  ("<", TokenKind::Lt),
  (">", TokenKind::Gt),
];

/// Lexical information needed by later stages.
///
/// `value` is only set for `Num` tokens whose digits fit the modeled integer
/// width; an out-of-range literal is still a `Num` token but carries `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
  pub kind: TokenKind,
  pub text: String,
  pub value: Option<i32>,
  pub line: usize,
  pub loc: usize,
}

impl Token {
  /// Convenience constructor to keep the lexer loop readable.
  pub fn new(kind: TokenKind, text: &str, line: usize, loc: usize) -> Self {
    Self {
      kind,
      text: text.to_string(),
      value: None,
      line,
      loc,
    }
  }

  pub fn is(&self, kind: TokenKind) -> bool {
    self.kind == kind
  }
}

/// Cursor over the source producing one token at a time.
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
  source: &'a str,
  pos: usize,
  line: usize,
  current: Token,
  exhausted: bool,
}

impl<'a> Lexer<'a> {
  /// Create a lexer and eagerly produce the first token so `peek` is valid.
  pub fn new(source: &'a str) -> Self {
    let mut lexer = Self {
      source,
      pos: 0,
      line: 1,
      current: Token::new(TokenKind::End, "", 1, 0),
      exhausted: false,
    };
    lexer.next_token();
    lexer
  }

  pub fn source(&self) -> &'a str {
    self.source
  }

  /// The most recently produced token.
  pub fn peek(&self) -> &Token {
    &self.current
  }

  /// Advance past the current token, returning the one that follows.
  ///
  /// Once the end of input is reached every further call yields `End`.
  pub fn next_token(&mut self) -> Token {
    self.skip_trivia();
    let token = self.lex_token();
    trace!(kind = ?token.kind, text = %token.text, line = token.line, "token");
    self.current = token.clone();
    token
  }

  fn lex_token(&mut self) -> Token {
    let rest = &self.source[self.pos..];
    let Some(c) = rest.chars().next() else {
      return Token::new(TokenKind::End, "", self.line, self.source.len());
    };
    let start = self.pos;

    if c.is_ascii_digit() {
      let len = rest.bytes().take_while(u8::is_ascii_digit).count();
      let text = &rest[..len];
      self.pos += len;
      let mut token = Token::new(TokenKind::Num, text, self.line, start);
      token.value = text.parse::<i32>().ok();
      return token;
    }

    if c.is_ascii_alphabetic() || c == '_' {
      let len = rest
        .bytes()
        .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
        .count();
      let text = &rest[..len];
      self.pos += len;
      let kind = KEYWORDS
        .iter()
        .find(|(keyword, _)| *keyword == text)
        .map_or(TokenKind::Ident, |(_, kind)| *kind);
      return Token::new(kind, text, self.line, start);
    }

    if let Some((op, kind)) = PUNCTUATORS.iter().find(|(op, _)| rest.starts_with(op)) {
      self.pos += op.len();
      return Token::new(*kind, op, self.line, start);
    }

    self.pos += c.len_utf8();
    Token::new(TokenKind::Unknown, &rest[..c.len_utf8()], self.line, start)
  }

  /// Skip C-locale whitespace (space, tab, CR, LF, VT, FF), `//` line
  /// comments and non-nesting `/* */` block comments, counting newlines on
  /// the way. Other Unicode spaces are left for `lex_token` as `Unknown`.
  fn skip_trivia(&mut self) {
    loop {
      let rest = &self.source[self.pos..];
      let Some(c) = rest.chars().next() else {
        return;
      };

      if c == '\n' {
        self.line += 1;
        self.pos += 1;
      } else if matches!(c, ' ' | '\t' | '\r' | '\x0b' | '\x0c') {
        self.pos += 1;
      } else if rest.starts_with("//") {
        self.pos += rest.find('\n').unwrap_or(rest.len());
      } else if rest.starts_with("/*") {
        // An unterminated comment swallows the rest of the input.
        let len = rest[2..].find("*/").map_or(rest.len(), |idx| idx + 4);
        self.line += rest[..len].matches('\n').count();
        self.pos += len;
      } else {
        return;
      }
    }
  }
}

impl Iterator for Lexer<'_> {
  type Item = Token;

  /// Yields the current token and advances; stops after `End` has been yielded.
  fn next(&mut self) -> Option<Self::Item> {
    if self.exhausted {
      return None;
    }
    let token = self.current.clone();
    if token.is(TokenKind::End) {
      self.exhausted = true;
    } else {
      self.next_token();
    }
    Some(token)
  }
}

/// Lex the whole input into a flat vector terminated by an `End` token.
pub fn tokenize(input: &str) -> Vec<Token> {
  let mut lexer = Lexer::new(input);
  let mut tokens = vec![lexer.peek().clone()];
  while !lexer.peek().is(TokenKind::End) {
    tokens.push(lexer.next_token());
  }
  tokens
}

/// Human-friendly description used in diagnostics.
pub fn describe_token(token: &Token) -> String {
  match token.kind {
    TokenKind::End => "EOF".to_string(),
    _ => token.text.clone(),
  }
}
