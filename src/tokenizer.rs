//! Lexical analysis: turns the raw input string into a vector of tokens.
//!
//! The tokenizer knows nothing about semantics beyond recognising keywords,
//! punctuators, identifiers and integer literals. Comments and whitespace
//! are dropped; newlines only advance the line counter carried by each token.

use std::fmt;

use tracing::debug;

use crate::error::{CompileError, CompileResult};

/// Kinds of tokens recognised by the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
  Exit,
  Let,
  If,
  Elif,
  Else,
  IntLit,
  Ident,
  Semi,
  OpenParen,
  CloseParen,
  OpenCurly,
  CloseCurly,
  Eq,
  Plus,
  Minus,
  Star,
  Slash,
}

impl TokenKind {
  /// Human-friendly description used in diagnostics.
  pub fn describe(self) -> &'static str {
    match self {
      Self::Exit => "`exit`",
      Self::Let => "`let`",
      Self::If => "`if`",
      Self::Elif => "`elif`",
      Self::Else => "`else`",
      Self::IntLit => "int literal",
      Self::Ident => "identifier",
      Self::Semi => "`;`",
      Self::OpenParen => "`(`",
      Self::CloseParen => "`)`",
      Self::OpenCurly => "`{`",
      Self::CloseCurly => "`}`",
      Self::Eq => "`=`",
      Self::Plus => "`+`",
      Self::Minus => "`-`",
      Self::Star => "`*`",
      Self::Slash => "`/`",
    }
  }
}

impl fmt::Display for TokenKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.describe())
  }
}

/// Binding precedence of a binary operator token, or `None` for anything
/// that does not continue an expression.
pub fn bin_prec(kind: TokenKind) -> Option<u8> {
  match kind {
    TokenKind::Plus | TokenKind::Minus => Some(0),
    TokenKind::Star | TokenKind::Slash => Some(1),
    _ => None,
  }
}

/// A single lexeme with the line it started on. Only identifiers and
/// integer literals carry text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
  pub kind: TokenKind,
  pub line: usize,
  pub literal: Option<String>,
}

impl Token {
  pub fn new(kind: TokenKind, line: usize) -> Self {
    Self {
      kind,
      line,
      literal: None,
    }
  }

  pub fn with_literal(kind: TokenKind, line: usize, literal: impl Into<String>) -> Self {
    Self {
      kind,
      line,
      literal: Some(literal.into()),
    }
  }
}

fn keyword(word: &str) -> Option<TokenKind> {
  match word {
    "exit" => Some(TokenKind::Exit),
    "let" => Some(TokenKind::Let),
    "if" => Some(TokenKind::If),
    "elif" => Some(TokenKind::Elif),
    "else" => Some(TokenKind::Else),
    _ => None,
  }
}

fn punctuator(c: u8) -> Option<TokenKind> {
  match c {
    b'(' => Some(TokenKind::OpenParen),
    b')' => Some(TokenKind::CloseParen),
    b'{' => Some(TokenKind::OpenCurly),
    b'}' => Some(TokenKind::CloseCurly),
    b';' => Some(TokenKind::Semi),
    b'=' => Some(TokenKind::Eq),
    b'+' => Some(TokenKind::Plus),
    b'-' => Some(TokenKind::Minus),
    b'*' => Some(TokenKind::Star),
    b'/' => Some(TokenKind::Slash),
    _ => None,
  }
}

/// Lex the input into a flat vector of tokens.
pub fn tokenize(input: &str) -> CompileResult<Vec<Token>> {
  let mut tokens = Vec::new();
  let bytes = input.as_bytes();
  let mut line = 1;
  let mut i = 0;

  while i < bytes.len() {
    let c = bytes[i];

    if c == b'\n' {
      line += 1;
      i += 1;
      continue;
    }

    if c.is_ascii_whitespace() {
      i += 1;
      continue;
    }

    if c.is_ascii_alphabetic() || c == b'_' {
      let start = i;
      while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
        i += 1;
      }
      let word = &input[start..i];
      match keyword(word) {
        Some(kind) => tokens.push(Token::new(kind, line)),
        None => tokens.push(Token::with_literal(TokenKind::Ident, line, word)),
      }
      continue;
    }

    if c.is_ascii_digit() {
      let start = i;
      while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
      }
      let text = &input[start..i];
      if let Err(err) = text.parse::<u64>() {
        return Err(CompileError::Lex {
          line,
          message: format!("invalid int literal {text}: {err}"),
        });
      }
      tokens.push(Token::with_literal(TokenKind::IntLit, line, text));
      continue;
    }

    if bytes[i..].starts_with(b"//") {
      while i < bytes.len() && bytes[i] != b'\n' {
        i += 1;
      }
      continue;
    }

    if bytes[i..].starts_with(b"/*") {
      i += 2;
      while i < bytes.len() && !bytes[i..].starts_with(b"*/") {
        if bytes[i] == b'\n' {
          line += 1;
        }
        i += 1;
      }
      // an unterminated comment swallows the rest of the input
      i = (i + 2).min(bytes.len());
      continue;
    }

    if let Some(kind) = punctuator(c) {
      tokens.push(Token::new(kind, line));
      i += 1;
      continue;
    }

    let invalid_char = input[i..].chars().next().unwrap_or('\0');
    return Err(CompileError::Lex {
      line,
      message: format!("invalid token '{invalid_char}'"),
    });
  }

  debug!(count = tokens.len(), lines = line, "tokenized source");
  Ok(tokens)
}
