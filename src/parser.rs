//! Recursive-descent parser producing the program AST inside an [`Arena`].
//!
//! Statements are chosen by looking at most three tokens ahead; expressions
//! use precedence climbing so that grouping and left-associativity are fixed
//! in the tree shape as nodes are built. Name resolution happens here too:
//! the parser tracks the identifiers declared in the currently open scopes
//! and rejects redeclarations and references to unknown names.

use std::fmt;

use tracing::debug;

use crate::arena::{Arena, NodeId};
use crate::config::CompileOptions;
use crate::error::{CompileError, CompileResult};
use crate::tokenizer::{Token, TokenKind, bin_prec};

/// Binary operators recognised by the language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
  Add,
  Sub,
  Mul,
  Div,
}

impl BinaryOp {
  fn from_token(kind: TokenKind) -> Option<Self> {
    match kind {
      TokenKind::Plus => Some(Self::Add),
      TokenKind::Minus => Some(Self::Sub),
      TokenKind::Star => Some(Self::Mul),
      TokenKind::Slash => Some(Self::Div),
      _ => None,
    }
  }

  pub fn name(self) -> &'static str {
    match self {
      Self::Add => "Add",
      Self::Sub => "Sub",
      Self::Mul => "Mul",
      Self::Div => "Div",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
  IntLit(String),
  Ident(String),
  Paren(NodeId<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinExpr {
  pub op: BinaryOp,
  pub lhs: NodeId<Expr>,
  pub rhs: NodeId<Expr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
  Term(Term),
  Binary(BinExpr),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
  Exit {
    expr: NodeId<Expr>,
  },
  Let {
    name: String,
    expr: NodeId<Expr>,
  },
  Assign {
    name: String,
    expr: NodeId<Expr>,
  },
  Scope(NodeId<Scope>),
  If {
    cond: NodeId<Expr>,
    body: NodeId<Scope>,
    tail: Option<NodeId<IfPred>>,
  },
}

/// A braced block; declarations inside it die when it closes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
  pub stmts: Vec<NodeId<Stmt>>,
}

/// The continuation of an `if`: another conditional branch or the final `else`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IfPred {
  Elif {
    cond: NodeId<Expr>,
    body: NodeId<Scope>,
    tail: Option<NodeId<IfPred>>,
  },
  Else {
    body: NodeId<Scope>,
  },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
  pub stmts: Vec<NodeId<Stmt>>,
}

impl Program {
  /// Render the program in a compact nested form, one statement per line.
  pub fn display<'a>(&'a self, arena: &'a Arena) -> ProgramDisplay<'a> {
    ProgramDisplay {
      program: self,
      arena,
    }
  }
}

pub struct ProgramDisplay<'a> {
  program: &'a Program,
  arena: &'a Arena,
}

impl fmt::Display for ProgramDisplay<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (i, stmt) in self.program.stmts.iter().enumerate() {
      if i > 0 {
        f.write_str("\n")?;
      }
      write_stmt(f, self.arena, *stmt)?;
    }
    Ok(())
  }
}

/// Render a single expression, e.g. `Add(1, Mul(2, 3))`.
pub fn render_expr(arena: &Arena, expr: NodeId<Expr>) -> String {
  let mut out = String::new();
  // writing into a String cannot fail
  let _ = write_expr(&mut out, arena, expr);
  out
}

fn write_expr(out: &mut impl fmt::Write, arena: &Arena, expr: NodeId<Expr>) -> fmt::Result {
  match &arena[expr] {
    Expr::Term(Term::IntLit(text)) => out.write_str(text),
    Expr::Term(Term::Ident(name)) => out.write_str(name),
    Expr::Term(Term::Paren(inner)) => {
      out.write_str("Paren(")?;
      write_expr(out, arena, *inner)?;
      out.write_str(")")
    }
    Expr::Binary(bin) => {
      write!(out, "{}(", bin.op.name())?;
      write_expr(out, arena, bin.lhs)?;
      out.write_str(", ")?;
      write_expr(out, arena, bin.rhs)?;
      out.write_str(")")
    }
  }
}

fn write_stmt(out: &mut impl fmt::Write, arena: &Arena, stmt: NodeId<Stmt>) -> fmt::Result {
  match &arena[stmt] {
    Stmt::Exit { expr } => {
      out.write_str("Exit(")?;
      write_expr(out, arena, *expr)?;
      out.write_str(")")
    }
    Stmt::Let { name, expr } => {
      write!(out, "Let({name}, ")?;
      write_expr(out, arena, *expr)?;
      out.write_str(")")
    }
    Stmt::Assign { name, expr } => {
      write!(out, "Assign({name}, ")?;
      write_expr(out, arena, *expr)?;
      out.write_str(")")
    }
    Stmt::Scope(scope) => write_scope(out, arena, *scope),
    Stmt::If { cond, body, tail } => {
      out.write_str("If(")?;
      write_expr(out, arena, *cond)?;
      out.write_str(", ")?;
      write_scope(out, arena, *body)?;
      if let Some(tail) = tail {
        out.write_str(", ")?;
        write_pred(out, arena, *tail)?;
      }
      out.write_str(")")
    }
  }
}

fn write_scope(out: &mut impl fmt::Write, arena: &Arena, scope: NodeId<Scope>) -> fmt::Result {
  out.write_str("Scope[")?;
  for (i, stmt) in arena[scope].stmts.iter().enumerate() {
    if i > 0 {
      out.write_str(", ")?;
    }
    write_stmt(out, arena, *stmt)?;
  }
  out.write_str("]")
}

fn write_pred(out: &mut impl fmt::Write, arena: &Arena, pred: NodeId<IfPred>) -> fmt::Result {
  match &arena[pred] {
    IfPred::Elif { cond, body, tail } => {
      out.write_str("Elif(")?;
      write_expr(out, arena, *cond)?;
      out.write_str(", ")?;
      write_scope(out, arena, *body)?;
      if let Some(tail) = tail {
        out.write_str(", ")?;
        write_pred(out, arena, *tail)?;
      }
      out.write_str(")")
    }
    IfPred::Else { body } => {
      out.write_str("Else(")?;
      write_scope(out, arena, *body)?;
      out.write_str(")")
    }
  }
}

/// Parse a whole program. Nodes are placed in `arena`, which must outlive
/// every later use of the returned [`Program`].
pub fn parse(
  tokens: &[Token],
  arena: &mut Arena,
  options: &CompileOptions,
) -> CompileResult<Program> {
  let mut parser = Parser::new(tokens, arena, options, true);
  let program = parser.parse_program()?;
  debug!(
    statements = program.stmts.len(),
    nodes = parser.arena.len(),
    bytes = parser.arena.used(),
    "parsed program"
  );
  Ok(program)
}

/// Parse a lone expression without name resolution. The whole token slice
/// must be consumed.
pub fn parse_expression(
  tokens: &[Token],
  arena: &mut Arena,
  options: &CompileOptions,
) -> CompileResult<NodeId<Expr>> {
  let mut parser = Parser::new(tokens, arena, options, false);
  let expr = parser.require_expr(0)?;
  if !parser.stream.is_eof() {
    return Err(parser.stream.expected("end of expression"));
  }
  Ok(expr.id)
}

/// An expression handle plus the height of the tree below it.
#[derive(Clone, Copy)]
struct Operand {
  id: NodeId<Expr>,
  height: usize,
}

struct Parser<'t, 'a> {
  stream: TokenStream<'t>,
  arena: &'a mut Arena,
  /// Names declared in the currently open scopes, outermost first.
  declared: Vec<String>,
  resolve_names: bool,
  depth: usize,
  max_depth: usize,
}

impl<'t, 'a> Parser<'t, 'a> {
  fn new(
    tokens: &'t [Token],
    arena: &'a mut Arena,
    options: &CompileOptions,
    resolve_names: bool,
  ) -> Self {
    Self {
      stream: TokenStream::new(tokens),
      arena,
      declared: Vec::new(),
      resolve_names,
      depth: 0,
      max_depth: options.max_depth,
    }
  }

  fn parse_program(&mut self) -> CompileResult<Program> {
    let mut stmts = Vec::new();
    while !self.stream.is_eof() {
      match self.parse_stmt()? {
        Some(stmt) => stmts.push(stmt),
        None => return Err(self.stream.expected("statement")),
      }
    }
    Ok(Program { stmts })
  }

  /// Parse one statement, or return `None` if the next tokens do not start one.
  fn parse_stmt(&mut self) -> CompileResult<Option<NodeId<Stmt>>> {
    use TokenKind as K;

    if self.stream.is_at(&[K::Exit, K::OpenParen]) {
      self.stream.advance(2);
      let expr = self.require_expr(0)?.id;
      self.stream.skip(K::CloseParen)?;
      self.stream.skip(K::Semi)?;
      return self.arena.emplace(Stmt::Exit { expr }).map(Some);
    }

    if self.stream.is_at(&[K::Let, K::Ident, K::Eq]) {
      self.stream.advance(1);
      let ident = self.stream.bump()?;
      self.stream.advance(1);
      let name = literal(ident)?;
      if self.resolve_names && self.is_declared(&name) {
        return Err(CompileError::DuplicateDeclaration {
          name,
          line: Some(ident.line),
        });
      }
      let expr = self.require_expr(0)?.id;
      self.stream.skip(K::Semi)?;
      // the name only comes into scope after its initializer
      self.declared.push(name.clone());
      return self.arena.emplace(Stmt::Let { name, expr }).map(Some);
    }

    if self.stream.is_at(&[K::Ident, K::Eq]) {
      let ident = self.stream.bump()?;
      self.stream.advance(1);
      let name = literal(ident)?;
      self.check_declared(&name, ident.line)?;
      let expr = self.require_expr(0)?.id;
      self.stream.skip(K::Semi)?;
      return self.arena.emplace(Stmt::Assign { name, expr }).map(Some);
    }

    if self.stream.is_at(&[K::OpenCurly]) {
      let scope = self.require_scope()?;
      return self.arena.emplace(Stmt::Scope(scope)).map(Some);
    }

    if self.stream.equal(K::If).is_some() {
      self.stream.skip(K::OpenParen)?;
      let cond = self.require_expr(0)?.id;
      self.stream.skip(K::CloseParen)?;
      let body = self.require_scope()?;
      let tail = self.parse_if_pred()?;
      return self.arena.emplace(Stmt::If { cond, body, tail }).map(Some);
    }

    Ok(None)
  }

  fn parse_if_pred(&mut self) -> CompileResult<Option<NodeId<IfPred>>> {
    if self.stream.equal(TokenKind::Elif).is_some() {
      self.enter()?;
      self.stream.skip(TokenKind::OpenParen)?;
      let cond = self.require_expr(0)?.id;
      self.stream.skip(TokenKind::CloseParen)?;
      let body = self.require_scope()?;
      let tail = self.parse_if_pred()?;
      self.leave();
      return self.arena.emplace(IfPred::Elif { cond, body, tail }).map(Some);
    }

    if self.stream.equal(TokenKind::Else).is_some() {
      let body = self.require_scope()?;
      return self.arena.emplace(IfPred::Else { body }).map(Some);
    }

    Ok(None)
  }

  /// Parse `{ Stmt* }`. Statements are taken greedily until one fails to
  /// start, then the closing brace is required.
  fn parse_scope(&mut self) -> CompileResult<Option<NodeId<Scope>>> {
    if self.stream.equal(TokenKind::OpenCurly).is_none() {
      return Ok(None);
    }

    self.enter()?;
    let mark = self.declared.len();
    let mut stmts = Vec::new();
    while let Some(stmt) = self.parse_stmt()? {
      stmts.push(stmt);
    }
    self.stream.skip(TokenKind::CloseCurly)?;
    self.declared.truncate(mark);
    self.leave();

    self.arena.emplace(Scope { stmts }).map(Some)
  }

  fn require_scope(&mut self) -> CompileResult<NodeId<Scope>> {
    match self.parse_scope()? {
      Some(scope) => Ok(scope),
      None => Err(self.stream.expected("scope")),
    }
  }

  /// Precedence climbing: parse a term, then fold in operators whose
  /// precedence is at least `min_prec`. The right-hand side is parsed with
  /// `prec + 1`, so equal-precedence chains fold to the left.
  fn parse_expr(&mut self, min_prec: u8) -> CompileResult<Option<Operand>> {
    self.enter()?;
    let Some(mut lhs) = self.parse_term()? else {
      self.leave();
      return Ok(None);
    };

    loop {
      let Some(kind) = self.stream.peek_kind(0) else {
        break;
      };
      let (Some(op), Some(prec)) = (BinaryOp::from_token(kind), bin_prec(kind)) else {
        break;
      };
      if prec < min_prec {
        break;
      }

      self.stream.advance(1);
      let rhs = self.require_expr(prec + 1)?;
      let height = lhs.height.max(rhs.height) + 1;
      self.check_height(height)?;
      let id = self.arena.emplace(Expr::Binary(BinExpr {
        op,
        lhs: lhs.id,
        rhs: rhs.id,
      }))?;
      lhs = Operand { id, height };
    }

    self.leave();
    Ok(Some(lhs))
  }

  fn require_expr(&mut self, min_prec: u8) -> CompileResult<Operand> {
    match self.parse_expr(min_prec)? {
      Some(expr) => Ok(expr),
      None => Err(self.stream.expected("expression")),
    }
  }

  fn parse_term(&mut self) -> CompileResult<Option<Operand>> {
    if let Some(token) = self.stream.equal(TokenKind::IntLit) {
      let id = self.arena.emplace(Expr::Term(Term::IntLit(literal(token)?)))?;
      return Ok(Some(Operand { id, height: 1 }));
    }

    if let Some(token) = self.stream.equal(TokenKind::Ident) {
      let name = literal(token)?;
      self.check_declared(&name, token.line)?;
      let id = self.arena.emplace(Expr::Term(Term::Ident(name)))?;
      return Ok(Some(Operand { id, height: 1 }));
    }

    if self.stream.equal(TokenKind::OpenParen).is_some() {
      let inner = self.require_expr(0)?;
      self.stream.skip(TokenKind::CloseParen)?;
      let height = inner.height + 1;
      self.check_height(height)?;
      let id = self.arena.emplace(Expr::Term(Term::Paren(inner.id)))?;
      return Ok(Some(Operand { id, height }));
    }

    Ok(None)
  }

  fn is_declared(&self, name: &str) -> bool {
    self.declared.iter().any(|declared| declared == name)
  }

  fn check_declared(&self, name: &str, line: usize) -> CompileResult<()> {
    if self.resolve_names && !self.is_declared(name) {
      return Err(CompileError::UndeclaredIdentifier {
        name: name.to_string(),
        line: Some(line),
      });
    }
    Ok(())
  }

  /// Track recursion into nested expressions and blocks.
  fn enter(&mut self) -> CompileResult<()> {
    self.depth += 1;
    if self.depth > self.max_depth {
      return Err(self.too_deep());
    }
    Ok(())
  }

  fn leave(&mut self) {
    self.depth -= 1;
  }

  /// Left-folded chains never recurse while parsing, but later tree walks
  /// do, so their height is bounded as well.
  fn check_height(&self, height: usize) -> CompileResult<()> {
    if height > self.max_depth {
      return Err(self.too_deep());
    }
    Ok(())
  }

  fn too_deep(&self) -> CompileError {
    CompileError::NestingTooDeep {
      line: self.stream.error_line(),
      limit: self.max_depth,
    }
  }
}

fn literal(token: &Token) -> CompileResult<String> {
  token
    .literal
    .clone()
    .ok_or_else(|| CompileError::expected(token.kind.describe(), token.line))
}

/// Lightweight cursor over the token slice.
struct TokenStream<'t> {
  tokens: &'t [Token],
  pos: usize,
}

impl<'t> TokenStream<'t> {
  fn new(tokens: &'t [Token]) -> Self {
    Self { tokens, pos: 0 }
  }

  fn peek(&self, offset: usize) -> Option<&'t Token> {
    self.tokens.get(self.pos + offset)
  }

  fn peek_kind(&self, offset: usize) -> Option<TokenKind> {
    self.peek(offset).map(|token| token.kind)
  }

  /// True if the upcoming tokens match `kinds` in order.
  fn is_at(&self, kinds: &[TokenKind]) -> bool {
    kinds
      .iter()
      .enumerate()
      .all(|(offset, kind)| self.peek_kind(offset) == Some(*kind))
  }

  fn advance(&mut self, count: usize) {
    self.pos = (self.pos + count).min(self.tokens.len());
  }

  fn bump(&mut self) -> CompileResult<&'t Token> {
    let token = self.peek(0).ok_or_else(|| self.expected("token"))?;
    self.pos += 1;
    Ok(token)
  }

  /// Consume the current token if it has the given kind.
  fn equal(&mut self, kind: TokenKind) -> Option<&'t Token> {
    let token = self.peek(0).filter(|token| token.kind == kind)?;
    self.pos += 1;
    Some(token)
  }

  fn skip(&mut self, kind: TokenKind) -> CompileResult<&'t Token> {
    self
      .equal(kind)
      .ok_or_else(|| self.expected(kind.describe()))
  }

  /// Line reported in diagnostics: the last consumed token's line, falling
  /// back to the upcoming token's.
  fn error_line(&self) -> usize {
    self
      .pos
      .checked_sub(1)
      .and_then(|prev| self.tokens.get(prev))
      .or_else(|| self.peek(0))
      .map_or(1, |token| token.line)
  }

  fn expected(&self, what: &str) -> CompileError {
    CompileError::expected(what, self.error_line())
  }

  fn is_eof(&self) -> bool {
    self.pos >= self.tokens.len()
  }
}
