//! Code generation: lower the parsed AST into NASM x86-64 assembly.
//!
//! The emitter is a pure stack machine: every expression leaves exactly one
//! value on the stack and every consumer pops it. Variables live in the stack
//! slot their initializer was pushed into, and are addressed relative to
//! `rsp`, so the generator tracks the stack height at every instruction.

use tracing::{debug, trace};

use crate::arena::{Arena, NodeId};
use crate::error::{CompileError, CompileResult};
use crate::parser::{BinaryOp, Expr, IfPred, Program, Scope, Stmt, Term};

const WORD: usize = 8;

/// Linux `exit` syscall number.
const SYS_EXIT: u32 = 60;

#[derive(Debug)]
struct Var {
  name: String,
  /// Stack height at which the value was pushed; 0 is the bottom.
  slot: usize,
}

/// Generation context for one program. All bookkeeping lives here, so every
/// call to [`generate`] starts from a clean slate.
pub struct Generator<'a> {
  arena: &'a Arena,
  asm: String,
  stack_size: usize,
  vars: Vec<Var>,
  label_count: usize,
}

/// Emit the assembly listing for a program whose nodes live in `arena`.
pub fn generate(program: &Program, arena: &Arena) -> CompileResult<String> {
  Generator::new(arena).generate(program)
}

impl<'a> Generator<'a> {
  pub fn new(arena: &'a Arena) -> Self {
    Self {
      arena,
      asm: String::new(),
      stack_size: 0,
      vars: Vec::new(),
      label_count: 0,
    }
  }

  pub fn generate(mut self, program: &Program) -> CompileResult<String> {
    self.asm.push_str("global _start\n");
    self.asm.push_str("_start:\n");

    for stmt in &program.stmts {
      self.emit_stmt(*stmt)?;
    }

    // falling off the end exits with status 0
    self.asm.push_str(&format!("    mov rax, {SYS_EXIT}\n"));
    self.asm.push_str("    mov rdi, 0\n");
    self.asm.push_str("    syscall\n");

    debug!(
      labels = self.label_count,
      bytes = self.asm.len(),
      "generated assembly"
    );
    Ok(self.asm)
  }

  fn emit_stmt(&mut self, stmt: NodeId<Stmt>) -> CompileResult<()> {
    let arena = self.arena;
    match &arena[stmt] {
      Stmt::Exit { expr } => {
        self.asm.push_str("    ;; exit\n");
        self.emit_expr(*expr)?;
        self.asm.push_str(&format!("    mov rax, {SYS_EXIT}\n"));
        self.pop("rdi");
        self.asm.push_str("    syscall\n");
        self.asm.push_str("    ;; /exit\n");
      }
      Stmt::Let { name, expr } => {
        self.asm.push_str("    ;; let\n");
        if self.vars.iter().any(|var| var.name == *name) {
          return Err(CompileError::DuplicateDeclaration {
            name: name.clone(),
            line: None,
          });
        }
        self.emit_expr(*expr)?;
        // the initializer's value stays on the stack as the variable
        self.vars.push(Var {
          name: name.clone(),
          slot: self.stack_size - 1,
        });
        self.asm.push_str("    ;; /let\n");
      }
      Stmt::Assign { name, expr } => {
        self.lookup(name)?;
        self.emit_expr(*expr)?;
        self.pop("rax");
        let offset = self.offset_of(name)?;
        self.asm.push_str(&format!("    mov [rsp + {offset}], rax\n"));
      }
      Stmt::Scope(scope) => {
        self.asm.push_str("    ;; scope\n");
        self.emit_scope(*scope)?;
        self.asm.push_str("    ;; /scope\n");
      }
      Stmt::If { cond, body, tail } => {
        self.asm.push_str("    ;; if\n");
        self.emit_expr(*cond)?;
        self.pop("rax");
        let label = self.create_label();
        self.asm.push_str("    test rax, rax\n");
        self.asm.push_str(&format!("    jz {label}\n"));
        self.emit_scope(*body)?;
        match tail {
          Some(tail) => {
            let end_label = self.create_label();
            self.asm.push_str(&format!("    jmp {end_label}\n"));
            self.asm.push_str(&format!("{label}:\n"));
            self.emit_if_pred(*tail, &end_label)?;
            self.asm.push_str(&format!("{end_label}:\n"));
          }
          None => self.asm.push_str(&format!("{label}:\n")),
        }
        self.asm.push_str("    ;; /if\n");
      }
    }
    Ok(())
  }

  /// Lower the rest of an `if` chain. Every branch that is not last jumps to
  /// `end_label` after its body; the last one falls through to it.
  fn emit_if_pred(&mut self, pred: NodeId<IfPred>, end_label: &str) -> CompileResult<()> {
    let arena = self.arena;
    match &arena[pred] {
      IfPred::Elif { cond, body, tail } => {
        self.asm.push_str("    ;; elif\n");
        self.emit_expr(*cond)?;
        self.pop("rax");
        self.asm.push_str("    test rax, rax\n");
        match tail {
          Some(tail) => {
            let label = self.create_label();
            self.asm.push_str(&format!("    jz {label}\n"));
            self.emit_scope(*body)?;
            self.asm.push_str(&format!("    jmp {end_label}\n"));
            self.asm.push_str(&format!("{label}:\n"));
            self.emit_if_pred(*tail, end_label)?;
          }
          None => {
            self.asm.push_str(&format!("    jz {end_label}\n"));
            self.emit_scope(*body)?;
          }
        }
      }
      IfPred::Else { body } => {
        self.asm.push_str("    ;; else\n");
        self.emit_scope(*body)?;
      }
    }
    Ok(())
  }

  fn emit_scope(&mut self, scope: NodeId<Scope>) -> CompileResult<()> {
    let arena = self.arena;
    let mark = self.begin_scope();
    for stmt in &arena[scope].stmts {
      self.emit_stmt(*stmt)?;
    }
    self.end_scope(mark);
    Ok(())
  }

  /// Emit stack-based code for a single expression node.
  fn emit_expr(&mut self, expr: NodeId<Expr>) -> CompileResult<()> {
    let arena = self.arena;
    match &arena[expr] {
      Expr::Term(term) => self.emit_term(term),
      Expr::Binary(bin) => {
        // right operand first, so the left one ends up on top
        self.emit_expr(bin.rhs)?;
        self.emit_expr(bin.lhs)?;
        self.pop("rax");
        self.pop("rbx");
        match bin.op {
          BinaryOp::Add => self.asm.push_str("    add rax, rbx\n"),
          BinaryOp::Sub => self.asm.push_str("    sub rax, rbx\n"),
          BinaryOp::Mul => self.asm.push_str("    imul rax, rbx\n"),
          BinaryOp::Div => {
            self.asm.push_str("    cqo\n");
            self.asm.push_str("    idiv rbx\n");
          }
        }
        self.push("rax");
        Ok(())
      }
    }
  }

  fn emit_term(&mut self, term: &Term) -> CompileResult<()> {
    match term {
      Term::IntLit(text) => {
        self.asm.push_str(&format!("    mov rax, {text}\n"));
        self.push("rax");
      }
      Term::Ident(name) => {
        let offset = self.offset_of(name)?;
        self.push(&format!("QWORD [rsp + {offset}]"));
      }
      Term::Paren(inner) => self.emit_expr(*inner)?,
    }
    Ok(())
  }

  fn push(&mut self, operand: &str) {
    self.asm.push_str(&format!("    push {operand}\n"));
    self.stack_size += 1;
  }

  fn pop(&mut self, reg: &str) {
    self.asm.push_str(&format!("    pop {reg}\n"));
    self.stack_size -= 1;
  }

  fn lookup(&self, name: &str) -> CompileResult<&Var> {
    self
      .vars
      .iter()
      .rev()
      .find(|var| var.name == name)
      .ok_or_else(|| CompileError::UndeclaredIdentifier {
        name: name.to_string(),
        line: None,
      })
  }

  /// Byte offset of `name` from the current top of stack. Recomputed on every
  /// use since the stack height moves while the slot does not.
  fn offset_of(&self, name: &str) -> CompileResult<usize> {
    let var = self.lookup(name)?;
    Ok((self.stack_size - var.slot - 1) * WORD)
  }

  /// Returns the mark that the matching [`Self::end_scope`] unwinds to.
  fn begin_scope(&self) -> usize {
    self.vars.len()
  }

  /// Drop the scope's variables with a single stack adjustment.
  fn end_scope(&mut self, mark: usize) {
    let pop_count = self.vars.len() - mark;
    if pop_count != 0 {
      self.asm.push_str(&format!("    add rsp, {}\n", pop_count * WORD));
    }
    self.stack_size -= pop_count;
    self.vars.truncate(mark);
  }

  fn create_label(&mut self) -> String {
    let label = format!("label{}", self.label_count);
    self.label_count += 1;
    trace!(%label, "created label");
    label
  }
}
