//! Shared error type used across the compilation pipeline.
//!
//! Every failure is terminal for the compilation, so there is exactly one
//! error enum and every stage returns it. Each variant renders as a single
//! diagnostic line suitable for stderr.

use std::path::PathBuf;
use std::process::ExitStatus;

use snafu::Snafu;

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CompileError {
  #[snafu(display("[Lex Error] {message} on line {line}"))]
  Lex { line: usize, message: String },

  #[snafu(display("[Parse Error] Expected {expected} on line {line}"))]
  Parse { expected: String, line: usize },

  #[snafu(display("Identifier already used: {name}{}", on_line(*line)))]
  DuplicateDeclaration { name: String, line: Option<usize> },

  #[snafu(display("Undeclared identifier: {name}{}", on_line(*line)))]
  UndeclaredIdentifier { name: String, line: Option<usize> },

  #[snafu(display(
    "Arena out of capacity: requested {requested} bytes with {used} of {capacity} bytes in use"
  ))]
  ArenaOutOfCapacity {
    requested: usize,
    used: usize,
    capacity: usize,
  },

  #[snafu(display("Arena alignment must be a power of two, got {align}"))]
  InvalidAlignment { align: usize },

  #[snafu(display("Nesting deeper than {limit} levels on line {line}"))]
  NestingTooDeep { line: usize, limit: usize },

  #[snafu(display("Failed to start the compiler thread: {source}"))]
  Worker { source: std::io::Error },

  #[snafu(display("Failed to access {}: {source}", path.display()))]
  Io {
    path: PathBuf,
    source: std::io::Error,
  },

  #[snafu(display("Could not find `{program}` on PATH: {source}"))]
  ToolchainMissing {
    program: String,
    source: which::Error,
  },

  #[snafu(display("Failed to run `{program}`: {source}"))]
  ToolchainSpawn {
    program: String,
    source: std::io::Error,
  },

  #[snafu(display("`{program}` failed with {status}"))]
  ToolchainFailure { program: String, status: ExitStatus },
}

impl CompileError {
  /// Construct a parse error anchored at a source line.
  pub fn expected(what: impl Into<String>, line: usize) -> Self {
    Self::Parse {
      expected: what.into(),
      line,
    }
  }

  /// Short, stable classification used by logging and tests.
  pub fn kind(&self) -> &'static str {
    match self {
      Self::Lex { .. } => "lex",
      Self::Parse { .. } => "parse",
      Self::DuplicateDeclaration { .. } => "duplicate-declaration",
      Self::UndeclaredIdentifier { .. } => "undeclared-identifier",
      Self::ArenaOutOfCapacity { .. } => "arena-out-of-capacity",
      Self::InvalidAlignment { .. } => "invalid-alignment",
      Self::NestingTooDeep { .. } => "nesting-too-deep",
      Self::Worker { .. } | Self::Io { .. } => "io",
      Self::ToolchainMissing { .. }
      | Self::ToolchainSpawn { .. }
      | Self::ToolchainFailure { .. } => "toolchain",
    }
  }
}

fn on_line(line: Option<usize>) -> String {
  match line {
    Some(line) => format!(" on line {line}"),
    None => String::new(),
  }
}
