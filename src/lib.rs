//! Crate root: wires together the compilation pipeline.
//!
//! - `tokenizer` performs lexical analysis and produces a flat token stream.
//! - `arena` owns every AST node of a compilation behind typed handles.
//! - `parser` builds the AST and resolves names against open scopes.
//! - `codegen` lowers the AST into NASM x86-64 assembly.
//! - `toolchain` drives the external assembler and linker.
//! - `error` and `config` are shared by the other modules.

pub mod arena;
pub mod codegen;
pub mod config;
pub mod error;
pub mod parser;
pub mod tokenizer;
pub mod toolchain;

use std::{fs, panic, thread};

use snafu::ResultExt;
use tracing::info;

pub use arena::Arena;
pub use config::{BuildPaths, CompileOptions};
pub use error::{CompileError, CompileResult};

use error::{IoSnafu, WorkerSnafu};
use parser::Program;
use toolchain::Toolchain;

/// Tokenize and parse `source` into a fresh arena sized by `options`.
pub fn parse_program(source: &str, options: &CompileOptions) -> CompileResult<(Program, Arena)> {
  on_compiler_stack(options, || parse_into_arena(source, options))
}

/// Compile a source string into an assembly listing.
pub fn compile(source: &str, options: &CompileOptions) -> CompileResult<String> {
  on_compiler_stack(options, || {
    let (program, arena) = parse_into_arena(source, options)?;
    codegen::generate(&program, &arena)
  })
}

fn parse_into_arena(source: &str, options: &CompileOptions) -> CompileResult<(Program, Arena)> {
  let tokens = tokenizer::tokenize(source)?;
  let mut arena = Arena::with_capacity(options.arena_capacity);
  let program = parser::parse(&tokens, &mut arena, options)?;
  Ok((program, arena))
}

/// Run `task` on a thread whose stack fits `options.max_depth` levels of
/// nesting, independent of the caller's stack.
fn on_compiler_stack<T, F>(options: &CompileOptions, task: F) -> CompileResult<T>
where
  T: Send + 'static,
  F: FnOnce() -> CompileResult<T> + Send,
{
  thread::scope(|scope| {
    let worker = thread::Builder::new()
      .name("hydroc-compile".into())
      .stack_size(options.stack_size())
      .spawn_scoped(scope, task)
      .context(WorkerSnafu)?;
    match worker.join() {
      Ok(result) => result,
      Err(payload) => panic::resume_unwind(payload),
    }
  })
}

/// Compile, write the listing, then assemble and link it into an executable.
pub fn build(source: &str, options: &CompileOptions, paths: &BuildPaths) -> CompileResult<()> {
  let asm = compile(source, options)?;
  fs::write(&paths.asm, asm).context(IoSnafu { path: &paths.asm })?;
  info!(path = %paths.asm.display(), "wrote assembly");

  let toolchain = Toolchain::discover()?;
  toolchain.assemble(&paths.asm, &paths.object)?;
  toolchain.link(&paths.object, &paths.executable)
}
