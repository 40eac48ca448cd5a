use std::fs;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use hydroc::arena::DEFAULT_CAPACITY;
use hydroc::config::DEFAULT_MAX_DEPTH;
use hydroc::{BuildPaths, CompileError, CompileOptions, CompileResult};

#[derive(Parser, Debug)]
#[command(name = "hydroc", version, about = "Compile a hydro program to a Linux x86-64 executable")]
struct Cli {
  /// Source file to compile
  #[arg(value_name = "INPUT")]
  input: PathBuf,

  /// Path of the linked executable
  #[arg(short, long, value_name = "FILE", default_value = "out")]
  output: PathBuf,

  /// Path of the generated assembly listing
  #[arg(long, value_name = "FILE", default_value = "out.asm")]
  asm: PathBuf,

  /// Print the assembly listing to stdout instead of building
  #[arg(long)]
  emit_asm: bool,

  /// Print the parsed program and stop
  #[arg(long)]
  emit_ast: bool,

  /// Byte budget of the AST arena
  #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_CAPACITY)]
  arena_bytes: usize,

  /// Deepest expression or block nesting accepted
  #[arg(long, value_name = "LEVELS", default_value_t = DEFAULT_MAX_DEPTH)]
  max_depth: usize,

  /// Log pipeline progress to stderr
  #[arg(short, long)]
  verbose: bool,
}

fn main() {
  let cli = match Cli::try_parse() {
    Ok(cli) => cli,
    Err(err) => {
      // --help and --version are not failures
      let code = if err.use_stderr() { 1 } else { 0 };
      let _ = err.print();
      process::exit(code);
    }
  };
  init_tracing(cli.verbose);

  if let Err(err) = run(&cli) {
    tracing::debug!(kind = err.kind(), "compilation failed");
    eprintln!("{err}");
    process::exit(1);
  }
}

fn init_tracing(verbose: bool) {
  let default = if verbose { "debug" } else { "warn" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .init();
}

fn run(cli: &Cli) -> CompileResult<()> {
  let source = fs::read_to_string(&cli.input).map_err(|source| CompileError::Io {
    path: cli.input.clone(),
    source,
  })?;
  let options = CompileOptions {
    arena_capacity: cli.arena_bytes,
    max_depth: cli.max_depth,
  };

  if cli.emit_ast {
    let (program, arena) = hydroc::parse_program(&source, &options)?;
    println!("{}", program.display(&arena));
    return Ok(());
  }

  if cli.emit_asm {
    print!("{}", hydroc::compile(&source, &options)?);
    return Ok(());
  }

  let paths = BuildPaths {
    asm: cli.asm.clone(),
    object: cli.output.with_extension("o"),
    executable: cli.output.clone(),
  };
  hydroc::build(&source, &options, &paths)
}
