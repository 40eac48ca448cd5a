//! Hand the generated listing to the external assembler and linker.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Command;

use snafu::{ResultExt, ensure};
use tracing::{debug, info};

use crate::error::{
  CompileResult, ToolchainFailureSnafu, ToolchainMissingSnafu, ToolchainSpawnSnafu,
};

pub const DEFAULT_ASSEMBLER: &str = "nasm";
pub const DEFAULT_LINKER: &str = "ld";

/// Resolved paths of the assembler and linker.
#[derive(Debug, Clone)]
pub struct Toolchain {
  pub assembler: PathBuf,
  pub linker: PathBuf,
}

impl Toolchain {
  /// Locate `nasm` and `ld` on `PATH`.
  pub fn discover() -> CompileResult<Self> {
    Self::with_programs(DEFAULT_ASSEMBLER, DEFAULT_LINKER)
  }

  pub fn with_programs(assembler: &str, linker: &str) -> CompileResult<Self> {
    let assembler = which::which(assembler).context(ToolchainMissingSnafu { program: assembler })?;
    let linker = which::which(linker).context(ToolchainMissingSnafu { program: linker })?;
    debug!(assembler = %assembler.display(), linker = %linker.display(), "found toolchain");
    Ok(Self { assembler, linker })
  }

  /// `nasm -felf64 <asm> -o <object>`
  pub fn assemble(&self, asm: &Path, object: &Path) -> CompileResult<()> {
    run(
      &self.assembler,
      [
        OsStr::new("-felf64"),
        asm.as_os_str(),
        OsStr::new("-o"),
        object.as_os_str(),
      ],
    )?;
    info!(object = %object.display(), "assembled");
    Ok(())
  }

  /// `ld -o <executable> <object>`
  pub fn link(&self, object: &Path, executable: &Path) -> CompileResult<()> {
    run(
      &self.linker,
      [OsStr::new("-o"), executable.as_os_str(), object.as_os_str()],
    )?;
    info!(executable = %executable.display(), "linked");
    Ok(())
  }
}

fn run<'a>(program: &Path, args: impl IntoIterator<Item = &'a OsStr>) -> CompileResult<()> {
  let name = program.display().to_string();
  let status = Command::new(program)
    .args(args)
    .status()
    .context(ToolchainSpawnSnafu { program: &name })?;
  ensure!(status.success(), ToolchainFailureSnafu { program: name, status });
  Ok(())
}
