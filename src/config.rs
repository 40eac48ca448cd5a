//! Knobs for one compilation and the locations of its build artifacts.

use std::path::PathBuf;

use crate::arena::DEFAULT_CAPACITY;

/// Default bound on expression height and block nesting.
///
/// Each level costs a few recursive frames in the parser and again in the
/// generator, so the pipeline runs on a stack of
/// [`CompileOptions::stack_size`] bytes rather than the caller's.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Stack reserved per accepted nesting level, sized for unoptimised builds.
pub const STACK_PER_LEVEL: usize = 32 * 1024;

/// Stack reserved on top of the per-level share.
pub const STACK_BASE: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
  /// Byte budget of the AST arena.
  pub arena_capacity: usize,
  /// Deepest expression tree or block nesting the parser accepts.
  pub max_depth: usize,
}

impl CompileOptions {
  /// Stack size of the thread that runs tokenizing, parsing and generation.
  pub fn stack_size(&self) -> usize {
    self
      .max_depth
      .saturating_mul(STACK_PER_LEVEL)
      .saturating_add(STACK_BASE)
  }
}

impl Default for CompileOptions {
  fn default() -> Self {
    Self {
      arena_capacity: DEFAULT_CAPACITY,
      max_depth: DEFAULT_MAX_DEPTH,
    }
  }
}

/// Where the listing, the object file and the linked executable are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPaths {
  pub asm: PathBuf,
  pub object: PathBuf,
  pub executable: PathBuf,
}

impl BuildPaths {
  /// Derive the listing and object paths from the executable path.
  pub fn for_executable(executable: impl Into<PathBuf>) -> Self {
    let executable = executable.into();
    Self {
      asm: executable.with_extension("asm"),
      object: executable.with_extension("o"),
      executable,
    }
  }
}

impl Default for BuildPaths {
  fn default() -> Self {
    Self::for_executable("out")
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn stack_grows_with_depth_limit() {
    let options = CompileOptions::default();
    assert_eq!(
      options.stack_size(),
      STACK_BASE + DEFAULT_MAX_DEPTH * STACK_PER_LEVEL
    );

    let unbounded = CompileOptions {
      max_depth: usize::MAX,
      ..CompileOptions::default()
    };
    assert_eq!(unbounded.stack_size(), usize::MAX);
  }

  #[test]
  fn default_paths_match_fixed_outputs() {
    let paths = BuildPaths::default();
    assert_eq!(paths.asm, PathBuf::from("out.asm"));
    assert_eq!(paths.object, PathBuf::from("out.o"));
    assert_eq!(paths.executable, PathBuf::from("out"));
  }

  #[test]
  fn derived_paths_follow_executable() {
    let paths = BuildPaths::for_executable("build/prog");
    assert_eq!(paths.asm, PathBuf::from("build/prog.asm"));
    assert_eq!(paths.object, PathBuf::from("build/prog.o"));
  }
}
