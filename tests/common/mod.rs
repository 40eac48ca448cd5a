//! Shared helpers for the integration tests.
//!
//! `execute` interprets the subset of x86-64 the code generator emits, which
//! lets the tests check a program's exit status without nasm or ld installed.
#![allow(dead_code)]

use std::collections::HashMap;

use hydroc::{CompileOptions, CompileResult};

pub fn compile(src: &str) -> CompileResult<String> {
  hydroc::compile(src, &CompileOptions::default())
}

/// Compile `src` and return the status the program would exit with.
pub fn exit_code(src: &str) -> u8 {
  let asm = compile(src).unwrap_or_else(|err| panic!("{src:?} failed to compile: {err}"));
  execute(&asm)
}

struct Machine {
  regs: HashMap<String, i64>,
  stack: Vec<i64>,
  zero_flag: bool,
}

impl Machine {
  fn slot(&self, operand: &str) -> Option<usize> {
    let offset = operand
      .trim_start_matches("QWORD ")
      .strip_prefix("[rsp + ")?
      .strip_suffix(']')?
      .parse::<usize>()
      .expect("stack offset");
    assert_eq!(offset % 8, 0, "unaligned stack access {operand}");
    let depth = offset / 8;
    assert!(depth < self.stack.len(), "read below the stack: {operand}");
    Some(self.stack.len() - 1 - depth)
  }

  fn read(&self, operand: &str) -> i64 {
    if let Some(index) = self.slot(operand) {
      return self.stack[index];
    }
    if let Ok(value) = operand.parse::<u64>() {
      return value as i64;
    }
    *self
      .regs
      .get(operand)
      .unwrap_or_else(|| panic!("read of unset register {operand}"))
  }

  fn write(&mut self, operand: &str, value: i64) {
    match self.slot(operand) {
      Some(index) => self.stack[index] = value,
      None => {
        self.regs.insert(operand.to_string(), value);
      }
    }
  }
}

/// Run a generated listing until its first `exit` syscall.
pub fn execute(asm: &str) -> u8 {
  let program: Vec<&str> = asm
    .lines()
    .map(str::trim)
    .filter(|line| !line.is_empty() && !line.starts_with(";;") && !line.starts_with("global "))
    .collect();
  let labels: HashMap<&str, usize> = program
    .iter()
    .enumerate()
    .filter_map(|(i, line)| line.strip_suffix(':').map(|name| (name, i)))
    .collect();

  let mut machine = Machine {
    regs: HashMap::new(),
    stack: Vec::new(),
    zero_flag: false,
  };
  let mut pc = 0;
  let mut steps = 0;

  while pc < program.len() {
    steps += 1;
    assert!(steps < 1_000_000, "program did not terminate");

    let line = program[pc];
    pc += 1;
    if line.ends_with(':') {
      continue;
    }

    let (op, rest) = line.split_once(' ').unwrap_or((line, ""));
    let args: Vec<&str> = if rest.is_empty() {
      Vec::new()
    } else {
      rest.split(", ").collect()
    };
    let jump = |target: &str| {
      *labels
        .get(target)
        .unwrap_or_else(|| panic!("undefined label {target}"))
    };

    match op {
      "mov" => {
        let value = machine.read(args[1]);
        machine.write(args[0], value);
      }
      "push" => {
        let value = machine.read(args[0]);
        machine.stack.push(value);
      }
      "pop" => {
        let value = machine.stack.pop().expect("pop from empty stack");
        machine.write(args[0], value);
      }
      "add" if args[0] == "rsp" => {
        let bytes: usize = args[1].parse().expect("stack adjustment");
        assert_eq!(bytes % 8, 0);
        let keep = machine
          .stack
          .len()
          .checked_sub(bytes / 8)
          .expect("stack adjustment below bottom");
        machine.stack.truncate(keep);
      }
      "add" => {
        let value = machine.read(args[0]).wrapping_add(machine.read(args[1]));
        machine.write(args[0], value);
      }
      "sub" => {
        let value = machine.read(args[0]).wrapping_sub(machine.read(args[1]));
        machine.write(args[0], value);
      }
      "imul" => {
        let value = machine.read(args[0]).wrapping_mul(machine.read(args[1]));
        machine.write(args[0], value);
      }
      "cqo" => {
        let rdx = if machine.read("rax") < 0 { -1 } else { 0 };
        machine.write("rdx", rdx);
      }
      "idiv" => {
        let divisor = machine.read(args[0]);
        let dividend = machine.read("rax");
        assert_ne!(divisor, 0, "division by zero");
        machine.write("rax", dividend.wrapping_div(divisor));
        machine.write("rdx", dividend.wrapping_rem(divisor));
      }
      "test" => {
        machine.zero_flag = (machine.read(args[0]) & machine.read(args[1])) == 0;
      }
      "jz" => {
        if machine.zero_flag {
          pc = jump(args[0]);
        }
      }
      "jmp" => pc = jump(args[0]),
      "syscall" => {
        assert_eq!(machine.read("rax"), 60, "only exit is supported");
        return machine.read("rdi") as u8;
      }
      other => panic!("unsupported instruction {other:?} in {line:?}"),
    }
  }

  panic!("program ran off the end without exiting");
}
