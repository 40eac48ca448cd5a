//! End-to-end behaviour of compiled programs, checked through the listing
//! interpreter in `common`.

mod common;

use common::{compile, exit_code};
use hydroc::config::DEFAULT_MAX_DEPTH;
use hydroc::{CompileError, CompileOptions};

#[test]
fn arithmetic_respects_precedence() {
  assert_eq!(exit_code("let x = 1 + 2 * 3; exit(x);"), 7);
  assert_eq!(exit_code("exit(10 - 2 * 3 + 8 / 4);"), 6);
  assert_eq!(exit_code("exit((10 - 2) * 3);"), 24);
}

#[test]
fn same_precedence_is_left_associative() {
  assert_eq!(exit_code("exit(20 - 5 - 3);"), 12);
  assert_eq!(exit_code("exit(100 / 10 / 5);"), 2);
  assert_eq!(exit_code("exit(9 - 4 + 2);"), 7);
}

#[test]
fn division_is_signed() {
  assert_eq!(exit_code("exit((0 - 8) / 2 + 10);"), 6);
  assert_eq!(exit_code("exit(0 - 7 / 2 + 10);"), 7);
}

#[test]
fn undeclared_identifier_fails() {
  let err = compile("exit(y);").unwrap_err();
  assert!(matches!(err, CompileError::UndeclaredIdentifier { ref name, .. } if name == "y"));
}

#[test]
fn block_locals_can_be_redeclared_after_the_block() {
  assert_eq!(exit_code("{ let x = 1; } let x = 2; exit(x);"), 2);
}

#[test]
fn duplicate_declaration_fails() {
  let err = compile("let x = 1; let x = 2;").unwrap_err();
  assert!(matches!(err, CompileError::DuplicateDeclaration { ref name, .. } if name == "x"));
}

#[test]
fn elif_branch_is_taken() {
  let src = "if (0) { exit(1); } elif (1) { exit(2); } else { exit(3); }";
  assert_eq!(exit_code(src), 2);

  let asm = compile(src).unwrap();
  let end_labels = asm.lines().filter(|line| *line == "label1:").count();
  let jumps_to_end = asm.lines().filter(|line| line.trim() == "jmp label1").count();
  assert_eq!(end_labels, 1);
  assert_eq!(jumps_to_end, 2);
}

#[test]
fn truncated_input_fails_to_parse() {
  let err = compile("1 +").unwrap_err();
  assert_eq!(err.kind(), "parse");
}

#[test]
fn exactly_one_branch_runs() {
  let cases = [((1, 0), 11), ((0, 1), 21), ((0, 0), 31), ((1, 1), 11)];
  for ((first, second), expected) in cases {
    let src = format!(
      "let r = 0;
       if ({first}) {{ r = r + 1; }}
       elif ({second}) {{ r = r + 2; }}
       else {{ r = r + 3; }}
       exit(r * 10 + 1);"
    );
    assert_eq!(exit_code(&src), expected, "conditions ({first}, {second})");
  }
}

#[test]
fn long_elif_chain_reconverges() {
  for taken in 0..5 {
    let mut src = String::from("let r = 0;\nif (0) { r = 100; }\n");
    for branch in 0..5 {
      let cond = u8::from(branch == taken);
      src.push_str(&format!("elif ({cond}) {{ r = {}; }}\n", branch + 1));
    }
    src.push_str("exit(r);");
    assert_eq!(exit_code(&src), taken as u8 + 1);
  }
}

#[test]
fn false_if_without_else_falls_through() {
  assert_eq!(exit_code("let x = 5; if (0) { x = 9; } exit(x);"), 5);
  assert_eq!(exit_code("let x = 5; if (x - 4) { x = 9; } exit(x);"), 9);
}

#[test]
fn assignment_from_inner_scope_updates_outer_variable() {
  assert_eq!(exit_code("let x = 1; { let y = 2; x = x + y; } exit(x);"), 3);
}

#[test]
fn branch_locals_are_released() {
  let src = "
    let a = 4;
    if (a - 4) {
      let b = 1;
      exit(b);
    } elif (a) {
      let c = a * 2;
      let d = c + 1;
      a = d;
    }
    let e = 2;
    exit(a + e);
  ";
  assert_eq!(exit_code(src), 11);
}

#[test]
fn nested_scopes_address_every_level() {
  let src = "
    let a = 1;
    {
      let b = 10;
      {
        let c = 100;
        a = a + b + c;
      }
      b = 0;
    }
    exit(a);
  ";
  assert_eq!(exit_code(src), 111);
}

#[test]
fn first_exit_wins() {
  assert_eq!(exit_code("exit(4); exit(5);"), 4);
}

#[test]
fn falling_off_the_end_exits_zero() {
  assert_eq!(exit_code("let x = 3;"), 0);
  assert_eq!(exit_code(""), 0);
}

#[test]
fn comments_are_ignored() {
  let src = "/* header\n spans lines */ let x = 2; // trailing\nexit(x * x);";
  assert_eq!(exit_code(src), 4);
}

#[test]
fn exit_status_is_truncated_to_a_byte() {
  assert_eq!(exit_code("exit(256 + 3);"), 3);
}

/// `exit(` plus `levels - 1` parentheses: the exit expression itself is the
/// first level.
fn nested_parens(levels: usize) -> String {
  format!("exit({}3{});", "(".repeat(levels - 1), ")".repeat(levels - 1))
}

/// Blocks around an `exit`, whose expression is the innermost level.
fn nested_blocks(levels: usize) -> String {
  format!("{}exit(5);{}", "{".repeat(levels - 1), "}".repeat(levels - 1))
}

#[test]
fn nesting_up_to_the_default_limit_compiles() {
  assert_eq!(exit_code(&nested_parens(DEFAULT_MAX_DEPTH)), 3);
  assert_eq!(exit_code(&nested_blocks(DEFAULT_MAX_DEPTH)), 5);
}

#[test]
fn nesting_past_the_default_limit_is_rejected() {
  let err = compile(&nested_parens(DEFAULT_MAX_DEPTH + 1)).unwrap_err();
  assert_eq!(err.kind(), "nesting-too-deep");

  let err = compile(&nested_blocks(DEFAULT_MAX_DEPTH + 1)).unwrap_err();
  assert_eq!(err.kind(), "nesting-too-deep");
}

#[test]
fn far_too_deep_input_is_an_error_not_a_crash() {
  let err = compile(&nested_parens(100_000)).unwrap_err();
  assert!(matches!(
    err,
    CompileError::NestingTooDeep {
      limit: DEFAULT_MAX_DEPTH,
      ..
    }
  ));
}

#[test]
fn parse_program_exposes_the_tree() {
  let (program, arena) =
    hydroc::parse_program("let x = 1 + 2 * 3;\nexit(x);", &CompileOptions::default()).unwrap();
  assert_eq!(
    program.display(&arena).to_string(),
    "Let(x, Add(1, Mul(2, 3)))\nExit(x)"
  );
}

#[test]
fn compiling_twice_gives_identical_output() {
  let src = "let x = 1; if (x) { let y = 2; x = y; } elif (0) { } exit(x);";
  assert_eq!(compile(src).unwrap(), compile(src).unwrap());
}

#[test]
fn arena_capacity_comes_from_options() {
  let options = CompileOptions {
    arena_capacity: 16,
    ..CompileOptions::default()
  };
  let err = hydroc::compile("exit(1 + 2);", &options).unwrap_err();
  assert_eq!(err.kind(), "arena-out-of-capacity");
}

#[test]
fn lex_errors_surface_from_compile() {
  let err = compile("let x = 1;\nexit(x) @").unwrap_err();
  assert_eq!(err.to_string(), "[Lex Error] invalid token '@' on line 2");
}
