//! Error reporting across every stage.

use jit_expr::runtime::InputHistory;
use jit_expr::{Arg, CompileError, Compiler, ErrorKind, Shape};

fn compile_err(src: &str, shape: Shape) -> CompileError {
    Compiler::new()
        .unwrap()
        .compile(src, shape)
        .expect_err("expected a compile error")
}

#[test]
fn syntax_errors_carry_positions() {
    let err = compile_err("1 +", Shape::Scalar);
    assert_eq!(err.kind, ErrorKind::Syntax);
    assert_eq!(err.line, 1);
    assert!(err.col > 0);

    assert_eq!(compile_err("", Shape::Scalar).kind, ErrorKind::Syntax);
    assert_eq!(compile_err("(1 + 2", Shape::Scalar).kind, ErrorKind::Syntax);
    assert_eq!(compile_err("3 = 4", Shape::Scalar).kind, ErrorKind::Syntax);
    assert_eq!(compile_err("\"open", Shape::Scalar).kind, ErrorKind::Syntax);
}

#[test]
fn unknown_function() {
    let err = compile_err("foo(1)", Shape::Scalar);
    assert_eq!(err.kind, ErrorKind::Semantic);
    assert!(err.message.contains("function not found with name: foo"));
}

#[test]
fn wrong_arity() {
    let err = compile_err("sin(1, 2)", Shape::Scalar);
    assert_eq!(err.kind, ErrorKind::Semantic);
    assert!(err.message.contains("function sin expects 1 arguments, got: 2"));
}

#[test]
fn table_function_needs_a_quoted_name() {
    let err = compile_err("size(3)", Shape::Scalar);
    assert_eq!(err.kind, ErrorKind::Semantic);
    let err = compile_err("sin(\"tab\")", Shape::Scalar);
    assert_eq!(err.kind, ErrorKind::Semantic);
    let err = compile_err("size(\"$f1\")", Shape::Scalar);
    assert_eq!(err.kind, ErrorKind::Semantic);
}

#[test]
fn bad_variables() {
    assert_eq!(compile_err("$q1", Shape::Scalar).kind, ErrorKind::Semantic);
    assert_eq!(compile_err("$f0", Shape::Scalar).kind, ErrorKind::Semantic);
}

#[test]
fn missing_input_index_is_one_based() {
    let err = compile_err("$f1 + $f3", Shape::Scalar);
    assert_eq!(err.kind, ErrorKind::Validation);
    assert!(err.message.contains("missing an input variable at index 2"));
}

#[test]
fn conflicting_input_kinds() {
    let err = compile_err("$f1 + $i1", Shape::Scalar);
    assert_eq!(err.kind, ErrorKind::Validation);
    assert!(err.message.contains("mismatched input types at index 1"));
}

#[test]
fn output_out_of_range() {
    let err = compile_err("$y2[-1]", Shape::Sample);
    assert_eq!(err.kind, ErrorKind::Validation);
}

#[test]
fn kind_not_supported_by_shape() {
    assert_eq!(compile_err("$v1", Shape::Scalar).kind, ErrorKind::Codegen);
    assert_eq!(compile_err("$x1", Shape::Block).kind, ErrorKind::Codegen);
    assert_eq!(compile_err("$y1[-1]", Shape::Block).kind, ErrorKind::Codegen);
}

#[test]
fn argument_mismatches() {
    let mut compiler = Compiler::new().unwrap();

    let scalar = compiler.compile("$f1 + $f2", Shape::Scalar).unwrap();
    let err = scalar.eval(&[Arg::Float(1.0)]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Argument);
    let mut out = [0.0f32; 4];
    let err = scalar
        .process(&mut [&mut out[..]], &[Arg::Float(1.0), Arg::Float(2.0)], 4)
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Argument);

    let block = compiler.compile("$v1", Shape::Block).unwrap();
    let short = [1.0f32; 2];
    let err = block
        .process(&mut [&mut out[..]], &[Arg::Vector(&short)], 4)
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Argument);
    let err = block.eval(&[Arg::Vector(&short)]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Argument);

    let sample = compiler.compile("$x1", Shape::Sample).unwrap();
    let history = InputHistory::new(2);
    let err = sample
        .process(&mut [&mut out[..]], &[Arg::History(&history)], 4)
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Argument);

    // Per-sample outputs double as history and must match the frame count.
    let history = InputHistory::new(2);
    let err = sample
        .process(&mut [&mut out[..]], &[Arg::History(&history)], 2)
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Argument);
}

#[test]
fn history_push_checks_length() {
    let mut history = InputHistory::new(4);
    let err = history.push_block(&[1.0, 2.0]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Argument);
}

#[test]
fn errors_display_kind_and_position() {
    let err = compile_err("1 +", Shape::Scalar);
    let text = err.to_string();
    assert!(text.starts_with("[1:"));
    assert!(text.contains("Syntax"));
}

#[test]
fn deep_nesting_is_an_error_not_a_crash() {
    for depth in [200, 1_000, 20_000] {
        let src = format!("{}1{}", "(".repeat(depth), ")".repeat(depth));
        let err = compile_err(&src, Shape::Scalar);
        assert_eq!(err.kind, ErrorKind::Syntax);
        assert!(err.message.contains("nested too deeply"));
    }
    let err = compile_err(&format!("{}$f1", "-".repeat(10_000)), Shape::Scalar);
    assert_eq!(err.kind, ErrorKind::Syntax);

    let mut compiler = Compiler::new().unwrap();
    let f = compiler
        .compile(&format!("{}$f1{}", "(".repeat(40), ")".repeat(40)), Shape::Scalar)
        .unwrap();
    assert_eq!(f.eval(&[Arg::Float(2.0)]).unwrap(), vec![2.0]);
}
