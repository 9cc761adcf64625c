//! Host tables and persistent named values seen from generated code.
//!
//! The stores are process-wide, so every test uses its own names.

use jit_expr::runtime::{self, Symbol};
use jit_expr::{Arg, Compiler, Shape};

fn compile(src: &str) -> jit_expr::CompiledFunction {
    Compiler::new()
        .unwrap()
        .compile(src, Shape::Scalar)
        .expect("compile failed")
}

#[test]
fn table_reads_clamp_the_index() {
    runtime::set_table("tv_read", vec![1.0, 2.0, 3.0, 4.0]);
    let f = compile("tv_read[2], tv_read[10], tv_read[-3], tv_read[1.9]");
    assert_eq!(f.eval(&[]).unwrap(), vec![3.0, 4.0, 1.0, 2.0]);
}

#[test]
fn missing_or_empty_table_reads_zero() {
    runtime::set_table("tv_empty", Vec::new());
    let f = compile("tv_nowhere[0], tv_empty[0], size(\"tv_nowhere\")");
    assert_eq!(f.eval(&[]).unwrap(), vec![0.0, 0.0, 0.0]);
}

#[test]
fn table_functions() {
    runtime::set_table("tv_funcs", vec![1.0, 2.0, 3.0, 4.0]);
    let f = compile(
        "size(\"tv_funcs\"), sum(\"tv_funcs\"), Sum(\"tv_funcs\", 1, 2), \
         Sum(\"tv_funcs\", -5, 100), Sum(\"tv_funcs\", 3, 1)",
    );
    assert_eq!(f.eval(&[]).unwrap(), vec![4.0, 10.0, 5.0, 10.0, 0.0]);
}

#[test]
fn table_write_updates_host_table() {
    runtime::set_table("tv_write", vec![0.0; 3]);
    let f = compile("tv_write[$f1] = $f2 * 2");
    assert_eq!(f.eval(&[Arg::Float(1.0), Arg::Float(4.5)]).unwrap(), vec![9.0]);
    assert_eq!(runtime::table("tv_write"), Some(vec![0.0, 9.0, 0.0]));

    // Writes to a missing table are dropped but still yield the value.
    let g = compile("tv_absent[0] = 3");
    assert_eq!(g.eval(&[]).unwrap(), vec![3.0]);
    assert_eq!(runtime::table("tv_absent"), None);
}

#[test]
fn symbol_inputs_select_the_table() {
    runtime::set_table("tv_sym_a", vec![10.0, 20.0]);
    runtime::set_table("tv_sym_b", vec![1.0, 2.0, 3.0]);
    let f = compile("$s1[1], size(\"$s1\")");

    let a = f.eval(&[Arg::Symbol(Symbol::intern("tv_sym_a"))]).unwrap();
    assert_eq!(a, vec![20.0, 2.0]);
    let b = f.eval(&[Arg::Symbol(Symbol::intern("tv_sym_b"))]).unwrap();
    assert_eq!(b, vec![2.0, 3.0]);
}

#[test]
fn symbol_table_write() {
    runtime::set_table("tv_sym_w", vec![0.0; 2]);
    let f = compile("$s1[1] = 7");
    f.eval(&[Arg::Symbol(Symbol::intern("tv_sym_w"))]).unwrap();
    assert_eq!(runtime::table("tv_sym_w"), Some(vec![0.0, 7.0]));
}

#[test]
fn persistent_values_survive_calls() {
    let f = compile("tv_counter = tv_counter + 1");
    assert_eq!(runtime::value("tv_counter"), None);
    f.eval(&[]).unwrap();
    f.eval(&[]).unwrap();
    assert_eq!(runtime::value("tv_counter"), Some(2.0));

    runtime::set_value("tv_counter", 40.0);
    assert_eq!(f.eval(&[]).unwrap(), vec![41.0]);
}

#[test]
fn values_are_shared_between_functions() {
    let writer = compile("tv_shared = $f1");
    let reader = compile("tv_shared * 2");
    writer.eval(&[Arg::Float(3.0)]).unwrap();
    assert_eq!(reader.eval(&[]).unwrap(), vec![6.0]);
}

#[test]
fn if_evaluates_only_the_taken_branch() {
    let f = compile("if($f1, tv_then = tv_then + 1, tv_else = tv_else + 1)");
    f.eval(&[Arg::Float(1.0)]).unwrap();
    f.eval(&[Arg::Float(1.0)]).unwrap();
    assert_eq!(runtime::value("tv_then"), Some(2.0));
    assert_eq!(runtime::value("tv_else"), None);
}

#[test]
fn logical_operators_evaluate_both_sides() {
    let f = compile("(tv_and_l = 0) && (tv_and_r = 1), (tv_or_l = 1) || (tv_or_r = 1)");
    assert_eq!(f.eval(&[]).unwrap(), vec![0.0, 1.0]);
    assert_eq!(runtime::value("tv_and_r"), Some(1.0));
    assert_eq!(runtime::value("tv_or_r"), Some(1.0));
}

#[test]
fn block_writes_per_frame() {
    runtime::set_table("tv_block", vec![0.0; 4]);
    let mut compiler = Compiler::new().unwrap();
    let f = compiler.compile("tv_block[$v1] = $v1 * 10", Shape::Block).unwrap();
    let idx = [3.0f32, 2.0, 1.0, 0.0];
    let mut out = [0.0f32; 4];
    f.process(&mut [&mut out[..]], &[Arg::Vector(&idx)], 4).unwrap();
    assert_eq!(out, [30.0, 20.0, 10.0, 0.0]);
    assert_eq!(runtime::table("tv_block"), Some(vec![0.0, 10.0, 20.0, 30.0]));
}
