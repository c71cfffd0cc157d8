//! Semantic preservation tests
//!
//! For every pass P and function F with inputs I, `run(F, I)` must equal
//! `run(P(F), I)` under the reference interpreter, including the trace of
//! external calls.

use lumen_common::ApInt;
use lumen_ir::{parse_module, Context, Interpreter, RtValue};
use lumen_opt::PassManager;
use pretty_assertions::assert_eq;

/// Test context with `RUST_LOG`-controlled pass tracing enabled.
fn test_context() -> Context {
    let _ = env_logger::builder().is_test(true).try_init();
    Context::new()
}

fn int(v: i64) -> RtValue {
    RtValue::Int(ApInt::from_i64(v, 64))
}

fn truth(v: bool) -> RtValue {
    RtValue::Int(ApInt::truth(v))
}

/// Runs `name` on each input set before and after the pipeline and
/// compares results and traces.
fn check_preservation(source: &str, name: &str, pipeline: &[&str], inputs: &[Vec<RtValue>]) {
    let mut before_runs = Vec::new();
    {
        let mut ctx = test_context();
        let module = parse_module(&mut ctx, "before", source).expect("parses");
        let mut interp = Interpreter::new(&ctx, &module);
        for input in inputs {
            before_runs.push(interp.run_by_name(name, input).expect("runs"));
        }
    }

    let mut ctx = test_context();
    let module = parse_module(&mut ctx, "after", source).expect("parses");
    let pm = PassManager::new();
    for &function in module.functions() {
        pm.run_function(&mut ctx, function, pipeline).expect("pipeline runs");
    }
    let mut interp = Interpreter::new(&ctx, &module);
    for (input, before) in inputs.iter().zip(before_runs) {
        let after = interp.run_by_name(name, input).expect("still runs");
        assert_eq!(before, after, "pipeline {pipeline:?} changed behavior for {input:?}");
    }
}

#[test]
fn mem2reg_preserves_loop_semantics() {
    let source = r#"
func i64 @tri(i64 %n) {
%entry:
  %acc = alloca i64
  %i = alloca i64
  store ptr %acc, i64 0
  store ptr %i, i64 0
  goto label %header
%header:
  %iv = load i64, ptr %i
  %c = scmp ls i64 %iv, i64 %n
  branch i1 %c, label %body, label %exit
%body:
  %a = load i64, ptr %acc
  %sum = add i64 %a, i64 %iv
  store ptr %acc, i64 %sum
  %next = add i64 %iv, i64 1
  store ptr %i, i64 %next
  goto label %header
%exit:
  %r = load i64, ptr %acc
  return i64 %r
}
"#;
    check_preservation(
        source,
        "tri",
        &["mem2reg", "sccp", "instcombine", "dce", "simplifycfg"],
        &[vec![int(0)], vec![int(1)], vec![int(5)], vec![int(10)]],
    );
}

#[test]
fn sroa_preserves_struct_semantics() {
    let source = r#"
struct @Pair { i64, i64 }

func i64 @swapsum(i64 %a, i64 %b) {
%entry:
  %p = alloca @Pair
  %first = getelementptr inbounds @Pair, ptr %p, i64 0, 0
  %second = getelementptr inbounds @Pair, ptr %p, i64 0, 1
  store ptr %first, i64 %a
  store ptr %second, i64 %b
  %x = load i64, ptr %second
  %y = load i64, ptr %first
  %s = add i64 %x, i64 %y
  return i64 %s
}
"#;
    check_preservation(
        source,
        "swapsum",
        &["sroa", "mem2reg", "sccp", "dce", "simplifycfg"],
        &[vec![int(1), int(2)], vec![int(-4), int(4)], vec![int(100), int(-1)]],
    );
}

#[test]
fn branch_folding_preserves_selected_values() {
    let source = r#"
func i64 @clamp(i64 %x) {
%entry:
  %neg = scmp ls i64 %x, i64 0
  branch i1 %neg, label %low, label %check
%low:
  return i64 0
%check:
  %big = scmp grt i64 %x, i64 100
  branch i1 %big, label %high, label %mid
%high:
  return i64 100
%mid:
  return i64 %x
}
"#;
    check_preservation(
        source,
        "clamp",
        &["sccp", "instcombine", "invprop", "dce", "simplifycfg"],
        &[vec![int(-5)], vec![int(0)], vec![int(55)], vec![int(100)], vec![int(101)]],
    );
}

#[test]
fn inlining_preserves_call_results() {
    let source = r#"
func i64 @square(i64 %x) {
%entry:
  %s = mul i64 %x, i64 %x
  return i64 %s
}

func i64 @sumsq(i64 %a, i64 %b) {
%entry:
  %x = call i64 @square, i64 %a
  %y = call i64 @square, i64 %b
  %s = add i64 %x, i64 %y
  return i64 %s
}
"#;
    check_preservation(
        source,
        "sumsq",
        &["inline", "sccp", "dce", "simplifycfg"],
        &[vec![int(0), int(0)], vec![int(3), int(4)], vec![int(-2), int(5)]],
    );
}

#[test]
fn external_call_traces_stay_in_order() {
    let source = r#"
ext func void @__builtin_puti64(i64)

func void @announce(i1 %c) {
%entry:
  call void @__builtin_puti64, i64 1
  branch i1 %c, label %t, label %e
%t:
  call void @__builtin_puti64, i64 2
  goto label %end
%e:
  call void @__builtin_puti64, i64 3
  goto label %end
%end:
  call void @__builtin_puti64, i64 4
  return
}
"#;
    check_preservation(
        source,
        "announce",
        &["sccp", "dce", "simplifycfg"],
        &[vec![truth(true)], vec![truth(false)]],
    );
}

#[test]
fn phi_heavy_diamonds_survive_the_full_pipeline() {
    let source = r#"
func i64 @pick(i1 %c, i64 %a, i64 %b) {
%entry:
  branch i1 %c, label %t, label %e
%t:
  %x = add i64 %a, i64 10
  goto label %join
%e:
  %y = mul i64 %b, i64 3
  goto label %join
%join:
  %p = phi i64 [label %t, %x], [label %e, %y]
  return i64 %p
}
"#;
    check_preservation(
        source,
        "pick",
        PassManager::default_pipeline(),
        &[
            vec![truth(true), int(1), int(2)],
            vec![truth(false), int(1), int(2)],
            vec![truth(false), int(0), int(-7)],
        ],
    );
}
