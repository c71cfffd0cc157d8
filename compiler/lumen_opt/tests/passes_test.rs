//! Pass-level tests over hand-written textual IR
//!
//! Each case parses a module, runs a pass or pipeline, validates the IR
//! invariants and checks the printed result.

use lumen_ir::{parse_module, print_function, validate, Context, Function};
use lumen_opt::PassManager;
use pretty_assertions::assert_eq;

/// Test context with `RUST_LOG`-controlled pass tracing enabled.
fn test_context() -> Context {
    let _ = env_logger::builder().is_test(true).try_init();
    Context::new()
}

fn parse_one(ctx: &mut Context, source: &str) -> (lumen_ir::Module, Function) {
    let module = parse_module(ctx, "test", source).expect("test IR parses");
    let function = module.functions()[0];
    (module, function)
}

fn run(ctx: &mut Context, function: Function, pipeline: &[&str]) -> bool {
    let pm = PassManager::new();
    let changed = pm.run_function(ctx, function, pipeline).expect("passes exist");
    validate(ctx, function).expect("invariants hold after the pipeline");
    changed
}

const COUNTER: &str = r#"
func i64 @sum() {
%entry:
  %a = alloca i64
  store ptr %a, i64 0
  %v = load i64, ptr %a
  %s = add i64 %v, i64 42
  store ptr %a, i64 %s
  %r = load i64, ptr %a
  return i64 %r
}
"#;

#[test]
fn mem2reg_promotes_a_simple_counter() {
    let mut ctx = test_context();
    let (_module, function) = parse_one(&mut ctx, COUNTER);
    assert!(run(&mut ctx, function, &["mem2reg"]));
    let printed = print_function(&ctx, function);
    assert!(!printed.contains("alloca"), "alloca must be promoted:\n{printed}");
    assert!(!printed.contains("load"), "loads must be rewritten:\n{printed}");
    assert!(!printed.contains("store"), "stores must be deleted:\n{printed}");
}

#[test]
fn sccp_and_dce_leave_only_the_return() {
    let mut ctx = test_context();
    let (_module, function) = parse_one(&mut ctx, COUNTER);
    run(&mut ctx, function, &["mem2reg", "sccp", "dce"]);
    let printed = print_function(&ctx, function);
    assert!(printed.contains("return i64 42"), "folded to a constant:\n{printed}");
    assert!(!printed.contains("add"), "arithmetic must be folded away:\n{printed}");
}

#[test]
fn sccp_eliminates_a_dead_branch() {
    let mut ctx = test_context();
    let source = r#"
func i64 @pick() {
%entry:
  branch i1 1, label %t, label %e
%t:
  return i64 1
%e:
  return i64 2
}
"#;
    let (_module, function) = parse_one(&mut ctx, source);
    assert!(run(&mut ctx, function, &["sccp"]));
    let printed = print_function(&ctx, function);
    assert!(printed.contains("goto label %t"), "branch becomes goto:\n{printed}");
    assert!(!printed.contains("%e:"), "stale block is removed:\n{printed}");
}

#[test]
fn sccp_drops_phi_arguments_of_removed_edges() {
    let mut ctx = test_context();
    let source = r#"
func i64 @pick() {
%entry:
  branch i1 0, label %t, label %e
%t:
  goto label %join
%e:
  goto label %join
%join:
  %p = phi i64 [label %t, 1], [label %e, 2]
  return i64 %p
}
"#;
    let (_module, function) = parse_one(&mut ctx, source);
    run(&mut ctx, function, &["sccp"]);
    let printed = print_function(&ctx, function);
    assert!(!printed.contains("%t:"), "untaken side is gone:\n{printed}");
    run(&mut ctx, function, &["sccp", "simplifycfg"]);
    let printed = print_function(&ctx, function);
    assert!(printed.contains("return i64 2"), "phi collapses to the live edge:\n{printed}");
}

#[test]
fn sroa_splits_a_two_field_struct() {
    let mut ctx = test_context();
    let source = r#"
struct @X { i64, i64 }

func i64 @f() {
%entry:
  %a = alloca @X
  %p0 = getelementptr inbounds @X, ptr %a, i64 0, 0
  store ptr %p0, i64 1
  %p1 = getelementptr inbounds @X, ptr %a, i64 0, 1
  store ptr %p1, i64 2
  %v0 = load i64, ptr %p0
  %v1 = load i64, ptr %p1
  %s = add i64 %v0, i64 %v1
  return i64 %s
}
"#;
    let (_module, function) = parse_one(&mut ctx, source);
    assert!(run(&mut ctx, function, &["sroa"]));
    let printed = print_function(&ctx, function);
    assert!(!printed.contains("getelementptr"), "no GEPs remain:\n{printed}");
    assert!(!printed.contains("alloca @X"), "aggregate alloca is split:\n{printed}");
    assert_eq!(printed.matches("alloca i64").count(), 2, "one alloca per leaf:\n{printed}");

    run(&mut ctx, function, &["mem2reg", "sccp", "dce"]);
    let printed = print_function(&ctx, function);
    assert!(printed.contains("return i64 3"), "fully folds:\n{printed}");
}

#[test]
fn simplifycfg_merges_a_linear_chain() {
    let mut ctx = test_context();
    let source = r#"
func i64 @chain() {
%a:
  %x = add i64 1, i64 2
  goto label %b
%b:
  %y = add i64 %x, i64 3
  goto label %c
%c:
  return i64 %y
}
"#;
    let (_module, function) = parse_one(&mut ctx, source);
    assert!(run(&mut ctx, function, &["simplifycfg"]));
    let printed = print_function(&ctx, function);
    assert_eq!(function.blocks(&ctx).len(), 1, "chain collapses to one block:\n{printed}");
    assert!(!printed.contains("goto"), "no gotos remain:\n{printed}");
}

#[test]
fn dce_removes_dead_arithmetic() {
    let mut ctx = test_context();
    let source = r#"
func i64 @f(i64 %x) {
%entry:
  %dead = mul i64 %x, i64 10
  %dead2 = add i64 %dead, i64 1
  return i64 %x
}
"#;
    let (_module, function) = parse_one(&mut ctx, source);
    assert!(run(&mut ctx, function, &["dce"]));
    let printed = print_function(&ctx, function);
    assert!(!printed.contains("mul"), "dead chain is swept:\n{printed}");
    assert!(!printed.contains("add"), "dead chain is swept:\n{printed}");
}

#[test]
fn dce_rewrites_useless_branches() {
    let mut ctx = test_context();
    // Both arms converge without observable effects; the branch is useless
    // and is rewritten to a goto to the post-dominator.
    let source = r#"
func i64 @f(i1 %c) {
%entry:
  branch i1 %c, label %t, label %e
%t:
  %a = add i64 1, i64 2
  goto label %join
%e:
  %b = add i64 3, i64 4
  goto label %join
%join:
  return i64 7
}
"#;
    let (_module, function) = parse_one(&mut ctx, source);
    assert!(run(&mut ctx, function, &["dce", "simplifycfg"]));
    let printed = print_function(&ctx, function);
    assert!(!printed.contains("branch"), "useless branch is gone:\n{printed}");
    assert!(printed.contains("return i64 7"), "behavior preserved:\n{printed}");
}

#[test]
fn instcombine_applies_arithmetic_identities() {
    let mut ctx = test_context();
    let source = r#"
func i64 @f(i64 %x) {
%entry:
  %a = add i64 %x, i64 0
  %b = mul i64 %a, i64 1
  %c = sub i64 %b, i64 %b
  %d = add i64 %c, i64 %x
  return i64 %d
}
"#;
    let (_module, function) = parse_one(&mut ctx, source);
    assert!(run(&mut ctx, function, &["instcombine", "dce"]));
    let printed = print_function(&ctx, function);
    // x + 0 => x, * 1 => x, b - b => 0, 0 + x => x.
    assert!(printed.contains("return i64 %x"), "identities collapse:\n{printed}");
}

#[test]
fn instcombine_reassociates_constants() {
    let mut ctx = test_context();
    let source = r#"
func i64 @f(i64 %x) {
%entry:
  %a = add i64 %x, i64 3
  %b = add i64 %a, i64 4
  return i64 %b
}
"#;
    let (_module, function) = parse_one(&mut ctx, source);
    assert!(run(&mut ctx, function, &["instcombine", "dce"]));
    let printed = print_function(&ctx, function);
    assert!(printed.contains("add i64 %x, i64 7"), "constants fold together:\n{printed}");
}

#[test]
fn inline_expands_a_small_callee() {
    let mut ctx = test_context();
    let source = r#"
func i64 @add(i64 %a, i64 %b) {
%entry:
  %s = add i64 %a, i64 %b
  return i64 %s
}

func i64 @caller() {
%entry:
  %r = call i64 @add, i64 20, i64 22
  return i64 %r
}
"#;
    let module = parse_module(&mut ctx, "test", source).expect("parses");
    let caller = module.function_by_name(&ctx, "caller").expect("caller exists");
    let pm = PassManager::new();
    assert!(pm.run_function(&mut ctx, caller, &["inline"]).expect("inline runs"));
    validate(&ctx, caller).expect("valid after inlining");
    let printed = print_function(&ctx, caller);
    assert!(!printed.contains("call"), "call is expanded:\n{printed}");

    pm.run_function(&mut ctx, caller, &["sccp", "dce", "simplifycfg"]).unwrap();
    let printed = print_function(&ctx, caller);
    assert!(printed.contains("return i64 42"), "inlined body folds:\n{printed}");
}

#[test]
fn invprop_replaces_equal_constants_in_dominated_code() {
    let mut ctx = test_context();
    let source = r#"
func i64 @f(i64 %x) {
%entry:
  %c = scmp eq i64 %x, i64 7
  branch i1 %c, label %t, label %e
%t:
  %y = add i64 %x, i64 1
  return i64 %y
%e:
  return i64 0
}
"#;
    let (_module, function) = parse_one(&mut ctx, source);
    assert!(run(&mut ctx, function, &["invprop"]));
    let printed = print_function(&ctx, function);
    assert!(printed.contains("add i64 7, i64 1"), "dominated use becomes 7:\n{printed}");

    run(&mut ctx, function, &["sccp"]);
    let printed = print_function(&ctx, function);
    assert!(printed.contains("return i64 8"), "folds after replacement:\n{printed}");
}

#[test]
fn passes_are_idempotent_on_their_fixed_point() {
    let mut ctx = test_context();
    let (_module, function) = parse_one(&mut ctx, COUNTER);
    let pipeline = ["sroa", "mem2reg", "sccp", "instcombine", "dce", "simplifycfg"];
    run(&mut ctx, function, &pipeline);
    let first = print_function(&ctx, function);
    let changed = run(&mut ctx, function, &pipeline);
    let second = print_function(&ctx, function);
    assert_eq!(first, second, "second run must not change the output");
    assert!(!changed, "fixed point reports no change");
}

#[test]
fn mem2reg_inserts_phis_at_joins() {
    let mut ctx = test_context();
    let source = r#"
func i64 @max(i64 %a, i64 %b) {
%entry:
  %r = alloca i64
  %c = scmp grt i64 %a, i64 %b
  branch i1 %c, label %t, label %e
%t:
  store ptr %r, i64 %a
  goto label %join
%e:
  store ptr %r, i64 %b
  goto label %join
%join:
  %v = load i64, ptr %r
  return i64 %v
}
"#;
    let (_module, function) = parse_one(&mut ctx, source);
    assert!(run(&mut ctx, function, &["mem2reg"]));
    let printed = print_function(&ctx, function);
    assert!(printed.contains("phi i64"), "a phi joins the two stores:\n{printed}");
    assert!(!printed.contains("alloca"), "the slot is promoted:\n{printed}");
}
