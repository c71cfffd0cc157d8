//! Code generation and assembly tests

use lumen_codegen::{compile_module, generate_module, split_critical_edges};
use lumen_ir::{parse_module, validate, Context};
use pretty_assertions::assert_eq;

/// Test context with `RUST_LOG`-controlled pass tracing enabled.
fn test_context() -> Context {
    let _ = env_logger::builder().is_test(true).try_init();
    Context::new()
}

#[test]
fn lowers_a_small_function() {
    let mut ctx = test_context();
    let source = r#"
func i64 @add(i64 %a, i64 %b) {
%entry:
  %s = add i64 %a, i64 %b
  return i64 %s
}
"#;
    let module = parse_module(&mut ctx, "test", source).expect("parses");
    let stream = generate_module(&mut ctx, &module).expect("generates");
    let listing = stream.listing();
    assert_eq!(
        listing,
        "F0:\n  enterfn 3\nF0.L0:\n  mov R[2], R[0]\n  add R[2], R[1]\n  mov R[0], R[2]\n  ret\n"
    );
}

#[test]
fn phis_resolve_to_moves_in_predecessors() {
    let mut ctx = test_context();
    let source = r#"
func i64 @pick(i1 %c) {
%entry:
  branch i1 %c, label %t, label %e
%t:
  goto label %join
%e:
  goto label %join
%join:
  %p = phi i64 [label %t, 1], [label %e, 2]
  return i64 %p
}
"#;
    let module = parse_module(&mut ctx, "test", source).expect("parses");
    let stream = generate_module(&mut ctx, &module).expect("generates");
    let listing = stream.listing();
    // Each predecessor materializes its incoming value before jumping.
    assert!(listing.contains("mov R[1], 1"), "then-edge move:\n{listing}");
    assert!(listing.contains("mov R[1], 2"), "else-edge move:\n{listing}");
}

#[test]
fn fused_compare_selects_the_jump_opcode() {
    let mut ctx = test_context();
    let source = r#"
func i64 @min(i64 %a, i64 %b) {
%entry:
  %c = scmp ls i64 %a, i64 %b
  branch i1 %c, label %t, label %e
%t:
  return i64 %a
%e:
  return i64 %b
}
"#;
    let module = parse_module(&mut ctx, "test", source).expect("parses");
    let stream = generate_module(&mut ctx, &module).expect("generates");
    let listing = stream.listing();
    assert!(listing.contains("icmp R[0], R[1]"), "compare feeds the flags:\n{listing}");
    assert!(listing.contains("jl F0.L"), "jump from comparison op:\n{listing}");
    assert!(!listing.contains("setl"), "no materialization for a fused compare:\n{listing}");
}

#[test]
fn critical_edges_are_split_before_emission() {
    let mut ctx = test_context();
    // entry branches to %loop and %exit; %loop branches back to itself and
    // to %exit, so both edges into %exit are critical.
    let source = r#"
func i64 @f(i1 %c) {
%entry:
  branch i1 %c, label %loop, label %exit
%loop:
  branch i1 %c, label %loop, label %exit
%exit:
  %p = phi i64 [label %entry, 1], [label %loop, 2]
  return i64 %p
}
"#;
    let module = parse_module(&mut ctx, "test", source).expect("parses");
    let function = module.functions()[0];
    assert!(split_critical_edges(&mut ctx, function));
    validate(&ctx, function).expect("still valid after splitting");
    for block in function.blocks(&ctx) {
        let multi_succ = block.successors(&ctx).len() > 1;
        for succ in block.successors(&ctx) {
            let multi_pred = succ.predecessor_count(&ctx) > 1;
            assert!(!(multi_succ && multi_pred), "critical edge survived");
        }
    }
}

#[test]
fn assembles_to_a_program_with_resolved_labels() {
    let mut ctx = test_context();
    let source = r#"
func i64 @loop(i64 %n) {
%entry:
  goto label %header
%header:
  %i = phi i64 [label %entry, 0], [label %body, %next]
  %c = scmp ls i64 %i, i64 %n
  branch i1 %c, label %body, label %exit
%body:
  %next = add i64 %i, i64 1
  goto label %header
%exit:
  return i64 %i
}
"#;
    let module = parse_module(&mut ctx, "test", source).expect("parses");
    let program = compile_module(&mut ctx, &module).expect("compiles");
    assert_eq!(program.header.version, lumen_codegen::PROGRAM_VERSION);
    assert_eq!(program.header.code_size as usize, program.code.len());
    assert!(!program.code.is_empty());
}

#[test]
fn foreign_calls_carry_the_packed_descriptor_address() {
    let mut ctx = test_context();
    let source = r#"
ext func f64 @__builtin_sqrt_f64(f64)

func f64 @root(f64 %x) {
%entry:
  %r = call f64 @__builtin_sqrt_f64, f64 %x
  return f64 %r
}
"#;
    let module = parse_module(&mut ctx, "test", source).expect("parses");
    let program = compile_module(&mut ctx, &module).expect("compiles");
    assert_eq!(program.foreign_functions.len(), 1);
    let decl = &program.foreign_functions[0];
    assert_eq!(decl.name, "__builtin_sqrt_f64");
    assert_eq!(decl.address.slot, 0);
    assert_eq!(decl.ret_size, 8);
    assert_eq!(decl.arg_sizes, vec![8]);
}

#[test]
fn globals_land_in_the_data_image() {
    let mut ctx = test_context();
    let source = r#"
@answer = constant i64 42
@flag = global i1 1

func i64 @read() {
%entry:
  %v = load i64, ptr @answer
  return i64 %v
}
"#;
    let module = parse_module(&mut ctx, "test", source).expect("parses");
    let program = compile_module(&mut ctx, &module).expect("compiles");
    assert_eq!(&program.data[0..8], &42u64.to_le_bytes());
    assert_eq!(program.data[8], 1);
}

#[test]
fn programs_serialize_round_trip() {
    let mut ctx = test_context();
    let source = r#"
func i64 @id(i64 %x) {
%entry:
  return i64 %x
}
"#;
    let module = parse_module(&mut ctx, "test", source).expect("parses");
    let program = compile_module(&mut ctx, &module).expect("compiles");
    let bytes = bincode::serialize(&program).expect("serializes");
    let back: lumen_codegen::Program = bincode::deserialize(&bytes).expect("deserializes");
    assert_eq!(program, back);
}
