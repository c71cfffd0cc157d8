//! Round-trip tests for the textual IR

use lumen_ir::{parse_module, print_module, validate_module, Context, SemanticReason};
use pretty_assertions::assert_eq;

fn roundtrip(source: &str) -> String {
    let mut ctx = Context::new();
    let module = parse_module(&mut ctx, "test", source).expect("parses cleanly");
    validate_module(&ctx, &module).expect("valid after parse");
    print_module(&ctx, &module)
}

#[test]
fn print_then_parse_is_identity_on_second_round() {
    let source = r#"
func i64 @sum(i64 %n) {
%entry:
  %i = alloca i64
  store ptr %i, i64 0
  goto label %header
%header:
  %iv = load i64, ptr %i
  %cond = scmp ls i64 %iv, i64 %n
  branch i1 %cond, label %body, label %exit
%body:
  %next = add i64 %iv, i64 1
  store ptr %i, i64 %next
  goto label %header
%exit:
  return i64 %iv
}
"#;
    let first = roundtrip(source);
    let second = roundtrip(&first);
    assert_eq!(first, second);
}

#[test]
fn parses_structs_globals_and_foreign_functions() {
    let source = r#"
struct @Pair { i64, i64 }

@origin = constant @Pair { i64 0, i64 0 }
@counter = global i64 0

ext func f64 @__builtin_sqrt_f64(f64)

func i64 @first(ptr %p) {
%entry:
  %addr = getelementptr inbounds @Pair, ptr %p, i64 0, 0
  %v = load i64, ptr %addr
  return i64 %v
}
"#;
    let first = roundtrip(source);
    assert!(first.contains("struct @Pair { i64, i64 }"));
    assert!(first.contains("@origin = constant @Pair { i64 0, i64 0 }"));
    assert!(first.contains("ext func f64 @__builtin_sqrt_f64(f64)"));
    let second = roundtrip(&first);
    assert_eq!(first, second);
}

#[test]
fn forward_references_resolve_within_a_function() {
    let source = r#"
func i64 @f(i1 %c) {
%entry:
  branch i1 %c, label %a, label %b
%a:
  goto label %join
%b:
  goto label %join
%join:
  %p = phi i64 [label %a, 1], [label %b, 2]
  return i64 %p
}
"#;
    let first = roundtrip(source);
    let second = roundtrip(&first);
    assert_eq!(first, second);
}

#[test]
fn pointer_metadata_round_trips() {
    let source = r#"
func i64 @f() {
%entry:
  %a = alloca i64 !ptr(align: 8, validsize: 8, nonnull)
  %v = load i64, ptr %a
  return i64 %v
}
"#;
    let first = roundtrip(source);
    assert!(first.contains("!ptr(align: 8, validsize: 8, nonnull)"));
    let second = roundtrip(&first);
    assert_eq!(first, second);
}

#[test]
fn string_literals_lower_to_byte_arrays() {
    let source = "@msg = constant [3 x i8] \"abc\"\n";
    let printed = roundtrip(source);
    assert!(printed.contains("@msg = constant [3 x i8] \"abc\""));
}

#[test]
fn use_of_undeclared_identifier_is_reported() {
    let mut ctx = Context::new();
    let source = r#"
func i64 @f() {
%entry:
  return i64 %nope
}
"#;
    let issues = parse_module(&mut ctx, "bad", source).unwrap_err();
    assert!(issues.iter().any(|issue| matches!(
        issue,
        lumen_ir::ParseIssue::Semantic(s) if s.reason == SemanticReason::UseOfUndeclaredIdentifier
    )));
}

#[test]
fn redeclaration_is_reported() {
    let mut ctx = Context::new();
    let source = r#"
func i64 @f() {
%entry:
  %x = add i64 1, i64 2
  %x = add i64 3, i64 4
  return i64 %x
}
"#;
    let issues = parse_module(&mut ctx, "bad", source).unwrap_err();
    assert!(issues.iter().any(|issue| matches!(
        issue,
        lumen_ir::ParseIssue::Semantic(s) if s.reason == SemanticReason::Redeclaration
    )));
}

#[test]
fn type_mismatch_is_reported() {
    let mut ctx = Context::new();
    let source = r#"
func i64 @f(i32 %a) {
%entry:
  %x = add i64 %a, i64 2
  return i64 %x
}
"#;
    let issues = parse_module(&mut ctx, "bad", source).unwrap_err();
    assert!(issues.iter().any(|issue| matches!(
        issue,
        lumen_ir::ParseIssue::Semantic(s) if s.reason == SemanticReason::TypeMismatch
    )));
}

#[test]
fn missing_terminators_are_completed() {
    let source = r#"
func i64 @f() {
%entry:
  %x = add i64 1, i64 2
}
"#;
    let printed = roundtrip(source);
    assert!(printed.contains("return i64 undef"));
}
