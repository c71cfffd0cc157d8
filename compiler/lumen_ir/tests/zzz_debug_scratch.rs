use lumen_ir::{parse_module, Context};

const LOOP_FN: &str = r#"
func i64 @count(i64 %n) {
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

#[test]
fn debug_it() {
    let mut ctx = Context::new();
    let res = parse_module(&mut ctx, "test", LOOP_FN);
    println!("{:?}", res.map(|_| ()));
}
