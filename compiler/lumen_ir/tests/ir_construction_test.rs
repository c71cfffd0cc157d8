//! Tests for IR construction, use-edges and invariants

use lumen_ir::{
    assert_invariants, setup_invariants, ArithmeticOp, Context, FunctionBuilder, Inst, Module,
    PhiMapping,
};
use pretty_assertions::assert_eq;

#[test]
fn build_a_straight_line_function() {
    let mut ctx = Context::new();
    let i64_ty = ctx.int_ty(64);
    let function = ctx.create_function(
        "add",
        i64_ty,
        vec![(i64_ty, "a".to_string()), (i64_ty, "b".to_string())],
    );
    let mut module = Module::new("test");
    module.add_function(&mut ctx, function);

    let entry = ctx.create_block("entry");
    function.add_block(&mut ctx, entry);
    let params = function.params(&ctx).to_vec();
    let mut builder = FunctionBuilder::new(&mut ctx, function);
    let sum = builder.arith(ArithmeticOp::Add, params[0], params[1], "s");
    builder.ret(Some(sum));

    setup_invariants(&mut ctx, function);
    assert_invariants(&ctx, function);

    let printed = lumen_ir::print_function(&ctx, function);
    assert_eq!(
        printed,
        "func i64 @add(i64 %a, i64 %b) {\n%entry:\n  %s = add i64 %a, i64 %b\n  return i64 %s\n}\n"
    );
}

#[test]
fn use_edges_track_operand_slots() {
    let mut ctx = Context::new();
    let i64_ty = ctx.int_ty(64);
    let function = ctx.create_function("f", i64_ty, vec![(i64_ty, "a".to_string())]);
    let entry = ctx.create_block("entry");
    function.add_block(&mut ctx, entry);
    let a = function.params(&ctx)[0];

    // a + a: two operand slots, two user entries.
    let sum = Inst::arith(&mut ctx, ArithmeticOp::Add, a, a, "s");
    entry.push_inst(&mut ctx, sum);
    assert_eq!(ctx.value_users(a).len(), 2);

    // Replacing a with a constant rewrites both slots.
    let seven = ctx.int_const(7, 64);
    ctx.replace_all_uses_with(a, seven);
    assert_eq!(ctx.value_users(a).len(), 0);
    assert_eq!(ctx.value_users(seven).len(), 2);
    assert_eq!(sum.operands(&ctx), &[seven, seven]);
}

#[test]
fn replacing_a_value_rewires_users() {
    let mut ctx = Context::new();
    let i64_ty = ctx.int_ty(64);
    let function = ctx.create_function("f", i64_ty, vec![(i64_ty, "a".to_string())]);
    let entry = ctx.create_block("entry");
    function.add_block(&mut ctx, entry);
    let a = function.params(&ctx)[0];

    let one = ctx.int_const(1, 64);
    let x = Inst::arith(&mut ctx, ArithmeticOp::Add, a, one, "x");
    entry.push_inst(&mut ctx, x);
    let y = Inst::arith(&mut ctx, ArithmeticOp::Mul, x, x, "y");
    entry.push_inst(&mut ctx, y);
    let ret = Inst::ret(&mut ctx, Some(y));
    entry.push_inst(&mut ctx, ret);

    ctx.replace_all_uses_with(x, a);
    assert_eq!(y.operands(&ctx), &[a, a]);
    assert!(ctx.value_users(x).is_empty());

    // x is unused now and can be destroyed.
    entry.erase_inst(&mut ctx, x);
    assert!(!ctx.is_alive(x));
}

#[test]
fn missing_terminator_gets_a_return_undef() {
    let mut ctx = Context::new();
    let i64_ty = ctx.int_ty(64);
    let function = ctx.create_function("f", i64_ty, vec![]);
    let entry = ctx.create_block("entry");
    function.add_block(&mut ctx, entry);
    let seven = ctx.int_const(7, 64);
    let inst = Inst::arith(&mut ctx, ArithmeticOp::Add, seven, seven, "x");
    entry.push_inst(&mut ctx, inst);

    setup_invariants(&mut ctx, function);
    let term = entry.terminator(&ctx).expect("terminator inserted");
    let printed = lumen_ir::print_inst(&ctx, term);
    assert_eq!(printed, "return i64 undef");
}

#[test]
fn predecessors_and_phis_stay_aligned() {
    let mut ctx = Context::new();
    let i64_ty = ctx.int_ty(64);
    let bool_ty = ctx.bool_ty();
    let function = ctx.create_function("f", i64_ty, vec![(bool_ty, "c".to_string())]);
    let entry = ctx.create_block("entry");
    let left = ctx.create_block("left");
    let right = ctx.create_block("right");
    let join = ctx.create_block("join");
    for block in [entry, left, right, join] {
        function.add_block(&mut ctx, block);
    }
    let cond = function.params(&ctx)[0];

    let br = Inst::branch(&mut ctx, cond, left, right);
    entry.push_inst(&mut ctx, br);
    let goto_left = Inst::goto(&mut ctx, join);
    left.push_inst(&mut ctx, goto_left);
    let goto_right = Inst::goto(&mut ctx, join);
    right.push_inst(&mut ctx, goto_right);

    let one = ctx.int_const(1, 64);
    let two = ctx.int_const(2, 64);
    let phi = Inst::phi(
        &mut ctx,
        i64_ty,
        &[
            PhiMapping { pred: left, value: one },
            PhiMapping { pred: right, value: two },
        ],
        "p",
    );
    join.push_inst(&mut ctx, phi);
    let ret = Inst::ret(&mut ctx, Some(phi));
    join.push_inst(&mut ctx, ret);

    setup_invariants(&mut ctx, function);
    assert_invariants(&ctx, function);

    // Removing an edge drops the phi argument of that edge.
    join.remove_predecessor(&mut ctx, right);
    assert_eq!(phi.phi_args(&ctx).len(), 1);
    assert_eq!(phi.phi_args(&ctx)[0].value, one);
}
