//! Local instruction combining
//!
//! Peephole simplifications over single instructions and short chains:
//! arithmetic identities, constant re-association, comparison
//! canonicalization (constant to the right), redundant conversion removal
//! and GEP chain folding. Runs to a local fixpoint.

use crate::common::{erase_if_unused, finish_pass, replace_value};
use lumen_common::ApInt;
use lumen_ir::{
    ArithmeticOp, CompareMode, Context, Conversion, Function, Inst, InstOp, TypeData, Value,
};
use log::trace;

pub fn instcombine(ctx: &mut Context, function: Function) -> bool {
    let mut changed = false;
    let mut local_change = true;
    let mut rounds = 0;
    while local_change && rounds < 8 {
        local_change = false;
        rounds += 1;
        for inst in function.instructions(ctx) {
            if !ctx.is_alive(inst) {
                continue;
            }
            if combine(ctx, inst) {
                local_change = true;
                changed = true;
            }
        }
    }
    finish_pass(ctx, function, changed)
}

fn combine(ctx: &mut Context, inst: Value) -> bool {
    let Some(data) = inst.inst_data(ctx) else {
        return false;
    };
    match data.op.clone() {
        InstOp::Arith(op) => combine_arith(ctx, inst, op),
        InstOp::Compare { mode, op } => canonicalize_compare(ctx, inst, mode, op),
        InstOp::Convert(conv) => combine_convert(ctx, inst, conv),
        InstOp::Gep { .. } => fold_gep_chain(ctx, inst),
        _ => false,
    }
}

fn replace_and_erase(ctx: &mut Context, inst: Value, replacement: Value) -> bool {
    trace!("instcombine: simplifying %{}", ctx.value_name(inst).unwrap_or(""));
    replace_value(ctx, inst, replacement);
    erase_if_unused(ctx, inst);
    true
}

fn combine_arith(ctx: &mut Context, inst: Value, op: ArithmeticOp) -> bool {
    let operands = inst.operands(ctx);
    let (lhs, rhs) = (operands[0], operands[1]);
    let lhs_const = ctx.as_int_constant(lhs);
    let rhs_const = ctx.as_int_constant(rhs);
    let ty = ctx.value_ty(inst);
    let width = match ctx.type_data(ty) {
        TypeData::Integral { width } => *width,
        _ => return false,
    };

    match op {
        ArithmeticOp::Add | ArithmeticOp::Or | ArithmeticOp::XOr => {
            // x + 0, x | 0, x ^ 0 => x (also the commuted forms).
            if rhs_const.is_some_and(|c| c.is_zero()) {
                return replace_and_erase(ctx, inst, lhs);
            }
            if lhs_const.is_some_and(|c| c.is_zero()) {
                return replace_and_erase(ctx, inst, rhs);
            }
        }
        ArithmeticOp::Sub => {
            if rhs_const.is_some_and(|c| c.is_zero()) {
                return replace_and_erase(ctx, inst, lhs);
            }
            if lhs == rhs {
                let zero = ctx.int_constant(ApInt::zero(width));
                return replace_and_erase(ctx, inst, zero);
            }
        }
        ArithmeticOp::Mul => {
            if rhs_const.is_some_and(|c| c == ApInt::one(width)) {
                return replace_and_erase(ctx, inst, lhs);
            }
            if lhs_const.is_some_and(|c| c == ApInt::one(width)) {
                return replace_and_erase(ctx, inst, rhs);
            }
            if rhs_const.is_some_and(|c| c.is_zero()) || lhs_const.is_some_and(|c| c.is_zero()) {
                let zero = ctx.int_constant(ApInt::zero(width));
                return replace_and_erase(ctx, inst, zero);
            }
        }
        ArithmeticOp::SDiv | ArithmeticOp::UDiv => {
            if rhs_const.is_some_and(|c| c == ApInt::one(width)) {
                return replace_and_erase(ctx, inst, lhs);
            }
        }
        ArithmeticOp::And => {
            if rhs_const.is_some_and(|c| c.is_zero()) || lhs_const.is_some_and(|c| c.is_zero()) {
                let zero = ctx.int_constant(ApInt::zero(width));
                return replace_and_erase(ctx, inst, zero);
            }
            let ones = ApInt::from_i64(-1, width);
            if rhs_const.is_some_and(|c| c == ones) {
                return replace_and_erase(ctx, inst, lhs);
            }
            if lhs_const.is_some_and(|c| c == ones) {
                return replace_and_erase(ctx, inst, rhs);
            }
        }
        ArithmeticOp::XOr if lhs == rhs => {
            let zero = ctx.int_constant(ApInt::zero(width));
            return replace_and_erase(ctx, inst, zero);
        }
        _ => {}
    }

    // (x + c1) + c2 => x + (c1 + c2), and likewise for mul.
    if matches!(op, ArithmeticOp::Add | ArithmeticOp::Mul) {
        if let Some(c2) = rhs_const {
            if let Some(inner_data) = lhs.inst_data(ctx) {
                if inner_data.op == InstOp::Arith(op) {
                    let inner_lhs = inner_data.operands[0];
                    let inner_rhs = inner_data.operands[1];
                    if let Some(c1) = ctx.as_int_constant(inner_rhs) {
                        let folded = match op {
                            ArithmeticOp::Add => c1.wrapping_add(c2),
                            _ => c1.wrapping_mul(c2),
                        };
                        let constant = ctx.int_constant(folded);
                        ctx.set_operand(inst, 0, inner_lhs);
                        ctx.set_operand(inst, 1, constant);
                        return true;
                    }
                }
            }
        }
        // Commute a lone constant to the right so re-association can see it.
        if lhs_const.is_some() && rhs_const.is_none() {
            ctx.set_operand(inst, 0, rhs);
            ctx.set_operand(inst, 1, lhs);
            return true;
        }
    }
    false
}

/// Puts constants on the right-hand side, flipping the relation.
fn canonicalize_compare(
    ctx: &mut Context,
    inst: Value,
    _mode: CompareMode,
    op: lumen_ir::CompareOp,
) -> bool {
    let operands = inst.operands(ctx);
    let (lhs, rhs) = (operands[0], operands[1]);
    if !ctx.is_constant(lhs) || ctx.is_constant(rhs) {
        return false;
    }
    ctx.set_operand(inst, 0, rhs);
    ctx.set_operand(inst, 1, lhs);
    if let InstOp::Compare { op: slot, .. } = ctx.inst_op_mut(inst) {
        *slot = op.inverse();
    }
    true
}

fn combine_convert(ctx: &mut Context, inst: Value, conv: Conversion) -> bool {
    let operand = inst.operands(ctx)[0];
    let target = ctx.value_ty(inst);
    let source = ctx.value_ty(operand);

    // A bitcast to the operand's own type is a copy.
    if conv == Conversion::Bitcast && source == target {
        return replace_and_erase(ctx, inst, operand);
    }

    // zext(trunc x) => x & mask when the widths line up.
    if conv == Conversion::Zext {
        if let Some(inner) = operand.inst_data(ctx) {
            if inner.op == InstOp::Convert(Conversion::Trunc) {
                let inner_source = inner.operands[0];
                if ctx.value_ty(inner_source) == target {
                    let truncated_width = match ctx.type_data(source) {
                        TypeData::Integral { width } => *width,
                        _ => return false,
                    };
                    let target_width = match ctx.type_data(target) {
                        TypeData::Integral { width } => *width,
                        _ => return false,
                    };
                    let mask_bits = if truncated_width == 64 {
                        u64::MAX
                    } else {
                        (1u64 << truncated_width) - 1
                    };
                    let mask = ctx.int_constant(ApInt::new(mask_bits, target_width));
                    let name = ctx.unique_name("masked");
                    let and = Inst::arith(ctx, ArithmeticOp::And, inner_source, mask, name);
                    let block = inst.parent_block(ctx);
                    block.insert_inst_before(ctx, inst, and);
                    return replace_and_erase(ctx, inst, and);
                }
            }
        }
    }
    false
}

/// Folds `gep (gep base, 0, [a]), 0, [b]` into `gep base, idx, [a, b]`.
fn fold_gep_chain(ctx: &mut Context, inst: Value) -> bool {
    let data = inst.inst_data(ctx).expect("gep");
    let InstOp::Gep { member_indices: ref outer_indices, inbounds, .. } = data.op else {
        return false;
    };
    let outer_indices = outer_indices.clone();
    let base = data.operands[0];
    let outer_array_index = data.operands[1];
    // Only a constant-zero outer array index addresses the same object.
    if !ctx.as_int_constant(outer_array_index).is_some_and(|c| c.is_zero()) {
        return false;
    }
    let Some(inner) = base.inst_data(ctx) else {
        return false;
    };
    let InstOp::Gep {
        inbounds_ty: inner_ty,
        member_indices: ref inner_indices,
        inbounds: inner_inbounds,
    } = inner.op
    else {
        return false;
    };
    let inner_indices = inner_indices.clone();
    let inner_base = inner.operands[0];
    let inner_array_index = inner.operands[1];

    let mut combined = inner_indices;
    combined.extend(outer_indices);
    ctx.set_operand(inst, 0, inner_base);
    ctx.set_operand(inst, 1, inner_array_index);
    if let InstOp::Gep { inbounds_ty, member_indices, inbounds: inb } = ctx.inst_op_mut(inst) {
        *inbounds_ty = inner_ty;
        *member_indices = combined;
        *inb = inbounds && inner_inbounds;
    }
    true
}
