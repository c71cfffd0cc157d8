//! Invariant setup and validation
//!
//! `setup_invariants` is run after lowering and after parsing: it truncates
//! instructions past the first terminator, gives terminator-less blocks a
//! `return undef`, and registers predecessor edges. `validate` checks every
//! universal invariant; passes call it (through `assert_invariants`) before
//! returning in debug builds.

use crate::context::Context;
use crate::dominance::DominanceInfo;
use crate::instruction::{Inst, InstOp};
use crate::module::Module;
use crate::value::{Block, Function, Value, ValueKind};

/// Establishes the block-level invariants of a freshly built function.
pub fn setup_invariants(ctx: &mut Context, function: Function) {
    for block in function.blocks(ctx) {
        truncate_after_terminator(ctx, block);
        ensure_terminator(ctx, function, block);
    }
    // Predecessor registration after all terminators exist.
    for block in function.blocks(ctx) {
        let term = block.terminator(ctx).expect("terminator was just ensured");
        for succ in term.successors(ctx) {
            if !succ.is_predecessor(ctx, block) {
                succ.add_predecessor(ctx, block);
            }
        }
    }
}

fn truncate_after_terminator(ctx: &mut Context, block: Block) {
    let insts = block.instructions(ctx).to_vec();
    let Some(first_term) = insts.iter().position(|i| i.is_terminator(ctx)) else {
        return;
    };
    for &inst in &insts[first_term + 1..] {
        let ty = ctx.value_ty(inst);
        let undef = ctx.undef(ty);
        ctx.replace_all_uses_with(inst, undef);
        block.erase_inst(ctx, inst);
    }
}

fn ensure_terminator(ctx: &mut Context, function: Function, block: Block) {
    if block.terminator(ctx).is_some() {
        return;
    }
    let return_ty = function.return_ty(ctx);
    let value = if ctx.type_data(return_ty).is_void() {
        None
    } else {
        Some(ctx.undef(return_ty))
    };
    let ret = Inst::ret(ctx, value);
    block.push_inst(ctx, ret);
}

/// Checks every universal invariant of a function. Returns a description of
/// the first violation found.
pub fn validate(ctx: &Context, function: Function) -> Result<(), String> {
    let blocks = function.blocks(ctx);
    if blocks.is_empty() {
        return Err(format!("function @{} has no blocks", function.name(ctx)));
    }

    for (block_index, &block) in blocks.iter().enumerate() {
        let name = block.name(ctx).to_string();
        let insts = block.instructions(ctx);

        // Entry has no predecessors; reachability of others is checked
        // against the dominator order below.
        if block_index == 0 && block.predecessor_count(ctx) != 0 {
            return Err(format!("entry block %{name} has predecessors"));
        }
        if block_index != 0 && block.predecessor_count(ctx) == 0 {
            return Err(format!("non-entry block %{name} has no predecessors"));
        }

        // Exactly one terminator, at the end; phis precede everything else.
        let Some(term) = block.terminator(ctx) else {
            return Err(format!("block %{name} does not end in a terminator"));
        };
        for &inst in &insts[..insts.len() - 1] {
            if inst.is_terminator(ctx) {
                return Err(format!("block %{name} has an interior terminator"));
            }
        }
        let first_non_phi = block.first_non_phi(ctx);
        if insts[first_non_phi..].iter().any(|i| i.is_phi(ctx)) {
            return Err(format!("block %{name} has a phi after a non-phi"));
        }

        // Branch conditions are i1.
        if let Some(data) = term.inst_data(ctx) {
            if matches!(data.op, InstOp::Branch)
                && !ctx.type_data(ctx.value_ty(data.operands[0])).is_bool()
            {
                return Err(format!("branch condition in %{name} is not i1"));
            }
        }

        // Phi arguments align with the predecessor list.
        let preds = block.predecessors(ctx);
        for phi in block.phis(ctx) {
            let args = phi.phi_args(ctx);
            if args.len() != preds.len() {
                return Err(format!(
                    "phi %{} has {} arguments for {} predecessors",
                    ctx.value_name(phi).unwrap_or(""),
                    args.len(),
                    preds.len()
                ));
            }
            for (arg, &pred) in args.iter().zip(&preds) {
                if arg.pred != pred {
                    return Err(format!(
                        "phi %{} arguments out of order with predecessor list",
                        ctx.value_name(phi).unwrap_or("")
                    ));
                }
            }
        }

        for &inst in insts {
            check_use_def(ctx, inst)?;
            inst.check_result_type(ctx)?;
            if matches!(ctx.value_data(inst).kind, ValueKind::ForwardRef) {
                return Err("unresolved forward reference".to_string());
            }
        }
    }

    check_dominance(ctx, function)
}

fn check_use_def(ctx: &Context, inst: Value) -> Result<(), String> {
    let operands = inst.operands(ctx);
    for &operand in operands {
        let in_operands = operands.iter().filter(|&&v| v == operand).count();
        let in_users = ctx.value_users(operand).iter().filter(|&&u| u == inst).count();
        if in_operands != in_users {
            return Err(format!(
                "use-def mismatch: {in_operands} operand slots vs {in_users} user entries"
            ));
        }
    }
    for &user in ctx.value_users(inst) {
        let in_users = ctx.value_users(inst).iter().filter(|&&u| u == user).count();
        let in_operands = user.operands(ctx).iter().filter(|&&v| v == inst).count();
        if in_operands != in_users {
            return Err(format!(
                "use-def mismatch: {in_users} user entries vs {in_operands} operand slots"
            ));
        }
    }
    Ok(())
}

fn check_dominance(ctx: &Context, function: Function) -> Result<(), String> {
    let dom = DominanceInfo::compute(ctx, function);
    for block in function.blocks(ctx) {
        if !dom.contains(block) {
            // Unreachable blocks are exempt from dominance checking.
            continue;
        }
        let insts = block.instructions(ctx).to_vec();
        for (index, &inst) in insts.iter().enumerate() {
            if inst.is_phi(ctx) {
                for arg in inst.phi_args(ctx) {
                    if let Some(def_block) = defining_block(ctx, arg.value) {
                        if !dom.dominates(def_block, arg.pred) {
                            return Err(format!(
                                "phi argument %{} does not dominate its incoming edge",
                                ctx.value_name(arg.value).unwrap_or("")
                            ));
                        }
                    }
                }
                continue;
            }
            for &operand in inst.operands(ctx) {
                let Some(def_block) = defining_block(ctx, operand) else {
                    continue;
                };
                let dominates = if def_block == block {
                    let def_index = block.inst_index(ctx, operand).expect("operand in its block");
                    def_index < index
                } else {
                    dom.dominates(def_block, block)
                };
                if !dominates {
                    return Err(format!(
                        "use of %{} is not dominated by its definition",
                        ctx.value_name(operand).unwrap_or("")
                    ));
                }
            }
        }
    }
    Ok(())
}

fn defining_block(ctx: &Context, value: Value) -> Option<Block> {
    match &ctx.value_data(value).kind {
        ValueKind::Inst(data) => data.parent.map(Block),
        _ => None,
    }
}

/// Panics on the first invariant violation. Debug-build tail of every pass.
pub fn assert_invariants(ctx: &Context, function: Function) {
    if let Err(message) = validate(ctx, function) {
        panic!("IR invariant violated in @{}: {message}", function.name(ctx));
    }
}

/// Validates every function of a module.
pub fn validate_module(ctx: &Context, module: &Module) -> Result<(), String> {
    for &function in module.functions() {
        validate(ctx, function)?;
    }
    Ok(())
}
