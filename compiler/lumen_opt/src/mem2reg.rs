//! Memory-to-register promotion
//!
//! Promotes every alloca whose uses are only direct loads and stores (no
//! escape, no address arithmetic) to SSA form: phi nodes are inserted at
//! the iterated dominance frontier of the alloca's defining blocks, then a
//! stack-based renaming walk over the dominator tree rewrites loads to the
//! reaching definition. Non-promotable allocas are left intact.

use crate::common::finish_pass;
use hashbrown::HashMap;
use lumen_analysis::FunctionAnalyses;
use lumen_ir::{Block, Context, Function, Inst, InstOp, PhiMapping, Ty, Value};
use log::trace;

pub fn mem2reg(ctx: &mut Context, function: Function) -> bool {
    let candidates = promotable_allocas(ctx, function);
    if candidates.is_empty() {
        return finish_pass(ctx, function, false);
    }

    let mut analyses = FunctionAnalyses::new();
    let dom = analyses.dominance(ctx, function);

    // Phi insertion at the iterated dominance frontier of each alloca's
    // store blocks.
    let mut phi_for: HashMap<(Block, Value), Value> = HashMap::new();
    for &(alloca, ty) in &candidates {
        let mut def_blocks: Vec<Block> = Vec::new();
        for &user in ctx.value_users(alloca) {
            let data = user.inst_data(ctx).expect("alloca users are instructions");
            if matches!(data.op, InstOp::Store) {
                let block = user.parent_block(ctx);
                if !def_blocks.contains(&block) {
                    def_blocks.push(block);
                }
            }
        }
        for join in dom.iterated_frontier(&def_blocks) {
            let preds = join.predecessors(ctx);
            let undef = ctx.undef(ty);
            let args: Vec<PhiMapping> =
                preds.iter().map(|&pred| PhiMapping { pred, value: undef }).collect();
            let stem = ctx.value_name(alloca).unwrap_or("mem").to_string();
            let name = ctx.unique_name(&stem);
            let phi = Inst::phi(ctx, ty, &args, name);
            join.insert_inst(ctx, 0, phi);
            phi_for.insert((join, alloca), phi);
        }
    }

    // Stack-based renaming over the dominator tree.
    let mut stacks: HashMap<Value, Vec<Value>> = HashMap::new();
    let mut dead_accesses: Vec<Value> = Vec::new();
    let entry = function.entry(ctx).expect("function has an entry block");
    rename(
        ctx,
        entry,
        &dom,
        &candidates,
        &phi_for,
        &mut stacks,
        &mut dead_accesses,
    );

    // Delete the rewritten loads and stores, then the allocas.
    for inst in dead_accesses {
        let block = inst.parent_block(ctx);
        block.erase_inst(ctx, inst);
    }
    for (alloca, _) in &candidates {
        trace!("mem2reg: promoted {}", ctx.value_name(*alloca).unwrap_or("<anon>"));
        debug_assert!(ctx.value_users(*alloca).is_empty());
        let block = alloca.parent_block(ctx);
        block.erase_inst(ctx, *alloca);
    }
    finish_pass(ctx, function, true)
}

/// Allocas used only by loads and by stores that store *to* them (the
/// alloca never appears as a stored value, call argument or GEP base).
fn promotable_allocas(ctx: &Context, function: Function) -> Vec<(Value, Ty)> {
    let Some(entry) = function.entry(ctx) else {
        return Vec::new();
    };
    let mut result = Vec::new();
    'next: for &inst in entry.instructions(ctx) {
        let Some(data) = inst.inst_data(ctx) else {
            continue;
        };
        let InstOp::Alloca { allocated } = data.op else {
            continue;
        };
        if !data.operands.is_empty() {
            // Dynamic count: not promotable.
            continue;
        }
        for &user in ctx.value_users(inst) {
            let Some(user_data) = user.inst_data(ctx) else {
                continue 'next;
            };
            match user_data.op {
                InstOp::Load { .. } => {}
                InstOp::Store => {
                    if user_data.operands[0] != inst || user_data.operands[1] == inst {
                        continue 'next;
                    }
                }
                _ => continue 'next,
            }
        }
        result.push((inst, allocated));
    }
    result
}

#[allow(clippy::too_many_arguments)]
fn rename(
    ctx: &mut Context,
    block: Block,
    dom: &lumen_ir::DominanceInfo,
    candidates: &[(Value, Ty)],
    phi_for: &HashMap<(Block, Value), Value>,
    stacks: &mut HashMap<Value, Vec<Value>>,
    dead_accesses: &mut Vec<Value>,
) {
    let mut pushed: Vec<Value> = Vec::new();

    // Phis inserted for an alloca are new reaching definitions.
    for &(alloca, _) in candidates {
        if let Some(&phi) = phi_for.get(&(block, alloca)) {
            stacks.entry(alloca).or_default().push(phi);
            pushed.push(alloca);
        }
    }

    for inst in block.instructions(ctx).to_vec() {
        let Some(data) = inst.inst_data(ctx) else {
            continue;
        };
        match data.op {
            InstOp::Load { loaded } => {
                let addr = data.operands[0];
                let Some(&(_, ty)) = candidates.iter().find(|(a, _)| *a == addr) else {
                    continue;
                };
                debug_assert_eq!(loaded, ty, "promoted load type matches the alloca");
                let reaching = stacks
                    .get(&addr)
                    .and_then(|s| s.last().copied())
                    .unwrap_or_else(|| ctx.undef(ty));
                ctx.replace_all_uses_with(inst, reaching);
                dead_accesses.push(inst);
            }
            InstOp::Store => {
                let addr = data.operands[0];
                let value = data.operands[1];
                if !candidates.iter().any(|(a, _)| *a == addr) {
                    continue;
                }
                stacks.entry(addr).or_default().push(value);
                pushed.push(addr);
                dead_accesses.push(inst);
            }
            _ => {}
        }
    }

    // Fill phi arguments of successors for the edges leaving this block.
    for succ in block.successors(ctx) {
        for &(alloca, ty) in candidates {
            let Some(&phi) = phi_for.get(&(succ, alloca)) else {
                continue;
            };
            let reaching = stacks
                .get(&alloca)
                .and_then(|s| s.last().copied())
                .unwrap_or_else(|| ctx.undef(ty));
            let args = phi.phi_args(ctx);
            for (slot, arg) in args.iter().enumerate() {
                if arg.pred == block {
                    ctx.set_operand(phi, slot, reaching);
                }
            }
        }
    }

    for &child in dom.children(block) {
        rename(ctx, child, dom, candidates, phi_for, stacks, dead_accesses);
    }

    for alloca in pushed {
        stacks.get_mut(&alloca).expect("pushed entry exists").pop();
    }
}
