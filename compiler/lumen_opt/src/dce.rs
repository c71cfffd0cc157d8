//! Aggressive dead code elimination
//!
//! Mark-and-sweep over instructions. The critical seed is returns, stores
//! and calls (calls to pure foreign functions are not critical). Marking an
//! instruction marks its operand instructions and the terminators of the
//! post-dominance-frontier blocks of its parent; a marked phi additionally
//! marks each predecessor's terminator. The sweep rewrites unmarked
//! branches into gotos targeting the nearest marked post-dominator and
//! erases the remaining unmarked non-goto instructions.

use crate::common::finish_pass;
use hashbrown::HashSet;
use lumen_analysis::FunctionAnalyses;
use lumen_ir::{Block, Context, Function, Inst, InstOp, PhiMapping, Value, ValueKind};
use log::trace;

pub fn dce(ctx: &mut Context, function: Function) -> bool {
    let mut analyses = FunctionAnalyses::new();
    let postdom = analyses.post_dominance(ctx, function);

    let instructions = function.instructions(ctx);
    let mut marked: HashSet<Value> = HashSet::new();
    let mut useful_blocks: HashSet<Block> = HashSet::new();
    let mut worklist: Vec<Value> = Vec::new();

    let mut mark = |inst: Value,
                    ctx: &Context,
                    marked: &mut HashSet<Value>,
                    useful_blocks: &mut HashSet<Block>,
                    worklist: &mut Vec<Value>| {
        if marked.insert(inst) {
            worklist.push(inst);
            useful_blocks.insert(inst.parent_block(ctx));
        }
    };

    for &inst in &instructions {
        if is_critical(ctx, inst) {
            mark(inst, ctx, &mut marked, &mut useful_blocks, &mut worklist);
        }
    }

    while let Some(inst) = worklist.pop() {
        for &operand in &inst.operands(ctx).to_vec() {
            if let ValueKind::Inst(_) = ctx.value_data(operand).kind {
                mark(operand, ctx, &mut marked, &mut useful_blocks, &mut worklist);
            }
        }
        let parent = inst.parent_block(ctx);
        if postdom.contains(parent) {
            for &front in postdom.frontier(parent) {
                if let Some(term) = front.terminator(ctx) {
                    mark(term, ctx, &mut marked, &mut useful_blocks, &mut worklist);
                }
            }
        }
        if inst.is_phi(ctx) {
            for arg in inst.phi_args(ctx) {
                if let Some(term) = arg.pred.terminator(ctx) {
                    mark(term, ctx, &mut marked, &mut useful_blocks, &mut worklist);
                }
            }
        }
    }

    // Sweep.
    let mut changed = false;
    let mut to_erase: Vec<Value> = Vec::new();
    for &inst in &instructions {
        if marked.contains(&inst) {
            continue;
        }
        let data = inst.inst_data(ctx).expect("instruction").op.clone();
        match data {
            InstOp::Branch => {
                let block = inst.parent_block(ctx);
                if !postdom.contains(block) {
                    // Unreachable control flow; nothing to rewire.
                    continue;
                }
                changed = true;
                trace!("dce: rewriting useless branch in %{}", block.name(ctx));
                for succ in inst.successors(ctx) {
                    if succ.is_predecessor(ctx, block) {
                        succ.remove_predecessor(ctx, block);
                    }
                }
                let target = nearest_useful_postdom(ctx, &postdom, &useful_blocks, block);
                block.erase_inst(ctx, inst);
                let goto = Inst::goto(ctx, target);
                block.push_inst(ctx, goto);
                // The new edge needs phi arguments to stay aligned.
                let mut appended_args: Vec<(Value, PhiMapping)> = Vec::new();
                for phi in target.phis(ctx) {
                    let ty = ctx.value_ty(phi);
                    let undef = ctx.undef(ty);
                    appended_args.push((phi, PhiMapping { pred: block, value: undef }));
                }
                target.add_predecessor(ctx, block);
                for (phi, mapping) in appended_args {
                    ctx.phi_add_arg(phi, mapping);
                }
            }
            InstOp::Goto => {}
            _ => {
                changed = true;
                ctx.clear_operands(inst);
                to_erase.push(inst);
            }
        }
    }
    for inst in to_erase {
        // Any remaining users are themselves unmarked and already cleared.
        let block = inst.parent_block(ctx);
        block.erase_inst(ctx, inst);
    }
    // Branch rewiring can strand whole regions.
    changed |= crate::common::erase_unreachable_blocks(ctx, function);
    finish_pass(ctx, function, changed)
}

fn is_critical(ctx: &Context, inst: Value) -> bool {
    let Some(data) = inst.inst_data(ctx) else {
        return false;
    };
    match data.op {
        InstOp::Return | InstOp::Store => true,
        InstOp::Call => {
            // All calls are critical unless the callee is marked pure.
            match &ctx.value_data(data.operands[0]).kind {
                ValueKind::ForeignFunction(foreign) => !foreign.pure_fn,
                _ => true,
            }
        }
        _ => false,
    }
}

/// Walks the post-dominator tree upward to the nearest useful block.
fn nearest_useful_postdom(
    ctx: &Context,
    postdom: &lumen_ir::DominanceInfo,
    useful: &HashSet<Block>,
    origin: Block,
) -> Block {
    let _ = ctx;
    let mut current = postdom.idom(origin);
    while let Some(block) = current {
        if useful.contains(&block) {
            return block;
        }
        current = postdom.idom(block);
    }
    panic!("no useful post-dominator found");
}
