//! Control-flow graph simplification
//!
//! Two sub-phases over the CFG reachable from entry:
//!
//! 1. Branches over constant conditions become gotos; the dead link is
//!    removed, erasing blocks that lose their last predecessor.
//! 2. A block with a single successor whose successor has it as its only
//!    predecessor is merged into it: the goto is erased, trivial phis in
//!    the successor collapse, its instructions are spliced over and the
//!    successor disappears.
//!
//! A final sweep erases blocks that ended up unreachable from entry.

use crate::common::{finish_pass, remove_dead_link, replace_value};
use hashbrown::HashSet;
use lumen_ir::{Block, Context, Function, Inst, InstOp};
use log::trace;

pub fn simplify_cfg(ctx: &mut Context, function: Function) -> bool {
    let mut pass = Ctx { ctx: &mut *ctx, function, visited: HashSet::new(), changed: false };
    if let Some(entry) = pass.function.entry(pass.ctx) {
        pass.replace_const_cond_branches(entry);
        pass.visited.clear();
        pass.merge(entry);
        pass.sweep_unreachable();
    }
    let changed = pass.changed;
    drop(pass);
    finish_pass(ctx, function, changed)
}

struct Ctx<'ctx> {
    ctx: &'ctx mut Context,
    function: Function,
    visited: HashSet<Block>,
    changed: bool,
}

impl<'ctx> Ctx<'ctx> {
    fn replace_const_cond_branches(&mut self, block: Block) {
        if !self.visited.insert(block) {
            return;
        }
        if let Some(term) = block.terminator(self.ctx) {
            let is_branch = matches!(term.inst_data(self.ctx).map(|d| &d.op), Some(InstOp::Branch));
            if is_branch {
                let cond = term.operands(self.ctx)[0];
                if let Some(value) = self.ctx.as_int_constant(cond) {
                    let succs = term.successors(self.ctx);
                    // The first target is taken when the condition is true.
                    let live = succs[if value.as_bool() { 0 } else { 1 }];
                    let dead = succs[if value.as_bool() { 1 } else { 0 }];
                    trace!("simplifycfg: folding constant branch in %{}", block.name(self.ctx));
                    block.erase_inst(self.ctx, term);
                    let goto = Inst::goto(self.ctx, live);
                    block.push_inst(self.ctx, goto);
                    if dead != live {
                        remove_dead_link(self.ctx, self.function, block, dead);
                    }
                    self.changed = true;
                }
            }
        }
        for succ in block.successors(self.ctx) {
            if self.ctx.is_alive(succ.0) {
                self.replace_const_cond_branches(succ);
            }
        }
    }

    fn merge(&mut self, block: Block) {
        if !self.visited.insert(block) {
            return;
        }
        let Some(succ) = block.single_successor(self.ctx) else {
            for next in block.successors(self.ctx) {
                self.merge(next);
            }
            return;
        };
        if succ == block || succ.single_predecessor(self.ctx) != Some(block) {
            self.merge(succ);
            return;
        }
        trace!(
            "simplifycfg: merging %{} into %{}",
            succ.name(self.ctx),
            block.name(self.ctx)
        );
        // Erase the goto, collapse the successor's trivial phis, splice.
        let term = block.terminator(self.ctx).expect("merge source has a terminator");
        block.erase_inst(self.ctx, term);
        for phi in succ.phis(self.ctx) {
            let args = phi.phi_args(self.ctx);
            debug_assert_eq!(args.len(), 1, "single-predecessor block phi arity");
            let value = args[0].value;
            replace_value(self.ctx, phi, value);
            succ.erase_inst(self.ctx, phi);
        }
        block.splice_from(self.ctx, succ);
        for next in block.successors(self.ctx) {
            next.update_predecessor(self.ctx, succ, block);
        }
        self.function.remove_block(self.ctx, succ);
        self.changed = true;
        // Reprocess this block; it may have gained another mergeable
        // successor.
        self.visited.remove(&block);
        self.merge(block);
    }

    /// Erases blocks no longer reachable from entry.
    fn sweep_unreachable(&mut self) {
        self.changed |= crate::common::erase_unreachable_blocks(self.ctx, self.function);
    }
}

/// `true` when nothing in the function can be simplified further: no
/// constant branches and no straight-line chains. Used by tests.
pub fn is_simplified(ctx: &Context, function: Function) -> bool {
    for block in function.blocks(ctx) {
        if let Some(term) = block.terminator(ctx) {
            if let Some(data) = term.inst_data(ctx) {
                if matches!(data.op, InstOp::Branch) && ctx.as_int_constant(data.operands[0]).is_some() {
                    return false;
                }
            }
        }
        if let Some(succ) = block.single_successor(ctx) {
            if succ != block && succ.single_predecessor(ctx) == Some(block) {
                return false;
            }
        }
    }
    true
}
