//! Shared pass utilities

use lumen_ir::{Block, Context, Function, Value};

/// Replaces every use of `old` with `new`.
pub fn replace_value(ctx: &mut Context, old: Value, new: Value) {
    ctx.replace_all_uses_with(old, new);
}

/// Erases an instruction if nothing uses it. Returns `true` on erasure.
pub fn erase_if_unused(ctx: &mut Context, inst: Value) -> bool {
    if !ctx.value_users(inst).is_empty() {
        return false;
    }
    let block = inst.parent_block(ctx);
    block.erase_inst(ctx, inst);
    true
}

/// Removes the control-flow edge `origin -> dest`. If `dest` thereby loses
/// its last predecessor it is erased, cascading into its own successors.
pub fn remove_dead_link(ctx: &mut Context, function: Function, origin: Block, dest: Block) {
    if dest.single_predecessor(ctx) == Some(origin) {
        erase_dead_block(ctx, function, dest);
    } else if dest.is_predecessor(ctx, origin) {
        dest.remove_predecessor(ctx, origin);
    }
}

/// Erases a block that lost its last incoming edge, cascading into
/// successors that die with it (including unreachable cycles).
pub fn erase_dead_block(ctx: &mut Context, function: Function, block: Block) {
    // Phase 1: the dead set. A successor dies when every one of its
    // predecessors is dead; the seed block is dead by assumption.
    let mut dead: Vec<Block> = vec![block];
    let mut changed = true;
    while changed {
        changed = false;
        for b in dead.clone() {
            for succ in b.successors(ctx) {
                if dead.contains(&succ) {
                    continue;
                }
                if succ.predecessors(ctx).iter().all(|p| dead.contains(p)) {
                    dead.push(succ);
                    changed = true;
                }
            }
        }
    }
    // Phase 2: drop all outgoing edges of dead blocks. This erases every
    // reference to dead block values and trims phis in surviving blocks.
    for &b in &dead {
        let successors = b.successors(ctx);
        if let Some(term) = b.terminator(ctx) {
            b.erase_inst(ctx, term);
        }
        for succ in successors {
            if !dead.contains(&succ) && succ.is_predecessor(ctx, b) {
                succ.remove_predecessor(ctx, b);
            }
        }
    }
    // Phase 3: redirect any remaining references to dead definitions (dead
    // phis in sibling dead blocks, stale debris) to undef, then destroy.
    for &b in &dead {
        for inst in b.instructions(ctx).to_vec() {
            let ty = ctx.value_ty(inst);
            let undef = ctx.undef(ty);
            ctx.replace_all_uses_with(inst, undef);
        }
    }
    for b in dead {
        function.remove_block(ctx, b);
    }
}

/// Erases every block unreachable from the entry. Returns `true` if
/// anything was removed.
pub fn erase_unreachable_blocks(ctx: &mut Context, function: Function) -> bool {
    let Some(entry) = function.entry(ctx) else {
        return false;
    };
    let mut reachable: hashbrown::HashSet<Block> = hashbrown::HashSet::new();
    let mut worklist = vec![entry];
    while let Some(block) = worklist.pop() {
        if !reachable.insert(block) {
            continue;
        }
        for succ in block.successors(ctx) {
            worklist.push(succ);
        }
    }
    let dead: Vec<Block> = function
        .blocks(ctx)
        .into_iter()
        .filter(|b| !reachable.contains(b))
        .collect();
    let mut changed = false;
    for block in dead {
        if ctx.is_alive(block.0) {
            erase_dead_block(ctx, function, block);
            changed = true;
        }
    }
    changed
}

/// Debug-build invariant check shared by every pass's exit path.
pub fn finish_pass(ctx: &Context, function: Function, changed: bool) -> bool {
    if cfg!(debug_assertions) {
        lumen_ir::assert_invariants(ctx, function);
    }
    changed
}
