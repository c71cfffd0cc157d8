//! Function inlining
//!
//! Replaces calls to small, statically known, non-recursive functions by a
//! clone of the callee body: the caller block is split at the call site,
//! parameters become the call arguments, the callee's returns thread into
//! the continuation through a phi.

use crate::common::{erase_dead_block, finish_pass};
use hashbrown::HashMap;
use lumen_ir::{Block, Context, Function, Inst, InstOp, PhiMapping, Value, ValueKind};
use log::trace;

/// Size-cost threshold: callees with more instructions stay out of line.
const INLINE_THRESHOLD: usize = 24;

pub fn inline(ctx: &mut Context, function: Function) -> bool {
    let mut changed = false;
    // Inlining restructures the caller, so we re-scan after each site.
    while let Some(site) = find_inlinable_call(ctx, function) {
        inline_call(ctx, function, site.call, site.callee);
        changed = true;
    }
    finish_pass(ctx, function, changed)
}

struct CallSite {
    call: Value,
    callee: Function,
}

fn find_inlinable_call(ctx: &Context, caller: Function) -> Option<CallSite> {
    for inst in caller.instructions(ctx) {
        let Some(data) = inst.inst_data(ctx) else {
            continue;
        };
        if !matches!(data.op, InstOp::Call) {
            continue;
        }
        let callee_value = data.operands[0];
        if !matches!(ctx.value_data(callee_value).kind, ValueKind::Function(_)) {
            continue;
        }
        let callee = Function(callee_value);
        if callee == caller {
            // Direct self-recursion never settles; leave it alone.
            continue;
        }
        if callee.entry(ctx).is_none() || callee.instructions(ctx).len() > INLINE_THRESHOLD {
            continue;
        }
        return Some(CallSite { call: inst, callee });
    }
    None
}

fn inline_call(ctx: &mut Context, caller: Function, call: Value, callee: Function) {
    trace!("inline: expanding call to @{} in @{}", callee.name(ctx), caller.name(ctx));
    let call_block = call.parent_block(ctx);
    let call_index = call_block.inst_index(ctx, call).expect("call site in its block");
    let args: Vec<Value> = call.call_args(ctx).to_vec();

    // Split the caller block after the call: the tail moves to a fresh
    // continuation block.
    let cont_name = ctx.unique_name("inline.cont");
    let cont = ctx.create_block(cont_name);
    caller.insert_block_after(ctx, call_block, cont);
    let tail: Vec<Value> = call_block.instructions(ctx)[call_index + 1..].to_vec();
    for &inst in &tail {
        call_block.detach_inst(ctx, inst);
    }
    for inst in tail {
        cont.push_inst(ctx, inst);
    }
    for succ in cont.successors(ctx) {
        succ.update_predecessor(ctx, call_block, cont);
    }

    // Clone the callee: blocks first, then instructions, with a value map
    // from originals to clones. Parameters map to the call arguments.
    let mut value_map: HashMap<Value, Value> = HashMap::new();
    for (param, arg) in callee.params(ctx).to_vec().into_iter().zip(args) {
        value_map.insert(param, arg);
    }
    let callee_blocks = callee.blocks(ctx);
    let mut block_map: HashMap<Block, Block> = HashMap::new();
    let mut insert_after = call_block;
    for &block in &callee_blocks {
        let name = ctx.unique_name(block.name(ctx).to_string().as_str());
        let clone = ctx.create_block(name);
        caller.insert_block_after(ctx, insert_after, clone);
        insert_after = clone;
        block_map.insert(block, clone);
        value_map.insert(block.0, clone.0);
    }

    // Returns become gotos into the continuation; the returned value (still
    // in terms of the original body) is remapped once the map is complete.
    let mut returns: Vec<(Block, Option<Value>)> = Vec::new();
    for &block in &callee_blocks {
        let clone = block_map[&block];
        for inst in block.instructions(ctx).to_vec() {
            let data = inst.inst_data(ctx).expect("instruction");
            if matches!(data.op, InstOp::Return) {
                let original_value = data.operands.first().copied();
                returns.push((clone, original_value));
                let goto = Inst::goto(ctx, cont);
                clone.push_inst(ctx, goto);
                continue;
            }
            let cloned = ctx.clone_instruction(inst);
            clone.push_inst(ctx, cloned);
            value_map.insert(inst, cloned);
        }
    }

    // Remap every operand slot of the clones and mirror predecessor lists.
    for &block in &callee_blocks {
        let clone = block_map[&block];
        for inst in clone.instructions(ctx).to_vec() {
            for (slot, operand) in inst.operands(ctx).to_vec().into_iter().enumerate() {
                let mapped = remap(&value_map, operand);
                if mapped != operand {
                    ctx.set_operand(inst, slot, mapped);
                }
            }
        }
        for pred in block.predecessors(ctx) {
            let mapped = block_map[&pred];
            clone.add_predecessor(ctx, mapped);
        }
    }

    // Entry-block allocas of the clone must dominate the whole caller.
    let caller_entry = caller.entry(ctx).expect("caller has an entry block");
    let cloned_entry = block_map[&callee_blocks[0]];
    let allocas: Vec<Value> = cloned_entry
        .instructions(ctx)
        .iter()
        .copied()
        .filter(|i| matches!(i.inst_data(ctx).map(|d| &d.op), Some(InstOp::Alloca { .. })))
        .collect();
    for alloca in allocas {
        cloned_entry.detach_inst(ctx, alloca);
        caller_entry.insert_inst(ctx, 0, alloca);
    }

    // Rewire: call block jumps into the cloned entry, returns feed the
    // continuation.
    let goto_entry = Inst::goto(ctx, cloned_entry);
    call_block.push_inst(ctx, goto_entry);
    cloned_entry.add_predecessor(ctx, call_block);
    for &(ret_block, _) in &returns {
        cont.add_predecessor(ctx, ret_block);
    }

    let call_ty = ctx.value_ty(call);
    if !ctx.type_data(call_ty).is_void() {
        let remapped: Vec<Option<Value>> = returns
            .iter()
            .map(|&(_, value)| value.map(|v| remap(&value_map, v)))
            .collect();
        let result = match (returns.len(), remapped.first()) {
            (1, Some(&Some(single))) => Some(single),
            (0, _) => None,
            _ => {
                let mappings: Vec<PhiMapping> = returns
                    .iter()
                    .zip(&remapped)
                    .map(|(&(block, _), &value)| PhiMapping {
                        pred: block,
                        value: value.unwrap_or_else(|| ctx.undef(call_ty)),
                    })
                    .collect();
                let name = ctx.unique_name("inline.ret");
                let phi = Inst::phi(ctx, call_ty, &mappings, name);
                cont.insert_inst(ctx, 0, phi);
                Some(phi)
            }
        };
        let result = result.unwrap_or_else(|| ctx.undef(call_ty));
        ctx.replace_all_uses_with(call, result);
    }
    call_block.detach_inst(ctx, call);
    ctx.destroy_inst(call);

    // A callee that never returns leaves the continuation unreachable.
    if returns.is_empty() {
        erase_dead_block(ctx, caller, cont);
    }
}

fn remap(map: &HashMap<Value, Value>, value: Value) -> Value {
    map.get(&value).copied().unwrap_or(value)
}
