//! Invariant propagation
//!
//! Each conditional branch over a comparison attaches invariants of the
//! form (value, relation, other value) to successors that it alone enters,
//! and the invariants flow through the dominator subtree. A
//! dominator-guaranteed equality with a constant replaces uses of the
//! value inside the dominated region; comparisons that restate a known
//! invariant fold to their truth value.

use crate::common::{erase_if_unused, finish_pass};
use hashbrown::{HashMap, HashSet};
use lumen_analysis::FunctionAnalyses;
use lumen_ir::{
    Block, CompareMode, CompareOp, Context, DominanceInfo, Function, InstOp, Value, ValueKind,
};
use log::trace;
use std::collections::VecDeque;

/// An invariant about a value at a program point: `value relation other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Invariant {
    mode: CompareMode,
    relation: CompareOp,
    other: Value,
}

#[derive(Debug, Clone, Default)]
struct InvariantSet {
    invariants: HashMap<Value, HashSet<Invariant>>,
}

impl InvariantSet {
    fn insert(&mut self, value: Value, invariant: Invariant) {
        self.invariants.entry(value).or_default().insert(invariant);
    }

    fn merge(&mut self, other: &InvariantSet) {
        for (&value, set) in &other.invariants {
            self.invariants.entry(value).or_default().extend(set.iter().copied());
        }
    }

    fn holds(&self, value: Value, invariant: &Invariant) -> bool {
        self.invariants
            .get(&value)
            .is_some_and(|set| set.contains(invariant))
    }
}

pub fn invprop(ctx: &mut Context, function: Function) -> bool {
    let mut analyses = FunctionAnalyses::new();
    let dom = analyses.dominance(ctx, function);
    let mut sets: HashMap<Block, InvariantSet> = HashMap::new();
    let mut changed = false;

    // Breadth-first over the CFG from entry, mirroring evaluation order to
    // discovery order.
    let Some(entry) = function.entry(ctx) else {
        return finish_pass(ctx, function, false);
    };
    let mut queue = VecDeque::new();
    let mut visited = HashSet::new();
    queue.push_back(entry);
    visited.insert(entry);
    while let Some(block) = queue.pop_front() {
        changed |= evaluate(ctx, block, sets.get(&block));
        propagate(ctx, function, block, &dom, &mut sets, &mut changed);
        for succ in block.successors(ctx) {
            if visited.insert(succ) {
                queue.push_back(succ);
            }
        }
    }
    finish_pass(ctx, function, changed)
}

/// Folds comparisons that restate an invariant known at this block.
fn evaluate(ctx: &mut Context, block: Block, set: Option<&InvariantSet>) -> bool {
    let Some(set) = set else {
        return false;
    };
    let mut changed = false;
    for inst in block.instructions(ctx).to_vec() {
        let Some(data) = inst.inst_data(ctx) else {
            continue;
        };
        let InstOp::Compare { mode, op } = data.op else {
            continue;
        };
        let (lhs, rhs) = (data.operands[0], data.operands[1]);
        let direct = Invariant { mode, relation: op, other: rhs };
        let negated = Invariant { mode, relation: op.negated(), other: rhs };
        let truth = if set.holds(lhs, &direct) {
            Some(true)
        } else if set.holds(lhs, &negated) {
            Some(false)
        } else {
            None
        };
        if let Some(truth) = truth {
            trace!("invprop: folding comparison %{}", ctx.value_name(inst).unwrap_or(""));
            let constant = ctx.bool_const(truth);
            ctx.replace_all_uses_with(inst, constant);
            erase_if_unused(ctx, inst);
            changed = true;
        }
    }
    changed
}

fn propagate(
    ctx: &mut Context,
    function: Function,
    block: Block,
    dom: &DominanceInfo,
    sets: &mut HashMap<Block, InvariantSet>,
    changed: &mut bool,
) {
    let Some(term) = block.terminator(ctx) else {
        return;
    };
    let Some(data) = term.inst_data(ctx) else {
        return;
    };
    if matches!(data.op, InstOp::Branch) {
        let cond = data.operands[0];
        let then_block = Block(data.operands[1]);
        let else_block = Block(data.operands[2]);
        let true_inv = |ctx: &mut Context| Invariant {
            mode: CompareMode::Unsigned,
            relation: CompareOp::Equal,
            other: ctx.bool_const(true),
        };
        let false_inv = |ctx: &mut Context| Invariant {
            mode: CompareMode::Unsigned,
            relation: CompareOp::Equal,
            other: ctx.bool_const(false),
        };
        if then_block.has_single_predecessor(ctx) {
            let inv = true_inv(ctx);
            add_invariant(ctx, function, then_block, cond, inv, dom, sets, changed);
        }
        if else_block.has_single_predecessor(ctx) {
            let inv = false_inv(ctx);
            add_invariant(ctx, function, else_block, cond, inv, dom, sets, changed);
        }
        if let Some(InstOp::Compare { mode, op }) = cond.inst_data(ctx).map(|d| d.op.clone()) {
            let a = cond.operands(ctx)[0];
            let b = cond.operands(ctx)[1];
            if then_block.has_single_predecessor(ctx) {
                let inv = Invariant { mode, relation: op, other: b };
                add_invariant(ctx, function, then_block, a, inv, dom, sets, changed);
                let inv = Invariant { mode, relation: op.inverse(), other: a };
                add_invariant(ctx, function, then_block, b, inv, dom, sets, changed);
            }
            if else_block.has_single_predecessor(ctx) {
                let inv = Invariant { mode, relation: op.negated(), other: b };
                add_invariant(ctx, function, else_block, a, inv, dom, sets, changed);
                let inv = Invariant { mode, relation: op.negated().inverse(), other: a };
                add_invariant(ctx, function, else_block, b, inv, dom, sets, changed);
            }
        }
    }

    // Blocks dominated by this one inherit everything known here.
    if let Some(set) = sets.get(&block).cloned() {
        let mut dominated = Vec::new();
        dom.traverse_preorder(block, &mut |sub| {
            if sub != block {
                dominated.push(sub);
            }
        });
        for sub in dominated {
            sets.entry(sub).or_default().merge(&set);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn add_invariant(
    ctx: &mut Context,
    function: Function,
    block: Block,
    value: Value,
    invariant: Invariant,
    dom: &DominanceInfo,
    sets: &mut HashMap<Block, InvariantSet>,
    changed: &mut bool,
) {
    if ctx.is_constant(value) || value == invariant.other {
        return;
    }
    // A guaranteed equality with a constant rewrites dominated uses.
    if invariant.relation == CompareOp::Equal && ctx.is_constant(invariant.other) {
        *changed |= replace_if_dominated(ctx, function, value, invariant.other, block, dom);
        return;
    }
    sets.entry(block).or_default().insert(value, invariant);
}

/// Replaces uses of `value` by `constant` in instructions dominated by
/// `dominator`. Phi operands count as uses at the incoming edge.
fn replace_if_dominated(
    ctx: &mut Context,
    _function: Function,
    value: Value,
    constant: Value,
    dominator: Block,
    dom: &DominanceInfo,
) -> bool {
    let mut changed = false;
    for user in ctx.value_users(value).to_vec() {
        if !matches!(ctx.value_data(user).kind, ValueKind::Inst(_)) {
            continue;
        }
        let Some(parent) = user.inst_data(ctx).and_then(|d| d.parent) else {
            continue;
        };
        if user.is_phi(ctx) {
            let args = user.phi_args(ctx);
            for (slot, arg) in args.iter().enumerate() {
                if arg.value == value && dom.dominates(dominator, arg.pred) {
                    ctx.set_operand(user, slot, constant);
                    changed = true;
                }
            }
            continue;
        }
        if !dom.dominates(dominator, Block(parent)) {
            continue;
        }
        let slots: Vec<usize> = user
            .operands(ctx)
            .iter()
            .enumerate()
            .filter_map(|(slot, &op)| (op == value).then_some(slot))
            .collect();
        for slot in slots {
            ctx.set_operand(user, slot, constant);
            changed = true;
        }
    }
    changed
}
