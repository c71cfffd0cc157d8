//! Sparse conditional constant propagation
//!
//! Lattice per value: Unexamined (top), Constant, or Inevaluable (bottom);
//! lattice per CFG edge: executable or not. Two FIFO worklists drive the
//! fixpoint: flow edges newly marked executable, and (value, user) pairs
//! whose lattice value changed. After the fixpoint, instructions with
//! constant lattice values are replaced, and branches over constant
//! conditions are rewritten to gotos with the stale edge removed.

use crate::common::{erase_if_unused, finish_pass, remove_dead_link, replace_value};
use hashbrown::HashMap;
use lumen_common::{ApFloat, ApInt};
use lumen_ir::{
    ArithmeticOp, Block, Builtin, CompareMode, CompareOp, Context, Conversion, Function, Inst,
    InstOp, TypeData, UnaryArithmeticOp, Value, ValueKind,
};
use log::trace;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Lattice {
    Unexamined,
    Inevaluable,
    Int(ApInt),
    Float(ApFloat),
}

impl Lattice {
    fn is_constant(self) -> bool {
        matches!(self, Lattice::Int(_) | Lattice::Float(_))
    }
}

/// Greatest lower bound of two lattice values.
fn infimum(a: Lattice, b: Lattice) -> Lattice {
    match (a, b) {
        (Lattice::Unexamined, other) | (other, Lattice::Unexamined) => other,
        (x, y) if x == y => x,
        _ => Lattice::Inevaluable,
    }
}

type FlowEdge = (Option<Block>, Block);

struct SccpContext<'ctx> {
    ctx: &'ctx mut Context,
    function: Function,
    flow_worklist: VecDeque<FlowEdge>,
    use_worklist: VecDeque<(Value, Value)>,
    values: HashMap<Value, Lattice>,
    executable: HashMap<FlowEdge, bool>,
}

pub fn sccp(ctx: &mut Context, function: Function) -> bool {
    let mut sccp = SccpContext {
        ctx: &mut *ctx,
        function,
        flow_worklist: VecDeque::new(),
        use_worklist: VecDeque::new(),
        values: HashMap::new(),
        executable: HashMap::new(),
    };
    let changed = sccp.run();
    drop(sccp);
    finish_pass(ctx, function, changed)
}

impl<'ctx> SccpContext<'ctx> {
    fn run(&mut self) -> bool {
        let entry = self.function.entry(self.ctx).expect("function has an entry block");
        self.flow_worklist.push_back((None, entry));
        while !self.flow_worklist.is_empty() || !self.use_worklist.is_empty() {
            if let Some(edge) = self.flow_worklist.pop_front() {
                self.process_flow_edge(edge);
            } else if let Some(edge) = self.use_worklist.pop_front() {
                self.process_use_edge(edge);
            }
        }
        self.apply()
    }

    fn is_executable(&mut self, edge: FlowEdge) -> bool {
        *self.executable.entry(edge).or_insert(false)
    }

    fn formal_value(&mut self, value: Value) -> Lattice {
        if let Some(&known) = self.values.get(&value) {
            return known;
        }
        let initial = match &self.ctx.value_data(value).kind {
            ValueKind::IntConst(v) => Lattice::Int(*v),
            ValueKind::FloatConst(v) => Lattice::Float(*v),
            ValueKind::Inst(_) => Lattice::Unexamined,
            _ => Lattice::Inevaluable,
        };
        self.values.insert(value, initial);
        initial
    }

    fn set_formal_value(&mut self, value: Value, lattice: Lattice) {
        self.values.insert(value, lattice);
    }

    fn block_is_executable(&mut self, block: Block) -> bool {
        if block.is_entry(self.ctx) {
            return true;
        }
        let preds = block.predecessors(self.ctx);
        preds.into_iter().any(|pred| self.is_executable((Some(pred), block)))
    }

    fn incoming_executable_edges(&mut self, block: Block) -> usize {
        let preds = block.predecessors(self.ctx);
        preds
            .into_iter()
            .filter(|&pred| self.is_executable((Some(pred), block)))
            .count()
    }

    fn process_flow_edge(&mut self, edge: FlowEdge) {
        if self.is_executable(edge) {
            return;
        }
        self.executable.insert(edge, true);
        let (_, dest) = edge;
        for phi in dest.phis(self.ctx) {
            self.visit_phi(phi);
        }
        if dest.is_entry(self.ctx) || self.incoming_executable_edges(dest) == 1 {
            for inst in dest.instructions(self.ctx).to_vec() {
                if inst.is_expression(self.ctx) {
                    self.visit_expression(inst);
                }
            }
        }
        // Propagate control flow out of the block.
        let Some(term) = dest.terminator(self.ctx) else {
            return;
        };
        match term.inst_data(self.ctx).map(|d| d.op.clone()) {
            Some(InstOp::Goto) => {
                let target = term.successors(self.ctx)[0];
                self.flow_worklist.push_back((Some(dest), target));
            }
            Some(InstOp::Branch) => {
                let cond = term.operands(self.ctx)[0];
                let fv = self.formal_value(cond);
                self.process_terminator(fv, term);
            }
            _ => {}
        }
    }

    fn process_use_edge(&mut self, (_, user): (Value, Value)) {
        if user.is_phi(self.ctx) {
            self.visit_phi(user);
        } else if user.is_expression(self.ctx) {
            let parent = user.parent_block(self.ctx);
            if self.block_is_executable(parent) {
                self.visit_expression(user);
            }
        }
    }

    fn visit_phi(&mut self, phi: Value) {
        let parent = phi.parent_block(self.ctx);
        let args = phi.phi_args(self.ctx);
        let mut value = Lattice::Unexamined;
        for arg in args {
            let executable = self.is_executable((Some(arg.pred), parent));
            if executable {
                let arg_value = self.formal_value(arg.value);
                value = infimum(value, arg_value);
            }
        }
        if value == self.formal_value(phi) {
            return;
        }
        self.set_formal_value(phi, value);
        self.notify_users(phi);
    }

    fn visit_expression(&mut self, inst: Value) {
        let old = self.formal_value(inst);
        let value = self.evaluate(inst);
        if value == old {
            return;
        }
        self.set_formal_value(inst, value);
        self.notify_users(inst);
    }

    fn notify_users(&mut self, value: Value) {
        let lattice = self.formal_value(value);
        for user in self.ctx.value_users(value).to_vec() {
            if user.is_phi(self.ctx) || user.is_expression(self.ctx) {
                self.use_worklist.push_back((value, user));
            } else if user.is_terminator(self.ctx) {
                let parent = user.parent_block(self.ctx);
                if self.block_is_executable(parent) {
                    self.process_terminator(lattice, user);
                }
            }
        }
    }

    /// Routes control flow out of a terminator whose condition has the
    /// given lattice value.
    fn process_terminator(&mut self, lattice: Lattice, term: Value) {
        let parent = term.parent_block(self.ctx);
        let data = term.inst_data(self.ctx).expect("terminator");
        match data.op {
            InstOp::Branch => match lattice {
                Lattice::Int(constant) => {
                    let succs = term.successors(self.ctx);
                    let target = if constant.as_bool() { succs[0] } else { succs[1] };
                    self.flow_worklist.push_back((Some(parent), target));
                }
                _ => {
                    for succ in term.successors(self.ctx) {
                        self.flow_worklist.push_back((Some(parent), succ));
                    }
                }
            },
            InstOp::Goto => {
                let target = term.successors(self.ctx)[0];
                self.flow_worklist.push_back((Some(parent), target));
            }
            _ => {}
        }
    }

    // ## Evaluation

    fn evaluate(&mut self, inst: Value) -> Lattice {
        let data = inst.inst_data(self.ctx).expect("expression").clone();
        match &data.op {
            InstOp::Convert(conv) => {
                let operand = self.formal_value(data.operands[0]);
                let target = self.ctx.value_ty(inst);
                let target_data = self.ctx.type_data(target).clone();
                evaluate_conversion(*conv, &target_data, operand)
            }
            InstOp::Arith(op) => {
                let lhs = self.formal_value(data.operands[0]);
                let rhs = self.formal_value(data.operands[1]);
                evaluate_arithmetic(*op, lhs, rhs)
            }
            InstOp::UnaryArith(op) => {
                let operand = self.formal_value(data.operands[0]);
                evaluate_unary(*op, operand)
            }
            InstOp::Compare { mode, op } => {
                let lhs = self.formal_value(data.operands[0]);
                let rhs = self.formal_value(data.operands[1]);
                evaluate_comparison(*mode, *op, lhs, rhs)
            }
            InstOp::Select => {
                let cond = self.formal_value(data.operands[0]);
                let then_value = self.formal_value(data.operands[1]);
                let else_value = self.formal_value(data.operands[2]);
                match cond {
                    Lattice::Int(c) if c.as_bool() => then_value,
                    Lattice::Int(_) => else_value,
                    _ => infimum(then_value, else_value),
                }
            }
            InstOp::Call => {
                let callee = data.operands[0];
                let args: Vec<Lattice> =
                    data.operands[1..].iter().map(|&a| self.formal_value(a)).collect();
                self.evaluate_call(callee, &args)
            }
            _ => Lattice::Inevaluable,
        }
    }

    /// Pure deterministic math builtins fold when all arguments are known.
    fn evaluate_call(&mut self, callee: Value, args: &[Lattice]) -> Lattice {
        let ValueKind::ForeignFunction(data) = &self.ctx.value_data(callee).kind else {
            return Lattice::Inevaluable;
        };
        if !data.pure_fn {
            return Lattice::Inevaluable;
        }
        let name = self.ctx.value_name(callee).unwrap_or("");
        let Some(builtin) = Builtin::from_name(name) else {
            return Lattice::Inevaluable;
        };
        let as_float = |lattice: &Lattice| match lattice {
            Lattice::Float(v) => Some(v.as_f64()),
            _ => None,
        };
        let floats: Option<Vec<f64>> = args.iter().map(as_float).collect();
        let Some(floats) = floats else {
            // Unknown argument: bottom if any argument is bottom, else top.
            return if args.iter().any(|a| matches!(a, Lattice::Inevaluable)) {
                Lattice::Inevaluable
            } else {
                Lattice::Unexamined
            };
        };
        let result = match (builtin, floats.as_slice()) {
            (Builtin::AbsF64, [x]) => x.abs(),
            (Builtin::SqrtF64, [x]) => x.sqrt(),
            (Builtin::PowF64, [x, y]) => x.powf(*y),
            _ => return Lattice::Inevaluable,
        };
        Lattice::Float(ApFloat::from_f64(result, 64))
    }

    // ## Rewriting

    fn apply(&mut self) -> bool {
        let mut replaced: Vec<Value> = Vec::new();
        let snapshot: Vec<(Value, Lattice)> = self.values.iter().map(|(&v, &l)| (v, l)).collect();
        for (value, lattice) in snapshot {
            if !lattice.is_constant() || !self.ctx.is_alive(value) {
                continue;
            }
            if self.ctx.is_constant(value) {
                continue;
            }
            let replacement = match lattice {
                Lattice::Int(v) => self.ctx.int_constant(v),
                Lattice::Float(v) => self.ctx.float_constant(v),
                _ => unreachable!(),
            };
            trace!("sccp: folding {:?} to constant", self.ctx.value_name(value));
            replace_value(self.ctx, value, replacement);
            replaced.push(value);
        }
        for inst in &replaced {
            erase_if_unused(self.ctx, *inst);
        }

        // Branches over constants become gotos; the stale edge dies.
        let mut rewrote_branch = false;
        for block in self.function.blocks(self.ctx) {
            if !self.ctx.is_alive(block.0) {
                // Erased by a previous rewrite's dead-link cascade.
                continue;
            }
            let Some(term) = block.terminator(self.ctx) else {
                continue;
            };
            let Some(data) = term.inst_data(self.ctx) else {
                continue;
            };
            if !matches!(data.op, InstOp::Branch) {
                continue;
            }
            let Some(cond) = self.ctx.as_int_constant(data.operands[0]) else {
                continue;
            };
            let succs = term.successors(self.ctx);
            let (live, stale) = if cond.as_bool() {
                (succs[0], succs[1])
            } else {
                (succs[1], succs[0])
            };
            block.erase_inst(self.ctx, term);
            let goto = Inst::goto(self.ctx, live);
            block.push_inst(self.ctx, goto);
            if stale != live {
                remove_dead_link(self.ctx, self.function, block, stale);
            }
            rewrote_branch = true;
        }
        !replaced.is_empty() || rewrote_branch
    }
}

fn evaluate_conversion(conv: Conversion, target: &TypeData, operand: Lattice) -> Lattice {
    match operand {
        Lattice::Unexamined => Lattice::Unexamined,
        Lattice::Inevaluable => Lattice::Inevaluable,
        Lattice::Int(v) => {
            let width = target.bit_width().unwrap_or(64);
            match conv {
                Conversion::Zext => Lattice::Int(v.zext(width)),
                Conversion::Sext => Lattice::Int(v.sext(width)),
                Conversion::Trunc => Lattice::Int(v.trunc(width)),
                Conversion::UtoF => Lattice::Float(ApFloat::from_f64(v.as_u64() as f64, width)),
                Conversion::StoF => Lattice::Float(ApFloat::from_f64(v.as_i64() as f64, width)),
                Conversion::Bitcast if target.is_integral() => Lattice::Int(v),
                _ => Lattice::Inevaluable,
            }
        }
        Lattice::Float(v) => {
            let width = target.bit_width().unwrap_or(64);
            match conv {
                Conversion::Fext | Conversion::Ftrunc => Lattice::Float(v.convert(width)),
                Conversion::FtoU => Lattice::Int(ApInt::new(v.as_f64() as u64, width)),
                Conversion::FtoS => Lattice::Int(ApInt::from_i64(v.as_f64() as i64, width)),
                _ => Lattice::Inevaluable,
            }
        }
    }
}

fn evaluate_arithmetic(op: ArithmeticOp, lhs: Lattice, rhs: Lattice) -> Lattice {
    use Lattice::{Float, Inevaluable, Int, Unexamined};
    // Multiplication by a known zero is zero regardless of the other side.
    if op == ArithmeticOp::Mul {
        if let Int(v) = lhs {
            if v.is_zero() {
                return Int(v);
            }
        }
        if let Int(v) = rhs {
            if v.is_zero() {
                return Int(v);
            }
        }
    }
    match (lhs, rhs) {
        (Unexamined, _) | (_, Unexamined) => Unexamined,
        (Int(a), Int(b)) => {
            let result = match op {
                ArithmeticOp::Add => Some(a.wrapping_add(b)),
                ArithmeticOp::Sub => Some(a.wrapping_sub(b)),
                ArithmeticOp::Mul => Some(a.wrapping_mul(b)),
                ArithmeticOp::SDiv => a.sdiv(b),
                ArithmeticOp::UDiv => a.udiv(b),
                ArithmeticOp::SRem => a.srem(b),
                ArithmeticOp::URem => a.urem(b),
                ArithmeticOp::LShL | ArithmeticOp::AShL => Some(a.shl(b)),
                ArithmeticOp::LShR => Some(a.lshr(b)),
                ArithmeticOp::AShR => Some(a.ashr(b)),
                ArithmeticOp::And => Some(a.bitand(b)),
                ArithmeticOp::Or => Some(a.bitor(b)),
                ArithmeticOp::XOr => Some(a.bitxor(b)),
                _ => None,
            };
            result.map(Int).unwrap_or(Inevaluable)
        }
        (Float(a), Float(b)) => {
            let result = match op {
                ArithmeticOp::FAdd => Some(a.add(b)),
                ArithmeticOp::FSub => Some(a.sub(b)),
                ArithmeticOp::FMul => Some(a.mul(b)),
                ArithmeticOp::FDiv => Some(a.div(b)),
                _ => None,
            };
            result.map(Float).unwrap_or(Inevaluable)
        }
        _ => Inevaluable,
    }
}

fn evaluate_unary(op: UnaryArithmeticOp, operand: Lattice) -> Lattice {
    match operand {
        Lattice::Unexamined => Lattice::Unexamined,
        Lattice::Int(v) => match op {
            UnaryArithmeticOp::BitwiseNot => Lattice::Int(v.bitnot()),
            UnaryArithmeticOp::LogicalNot => Lattice::Int(v.lognot()),
            UnaryArithmeticOp::Negate => Lattice::Int(v.wrapping_neg()),
        },
        Lattice::Float(v) => match op {
            UnaryArithmeticOp::Negate => Lattice::Float(v.neg()),
            _ => Lattice::Inevaluable,
        },
        Lattice::Inevaluable => Lattice::Inevaluable,
    }
}

fn evaluate_comparison(mode: CompareMode, op: CompareOp, lhs: Lattice, rhs: Lattice) -> Lattice {
    use std::cmp::Ordering;
    let ordering = match (mode, lhs, rhs) {
        (_, Lattice::Unexamined, _) | (_, _, Lattice::Unexamined) => return Lattice::Unexamined,
        (CompareMode::Signed, Lattice::Int(a), Lattice::Int(b)) => Some(a.scmp(b)),
        (CompareMode::Unsigned, Lattice::Int(a), Lattice::Int(b)) => Some(a.ucmp(b)),
        (CompareMode::Float, Lattice::Float(a), Lattice::Float(b)) => a.fcmp(b),
        _ => return Lattice::Inevaluable,
    };
    let result = match ordering {
        None => {
            // NaN: only != holds.
            matches!(op, CompareOp::NotEqual)
        }
        Some(ordering) => match op {
            CompareOp::Equal => ordering == Ordering::Equal,
            CompareOp::NotEqual => ordering != Ordering::Equal,
            CompareOp::Less => ordering == Ordering::Less,
            CompareOp::LessEq => ordering != Ordering::Greater,
            CompareOp::Greater => ordering == Ordering::Greater,
            CompareOp::GreaterEq => ordering != Ordering::Less,
        },
    };
    Lattice::Int(ApInt::truth(result))
}
