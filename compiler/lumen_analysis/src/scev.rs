//! Scalar evolution
//!
//! Classifies the value of each instruction inside a loop as a constant, an
//! opaque unknown, or an add/mul recurrence over the loop. The expression
//! tree is owned by the analysis and is invalidated whenever the function
//! is mutated (see [`FunctionAnalyses`](crate::FunctionAnalyses)).
//!
//! `Unknown` nodes are weak back-references: they hold the value handle and
//! must be checked for liveness against the context before use.

use crate::loops::LoopNestForest;
use hashbrown::HashMap;
use lumen_common::ApInt;
use lumen_ir::{ArithmeticOp, Block, Context, Function, InstOp, Value, ValueKind};

/// A scalar evolution expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Scev {
    Constant(ApInt),
    /// An opaque SSA value. The handle is weak; `Context::is_alive` decides
    /// whether it still refers to anything.
    Unknown(Value),
    /// `base + step * iteration` over the loop with this header.
    AddRec { base: Box<Scev>, step: Box<Scev>, header: Block },
    /// `base * step^iteration` over the loop with this header.
    MulRec { base: Box<Scev>, step: Box<Scev>, header: Block },
}

impl Scev {
    pub fn as_constant(&self) -> Option<ApInt> {
        match self {
            Scev::Constant(value) => Some(*value),
            _ => None,
        }
    }
}

/// Scalar evolution results for one function.
#[derive(Debug, Clone, Default)]
pub struct ScalarEvolution {
    expressions: HashMap<Value, Scev>,
}

impl ScalarEvolution {
    pub fn compute(ctx: &Context, function: Function, loops: &LoopNestForest) -> Self {
        let mut result = Self::default();
        for l in loops.loops() {
            result.classify_loop(ctx, l.header, &l.blocks);
        }
        // Values outside any loop still get constant / unknown entries on
        // demand through `classify`; only loop recurrences are precomputed.
        let _ = function;
        result
    }

    /// The classification of `value`, if it was computed.
    pub fn of(&self, value: Value) -> Option<&Scev> {
        self.expressions.get(&value)
    }

    /// Classifies a value: precomputed recurrence, constant, or unknown.
    pub fn classify(&self, ctx: &Context, value: Value) -> Scev {
        if let Some(expr) = self.expressions.get(&value) {
            return expr.clone();
        }
        match ctx.as_int_constant(value) {
            Some(constant) => Scev::Constant(constant),
            None => Scev::Unknown(value),
        }
    }

    fn classify_loop(
        &mut self,
        ctx: &Context,
        header: Block,
        blocks: &hashbrown::HashSet<Block>,
    ) {
        // Recurrences are rooted at header phis of the shape
        // `%i = phi [init from outside], [%i op step from inside]`.
        for phi in header.phis(ctx) {
            let args = phi.phi_args(ctx);
            if args.len() != 2 {
                continue;
            }
            let (outside, inside) = if blocks.contains(&args[0].pred) {
                (args[1], args[0])
            } else {
                (args[0], args[1])
            };
            if blocks.contains(&outside.pred) || !blocks.contains(&inside.pred) {
                continue;
            }
            let Some(rec) = self.recurrence_step(ctx, phi, inside.value, blocks) else {
                continue;
            };
            let base = Box::new(self.classify(ctx, outside.value));
            let expr = match rec {
                (ArithmeticOp::Add, step) => {
                    Scev::AddRec { base, step: Box::new(step), header }
                }
                (ArithmeticOp::Mul, step) => {
                    Scev::MulRec { base, step: Box::new(step), header }
                }
                _ => continue,
            };
            self.expressions.insert(phi, expr);
        }
    }

    /// Matches `inside = phi op step` with a loop-invariant step.
    fn recurrence_step(
        &self,
        ctx: &Context,
        phi: Value,
        inside: Value,
        blocks: &hashbrown::HashSet<Block>,
    ) -> Option<(ArithmeticOp, Scev)> {
        let data = inside.inst_data(ctx)?;
        let InstOp::Arith(op) = data.op else {
            return None;
        };
        if !matches!(op, ArithmeticOp::Add | ArithmeticOp::Mul) {
            return None;
        }
        let (a, b) = (data.operands[0], data.operands[1]);
        let step = if a == phi {
            b
        } else if b == phi {
            a
        } else {
            return None;
        };
        if !is_invariant(ctx, step, blocks) {
            return None;
        }
        Some((op, self.classify(ctx, step)))
    }
}

/// A value is invariant in a loop if it is defined outside of it.
pub fn is_invariant(ctx: &Context, value: Value, blocks: &hashbrown::HashSet<Block>) -> bool {
    match &ctx.value_data(value).kind {
        ValueKind::Inst(data) => match data.parent {
            Some(parent) => !blocks.contains(&Block(parent)),
            None => true,
        },
        _ => true,
    }
}
