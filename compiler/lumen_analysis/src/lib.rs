//! Analyses over the SSA IR
//!
//! Dominance and post-dominance (computed in `lumen_ir`), the loop nest
//! forest, scalar evolution and provenance-based alias queries, with a
//! per-function cache invalidated by the function's modification counter:
//! calling a getter after any mutation recomputes.

pub mod alias;
pub mod loops;
pub mod scev;

pub use alias::{allocation_of, no_alias};
pub use loops::{Loop, LoopNestForest};
pub use scev::{is_invariant, ScalarEvolution, Scev};

use lumen_ir::{Context, DominanceInfo, Function};
use std::rc::Rc;

/// Cached analysis results for one function.
///
/// Each slot remembers the function version it was computed at; a bumped
/// version makes the next getter recompute.
#[derive(Default)]
pub struct FunctionAnalyses {
    dominance: Option<(u64, Rc<DominanceInfo>)>,
    post_dominance: Option<(u64, Rc<DominanceInfo>)>,
    loops: Option<(u64, Rc<LoopNestForest>)>,
    scev: Option<(u64, Rc<ScalarEvolution>)>,
}

impl FunctionAnalyses {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every cached result.
    pub fn invalidate(&mut self) {
        *self = Self::default();
    }

    pub fn dominance(&mut self, ctx: &Context, function: Function) -> Rc<DominanceInfo> {
        let version = function.version(ctx);
        if let Some((at, cached)) = &self.dominance {
            if *at == version {
                return Rc::clone(cached);
            }
        }
        let computed = Rc::new(DominanceInfo::compute(ctx, function));
        self.dominance = Some((version, Rc::clone(&computed)));
        computed
    }

    pub fn post_dominance(&mut self, ctx: &Context, function: Function) -> Rc<DominanceInfo> {
        let version = function.version(ctx);
        if let Some((at, cached)) = &self.post_dominance {
            if *at == version {
                return Rc::clone(cached);
            }
        }
        let computed = Rc::new(DominanceInfo::compute_post(ctx, function));
        self.post_dominance = Some((version, Rc::clone(&computed)));
        computed
    }

    pub fn loop_forest(&mut self, ctx: &Context, function: Function) -> Rc<LoopNestForest> {
        let version = function.version(ctx);
        if let Some((at, cached)) = &self.loops {
            if *at == version {
                return Rc::clone(cached);
            }
        }
        let dom = self.dominance(ctx, function);
        let computed = Rc::new(LoopNestForest::compute(ctx, function, &dom));
        self.loops = Some((version, Rc::clone(&computed)));
        computed
    }

    pub fn scalar_evolution(&mut self, ctx: &Context, function: Function) -> Rc<ScalarEvolution> {
        let version = function.version(ctx);
        if let Some((at, cached)) = &self.scev {
            if *at == version {
                return Rc::clone(cached);
            }
        }
        let loops = self.loop_forest(ctx, function);
        let computed = Rc::new(ScalarEvolution::compute(ctx, function, &loops));
        self.scev = Some((version, Rc::clone(&computed)));
        computed
    }
}
