//! IR-to-IR optimization passes
//!
//! Every pass shares the contract `(ctx, function) -> bool`: the return
//! value reports whether anything changed, IR invariants hold again on
//! return, and debug builds validate them at pass exit. Passes never
//! retain references into the IR past their own return; a driver composes
//! them through the [`PassManager`].

pub mod common;
pub mod dce;
pub mod inline;
pub mod instcombine;
pub mod invprop;
pub mod mem2reg;
pub mod sccp;
pub mod simplify_cfg;
pub mod sroa;

pub use dce::dce;
pub use inline::inline;
pub use instcombine::instcombine;
pub use invprop::invprop;
pub use mem2reg::mem2reg;
pub use sccp::sccp;
pub use simplify_cfg::simplify_cfg;
pub use sroa::sroa;

use lumen_common::{LumenError, LumenResult};
use lumen_ir::{Context, Function, Module};

/// The uniform pass signature.
pub type PassFn = fn(&mut Context, Function) -> bool;

struct PassInfo {
    name: &'static str,
    run: PassFn,
}

/// Orders passes by name. No global mutable state: the registry is built
/// at construction and threaded through the driver.
pub struct PassManager {
    passes: Vec<PassInfo>,
}

impl Default for PassManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PassManager {
    /// The standard registry with every built-in pass.
    pub fn new() -> Self {
        let passes = vec![
            PassInfo { name: "mem2reg", run: mem2reg },
            PassInfo { name: "sroa", run: sroa },
            PassInfo { name: "sccp", run: sccp },
            PassInfo { name: "dce", run: dce },
            PassInfo { name: "simplifycfg", run: simplify_cfg },
            PassInfo { name: "inline", run: inline },
            PassInfo { name: "instcombine", run: instcombine },
            PassInfo { name: "invprop", run: invprop },
        ];
        Self { passes }
    }

    pub fn get(&self, name: &str) -> Option<PassFn> {
        self.passes.iter().find(|p| p.name == name).map(|p| p.run)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.passes.iter().map(|p| p.name)
    }

    /// Runs a named pipeline over one function.
    pub fn run_function(
        &self,
        ctx: &mut Context,
        function: Function,
        pipeline: &[&str],
    ) -> LumenResult<bool> {
        let mut changed = false;
        for name in pipeline {
            let pass = self
                .get(name)
                .ok_or_else(|| LumenError::invalid_ir(format!("unknown pass '{name}'")))?;
            changed |= pass(ctx, function);
        }
        Ok(changed)
    }

    /// Runs a named pipeline over every function of a module.
    pub fn run_module(
        &self,
        ctx: &mut Context,
        module: &Module,
        pipeline: &[&str],
    ) -> LumenResult<bool> {
        let mut changed = false;
        for &function in module.functions() {
            changed |= self.run_function(ctx, function, pipeline)?;
        }
        Ok(changed)
    }

    /// The default optimization order.
    pub fn default_pipeline() -> &'static [&'static str] {
        &[
            "sroa",
            "mem2reg",
            "sccp",
            "instcombine",
            "simplifycfg",
            "inline",
            "sccp",
            "instcombine",
            "invprop",
            "dce",
            "simplifycfg",
        ]
    }
}
