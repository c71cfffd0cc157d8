//! Modules: owners of functions, foreign functions, globals and named
//! struct types

use crate::context::Context;
use crate::types::Ty;
use crate::value::{ForeignFunctionData, Function, GlobalData, Value, ValueData, ValueKind};

/// A compilation unit. The context owns the storage; the module owns the
/// membership lists and declaration order.
#[derive(Debug, Default)]
pub struct Module {
    pub name: String,
    functions: Vec<Function>,
    foreign_functions: Vec<Value>,
    globals: Vec<Value>,
    struct_types: Vec<Ty>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    pub fn foreign_functions(&self) -> &[Value] {
        &self.foreign_functions
    }

    pub fn globals(&self) -> &[Value] {
        &self.globals
    }

    pub fn struct_types(&self) -> &[Ty] {
        &self.struct_types
    }

    pub fn add_function(&mut self, ctx: &mut Context, function: Function) {
        function.set_id(ctx, self.functions.len() as u32);
        self.functions.push(function);
    }

    pub fn function_by_name(&self, ctx: &Context, name: &str) -> Option<Function> {
        self.functions.iter().copied().find(|f| f.name(ctx) == name)
    }

    pub fn add_struct_type(&mut self, ty: Ty) {
        self.struct_types.push(ty);
    }

    /// Declares a foreign function: signature and `(slot, index)` address
    /// only, no body.
    pub fn declare_foreign_function(
        &mut self,
        ctx: &mut Context,
        name: impl Into<String>,
        return_ty: Ty,
        param_tys: Vec<Ty>,
        slot: u32,
        index: u32,
        pure_fn: bool,
    ) -> Value {
        debug_assert!(slot < (1 << 11) && index < (1 << 21), "foreign address out of range");
        let ptr = ctx.ptr_ty();
        let value = ctx.alloc_value(ValueData::new(
            ValueKind::ForeignFunction(ForeignFunctionData {
                return_ty,
                param_tys,
                slot,
                index,
                lib_index: 0,
                pure_fn,
            }),
            ptr,
            Some(name.into()),
        ));
        self.foreign_functions.push(value);
        value
    }

    pub fn foreign_by_name(&self, ctx: &Context, name: &str) -> Option<Value> {
        self.foreign_functions
            .iter()
            .copied()
            .find(|&f| ctx.value_name(f) == Some(name))
    }

    /// Declares a global variable. Its value is its address (`ptr`); the
    /// stored object has `value_ty`.
    pub fn add_global(
        &mut self,
        ctx: &mut Context,
        name: impl Into<String>,
        value_ty: Ty,
        initializer: Option<Value>,
        is_const: bool,
    ) -> Value {
        let ptr = ctx.ptr_ty();
        let value = ctx.alloc_value(ValueData::new(
            ValueKind::Global(GlobalData { value_ty, initializer, is_const }),
            ptr,
            Some(name.into()),
        ));
        self.globals.push(value);
        value
    }

    pub fn global_by_name(&self, ctx: &Context, name: &str) -> Option<Value> {
        self.globals.iter().copied().find(|&g| ctx.value_name(g) == Some(name))
    }

    /// Declares (or returns the existing declaration of) a builtin foreign
    /// function with its canonical signature.
    pub fn builtin(&mut self, ctx: &mut Context, builtin: Builtin) -> Value {
        if let Some(existing) = self.foreign_by_name(ctx, builtin.name()) {
            return existing;
        }
        let (return_ty, param_tys) = builtin.signature(ctx);
        self.declare_foreign_function(
            ctx,
            builtin.name(),
            return_ty,
            param_tys,
            Builtin::SLOT,
            builtin.index(),
            builtin.is_pure(),
        )
    }
}

/// Host builtins with reserved `(slot, index)` addresses. Slot 0 is the
/// builtin slot; indices follow this enum's order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    AbsF64,
    SqrtF64,
    PowF64,
    Memcpy,
    Memset,
    Alloc,
    Dealloc,
    PutStr,
    PutI64,
    PutF64,
}

impl Builtin {
    pub const SLOT: u32 = 0;

    pub const ALL: [Builtin; 10] = [
        Builtin::AbsF64,
        Builtin::SqrtF64,
        Builtin::PowF64,
        Builtin::Memcpy,
        Builtin::Memset,
        Builtin::Alloc,
        Builtin::Dealloc,
        Builtin::PutStr,
        Builtin::PutI64,
        Builtin::PutF64,
    ];

    pub fn index(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::AbsF64 => "__builtin_abs_f64",
            Builtin::SqrtF64 => "__builtin_sqrt_f64",
            Builtin::PowF64 => "__builtin_pow_f64",
            Builtin::Memcpy => "__builtin_memcpy",
            Builtin::Memset => "__builtin_memset",
            Builtin::Alloc => "__builtin_alloc",
            Builtin::Dealloc => "__builtin_dealloc",
            Builtin::PutStr => "__builtin_putstr",
            Builtin::PutI64 => "__builtin_puti64",
            Builtin::PutF64 => "__builtin_putf64",
        }
    }

    pub fn from_name(name: &str) -> Option<Builtin> {
        Builtin::ALL.iter().copied().find(|b| b.name() == name)
    }

    /// Deterministic math builtins may be folded at compile time.
    pub fn is_pure(self) -> bool {
        matches!(self, Builtin::AbsF64 | Builtin::SqrtF64 | Builtin::PowF64)
    }

    pub fn signature(self, ctx: &mut Context) -> (Ty, Vec<Ty>) {
        let f64_ty = ctx.float_ty(64);
        let i64_ty = ctx.int_ty(64);
        let ptr = ctx.ptr_ty();
        let void = ctx.void_ty();
        match self {
            Builtin::AbsF64 | Builtin::SqrtF64 => (f64_ty, vec![f64_ty]),
            Builtin::PowF64 => (f64_ty, vec![f64_ty, f64_ty]),
            Builtin::Memcpy => (void, vec![ptr, i64_ty, ptr, i64_ty]),
            Builtin::Memset => (void, vec![ptr, i64_ty, i64_ty]),
            Builtin::Alloc => (ptr, vec![i64_ty, i64_ty]),
            Builtin::Dealloc => (void, vec![ptr, i64_ty, i64_ty]),
            Builtin::PutStr => (void, vec![ptr, i64_ty]),
            Builtin::PutI64 => (void, vec![i64_ty]),
            Builtin::PutF64 => (void, vec![f64_ty]),
        }
    }
}
