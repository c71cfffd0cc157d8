//! Typed three-address SSA intermediate representation
//!
//! The IR is owned by a [`Context`]: types and constants are interned
//! there, and every value (parameters, constants, globals, functions,
//! blocks, instructions) lives in its arena. A [`Module`] holds the
//! membership lists of one compilation unit.
//!
//! Construction goes through [`Inst`] constructors or the
//! [`FunctionBuilder`]; [`setup_invariants`] establishes block-level
//! invariants after lowering or parsing, and [`validate`] checks them all.
//! The textual format round-trips through [`print_module`] and
//! [`parse_module`].

pub mod builder;
pub mod context;
pub mod dominance;
pub mod function;
pub mod instruction;
pub mod interp;
pub mod invariant;
pub mod module;
pub mod parse;
pub mod types;
pub mod value;
pub mod write;

pub use builder::FunctionBuilder;
pub use context::Context;
pub use dominance::DominanceInfo;
pub use instruction::{
    ArithmeticOp, CompareMode, CompareOp, Conversion, Inst, InstData, InstOp, MemberIndices,
    PhiMapping, UnaryArithmeticOp,
};
pub use interp::{Execution, Interpreter, RtValue};
pub use invariant::{assert_invariants, setup_invariants, validate, validate_module};
pub use module::{Builtin, Module};
pub use parse::{parse_module, ParseIssue, SemanticReason};
pub use types::{Layout, Ty, TypeData};
pub use value::{
    Block, BlockData, ForeignFunctionData, Function, FunctionData, GlobalData, PointerInfo, Value,
    ValueData, ValueKind,
};
pub use write::{print_function, print_inst, print_module, type_name, value_name};

pub use function::phi_remove_arg;
