//! Lowering from the decorated AST to SSA IR
//!
//! The builder converts a decorated AST into SSA IR while preserving
//! source semantics: value categories, reference lifetimes, calling
//! conventions and in-place construction of non-trivial aggregates. The
//! value model is the `Atom`/`LowerValue` pair: each expression lowers to
//! one or two (IR value, location) atoms with a packed/unpacked
//! representation flag.

pub mod cc;
pub mod lower;
pub mod value;

pub use cc::{compute_cc, CallingConvention, PassingConvention, PREFERRED_REGISTER_SIZE};
pub use lower::lower_program;
pub use value::{Atom, LowerValue, Representation, ValueLocation};
