//! Decorated AST and symbol table contract
//!
//! The inbound interface of the compiler core: the semantic analyzer
//! produces these structures, the lowerer consumes them. Every typed
//! expression exposes its source type, value category and optional
//! constant; every lifetime-relevant type exposes a lifetime metadata
//! record; the symbol table answers entity and builtin queries.

pub mod ast;
pub mod symbol;
pub mod types;

pub use ast::*;
pub use symbol::*;
pub use types::*;
