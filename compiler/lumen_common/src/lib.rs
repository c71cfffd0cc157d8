//! Shared utilities and error types for the Lumen compiler
//!
//! This crate provides common functionality used across all compiler
//! components:
//! - Error types and handling utilities
//! - Source location tracking for the textual IR
//! - Fixed-width constant arithmetic (`ApInt`, `ApFloat`)

pub mod apfloat;
pub mod apint;
pub mod diagnostics;
pub mod error;
pub mod srcloc;

pub use apfloat::*;
pub use apint::*;
pub use diagnostics::*;
pub use error::*;
pub use srcloc::*;
