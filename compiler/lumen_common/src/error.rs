//! Error handling utilities for the Lumen compiler

use thiserror::Error;

/// The main error type for the Lumen compiler core
#[derive(Error, Debug, Clone)]
pub enum LumenError {
    #[error("IR parse error: {message}")]
    ParseError { message: String },

    #[error("Lowering error: {message}")]
    LoweringError { message: String },

    #[error("Code generation error: {message}")]
    CodegenError { message: String },

    #[error("Assembler error: {message}")]
    AssemblerError { message: String },

    #[error("Invalid IR: {message}")]
    InvalidIr { message: String },
}

/// Result type alias for Lumen compiler operations
pub type LumenResult<T> = Result<T, LumenError>;

impl LumenError {
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::ParseError { message: message.into() }
    }

    pub fn lowering_error(message: impl Into<String>) -> Self {
        Self::LoweringError { message: message.into() }
    }

    pub fn codegen_error(message: impl Into<String>) -> Self {
        Self::CodegenError { message: message.into() }
    }

    pub fn assembler_error(message: impl Into<String>) -> Self {
        Self::AssemblerError { message: message.into() }
    }

    pub fn invalid_ir(message: impl Into<String>) -> Self {
        Self::InvalidIr { message: message.into() }
    }
}
