//! Parse issues
//!
//! Exactly one diagnostic category per error site: lexical (invalid token),
//! syntactic (wrong token kind) or semantic (wrong referent). A non-empty
//! issue vector means the module must not be used.

use super::token::Token;
use lumen_common::{Diagnostic, SourceLocation};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexicalIssue {
    pub loc: SourceLocation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxIssue {
    pub token: Token,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemanticReason {
    TypeMismatch,
    InvalidType,
    InvalidFfiType,
    InvalidEntity,
    UseOfUndeclaredIdentifier,
    Redeclaration,
    UnexpectedId,
    ExpectedType,
    ExpectedConstantValue,
}

impl fmt::Display for SemanticReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::TypeMismatch => "Type mismatch",
            Self::InvalidType => "Invalid type",
            Self::InvalidFfiType => "Invalid type for foreign function interface",
            Self::InvalidEntity => "Invalid entity",
            Self::UseOfUndeclaredIdentifier => "Use of undeclared identifier",
            Self::Redeclaration => "Redeclaration",
            Self::UnexpectedId => "Unexpected ID",
            Self::ExpectedType => "Expected type",
            Self::ExpectedConstantValue => "Expected value constant",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemanticIssue {
    pub token: Token,
    pub reason: SemanticReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseIssue {
    #[error("Lexical issue: {}", .0.loc)]
    Lexical(LexicalIssue),
    #[error("Syntax issue: {}", .0.token.loc)]
    Syntax(SyntaxIssue),
    #[error("Semantic issue: {}: {}", .0.token.loc, .0.reason)]
    Semantic(SemanticIssue),
}

impl ParseIssue {
    pub fn lexical(loc: SourceLocation) -> Self {
        Self::Lexical(LexicalIssue { loc })
    }

    pub fn syntax(token: Token) -> Self {
        Self::Syntax(SyntaxIssue { token })
    }

    pub fn semantic(token: Token, reason: SemanticReason) -> Self {
        Self::Semantic(SemanticIssue { token, reason })
    }

    pub fn location(&self) -> SourceLocation {
        match self {
            Self::Lexical(issue) => issue.loc,
            Self::Syntax(issue) => issue.token.loc,
            Self::Semantic(issue) => issue.token.loc,
        }
    }
}

impl From<&ParseIssue> for Diagnostic {
    fn from(issue: &ParseIssue) -> Self {
        Diagnostic::error(issue.to_string(), issue.location())
    }
}
