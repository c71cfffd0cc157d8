//! Tokens of the textual IR

use lumen_common::SourceLocation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    GlobalIdentifier,
    LocalIdentifier,
    IntLiteral,
    FloatLiteral,
    StringLiteral,

    OpenParen,
    CloseParen,
    OpenBrace,
    CloseBrace,
    OpenBracket,
    CloseBracket,
    Assign,
    Comma,
    Colon,

    Structure,
    FunctionKw,
    Ext,
    Global,
    ConstantKw,

    Void,
    Ptr,
    LabelKw,
    /// `iN`; the width is carried on the token.
    IntType,
    /// `fN`.
    FloatType,
    /// The `x` of `[N x T]`.
    ArrayOf,

    NullLiteral,
    UndefLiteral,

    Alloca,
    Load,
    Store,
    GetElementPointer,
    Inbounds,
    InsertValue,
    ExtractValue,
    Select,
    Goto,
    Branch,
    Return,
    Call,
    Phi,
    To,

    SCmp,
    UCmp,
    FCmp,
    Bnt,
    Lnt,
    Neg,

    Add,
    Sub,
    Mul,
    SDiv,
    UDiv,
    SRem,
    URem,
    FAdd,
    FSub,
    FMul,
    FDiv,
    LShL,
    LShR,
    AShL,
    AShR,
    And,
    Or,
    XOr,

    Zext,
    Sext,
    Trunc,
    Fext,
    Ftrunc,
    UtoF,
    StoF,
    FtoU,
    FtoS,
    Bitcast,

    Equal,
    NotEqual,
    Less,
    LessEq,
    Greater,
    GreaterEq,

    /// `!ptr`, introducing a pointer metadata record.
    MetaPtr,
    /// A bare word that is not a keyword, e.g. a metadata key.
    Word,

    EndOfFile,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Identifier or literal spelling, without sigils or quotes.
    pub text: String,
    pub loc: SourceLocation,
    /// Bit width for `IntType` / `FloatType` tokens.
    pub width: u32,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, loc: SourceLocation) -> Self {
        Self { kind, text: text.into(), loc, width: 0 }
    }

    pub fn with_width(kind: TokenKind, text: impl Into<String>, loc: SourceLocation, width: u32) -> Self {
        Self { kind, text: text.into(), loc, width }
    }
}
