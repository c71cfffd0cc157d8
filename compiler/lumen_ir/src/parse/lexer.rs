//! Textual IR lexer
//!
//! A hand-rolled cursor over the source text. `#` starts a line comment.
//! Identifiers are `%`- or `@`-prefixed; bare words are keywords or type
//! names; numeric literals are decimal or `0x`-hex, with a single `.`
//! making a float literal.

use super::issue::{LexicalIssue, ParseIssue};
use super::token::{Token, TokenKind};
use lumen_common::SourceLocation;

pub struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    loc: SourceLocation,
}

fn punctuation(c: char) -> Option<TokenKind> {
    match c {
        '(' => Some(TokenKind::OpenParen),
        ')' => Some(TokenKind::CloseParen),
        '{' => Some(TokenKind::OpenBrace),
        '}' => Some(TokenKind::CloseBrace),
        '[' => Some(TokenKind::OpenBracket),
        ']' => Some(TokenKind::CloseBracket),
        '=' => Some(TokenKind::Assign),
        ',' => Some(TokenKind::Comma),
        ':' => Some(TokenKind::Colon),
        _ => None,
    }
}

fn keyword(id: &str) -> Option<TokenKind> {
    use TokenKind::*;
    let kind = match id {
        "struct" => Structure,
        "func" => FunctionKw,
        "ext" => Ext,
        "global" => Global,
        "constant" => ConstantKw,
        "void" => Void,
        "ptr" => Ptr,
        "label" => LabelKw,
        "null" => NullLiteral,
        "undef" => UndefLiteral,
        "x" => ArrayOf,
        "alloca" => Alloca,
        "load" => Load,
        "store" => Store,
        "getelementptr" => GetElementPointer,
        "inbounds" => Inbounds,
        "insert_value" => InsertValue,
        "extract_value" => ExtractValue,
        "select" => Select,
        "goto" => Goto,
        "branch" => Branch,
        "return" => Return,
        "call" => Call,
        "phi" => Phi,
        "to" => To,
        "scmp" => SCmp,
        "ucmp" => UCmp,
        "fcmp" => FCmp,
        "bnt" => Bnt,
        "lnt" => Lnt,
        "neg" => Neg,
        "add" => Add,
        "sub" => Sub,
        "mul" => Mul,
        "sdiv" => SDiv,
        "udiv" => UDiv,
        "srem" => SRem,
        "urem" => URem,
        "fadd" => FAdd,
        "fsub" => FSub,
        "fmul" => FMul,
        "fdiv" => FDiv,
        "lshl" => LShL,
        "lshr" => LShR,
        "ashl" => AShL,
        "ashr" => AShR,
        "and" => And,
        "or" => Or,
        "xor" => XOr,
        "zext" => Zext,
        "sext" => Sext,
        "trunc" => Trunc,
        "fext" => Fext,
        "ftrunc" => Ftrunc,
        "utof" => UtoF,
        "stof" => StoF,
        "ftou" => FtoU,
        "ftos" => FtoS,
        "bitcast" => Bitcast,
        "eq" => Equal,
        "neq" => NotEqual,
        "ls" => Less,
        "leq" => LessEq,
        "grt" => Greater,
        "geq" => GreaterEq,
        _ => return None,
    };
    Some(kind)
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self { chars: source.chars().peekable(), loc: SourceLocation::default() }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        self.loc.advance(c);
        Some(c)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn take_while(&mut self, first: Option<char>, mut keep: impl FnMut(char) -> bool) -> String {
        let mut text = String::new();
        if let Some(c) = first {
            text.push(c);
        }
        while let Some(c) = self.peek() {
            if !keep(c) {
                break;
            }
            text.push(c);
            self.bump();
        }
        text
    }

    pub fn next_token(&mut self) -> Result<Token, ParseIssue> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('#') => {
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                _ => break,
            }
        }
        let loc = self.loc;
        let Some(c) = self.peek() else {
            return Ok(Token::new(TokenKind::EndOfFile, "", loc));
        };

        // Prefixed identifiers.
        if c == '%' || c == '@' {
            self.bump();
            let text = self.take_while(None, ident_char);
            let kind = if c == '@' { TokenKind::GlobalIdentifier } else { TokenKind::LocalIdentifier };
            return Ok(Token::new(kind, text, loc));
        }

        // Pointer metadata introducer.
        if c == '!' {
            self.bump();
            let word = self.take_while(None, |c| c.is_ascii_alphanumeric());
            if word == "ptr" {
                return Ok(Token::new(TokenKind::MetaPtr, "!ptr", loc));
            }
            return Err(ParseIssue::Lexical(LexicalIssue { loc }));
        }

        // Numeric literals.
        if c.is_ascii_digit() || c == '-' {
            let first = self.bump();
            let text = self.take_while(first, |c| {
                c.is_ascii_alphanumeric() || c == '.' || c == '_'
            });
            let dots = text.matches('.').count();
            return match dots {
                0 => Ok(Token::new(TokenKind::IntLiteral, text, loc)),
                1 => Ok(Token::new(TokenKind::FloatLiteral, text, loc)),
                _ => Err(ParseIssue::Lexical(LexicalIssue { loc })),
            };
        }

        // String literals.
        if c == '"' {
            self.bump();
            let mut text = String::new();
            loop {
                match self.bump() {
                    None => return Err(ParseIssue::Lexical(LexicalIssue { loc })),
                    Some('"') => break,
                    Some('\\') => match self.bump() {
                        Some('n') => text.push('\n'),
                        Some('t') => text.push('\t'),
                        Some('0') => text.push('\0'),
                        Some('"') => text.push('"'),
                        Some('\\') => text.push('\\'),
                        _ => return Err(ParseIssue::Lexical(LexicalIssue { loc })),
                    },
                    Some(other) => text.push(other),
                }
            }
            return Ok(Token::new(TokenKind::StringLiteral, text, loc));
        }

        if let Some(kind) = punctuation(c) {
            self.bump();
            return Ok(Token::new(kind, c, loc));
        }

        // Keywords and type names.
        if c.is_ascii_alphabetic() || c == '_' {
            let first = self.bump();
            let text = self.take_while(first, ident_char);
            if let Some(kind) = keyword(&text) {
                return Ok(Token::new(kind, text, loc));
            }
            if let Some(width) = scalar_type_width(&text) {
                let kind = if text.starts_with('i') { TokenKind::IntType } else { TokenKind::FloatType };
                return Ok(Token::with_width(kind, text, loc, width));
            }
            return Ok(Token::new(TokenKind::Word, text, loc));
        }

        // Consume the offending character so error recovery makes progress.
        self.bump();
        Err(ParseIssue::Lexical(LexicalIssue { loc }))
    }
}

fn ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

fn scalar_type_width(text: &str) -> Option<u32> {
    let (prefix, digits) = text.split_at(1);
    if !matches!(prefix, "i" | "f") || digits.is_empty() {
        return None;
    }
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(source);
        let mut result = Vec::new();
        loop {
            let token = lexer.next_token().expect("lexes");
            if token.kind == TokenKind::EndOfFile {
                return result;
            }
            result.push(token.kind);
        }
    }

    #[test]
    fn lexes_an_instruction_line() {
        use TokenKind::*;
        assert_eq!(
            kinds("%s = add i64 %a, i64 %b"),
            vec![LocalIdentifier, Assign, Add, IntType, LocalIdentifier, Comma, IntType, LocalIdentifier]
        );
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(kinds("# nothing here\nreturn"), vec![TokenKind::Return]);
    }

    #[test]
    fn negative_and_hex_literals() {
        use TokenKind::*;
        assert_eq!(kinds("-12 0xff 1.5"), vec![IntLiteral, IntLiteral, FloatLiteral]);
    }

    #[test]
    fn two_dots_is_a_lexical_issue() {
        let mut lexer = Lexer::new("1.2.3");
        assert!(lexer.next_token().is_err());
    }

    #[test]
    fn type_tokens_carry_their_width() {
        let mut lexer = Lexer::new("i32");
        let token = lexer.next_token().unwrap();
        assert_eq!(token.kind, TokenKind::IntType);
        assert_eq!(token.width, 32);
    }
}
