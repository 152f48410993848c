use crate::{span::Position, types::Fundamental};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // grouping
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,

    // arithmetic
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Percent,

    // logic
    Ampersand,
    Pipe,
    Tilde,
    Bang,

    // comparison
    Greater,
    Less,

    Dot,
    Comma,
    Semicolon,
    Colon,

    // assignment
    Eq,

    // two-character operators
    BangEq,
    EqEq,
    GreaterEq,
    LessEq,
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
    Arrow,       // ->
    DoubleArrow, // =>

    // keywords
    KwLet,
    KwAnd,
    KwOr,
    KwTrue,
    KwFalse,
    KwIf,
    KwElse,
    KwWhile,
    KwLoop,
    KwFor,
    KwReturn,
    KwFn,
    KwDo,
    KwBreak,
    KwContinue,
    KwClass,
    KwPrivate,
    KwPublic,
    KwThis,
    KwEnum,
    KwExternal,
    KwInternal,
    KwGlobal,
    KwMatch,
    KwConst,
    KwI8,
    KwI16,
    KwI32,
    KwI64,
    KwF32,
    KwF64,
    KwBool,
    KwNull,

    // literals and names
    Identifier,
    IntLit,
    FloatLit,
    StringLit,
    CharLit,

    // special
    Eof,
    Error,
}

impl TokenKind {
    pub fn keyword(s: &str) -> Option<TokenKind> {
        match s {
            "let" => Some(TokenKind::KwLet),
            "and" => Some(TokenKind::KwAnd),
            "or" => Some(TokenKind::KwOr),
            "true" => Some(TokenKind::KwTrue),
            "false" => Some(TokenKind::KwFalse),
            "if" => Some(TokenKind::KwIf),
            "else" => Some(TokenKind::KwElse),
            "while" => Some(TokenKind::KwWhile),
            "loop" => Some(TokenKind::KwLoop),
            "for" => Some(TokenKind::KwFor),
            "return" => Some(TokenKind::KwReturn),
            "fn" => Some(TokenKind::KwFn),
            "do" => Some(TokenKind::KwDo),
            "break" => Some(TokenKind::KwBreak),
            "continue" => Some(TokenKind::KwContinue),
            "class" => Some(TokenKind::KwClass),
            "private" => Some(TokenKind::KwPrivate),
            "public" => Some(TokenKind::KwPublic),
            "this" => Some(TokenKind::KwThis),
            "enum" => Some(TokenKind::KwEnum),
            "external" => Some(TokenKind::KwExternal),
            "internal" => Some(TokenKind::KwInternal),
            "global" => Some(TokenKind::KwGlobal),
            "match" => Some(TokenKind::KwMatch),
            "const" => Some(TokenKind::KwConst),
            "i8" => Some(TokenKind::KwI8),
            "i16" => Some(TokenKind::KwI16),
            "i32" => Some(TokenKind::KwI32),
            "i64" => Some(TokenKind::KwI64),
            "f32" => Some(TokenKind::KwF32),
            "f64" => Some(TokenKind::KwF64),
            "bool" => Some(TokenKind::KwBool),
            "null" => Some(TokenKind::KwNull),
            _ => None,
        }
    }

    pub fn is_type_keyword(self) -> bool {
        matches!(
            self,
            TokenKind::KwI8
                | TokenKind::KwI16
                | TokenKind::KwI32
                | TokenKind::KwI64
                | TokenKind::KwF32
                | TokenKind::KwF64
                | TokenKind::KwBool
                | TokenKind::KwNull
        )
    }

    /// Scalar type denoted by a type keyword.
    ///
    /// `i8`, `i16` and `bool` collapse to `i32` for source compatibility.
    // TODO: `f32` and `f64` map to the opposite width here; fix both
    // directions together with float code generation.
    pub fn fundamental(self) -> Option<Fundamental> {
        match self {
            TokenKind::KwI8 | TokenKind::KwI16 | TokenKind::KwI32 | TokenKind::KwBool => {
                Some(Fundamental::I32)
            }
            TokenKind::KwI64 => Some(Fundamental::I64),
            TokenKind::KwF32 => Some(Fundamental::F64),
            TokenKind::KwF64 => Some(Fundamental::F32),
            TokenKind::KwNull => Some(Fundamental::Null),
            _ => None,
        }
    }

    pub fn is_ident_start(c: u8) -> bool {
        c.is_ascii_alphabetic() || c == b'_'
    }

    pub fn is_ident_char(c: u8) -> bool {
        c.is_ascii_alphanumeric() || c == b'_'
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Caret => "^",
            TokenKind::Percent => "%",
            TokenKind::Ampersand => "&",
            TokenKind::Pipe => "|",
            TokenKind::Tilde => "~",
            TokenKind::Bang => "!",
            TokenKind::Greater => ">",
            TokenKind::Less => "<",
            TokenKind::Dot => ".",
            TokenKind::Comma => ",",
            TokenKind::Semicolon => ";",
            TokenKind::Colon => ":",
            TokenKind::Eq => "=",
            TokenKind::BangEq => "!=",
            TokenKind::EqEq => "==",
            TokenKind::GreaterEq => ">=",
            TokenKind::LessEq => "<=",
            TokenKind::PlusEq => "+=",
            TokenKind::MinusEq => "-=",
            TokenKind::StarEq => "*=",
            TokenKind::SlashEq => "/=",
            TokenKind::Arrow => "->",
            TokenKind::DoubleArrow => "=>",
            TokenKind::KwLet => "let",
            TokenKind::KwAnd => "and",
            TokenKind::KwOr => "or",
            TokenKind::KwTrue => "true",
            TokenKind::KwFalse => "false",
            TokenKind::KwIf => "if",
            TokenKind::KwElse => "else",
            TokenKind::KwWhile => "while",
            TokenKind::KwLoop => "loop",
            TokenKind::KwFor => "for",
            TokenKind::KwReturn => "return",
            TokenKind::KwFn => "fn",
            TokenKind::KwDo => "do",
            TokenKind::KwBreak => "break",
            TokenKind::KwContinue => "continue",
            TokenKind::KwClass => "class",
            TokenKind::KwPrivate => "private",
            TokenKind::KwPublic => "public",
            TokenKind::KwThis => "this",
            TokenKind::KwEnum => "enum",
            TokenKind::KwExternal => "external",
            TokenKind::KwInternal => "internal",
            TokenKind::KwGlobal => "global",
            TokenKind::KwMatch => "match",
            TokenKind::KwConst => "const",
            TokenKind::KwI8 => "i8",
            TokenKind::KwI16 => "i16",
            TokenKind::KwI32 => "i32",
            TokenKind::KwI64 => "i64",
            TokenKind::KwF32 => "f32",
            TokenKind::KwF64 => "f64",
            TokenKind::KwBool => "bool",
            TokenKind::KwNull => "null",
            TokenKind::Identifier => "identifier",
            TokenKind::IntLit => "integer literal",
            TokenKind::FloatLit => "float literal",
            TokenKind::StringLit => "string literal",
            TokenKind::CharLit => "character literal",
            TokenKind::Eof => "EOF",
            TokenKind::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// A single lexed token. The lexeme is owned so that semantic analysis
/// can rewrite identifier lexemes to their mangled names in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind:     TokenKind,
    pub lexeme:   String,
    pub position: Position,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: impl Into<String>, position: Position) -> Self {
        Self {
            kind,
            lexeme: lexeme.into(),
            position,
        }
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.lexeme)
    }
}
