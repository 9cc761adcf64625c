//! Token types for the expression lexer.

/// A token produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub col: usize,
}

/// The kind of token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    Integer(i64),
    Number(f32),
    /// A variable sigil as written, e.g. `$f1` or `$x`.
    Variable(String),
    Ident(String),
    /// Body of a double-quoted string.
    Str(String),

    // Delimiters
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Semicolon,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Shl,    // <<
    Shr,    // >>
    EqEq,   // ==
    NotEq,  // !=
    Lt,     // <
    Gt,     // >
    LtEq,   // <=
    GtEq,   // >=
    AndAnd, // &&
    OrOr,   // ||
    Amp,    // &
    Pipe,   // |
    Caret,  // ^
    Tilde,  // ~
    Bang,   // !
    Assign, // =

    Eof,
}

impl TokenKind {
    /// Statement separators at the top level.
    pub fn is_separator(&self) -> bool {
        matches!(self, TokenKind::Comma | TokenKind::Semicolon)
    }
}
