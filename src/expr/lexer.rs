//! Lexer for the expression language.
//!
//! Converts source text into a stream of [`Token`]s.

use super::error::CompileError;
use super::token::{Token, TokenKind};

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    pub fn tokenize(&mut self) -> Result<Vec<Token>, CompileError> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace();

            if self.is_at_end() {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    line: self.line,
                    col: self.col,
                });
                break;
            }

            let ch = self.peek();
            let token = match ch {
                '(' => self.single_char(TokenKind::LParen),
                ')' => self.single_char(TokenKind::RParen),
                '[' => self.single_char(TokenKind::LBracket),
                ']' => self.single_char(TokenKind::RBracket),
                ',' => self.single_char(TokenKind::Comma),
                ';' => self.single_char(TokenKind::Semicolon),
                '+' => self.single_char(TokenKind::Plus),
                '-' => self.single_char(TokenKind::Minus),
                '*' => self.single_char(TokenKind::Star),
                '/' => self.single_char(TokenKind::Slash),
                '^' => self.single_char(TokenKind::Caret),
                '~' => self.single_char(TokenKind::Tilde),
                '<' => self.one_or_two(&[('<', TokenKind::Shl), ('=', TokenKind::LtEq)], TokenKind::Lt),
                '>' => self.one_or_two(&[('>', TokenKind::Shr), ('=', TokenKind::GtEq)], TokenKind::Gt),
                '=' => self.one_or_two(&[('=', TokenKind::EqEq)], TokenKind::Assign),
                '!' => self.one_or_two(&[('=', TokenKind::NotEq)], TokenKind::Bang),
                '&' => self.one_or_two(&[('&', TokenKind::AndAnd)], TokenKind::Amp),
                '|' => self.one_or_two(&[('|', TokenKind::OrOr)], TokenKind::Pipe),
                '"' => self.lex_string()?,
                '$' => self.lex_variable()?,
                '.' if self.peek_next().is_some_and(|c| c.is_ascii_digit()) => self.lex_number()?,
                '0'..='9' => self.lex_number()?,
                'a'..='z' | 'A'..='Z' | '_' => self.lex_ident(),
                _ => {
                    return Err(CompileError::syntax(
                        format!("unexpected character: '{ch}'"),
                        self.line,
                        self.col,
                    ));
                }
            };

            tokens.push(token);
        }

        Ok(tokens)
    }

    fn peek(&self) -> char {
        self.chars[self.pos]
    }

    fn peek_next(&self) -> Option<char> {
        self.chars.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> char {
        let ch = self.chars[self.pos];
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        ch
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn skip_whitespace(&mut self) {
        while !self.is_at_end() && self.peek().is_whitespace() {
            self.advance();
        }
    }

    fn single_char(&mut self, kind: TokenKind) -> Token {
        let line = self.line;
        let col = self.col;
        self.advance();
        Token { kind, line, col }
    }

    /// Lex a one-character operator that may be extended by a second character.
    fn one_or_two(&mut self, pairs: &[(char, TokenKind)], single: TokenKind) -> Token {
        let line = self.line;
        let col = self.col;
        self.advance();
        if let Some(next) = (!self.is_at_end()).then(|| self.peek()) {
            if let Some((_, kind)) = pairs.iter().find(|(c, _)| *c == next) {
                self.advance();
                return Token {
                    kind: kind.clone(),
                    line,
                    col,
                };
            }
        }
        Token {
            kind: single,
            line,
            col,
        }
    }

    fn lex_string(&mut self) -> Result<Token, CompileError> {
        let line = self.line;
        let col = self.col;
        self.advance(); // consume opening '"'
        let mut s = String::new();
        while !self.is_at_end() && self.peek() != '"' {
            s.push(self.advance());
        }
        if self.is_at_end() {
            return Err(CompileError::syntax("unclosed string literal", line, col));
        }
        self.advance(); // consume closing '"'
        Ok(Token {
            kind: TokenKind::Str(s),
            line,
            col,
        })
    }

    /// `$` followed by a kind letter and an optional index. The letter and
    /// index are checked when the variable node is built.
    fn lex_variable(&mut self) -> Result<Token, CompileError> {
        let line = self.line;
        let col = self.col;
        let mut s = String::new();
        s.push(self.advance()); // '$'

        if self.is_at_end() || !self.peek().is_ascii_alphabetic() {
            return Err(CompileError::syntax(
                "malformed variable: expected a kind letter after '$'",
                line,
                col,
            ));
        }

        while !self.is_at_end() && self.peek().is_ascii_alphanumeric() {
            s.push(self.advance());
        }

        Ok(Token {
            kind: TokenKind::Variable(s),
            line,
            col,
        })
    }

    fn lex_number(&mut self) -> Result<Token, CompileError> {
        let line = self.line;
        let col = self.col;
        let mut s = String::new();

        while !self.is_at_end() && self.peek().is_ascii_digit() {
            s.push(self.advance());
        }

        let mut is_float = false;
        if !self.is_at_end() && self.peek() == '.' {
            is_float = true;
            s.push(self.advance());
            while !self.is_at_end() && self.peek().is_ascii_digit() {
                s.push(self.advance());
            }
        }

        if !self.is_at_end() && matches!(self.peek(), 'e' | 'E') {
            is_float = true;
            s.push(self.advance());
            if !self.is_at_end() && matches!(self.peek(), '+' | '-') {
                s.push(self.advance());
            }
            let digits_start = s.len();
            while !self.is_at_end() && self.peek().is_ascii_digit() {
                s.push(self.advance());
            }
            if s.len() == digits_start {
                return Err(CompileError::syntax(
                    format!("malformed number: {s}"),
                    line,
                    col,
                ));
            }
        }

        // `12abc` or `1.5.2`
        if !self.is_at_end() && (self.peek().is_ascii_alphanumeric() || self.peek() == '.') {
            s.push(self.peek());
            return Err(CompileError::syntax(
                format!("malformed number: {s}"),
                line,
                col,
            ));
        }

        let kind = if is_float {
            let val: f32 = s
                .parse()
                .map_err(|_| CompileError::syntax(format!("invalid number: {s}"), line, col))?;
            TokenKind::Number(val)
        } else {
            let val: i64 = s
                .parse()
                .map_err(|_| CompileError::syntax(format!("invalid integer: {s}"), line, col))?;
            TokenKind::Integer(val)
        };

        Ok(Token { kind, line, col })
    }

    fn lex_ident(&mut self) -> Token {
        let line = self.line;
        let col = self.col;
        let mut s = String::new();

        while !self.is_at_end() && (self.peek().is_ascii_alphanumeric() || self.peek() == '_') {
            s.push(self.advance());
        }

        Token {
            kind: TokenKind::Ident(s),
            line,
            col,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::error::ErrorKind;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lex_arithmetic() {
        assert_eq!(
            kinds("$f1 * 2 + $f2"),
            vec![
                TokenKind::Variable("$f1".into()),
                TokenKind::Star,
                TokenKind::Integer(2),
                TokenKind::Plus,
                TokenKind::Variable("$f2".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_two_char_operators() {
        assert_eq!(
            kinds("<< >> <= >= == != && || < > = ! & |"),
            vec![
                TokenKind::Shl,
                TokenKind::Shr,
                TokenKind::LtEq,
                TokenKind::GtEq,
                TokenKind::EqEq,
                TokenKind::NotEq,
                TokenKind::AndAnd,
                TokenKind::OrOr,
                TokenKind::Lt,
                TokenKind::Gt,
                TokenKind::Assign,
                TokenKind::Bang,
                TokenKind::Amp,
                TokenKind::Pipe,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_numbers() {
        assert_eq!(
            kinds("42 4.5 .25 1e3 2.5e-1"),
            vec![
                TokenKind::Integer(42),
                TokenKind::Number(4.5),
                TokenKind::Number(0.25),
                TokenKind::Number(1000.0),
                TokenKind::Number(0.25),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_malformed_numbers() {
        for src in ["1e", "12abc", "1.5.2", "3e+"] {
            let err = Lexer::new(src).tokenize().unwrap_err();
            assert_eq!(err.kind, ErrorKind::Syntax, "{src}");
        }
    }

    #[test]
    fn lex_variables_and_names() {
        assert_eq!(
            kinds("$x $y2[-1] tab[3]"),
            vec![
                TokenKind::Variable("$x".into()),
                TokenKind::Variable("$y2".into()),
                TokenKind::LBracket,
                TokenKind::Minus,
                TokenKind::Integer(1),
                TokenKind::RBracket,
                TokenKind::Ident("tab".into()),
                TokenKind::LBracket,
                TokenKind::Integer(3),
                TokenKind::RBracket,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_bare_dollar_is_error() {
        let err = Lexer::new("1 + $").tokenize().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Syntax);
        assert_eq!(err.col, 5);
    }

    #[test]
    fn lex_string_literal() {
        assert_eq!(
            kinds(r#"size("tab")"#),
            vec![
                TokenKind::Ident("size".into()),
                TokenKind::LParen,
                TokenKind::Str("tab".into()),
                TokenKind::RParen,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_unclosed_string() {
        assert!(Lexer::new("\"abc").tokenize().is_err());
    }

    #[test]
    fn lex_separators() {
        assert_eq!(
            kinds("1, 2; 3"),
            vec![
                TokenKind::Integer(1),
                TokenKind::Comma,
                TokenKind::Integer(2),
                TokenKind::Semicolon,
                TokenKind::Integer(3),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lex_unexpected_character() {
        let err = Lexer::new("1 @ 2").tokenize().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Syntax);
        assert_eq!((err.line, err.col), (1, 3));
    }

    #[test]
    fn lex_line_tracking() {
        let tokens = Lexer::new("1 +\n  2").tokenize().unwrap();
        assert_eq!((tokens[2].line, tokens[2].col), (2, 3));
    }

    #[test]
    fn lex_empty_input() {
        assert_eq!(kinds("   "), vec![TokenKind::Eof]);
    }
}
