//! Recursive-descent parser for expression statements.
//!
//! Builds nodes directly into an [`Ast`] arena. Each precedence level has
//! its own method, lowest first.

use super::ast::*;
use super::error::CompileError;
use super::token::{Token, TokenKind};

/// Deepest recursion through parentheses, calls, subscripts, unary
/// operators and chained assignments.
pub const MAX_NESTING: usize = 64;

pub struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    ast: &'a mut Ast,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: Vec<Token>, ast: &'a mut Ast) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
            ast,
        }
    }

    /// Parse a separator-delimited statement list, returning one root per
    /// statement.
    pub fn parse(&mut self) -> Result<Vec<NodeId>, CompileError> {
        if self.is_at_end() {
            let t = self.peek();
            return Err(CompileError::syntax("empty expression", t.line, t.col));
        }

        let mut roots = vec![self.parse_assignment()?];
        while self.peek().kind.is_separator() {
            let sep = self.advance().kind.clone();
            // A single trailing ';' is allowed.
            if sep == TokenKind::Semicolon && self.is_at_end() {
                break;
            }
            roots.push(self.parse_assignment()?);
        }

        if !self.is_at_end() {
            let t = self.peek();
            return Err(CompileError::syntax(
                format!("unexpected token: {:?}", t.kind),
                t.line,
                t.col,
            ));
        }

        Ok(roots)
    }

    fn parse_assignment(&mut self) -> Result<NodeId, CompileError> {
        self.nested(Self::parse_assignment_level)
    }

    fn parse_assignment_level(&mut self) -> Result<NodeId, CompileError> {
        let target = self.parse_logical_or()?;
        if !self.check(TokenKind::Assign) {
            return Ok(target);
        }

        let (line, col) = self.position();
        self.advance();
        let value = self.parse_assignment()?;

        match self.ast.kind(target).clone() {
            NodeKind::ValueRead { name } => self
                .ast
                .value_assignment(name, value)
                .map_err(|e| e.at(line, col)),
            NodeKind::Deref { access } => self
                .ast
                .array_assignment(access, value)
                .map_err(|e| e.at(line, col)),
            _ => Err(CompileError::syntax(
                "left side of '=' must be a name or a table cell",
                line,
                col,
            )),
        }
    }

    fn parse_logical_or(&mut self) -> Result<NodeId, CompileError> {
        self.binary_level(
            |kind| matches!(kind, TokenKind::OrOr).then_some(BinaryOp::LogicalOr),
            Self::parse_logical_and,
        )
    }

    fn parse_logical_and(&mut self) -> Result<NodeId, CompileError> {
        self.binary_level(
            |kind| matches!(kind, TokenKind::AndAnd).then_some(BinaryOp::LogicalAnd),
            Self::parse_bit_or,
        )
    }

    fn parse_bit_or(&mut self) -> Result<NodeId, CompileError> {
        self.binary_level(
            |kind| matches!(kind, TokenKind::Pipe).then_some(BinaryOp::BitOr),
            Self::parse_bit_xor,
        )
    }

    fn parse_bit_xor(&mut self) -> Result<NodeId, CompileError> {
        self.binary_level(
            |kind| matches!(kind, TokenKind::Caret).then_some(BinaryOp::BitXor),
            Self::parse_bit_and,
        )
    }

    fn parse_bit_and(&mut self) -> Result<NodeId, CompileError> {
        self.binary_level(
            |kind| matches!(kind, TokenKind::Amp).then_some(BinaryOp::BitAnd),
            Self::parse_equality,
        )
    }

    fn parse_equality(&mut self) -> Result<NodeId, CompileError> {
        self.binary_level(
            |kind| match kind {
                TokenKind::EqEq => Some(BinaryOp::Equal),
                TokenKind::NotEq => Some(BinaryOp::NotEqual),
                _ => None,
            },
            Self::parse_relational,
        )
    }

    fn parse_relational(&mut self) -> Result<NodeId, CompileError> {
        self.binary_level(
            |kind| match kind {
                TokenKind::Lt => Some(BinaryOp::Less),
                TokenKind::Gt => Some(BinaryOp::Greater),
                TokenKind::LtEq => Some(BinaryOp::LessEqual),
                TokenKind::GtEq => Some(BinaryOp::GreaterEqual),
                _ => None,
            },
            Self::parse_shift,
        )
    }

    fn parse_shift(&mut self) -> Result<NodeId, CompileError> {
        self.binary_level(
            |kind| match kind {
                TokenKind::Shl => Some(BinaryOp::ShiftLeft),
                TokenKind::Shr => Some(BinaryOp::ShiftRight),
                _ => None,
            },
            Self::parse_additive,
        )
    }

    fn parse_additive(&mut self) -> Result<NodeId, CompileError> {
        self.binary_level(
            |kind| match kind {
                TokenKind::Plus => Some(BinaryOp::Add),
                TokenKind::Minus => Some(BinaryOp::Subtract),
                _ => None,
            },
            Self::parse_multiplicative,
        )
    }

    fn parse_multiplicative(&mut self) -> Result<NodeId, CompileError> {
        self.binary_level(
            |kind| match kind {
                TokenKind::Star => Some(BinaryOp::Multiply),
                TokenKind::Slash => Some(BinaryOp::Divide),
                _ => None,
            },
            Self::parse_unary,
        )
    }

    /// One left-associative binary precedence level.
    fn binary_level(
        &mut self,
        op_for: impl Fn(&TokenKind) -> Option<BinaryOp>,
        next: fn(&mut Self) -> Result<NodeId, CompileError>,
    ) -> Result<NodeId, CompileError> {
        let mut lhs = next(self)?;
        while let Some(op) = op_for(&self.peek().kind) {
            let (line, col) = self.position();
            self.advance();
            let rhs = next(self)?;
            lhs = self
                .ast
                .binary(op, lhs, rhs)
                .map_err(|e| e.at(line, col))?;
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<NodeId, CompileError> {
        let op = match self.peek().kind {
            TokenKind::Minus => UnaryOp::Negate,
            TokenKind::Tilde => UnaryOp::BitNot,
            TokenKind::Bang => UnaryOp::Not,
            _ => return self.parse_postfix(),
        };
        let (line, col) = self.position();
        self.advance();
        let operand = self.nested(Self::parse_unary)?;
        self.ast.unary(op, operand).map_err(|e| e.at(line, col))
    }

    fn parse_postfix(&mut self) -> Result<NodeId, CompileError> {
        let (line, col) = self.position();
        match self.peek().kind.clone() {
            TokenKind::Ident(name) => {
                self.advance();
                if self.check(TokenKind::LParen) {
                    self.advance();
                    let args = self.parse_args()?;
                    self.ast.call(&name, args).map_err(|e| e.at(line, col))
                } else if self.check(TokenKind::LBracket) {
                    let index = self.parse_subscript()?;
                    let access = self
                        .ast
                        .array_access(TableRef::Named(name), index)
                        .map_err(|e| e.at(line, col))?;
                    self.ast.deref(access).map_err(|e| e.at(line, col))
                } else {
                    Ok(self.ast.value_read(name))
                }
            }
            TokenKind::Variable(text) => {
                self.advance();
                let var = Variable::parse(&text).map_err(|e| e.at(line, col))?;
                let node = self.ast.variable(var);
                if !self.check(TokenKind::LBracket) {
                    return Ok(node);
                }
                let index = self.parse_subscript()?;
                if var.kind.has_history() {
                    self.ast
                        .sample_access(node, index)
                        .map_err(|e| e.at(line, col))
                } else {
                    let access = self
                        .ast
                        .array_access(TableRef::Variable(node), index)
                        .map_err(|e| e.at(line, col))?;
                    self.ast.deref(access).map_err(|e| e.at(line, col))
                }
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<NodeId, CompileError> {
        let t = self.advance().clone();
        match t.kind {
            TokenKind::Integer(v) => Ok(self.ast.int(v)),
            TokenKind::Number(v) => Ok(self.ast.float(v)),
            TokenKind::Str(body) => {
                if body.starts_with('$') {
                    let var = Variable::parse(&body).map_err(|e| e.at(t.line, t.col))?;
                    let node = self.ast.variable(var);
                    self.ast
                        .quoted_variable(node)
                        .map_err(|e| e.at(t.line, t.col))
                } else {
                    Ok(self.ast.quoted_literal(body))
                }
            }
            TokenKind::LParen => {
                let inner = self.parse_assignment()?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::Eof => Err(CompileError::syntax(
                "unexpected end of expression",
                t.line,
                t.col,
            )),
            other => Err(CompileError::syntax(
                format!("unexpected token: {other:?}"),
                t.line,
                t.col,
            )),
        }
    }

    /// Arguments after an opening '(' up to and including the ')'.
    fn parse_args(&mut self) -> Result<Vec<NodeId>, CompileError> {
        let mut args = Vec::new();
        if self.check(TokenKind::RParen) {
            self.advance();
            return Ok(args);
        }
        loop {
            args.push(self.parse_assignment()?);
            if self.check(TokenKind::Comma) {
                self.advance();
                continue;
            }
            self.expect(TokenKind::RParen)?;
            return Ok(args);
        }
    }

    /// `[ expr ]`
    fn parse_subscript(&mut self) -> Result<NodeId, CompileError> {
        self.expect(TokenKind::LBracket)?;
        let index = self.parse_assignment()?;
        self.expect(TokenKind::RBracket)?;
        Ok(index)
    }

    // --- Helpers ---

    /// Run `parse` one nesting level deeper.
    fn nested(
        &mut self,
        parse: fn(&mut Self) -> Result<NodeId, CompileError>,
    ) -> Result<NodeId, CompileError> {
        if self.depth >= MAX_NESTING {
            let (line, col) = self.position();
            return Err(CompileError::syntax("expression nested too deeply", line, col));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn position(&self) -> (usize, usize) {
        let t = self.peek();
        (t.line, t.col)
    }

    fn advance(&mut self) -> &Token {
        let t = &self.tokens[self.pos.min(self.tokens.len() - 1)];
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.tokens.len() || self.peek().kind == TokenKind::Eof
    }

    fn check(&self, kind: TokenKind) -> bool {
        !self.is_at_end()
            && std::mem::discriminant(&self.peek().kind) == std::mem::discriminant(&kind)
    }

    fn expect(&mut self, kind: TokenKind) -> Result<&Token, CompileError> {
        if std::mem::discriminant(&self.peek().kind) == std::mem::discriminant(&kind) {
            Ok(self.advance())
        } else {
            let t = self.peek();
            Err(CompileError::syntax(
                format!("expected {kind:?}, got {:?}", t.kind),
                t.line,
                t.col,
            ))
        }
    }
}
