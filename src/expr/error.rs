//! Error types for the expression compiler.

use std::fmt;

/// An error that occurred while parsing, validating, generating or linking
/// an expression.
#[derive(Debug, Clone)]
pub struct CompileError {
    pub message: String,
    pub line: usize,
    pub col: usize,
    pub kind: ErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed token or grammar.
    Syntax,
    /// Well-formed but ill-typed: unknown function, arity/type mismatch,
    /// bad variable sigil, quoting a non-symbol.
    Semantic,
    /// Inconsistent input variable layout across the statement list.
    Validation,
    /// Lowering to native code failed.
    Codegen,
    /// An external symbol could not be resolved, or finalization failed.
    Link,
    /// A compiled function was invoked with arguments that do not match
    /// its input layout.
    Argument,
}

impl CompileError {
    fn new(kind: ErrorKind, message: impl Into<String>, line: usize, col: usize) -> Self {
        Self {
            message: message.into(),
            line,
            col,
            kind,
        }
    }

    pub fn syntax(message: impl Into<String>, line: usize, col: usize) -> Self {
        Self::new(ErrorKind::Syntax, message, line, col)
    }

    pub fn semantic(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Semantic, message, 0, 0)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message, 0, 0)
    }

    pub fn codegen(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Codegen, message, 0, 0)
    }

    pub fn link(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Link, message, 0, 0)
    }

    pub fn argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Argument, message, 0, 0)
    }

    /// Attach a source position, keeping an existing one.
    pub fn at(mut self, line: usize, col: usize) -> Self {
        if self.line == 0 {
            self.line = line;
            self.col = col;
        }
        self
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line > 0 {
            write!(
                f,
                "[{}:{}] {:?}: {}",
                self.line, self.col, self.kind, self.message
            )
        } else {
            write!(f, "{:?}: {}", self.kind, self.message)
        }
    }
}

impl std::error::Error for CompileError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_with_position() {
        let err = CompileError::syntax("unexpected ')'", 1, 7);
        assert_eq!(err.to_string(), "[1:7] Syntax: unexpected ')'");
    }

    #[test]
    fn display_without_position() {
        let err = CompileError::validation("missing an input variable at index 2");
        assert_eq!(
            err.to_string(),
            "Validation: missing an input variable at index 2"
        );
    }

    #[test]
    fn at_keeps_first_position() {
        let err = CompileError::semantic("bad").at(1, 4).at(1, 9);
        assert_eq!((err.line, err.col), (1, 4));
        assert_eq!(err.kind, ErrorKind::Semantic);
    }
}
