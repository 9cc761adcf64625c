//! Expression front end (source text → tokens → typed AST → validated
//! statement list) and the [`Compiler`] façade over it and the JIT engine.

pub mod ast;
pub mod driver;
pub mod error;
pub mod functions;
pub mod lexer;
pub mod parser;
pub mod print;
pub mod token;

pub use ast::*;
pub use driver::{Driver, StatementList};
pub use error::{CompileError, ErrorKind};

use crate::codegen::Shape;
use crate::jit::{CompiledFunction, JitConfig, JitEngine};

/// Parses, validates and JIT-compiles expression statements.
pub struct Compiler {
    driver: Driver,
    engine: JitEngine,
}

impl Compiler {
    pub fn new() -> Result<Self, CompileError> {
        Self::with_config(JitConfig::default())
    }

    pub fn with_config(config: JitConfig) -> Result<Self, CompileError> {
        Ok(Self {
            driver: Driver::new(),
            engine: JitEngine::with_config(config)?,
        })
    }

    /// Parse and validate without compiling.
    pub fn parse(&mut self, text: &str) -> Result<StatementList, CompileError> {
        self.driver.parse(text)
    }

    pub fn compile(&mut self, text: &str, shape: Shape) -> Result<CompiledFunction, CompileError> {
        let list = self.driver.parse(text)?;
        self.engine.compile(&list, shape)
    }

    pub fn engine(&self) -> &JitEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut JitEngine {
        &mut self.engine
    }
}
