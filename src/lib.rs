//! jit-expr: compiles audio expression statements into native scalar,
//! block and per-sample functions.

pub mod codegen;
pub mod expr;
pub mod jit;
pub mod runtime;

pub use codegen::{InputArg, Shape};
pub use expr::{CompileError, Compiler, ErrorKind};
pub use jit::{Arg, CompiledFunction, JitConfig, JitEngine};
