//! Calling convention of generated functions.

use std::fmt;
use std::str::FromStr;

use cranelift_codegen::ir::{types, AbiParam, Signature, Type};
use cranelift_codegen::isa::CallConv;

use crate::expr::ast::VarKind;
use crate::runtime::{Symbol, SymbolName};

/// One input slot. Every slot is pointer sized; which field is live is
/// given by the kind of the variable at that position.
#[repr(C)]
#[derive(Clone, Copy)]
pub union InputArg {
    pub flt: f32,
    pub sym: *const SymbolName,
    pub vec: *const f32,
}

impl InputArg {
    pub fn float(v: f32) -> Self {
        // Zero the whole slot first so no byte is left uninitialized.
        let mut arg = InputArg {
            vec: std::ptr::null(),
        };
        arg.flt = v;
        arg
    }

    pub fn symbol(sym: Symbol) -> Self {
        InputArg { sym: sym.as_ptr() }
    }

    pub fn buffer(buf: &[f32]) -> Self {
        InputArg { vec: buf.as_ptr() }
    }
}

impl fmt::Debug for InputArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // SAFETY: every field is plain data, reading the pointer view is
        // always defined.
        write!(f, "InputArg({:p})", unsafe { self.vec })
    }
}

pub const INPUT_SLOT_BYTES: usize = std::mem::size_of::<InputArg>();

pub type ScalarFn = unsafe extern "C" fn(outputs: *const *mut f32, inputs: *const InputArg);
pub type BlockFn =
    unsafe extern "C" fn(outputs: *const *mut f32, inputs: *const InputArg, frames: i32);

/// Execution shape of a generated function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    /// Evaluate every statement once.
    Scalar,
    /// Loop over `frames`, reading whole input vectors.
    Block,
    /// Loop over `frames` with access to input and output history.
    Sample,
}

impl Shape {
    pub fn name(self) -> &'static str {
        match self {
            Shape::Scalar => "scalar",
            Shape::Block => "block",
            Shape::Sample => "sample",
        }
    }

    /// Whether generated code for this shape has a frame loop.
    pub fn is_looped(self) -> bool {
        self != Shape::Scalar
    }

    pub fn accepts(self, kind: VarKind) -> bool {
        match kind {
            VarKind::Float | VarKind::Int | VarKind::Symbol => true,
            VarKind::Vector => self.is_looped(),
            VarKind::Input | VarKind::Output => self == Shape::Sample,
        }
    }

    pub fn signature(self, pointer: Type, call_conv: CallConv) -> Signature {
        let mut sig = Signature::new(call_conv);
        sig.params.push(AbiParam::new(pointer));
        sig.params.push(AbiParam::new(pointer));
        if self.is_looped() {
            sig.params.push(AbiParam::new(types::I32));
        }
        sig
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Shape {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scalar" => Ok(Shape::Scalar),
            "block" => Ok(Shape::Block),
            "sample" => Ok(Shape::Sample),
            other => Err(format!(
                "unknown shape '{other}', expected scalar, block or sample"
            )),
        }
    }
}
