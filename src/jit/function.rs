//! A linked, callable generated function.

use std::fmt;
use std::sync::Arc;

use super::symbols::LinkedModule;
use crate::codegen::{BlockFn, InputArg, ScalarFn, Shape};
use crate::expr::ast::{VarKind, Variable};
use crate::expr::CompileError;
use crate::runtime::{InputHistory, Symbol};

/// A host-side argument for one input slot.
#[derive(Debug, Clone, Copy)]
pub enum Arg<'a> {
    /// For `$f` and `$i` inputs.
    Float(f32),
    /// For `$s` inputs.
    Symbol(Symbol),
    /// For `$v` inputs (at least `frames` long), or `$x` inputs given as a
    /// raw `2 × frames` history.
    Vector(&'a [f32]),
    /// For `$x` inputs.
    History(&'a InputHistory),
}

impl Arg<'_> {
    fn describe(&self) -> &'static str {
        match self {
            Arg::Float(_) => "a float",
            Arg::Symbol(_) => "a symbol",
            Arg::Vector(_) => "a vector",
            Arg::History(_) => "an input history",
        }
    }
}

impl From<f32> for Arg<'_> {
    fn from(v: f32) -> Self {
        Arg::Float(v)
    }
}

impl From<Symbol> for Arg<'_> {
    fn from(s: Symbol) -> Self {
        Arg::Symbol(s)
    }
}

impl<'a> From<&'a [f32]> for Arg<'a> {
    fn from(v: &'a [f32]) -> Self {
        Arg::Vector(v)
    }
}

impl<'a> From<&'a InputHistory> for Arg<'a> {
    fn from(h: &'a InputHistory) -> Self {
        Arg::History(h)
    }
}

pub struct CompiledFunction {
    pub(crate) name: String,
    pub(crate) handle: u64,
    pub(crate) shape: Shape,
    pub(crate) outputs: usize,
    pub(crate) inputs: Vec<Variable>,
    pub(crate) entry: *const u8,
    pub(crate) ir: Option<String>,
    pub(crate) _module: Arc<LinkedModule>,
}

// SAFETY: `entry` points into code owned by `_module`, which lives as long
// as this value. Generated code keeps no state of its own, so it can be
// called from any thread with separate buffers.
unsafe impl Send for CompiledFunction {}
unsafe impl Sync for CompiledFunction {}

impl CompiledFunction {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> u64 {
        self.handle
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// Number of output channels, one per statement.
    pub fn outputs(&self) -> usize {
        self.outputs
    }

    /// Input layout: position `i` is the variable with index `i`.
    pub fn inputs(&self) -> &[Variable] {
        &self.inputs
    }

    /// Generated IR, when the engine was configured to keep it.
    pub fn ir(&self) -> Option<&str> {
        self.ir.as_deref()
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.entry
    }

    /// Call the generated code directly.
    ///
    /// # Safety
    ///
    /// `outputs` must hold one valid buffer pointer per output and `inputs`
    /// one slot per input, laid out as described by [`inputs`](Self::inputs).
    /// For looped shapes every buffer must be long enough for `frames`
    /// samples (`2 × frames` for input histories).
    pub unsafe fn call(&self, outputs: *const *mut f32, inputs: *const InputArg, frames: i32) {
        match self.shape {
            Shape::Scalar => {
                let f: ScalarFn = std::mem::transmute::<*const u8, ScalarFn>(self.entry);
                f(outputs, inputs)
            }
            Shape::Block | Shape::Sample => {
                let f: BlockFn = std::mem::transmute::<*const u8, BlockFn>(self.entry);
                f(outputs, inputs, frames)
            }
        }
    }

    /// Evaluate a scalar function once.
    pub fn eval(&self, args: &[Arg]) -> Result<Vec<f32>, CompileError> {
        if self.shape != Shape::Scalar {
            return Err(CompileError::argument(format!(
                "{} is a {} function, use process",
                self.name, self.shape
            )));
        }
        let slots = self.pack(args, 0)?;
        let mut values = vec![0.0f32; self.outputs];
        let ptrs: Vec<*mut f32> = values.iter_mut().map(|v| v as *mut f32).collect();

        // SAFETY: one output pointer per statement and `pack` checked the
        // input layout.
        unsafe { self.call(ptrs.as_ptr(), slots.as_ptr(), 0) };
        Ok(values)
    }

    /// Run a block or per-sample function over `frames` frames.
    ///
    /// Block outputs must hold at least `frames` samples. Per-sample
    /// outputs are also the output history and must hold exactly `frames`.
    pub fn process(
        &self,
        outputs: &mut [&mut [f32]],
        args: &[Arg],
        frames: usize,
    ) -> Result<(), CompileError> {
        if self.shape == Shape::Scalar {
            return Err(CompileError::argument(format!(
                "{} is a scalar function, use eval",
                self.name
            )));
        }
        let frame_count = i32::try_from(frames)
            .map_err(|_| CompileError::argument(format!("{frames} frames is too many")))?;
        if outputs.len() != self.outputs {
            return Err(CompileError::argument(format!(
                "{} produces {} output(s), got {} buffer(s)",
                self.name,
                self.outputs,
                outputs.len()
            )));
        }
        for (k, out) in outputs.iter().enumerate() {
            let ok = match self.shape {
                Shape::Sample => out.len() == frames,
                _ => out.len() >= frames,
            };
            if !ok {
                return Err(CompileError::argument(format!(
                    "output {} has {} samples for {frames} frames",
                    k + 1,
                    out.len()
                )));
            }
        }

        let slots = self.pack(args, frames)?;
        let ptrs: Vec<*mut f32> = outputs.iter_mut().map(|o| o.as_mut_ptr()).collect();

        // SAFETY: buffer lengths and the input layout were checked above.
        unsafe { self.call(ptrs.as_ptr(), slots.as_ptr(), frame_count) };
        Ok(())
    }

    /// Check `args` against the input layout and build the slot array.
    fn pack(&self, args: &[Arg], frames: usize) -> Result<Vec<InputArg>, CompileError> {
        if args.len() != self.inputs.len() {
            return Err(CompileError::argument(format!(
                "{} expects {} argument(s), got {}",
                self.name,
                self.inputs.len(),
                args.len()
            )));
        }

        self.inputs
            .iter()
            .zip(args)
            .enumerate()
            .map(|(i, (var, arg))| {
                let slot = match (var.kind, arg) {
                    (VarKind::Float | VarKind::Int, Arg::Float(v)) => Some(InputArg::float(*v)),
                    (VarKind::Symbol, Arg::Symbol(s)) => Some(InputArg::symbol(*s)),
                    (VarKind::Vector, Arg::Vector(buf)) if buf.len() >= frames => {
                        Some(InputArg::buffer(buf))
                    }
                    (VarKind::Input, Arg::Vector(buf)) if buf.len() == frames * 2 => {
                        Some(InputArg::buffer(buf))
                    }
                    (VarKind::Input, Arg::History(h)) if h.frames() == frames => {
                        Some(InputArg::buffer(h.as_slice()))
                    }
                    _ => None,
                };
                slot.ok_or_else(|| {
                    CompileError::argument(format!(
                        "argument {} ({var}) does not accept {} for {frames} frames",
                        i + 1,
                        arg.describe()
                    ))
                })
            })
            .collect()
    }
}

impl fmt::Debug for CompiledFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledFunction")
            .field("name", &self.name)
            .field("handle", &self.handle)
            .field("shape", &self.shape)
            .field("outputs", &self.outputs)
            .field("inputs", &self.inputs)
            .finish()
    }
}
