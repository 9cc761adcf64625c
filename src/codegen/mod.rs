//! Code generation: lowers a validated statement list into one Cranelift
//! function with a [`Shape`]-specific signature.

pub mod abi;
pub mod lower;

pub use abi::{BlockFn, InputArg, ScalarFn, Shape};

use cranelift_codegen::ir::Function;
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_module::Module;

use crate::expr::driver::StatementList;
use crate::expr::CompileError;
use lower::Lowering;

/// Check that every referenced variable kind is available in `shape`.
pub fn check_shape(list: &StatementList, shape: Shape) -> Result<(), CompileError> {
    let mut result = Ok(());
    for root in &list.roots {
        list.ast.for_each_variable(*root, &mut |var| {
            if result.is_ok() && !shape.accepts(var.kind) {
                result = Err(CompileError::codegen(format!(
                    "{var} is not supported by the {shape} shape"
                )));
            }
        });
    }
    result
}

/// Build the body of `func` for `list`. Returns the external symbols the
/// body imports.
pub fn generate<M: Module>(
    list: &StatementList,
    shape: Shape,
    func: &mut Function,
    fb_ctx: &mut FunctionBuilderContext,
    module: &mut M,
) -> Result<Vec<String>, CompileError> {
    check_shape(list, shape)?;

    let pointer = module.target_config().pointer_type();
    func.signature = shape.signature(pointer, module.isa().default_call_conv());

    let mut builder = FunctionBuilder::new(func, fb_ctx);
    match Lowering::new(&mut builder, module, list, shape).lower() {
        Ok(imports) => {
            builder.finalize();
            Ok(imports)
        }
        Err(e) => {
            // A half-built function leaves the builder context dirty.
            drop(builder);
            *fb_ctx = FunctionBuilderContext::new();
            Err(e)
        }
    }
}
