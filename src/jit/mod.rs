//! JIT engine: verifies, compiles and links generated functions.
//!
//! Every compilation gets its own `JITModule` holding exactly one exported
//! function. Finished modules are appended to a history that later
//! compilations resolve external symbols against, newest first.

pub mod config;
pub mod function;
pub mod symbols;

pub use config::{JitConfig, OptLevel};
pub use function::{Arg, CompiledFunction};
pub use symbols::SymbolResolver;

use std::sync::Arc;

use cranelift_codegen::isa::OwnedTargetIsa;
use cranelift_codegen::settings::{self, Configurable};
use cranelift_frontend::FunctionBuilderContext;
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{Linkage, Module};
use log::{debug, trace};

use crate::codegen::{self, Shape};
use crate::expr::driver::StatementList;
use crate::expr::CompileError;
use symbols::LinkedModule;

pub struct JitEngine {
    config: JitConfig,
    isa: OwnedTargetIsa,
    resolver: SymbolResolver,
    next_handle: u64,
    fb_ctx: FunctionBuilderContext,
}

impl JitEngine {
    pub fn new() -> Result<Self, CompileError> {
        Self::with_config(JitConfig::default())
    }

    pub fn with_config(config: JitConfig) -> Result<Self, CompileError> {
        let isa = build_isa(&config)?;
        Ok(Self {
            config,
            isa,
            resolver: SymbolResolver::new(),
            next_handle: 0,
            fb_ctx: FunctionBuilderContext::new(),
        })
    }

    pub fn config(&self) -> &JitConfig {
        &self.config
    }

    /// Make `ptr` resolvable by name from generated code.
    pub fn register_symbol(&mut self, name: &str, ptr: *const u8) {
        self.resolver.register(name, ptr);
    }

    /// Address of the newest compiled function exported as `name`.
    pub fn lookup(&self, name: &str) -> Option<*const u8> {
        self.resolver.compiled(name)
    }

    /// Number of linked modules.
    pub fn modules(&self) -> usize {
        self.resolver.modules()
    }

    pub fn compile(
        &mut self,
        list: &StatementList,
        shape: Shape,
    ) -> Result<CompiledFunction, CompileError> {
        let name = format!("jit_expr_fn_{}", self.next_handle);
        self.compile_as(list, shape, &name)
    }

    /// Compile and export the function under `name`. A later module
    /// exporting the same name shadows this one in [`lookup`](Self::lookup).
    pub fn compile_as(
        &mut self,
        list: &StatementList,
        shape: Shape,
        name: &str,
    ) -> Result<CompiledFunction, CompileError> {
        let handle = self.next_handle;

        let mut builder = JITBuilder::with_isa(self.isa.clone(), cranelift_module::default_libcall_names());
        builder.symbol_lookup_fn(self.resolver.lookup_fn());
        let mut module = JITModule::new(builder);
        let mut ctx = module.make_context();

        let imports = codegen::generate(list, shape, &mut ctx.func, &mut self.fb_ctx, &mut module)?;

        // cranelift-jit panics on unresolved imports, so check them first.
        if let Some(missing) = imports.iter().find(|s| self.resolver.resolve(s).is_none()) {
            return Err(CompileError::link(format!(
                "unresolved external symbol: {missing}"
            )));
        }

        if self.config.verify {
            cranelift_codegen::verify_function(&ctx.func, module.isa())
                .map_err(|e| CompileError::codegen(format!("verifier errors:\n{e}")))?;
        }

        let ir = ctx.func.display().to_string();
        trace!("{name} ({shape}):\n{ir}");

        let func_id = module
            .declare_function(name, Linkage::Export, &ctx.func.signature)
            .map_err(|e| CompileError::codegen(format!("declaring {name}: {e}")))?;
        module
            .define_function(func_id, &mut ctx)
            .map_err(|e| CompileError::codegen(format!("defining {name}: {e:?}")))?;
        module.clear_context(&mut ctx);
        module
            .finalize_definitions()
            .map_err(|e| CompileError::link(format!("finalizing {name}: {e}")))?;

        let entry = module.get_finalized_function(func_id);
        let linked = Arc::new(LinkedModule::new(name.to_string(), entry, module));
        self.resolver.push(Arc::clone(&linked));
        self.next_handle += 1;

        debug!(
            "linked {name} as handle {handle}: {shape}, {} output(s), {} input(s), imports {imports:?}",
            list.outputs(),
            list.inputs.len()
        );

        Ok(CompiledFunction {
            name: name.to_string(),
            handle,
            shape,
            outputs: list.outputs(),
            inputs: list.inputs.clone(),
            entry,
            ir: self.config.keep_ir.then_some(ir),
            _module: linked,
        })
    }
}

fn build_isa(config: &JitConfig) -> Result<OwnedTargetIsa, CompileError> {
    let mut flags = settings::builder();
    let setting = |e: settings::SetError| CompileError::codegen(format!("invalid setting: {e}"));
    flags
        .set("opt_level", config.opt_level.as_setting())
        .map_err(setting)?;
    flags
        .set("enable_verifier", if config.verify { "true" } else { "false" })
        .map_err(setting)?;
    flags.set("use_colocated_libcalls", "false").map_err(setting)?;
    flags.set("is_pic", "false").map_err(setting)?;

    let isa_builder = cranelift_native::builder()
        .map_err(|e| CompileError::codegen(format!("host machine is not supported: {e}")))?;
    isa_builder
        .finish(settings::Flags::new(flags))
        .map_err(|e| CompileError::codegen(format!("building target isa: {e}")))
}
