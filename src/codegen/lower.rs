//! AST → Cranelift IR lowering.
//!
//! Every expression value is an `f32`. Integer semantics (bitwise, shift,
//! comparison and logical operators) truncate operands to `i32`, operate,
//! and convert back.

use std::collections::HashMap;

use cranelift_codegen::ir::condcodes::IntCC;
use cranelift_codegen::ir::{types, AbiParam, FuncRef, InstBuilder, MemFlags, Type, Value};
use cranelift_frontend::FunctionBuilder;
use cranelift_module::{Linkage, Module};

use super::abi::Shape;
use crate::expr::ast::{BinaryOp, NodeId, NodeKind, Quoted, TableRef, UnaryOp, VarKind, Variable};
use crate::expr::driver::StatementList;
use crate::expr::functions::{self, Param};
use crate::expr::CompileError;
use crate::runtime::Symbol;

const TABLE_VALUE_PTR: &str = "jit_expr_table_value_ptr";
const DEREF: &str = "jit_expr_deref";
const VALUE_GET: &str = "jit_expr_value_get";
const VALUE_ASSIGN: &str = "jit_expr_value_assign";
const ARRAY_READ: &str = "jit_expr_array_read";

pub struct Lowering<'a, 'b, M: Module> {
    builder: &'a mut FunctionBuilder<'b>,
    module: &'a mut M,
    list: &'a StatementList,
    shape: Shape,
    pointer: Type,
    /// Preloaded input slots: `f32` for numeric kinds, a pointer otherwise.
    inputs: Vec<Value>,
    /// Output buffer pointers.
    outputs: Vec<Value>,
    frames: Option<Value>,
    /// Loop counter while lowering the loop body.
    frame: Option<Value>,
    imports: HashMap<String, FuncRef>,
    import_order: Vec<String>,
}

impl<'a, 'b, M: Module> Lowering<'a, 'b, M> {
    pub fn new(
        builder: &'a mut FunctionBuilder<'b>,
        module: &'a mut M,
        list: &'a StatementList,
        shape: Shape,
    ) -> Self {
        let pointer = module.target_config().pointer_type();
        Self {
            builder,
            module,
            list,
            shape,
            pointer,
            inputs: Vec::new(),
            outputs: Vec::new(),
            frames: None,
            frame: None,
            imports: HashMap::new(),
            import_order: Vec::new(),
        }
    }

    /// Emit the whole function body. Returns the imported symbol names in
    /// first-use order.
    pub fn lower(mut self) -> Result<Vec<String>, CompileError> {
        let entry = self.builder.create_block();
        self.builder.append_block_params_for_function_params(entry);
        self.builder.switch_to_block(entry);
        self.builder.seal_block(entry);

        let params = self.builder.block_params(entry).to_vec();
        let (outputs_ptr, inputs_ptr) = (params[0], params[1]);
        if self.shape.is_looped() {
            self.frames = params.get(2).copied();
        }

        self.load_inputs(inputs_ptr)?;
        self.load_outputs(outputs_ptr);

        match self.frames {
            None => {
                let list = self.list;
                for (k, root) in list.roots.iter().enumerate() {
                    let value = self.expr(*root)?;
                    let out = self.outputs[k];
                    self.builder.ins().store(MemFlags::trusted(), value, out, 0);
                }
            }
            Some(frames) => self.frame_loop(frames)?,
        }

        self.builder.ins().return_(&[]);
        Ok(self.import_order)
    }

    // --- Function structure ---

    /// Scalar, symbol and buffer inputs are frame invariant, so they are
    /// loaded once in the entry block.
    fn load_inputs(&mut self, inputs_ptr: Value) -> Result<(), CompileError> {
        let slot = self.pointer.bytes() as usize;
        let list = self.list;
        for (i, var) in list.inputs.iter().enumerate() {
            let offset = (i * slot) as i32;
            let value = match var.kind {
                VarKind::Float => {
                    self.builder
                        .ins()
                        .load(types::F32, MemFlags::trusted(), inputs_ptr, offset)
                }
                VarKind::Int => {
                    let raw = self
                        .builder
                        .ins()
                        .load(types::F32, MemFlags::trusted(), inputs_ptr, offset);
                    self.builder.ins().trunc(raw)
                }
                VarKind::Symbol | VarKind::Vector | VarKind::Input => {
                    self.builder
                        .ins()
                        .load(self.pointer, MemFlags::trusted(), inputs_ptr, offset)
                }
                VarKind::Output => {
                    return Err(CompileError::codegen(format!(
                        "{var} cannot be an input"
                    )))
                }
            };
            self.inputs.push(value);
        }
        Ok(())
    }

    fn load_outputs(&mut self, outputs_ptr: Value) {
        let slot = self.pointer.bytes() as i32;
        for k in 0..self.list.outputs() {
            let ptr = self.builder.ins().load(
                self.pointer,
                MemFlags::trusted(),
                outputs_ptr,
                k as i32 * slot,
            );
            self.outputs.push(ptr);
        }
    }

    /// `for i in 0..frames { outputs[k][i] = statement_k }`
    fn frame_loop(&mut self, frames: Value) -> Result<(), CompileError> {
        let header = self.builder.create_block();
        let body = self.builder.create_block();
        let exit = self.builder.create_block();
        let i = self.builder.append_block_param(header, types::I32);

        let zero = self.builder.ins().iconst(types::I32, 0);
        self.builder.ins().jump(header, &[zero]);

        self.builder.switch_to_block(header);
        let more = self.builder.ins().icmp(IntCC::SignedLessThan, i, frames);
        self.builder.ins().brif(more, body, &[], exit, &[]);

        self.builder.switch_to_block(body);
        self.builder.seal_block(body);
        self.frame = Some(i);

        let list = self.list;
        for (k, root) in list.roots.iter().enumerate() {
            let value = self.expr(*root)?;
            let addr = self.frame_addr(self.outputs[k])?;
            self.builder.ins().store(MemFlags::trusted(), value, addr, 0);
        }

        let next = self.builder.ins().iadd_imm(i, 1);
        self.builder.ins().jump(header, &[next]);
        self.builder.seal_block(header);

        self.builder.switch_to_block(exit);
        self.builder.seal_block(exit);
        self.frame = None;
        Ok(())
    }

    // --- Expressions ---

    fn expr(&mut self, id: NodeId) -> Result<Value, CompileError> {
        let list = self.list;
        match list.ast.kind(id) {
            NodeKind::Variable(var) => self.variable(*var),
            NodeKind::Value(lit) => Ok(self.builder.ins().f32const(lit.as_f32())),
            NodeKind::Quoted(_) => Err(CompileError::codegen("string value used as a number")),
            NodeKind::Unary { op, operand } => {
                let v = self.expr(*operand)?;
                Ok(self.unary(*op, v))
            }
            NodeKind::Binary { op, lhs, rhs } => {
                let l = self.expr(*lhs)?;
                let r = self.expr(*rhs)?;
                Ok(self.binary(*op, l, r))
            }
            NodeKind::Call { name, args } => self.call(name, args),
            NodeKind::SampleAccess { var, offset } => {
                let var = list
                    .ast
                    .as_variable(*var)
                    .ok_or_else(|| CompileError::codegen("history access without a variable"))?;
                let offset = self.expr(*offset)?;
                self.history_read(var, offset)
            }
            NodeKind::ArrayAccess { .. } => {
                Err(CompileError::codegen("table cell used without a read"))
            }
            NodeKind::ValueRead { name } => {
                let sym = self.symbol_const(name);
                self.call_helper(VALUE_GET, &[self.pointer], &[sym])
            }
            NodeKind::ValueAssignment { name, value } => {
                let sym = self.symbol_const(name);
                let v = self.expr(*value)?;
                self.call_helper(VALUE_ASSIGN, &[self.pointer, types::F32], &[sym, v])
            }
            NodeKind::ArrayAssignment { access, value } => {
                let (addr, checked) = self.table_cell(*access)?;
                let v = self.expr(*value)?;
                if checked {
                    self.checked_store(v, addr);
                } else {
                    self.builder.ins().store(MemFlags::trusted(), v, addr, 0);
                }
                Ok(v)
            }
            NodeKind::Deref { access } => {
                let (addr, checked) = self.table_cell(*access)?;
                if checked {
                    self.call_helper(DEREF, &[self.pointer], &[addr])
                } else {
                    Ok(self.builder.ins().load(types::F32, MemFlags::trusted(), addr, 0))
                }
            }
        }
    }

    fn variable(&mut self, var: Variable) -> Result<Value, CompileError> {
        match var.kind {
            VarKind::Float | VarKind::Int => Ok(self.inputs[var.index]),
            VarKind::Symbol => Err(CompileError::codegen(format!(
                "symbol variable {var} used as a number"
            ))),
            VarKind::Vector => {
                let addr = self.frame_addr(self.inputs[var.index])?;
                Ok(self.builder.ins().load(types::F32, MemFlags::trusted(), addr, 0))
            }
            VarKind::Input => {
                // Current frame lives in the second half of the history.
                let frames = self.frames()?;
                let i = self.frame()?;
                let pos = self.builder.ins().iadd(frames, i);
                let pos = self.to_pointer_width(pos);
                let bytes = self.builder.ins().imul_imm(pos, 4);
                let addr = self.builder.ins().iadd(self.inputs[var.index], bytes);
                Ok(self.builder.ins().load(types::F32, MemFlags::trusted(), addr, 0))
            }
            VarKind::Output => {
                let previous = self.builder.ins().f32const(-1.0);
                self.history_read(var, previous)
            }
        }
    }

    fn unary(&mut self, op: UnaryOp, v: Value) -> Value {
        match op {
            UnaryOp::Negate => self.builder.ins().fneg(v),
            UnaryOp::BitNot => {
                let i = self.to_int(v);
                let n = self.builder.ins().bnot(i);
                self.int_to_float(n)
            }
            UnaryOp::Not => {
                let i = self.to_int(v);
                let c = self.builder.ins().icmp_imm(IntCC::Equal, i, 0);
                self.bool_to_float(c)
            }
        }
    }

    fn binary(&mut self, op: BinaryOp, l: Value, r: Value) -> Value {
        match op {
            BinaryOp::Add => self.builder.ins().fadd(l, r),
            BinaryOp::Subtract => self.builder.ins().fsub(l, r),
            BinaryOp::Multiply => self.builder.ins().fmul(l, r),
            BinaryOp::Divide => self.builder.ins().fdiv(l, r),
            BinaryOp::ShiftLeft => {
                let (a, b) = self.int_operands(l, r);
                let v = self.builder.ins().ishl(a, b);
                self.int_to_float(v)
            }
            BinaryOp::ShiftRight => {
                let (a, b) = self.int_operands(l, r);
                let v = self.builder.ins().sshr(a, b);
                self.int_to_float(v)
            }
            BinaryOp::Equal => self.compare(IntCC::Equal, l, r),
            BinaryOp::NotEqual => self.compare(IntCC::NotEqual, l, r),
            BinaryOp::Greater => self.compare(IntCC::SignedGreaterThan, l, r),
            BinaryOp::Less => self.compare(IntCC::SignedLessThan, l, r),
            BinaryOp::GreaterEqual => self.compare(IntCC::SignedGreaterThanOrEqual, l, r),
            BinaryOp::LessEqual => self.compare(IntCC::SignedLessThanOrEqual, l, r),
            BinaryOp::LogicalOr | BinaryOp::LogicalAnd => {
                // Both sides are always evaluated.
                let (a, b) = self.int_operands(l, r);
                let a = self.builder.ins().icmp_imm(IntCC::NotEqual, a, 0);
                let b = self.builder.ins().icmp_imm(IntCC::NotEqual, b, 0);
                let c = if op == BinaryOp::LogicalOr {
                    self.builder.ins().bor(a, b)
                } else {
                    self.builder.ins().band(a, b)
                };
                self.bool_to_float(c)
            }
            BinaryOp::BitOr => {
                let (a, b) = self.int_operands(l, r);
                let v = self.builder.ins().bor(a, b);
                self.int_to_float(v)
            }
            BinaryOp::BitAnd => {
                let (a, b) = self.int_operands(l, r);
                let v = self.builder.ins().band(a, b);
                self.int_to_float(v)
            }
            BinaryOp::BitXor => {
                let (a, b) = self.int_operands(l, r);
                let v = self.builder.ins().bxor(a, b);
                self.int_to_float(v)
            }
        }
    }

    fn compare(&mut self, cc: IntCC, l: Value, r: Value) -> Value {
        let (a, b) = self.int_operands(l, r);
        let c = self.builder.ins().icmp(cc, a, b);
        self.bool_to_float(c)
    }

    fn call(&mut self, name: &str, args: &[NodeId]) -> Result<Value, CompileError> {
        match (name, args) {
            ("if", [cond, then, otherwise]) => self.conditional(*cond, *then, *otherwise),
            ("int", [arg]) => {
                let v = self.expr(*arg)?;
                Ok(self.builder.ins().trunc(v))
            }
            ("float", [arg]) => self.expr(*arg),
            _ => {
                let params = functions::signature(name).ok_or_else(|| {
                    CompileError::codegen(format!("function not found with name: {name}"))
                })?;
                let mut values = Vec::with_capacity(args.len());
                let mut param_types = Vec::with_capacity(args.len());
                for (param, arg) in params.iter().zip(args) {
                    match param {
                        Param::Number => {
                            values.push(self.expr(*arg)?);
                            param_types.push(types::F32);
                        }
                        Param::Symbol => {
                            values.push(self.symbol_handle(*arg)?);
                            param_types.push(self.pointer);
                        }
                    }
                }
                self.call_helper(&functions::helper_symbol(name), &param_types, &values)
            }
        }
    }

    /// `if(c, a, b)`: only the taken branch is evaluated.
    fn conditional(
        &mut self,
        cond: NodeId,
        then: NodeId,
        otherwise: NodeId,
    ) -> Result<Value, CompileError> {
        let c = self.expr(cond)?;
        let c = self.to_int(c);

        let then_block = self.builder.create_block();
        let else_block = self.builder.create_block();
        let merge = self.builder.create_block();
        let result = self.builder.append_block_param(merge, types::F32);

        self.builder.ins().brif(c, then_block, &[], else_block, &[]);

        self.builder.switch_to_block(then_block);
        self.builder.seal_block(then_block);
        let a = self.expr(then)?;
        self.builder.ins().jump(merge, &[a]);

        self.builder.switch_to_block(else_block);
        self.builder.seal_block(else_block);
        let b = self.expr(otherwise)?;
        self.builder.ins().jump(merge, &[b]);

        self.builder.switch_to_block(merge);
        self.builder.seal_block(merge);
        Ok(result)
    }

    /// Interpolated read from an input or output history.
    ///
    /// Input history is `[previous | current]` (`2 × frames`), offsets are
    /// clamped to `[-frames, 0]`. Output history is the output buffer
    /// itself, read circularly, with offsets clamped to `[-frames, -1]`.
    fn history_read(&mut self, var: Variable, offset: Value) -> Result<Value, CompileError> {
        let frames = self.frames()?;
        let i = self.frame()?;

        let (base, upper, len) = match var.kind {
            VarKind::Input => {
                let len = self.builder.ins().ishl_imm(frames, 1);
                (self.inputs[var.index], 0.0, len)
            }
            VarKind::Output => (self.outputs[var.index], -1.0, frames),
            _ => {
                return Err(CompileError::codegen(format!(
                    "{var} has no sample history"
                )))
            }
        };

        let n = self.builder.ins().fcvt_from_sint(types::F32, frames);
        let frame = self.builder.ins().fcvt_from_sint(types::F32, i);
        let lower = self.builder.ins().fneg(n);
        let upper = self.builder.ins().f32const(upper);
        let offset = self.builder.ins().fmax(offset, lower);
        let offset = self.builder.ins().fmin(offset, upper);

        let index = self.builder.ins().fadd(n, frame);
        let index = self.builder.ins().fadd(index, offset);

        self.call_helper(
            ARRAY_READ,
            &[self.pointer, types::F32, types::I32],
            &[base, index, len],
        )
    }

    // --- Tables and symbols ---

    /// Address of a table cell, and whether it may be null.
    fn table_cell(&mut self, access: NodeId) -> Result<(Value, bool), CompileError> {
        let list = self.list;
        let (table, index) = match list.ast.kind(access) {
            NodeKind::ArrayAccess { table, index } => (table, *index),
            _ => return Err(CompileError::codegen("expected a table access")),
        };

        let sym = match table {
            TableRef::Named(name) => self.symbol_const(name),
            TableRef::Variable(var) => {
                let var = list
                    .ast
                    .as_variable(*var)
                    .ok_or_else(|| CompileError::codegen("table variable is not a variable"))?;
                match var.kind {
                    VarKind::Symbol => self.inputs[var.index],
                    VarKind::Vector => {
                        let idx = self.expr(index)?;
                        let addr = self.vector_cell(self.inputs[var.index], idx)?;
                        return Ok((addr, false));
                    }
                    _ => {
                        return Err(CompileError::codegen(format!(
                            "{var} cannot be indexed"
                        )))
                    }
                }
            }
        };

        let idx = self.expr(index)?;
        let ptr = self.call_import(
            TABLE_VALUE_PTR,
            &[self.pointer, types::F32],
            self.pointer,
            &[sym, idx],
        )?;
        Ok((ptr, true))
    }

    /// `base + clamp(int(index), 0, frames - 1)`
    fn vector_cell(&mut self, base: Value, index: Value) -> Result<Value, CompileError> {
        let frames = self.frames()?;
        let i = self.to_int(index);
        let zero = self.builder.ins().iconst(types::I32, 0);
        let last = self.builder.ins().iadd_imm(frames, -1);
        let i = self.builder.ins().smax(i, zero);
        let i = self.builder.ins().smin(i, last);
        let i = self.to_pointer_width(i);
        let bytes = self.builder.ins().imul_imm(i, 4);
        Ok(self.builder.ins().iadd(base, bytes))
    }

    fn checked_store(&mut self, value: Value, addr: Value) {
        let store_block = self.builder.create_block();
        let done = self.builder.create_block();
        let is_null = self.builder.ins().icmp_imm(IntCC::Equal, addr, 0);
        self.builder.ins().brif(is_null, done, &[], store_block, &[]);

        self.builder.switch_to_block(store_block);
        self.builder.seal_block(store_block);
        self.builder.ins().store(MemFlags::trusted(), value, addr, 0);
        self.builder.ins().jump(done, &[]);

        self.builder.switch_to_block(done);
        self.builder.seal_block(done);
    }

    fn symbol_handle(&mut self, id: NodeId) -> Result<Value, CompileError> {
        let list = self.list;
        match list.ast.kind(id) {
            NodeKind::Quoted(Quoted::Literal(text)) => Ok(self.symbol_const(text)),
            NodeKind::Quoted(Quoted::Variable(var)) => match list.ast.as_variable(*var) {
                Some(v) if v.kind == VarKind::Symbol => Ok(self.inputs[v.index]),
                _ => Err(CompileError::codegen("quoted variable is not a symbol")),
            },
            _ => Err(CompileError::codegen("expected a symbol argument")),
        }
    }

    /// Interned symbols never move, so the handle is a constant.
    fn symbol_const(&mut self, name: &str) -> Value {
        let ptr = Symbol::intern(name).as_ptr() as i64;
        self.builder.ins().iconst(self.pointer, ptr)
    }

    // --- Helpers ---

    fn import(&mut self, name: &str, params: &[Type], ret: Type) -> Result<FuncRef, CompileError> {
        if let Some(func) = self.imports.get(name) {
            return Ok(*func);
        }
        let mut sig = self.module.make_signature();
        sig.params
            .extend(params.iter().map(|ty| AbiParam::new(*ty)));
        sig.returns.push(AbiParam::new(ret));

        let id = self
            .module
            .declare_function(name, Linkage::Import, &sig)
            .map_err(|e| CompileError::codegen(format!("declaring {name}: {e}")))?;
        let func = self.module.declare_func_in_func(id, self.builder.func);
        self.imports.insert(name.to_string(), func);
        self.import_order.push(name.to_string());
        Ok(func)
    }

    fn call_helper(
        &mut self,
        name: &str,
        params: &[Type],
        args: &[Value],
    ) -> Result<Value, CompileError> {
        self.call_import(name, params, types::F32, args)
    }

    fn call_import(
        &mut self,
        name: &str,
        params: &[Type],
        ret: Type,
        args: &[Value],
    ) -> Result<Value, CompileError> {
        let func = self.import(name, params, ret)?;
        let call = self.builder.ins().call(func, args);
        Ok(self.builder.inst_results(call)[0])
    }

    fn frames(&self) -> Result<Value, CompileError> {
        self.frames.ok_or_else(|| {
            CompileError::codegen(format!(
                "per-frame access is not available in the {} shape",
                self.shape
            ))
        })
    }

    fn frame(&self) -> Result<Value, CompileError> {
        self.frame
            .ok_or_else(|| CompileError::codegen("per-frame access outside the frame loop"))
    }

    fn frame_addr(&mut self, base: Value) -> Result<Value, CompileError> {
        let i = self.frame()?;
        let i = self.to_pointer_width(i);
        let bytes = self.builder.ins().imul_imm(i, 4);
        Ok(self.builder.ins().iadd(base, bytes))
    }

    fn to_pointer_width(&mut self, v: Value) -> Value {
        if self.pointer == types::I32 {
            v
        } else {
            self.builder.ins().sextend(self.pointer, v)
        }
    }

    fn to_int(&mut self, v: Value) -> Value {
        self.builder.ins().fcvt_to_sint_sat(types::I32, v)
    }

    fn int_operands(&mut self, l: Value, r: Value) -> (Value, Value) {
        (self.to_int(l), self.to_int(r))
    }

    fn int_to_float(&mut self, v: Value) -> Value {
        self.builder.ins().fcvt_from_sint(types::F32, v)
    }

    fn bool_to_float(&mut self, c: Value) -> Value {
        let one = self.builder.ins().f32const(1.0);
        let zero = self.builder.ins().f32const(0.0);
        self.builder.ins().select(c, one, zero)
    }
}
