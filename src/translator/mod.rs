//! Opcode Dispatcher: walks one function body's operator stream and calls into
//! the per-class lowering modules, threading the active `LoweringStrategy`
//! through every memory, constant, and call-indirect site.

pub mod calls;
pub mod consts;
pub mod control;
pub mod memory;
pub mod numeric;

use crate::env::LoweringStrategy;
use crate::error::Error;
use crate::function::FuncContext;
use crate::types::ValType;
use inkwell::context::Context;
use inkwell::module::Module as LlvmModule;
use numeric::{FloatBinOp, FloatCmpOp, IntBinOp, IntCmpOp};
use wasmparser::Operator as Op;

/// Translates a single function body, already positioned at the entry block by
/// `FuncContext::new`, into the function's IR. `result_types` is the Wasm
/// function's declared result signature for the implicit function-level frame.
pub fn translate_function<'ctx, 'a>(
    fcx: &mut FuncContext<'_, 'ctx>,
    ctx: &'ctx Context,
    llvm_module: &LlvmModule<'ctx>,
    strategy: &dyn LoweringStrategy,
    mut reader: wasmparser::OperatorsReader<'a>,
    result_types: Vec<ValType>,
) -> Result<(), Error> {
    fcx.enter_function_frame(result_types.clone());

    while !reader.eof() {
        let relative_offset = reader.original_position() as u32;
        let op = reader.read()?;
        // The function body's closing `end` terminates the implicit outermost
        // frame; it is handled by `finish_return_block` rather than the generic
        // block/loop/if `end` lowering, since it must build the `ret`, not a phi
        // feeding back onto the operand stack.
        if matches!(op, Op::End) && fcx.stack.frame_depth() == 1 {
            if !fcx.unreachable {
                let n = result_types.len();
                let values: Vec<_> = fcx.stack.top_n(n).iter().map(|e| e.value).collect();
                let current_block = fcx.builder.get_insert_block().unwrap();
                fcx.stack.current_frame_mut().record_incoming(&values, current_block);
                fcx.builder.build_unconditional_branch(fcx.return_block);
            }
            continue;
        }
        translate_operator(fcx, ctx, llvm_module, strategy, op, relative_offset as u32)?;
    }

    finish_return_block(fcx, ctx, &result_types)?;
    Ok(())
}

/// Builds the shared return block: loads the phi-merged function-frame results
/// (recorded by every `return`/fallthrough site) and emits the IR `ret`, storing
/// results beyond the first into their out-parameter slots first.
fn finish_return_block<'ctx>(
    fcx: &mut FuncContext<'_, 'ctx>,
    ctx: &'ctx Context,
    result_types: &[ValType],
) -> Result<(), Error> {
    let frame = fcx.stack.exit_frame();
    fcx.builder.position_at_end(fcx.return_block);

    let mut values = Vec::with_capacity(result_types.len());
    for (slot, ty) in result_types.iter().enumerate() {
        let incoming = &frame.incoming[slot];
        if incoming.is_empty() {
            values.push(zero_for(ctx, *ty, fcx.sandboxed));
            continue;
        }
        let llvm_ty = crate::types::lower(ctx, *ty, fcx.sandboxed);
        let phi = fcx.builder.build_phi(llvm_ty, "ret_merge");
        for inc in incoming {
            phi.add_incoming(&[(&inc.value as &dyn inkwell::values::BasicValue, inc.block)]);
        }
        values.push(phi.as_basic_value());
    }

    for (slot, ty) in result_types.iter().enumerate().skip(1) {
        let _ = ty;
        if let Some(out_ptr) = fcx.extra_result_slots.get(slot - 1) {
            fcx.builder.build_store(*out_ptr, values[slot]);
        }
    }

    match values.first() {
        None => {
            fcx.builder.build_return(None);
        }
        Some(v) => {
            fcx.builder.build_return(Some(v));
        }
    }
    Ok(())
}

fn zero_for<'ctx>(ctx: &'ctx Context, ty: ValType, sandboxed: bool) -> inkwell::values::BasicValueEnum<'ctx> {
    crate::types::lower(ctx, ty, sandboxed)
        .const_zero_value()
}

trait ConstZero<'ctx> {
    fn const_zero_value(&self) -> inkwell::values::BasicValueEnum<'ctx>;
}

impl<'ctx> ConstZero<'ctx> for inkwell::types::BasicTypeEnum<'ctx> {
    fn const_zero_value(&self) -> inkwell::values::BasicValueEnum<'ctx> {
        use inkwell::types::BasicTypeEnum::*;
        match self {
            IntType(t) => t.const_zero().into(),
            FloatType(t) => t.const_zero().into(),
            PointerType(t) => t.const_null().into(),
            ArrayType(t) => t.const_zero().into(),
            StructType(t) => t.const_zero().into(),
            VectorType(t) => t.const_zero().into(),
        }
    }
}

fn translate_operator<'ctx>(
    fcx: &mut FuncContext<'_, 'ctx>,
    ctx: &'ctx Context,
    llvm_module: &LlvmModule<'ctx>,
    strategy: &dyn LoweringStrategy,
    op: Op,
    code_offset: u32,
) -> Result<(), Error> {
    use control::*;

    match op {
        // --- Control flow ---
        Op::Block { ty } => translate_block(fcx, ctx, resolve_block_type(fcx.decls, ty)?),
        Op::Loop { ty } => translate_loop(fcx, ctx, resolve_block_type(fcx.decls, ty)?),
        Op::If { ty } => translate_if(fcx, ctx, resolve_block_type(fcx.decls, ty)?),
        Op::Else => translate_else(fcx, ctx),
        Op::End => translate_end(fcx, ctx),
        Op::Br { relative_depth } => translate_br(fcx, relative_depth),
        Op::BrIf { relative_depth } => translate_br_if(fcx, ctx, relative_depth),
        Op::BrTable { table } => {
            let default = table.default();
            let targets: Result<Vec<u32>, _> = table.targets().collect();
            let targets = targets.map_err(Error::from)?;
            translate_br_table(fcx, ctx, &targets, default)
        }
        Op::Return => translate_return(fcx),
        Op::Unreachable => translate_unreachable(fcx, ctx, code_offset),
        Op::Nop => Ok(()),
        Op::Drop => {
            translate_drop(fcx);
            Ok(())
        }
        Op::Select => translate_select(fcx),

        // --- Locals/globals ---
        Op::LocalGet { local_index } => {
            if !fcx.unreachable {
                let ptr = fcx.locals[local_index as usize];
                let ty = fcx.local_types[local_index as usize];
                let v = fcx.builder.build_load(ptr, "local_get");
                fcx.stack.push(v, ty);
            }
            Ok(())
        }
        Op::LocalSet { local_index } => {
            if !fcx.unreachable {
                let v = fcx.stack.pop();
                fcx.builder.build_store(fcx.locals[local_index as usize], v.value);
            }
            Ok(())
        }
        Op::LocalTee { local_index } => {
            if !fcx.unreachable {
                let v = *fcx.stack.peek();
                fcx.builder.build_store(fcx.locals[local_index as usize], v.value);
            }
            Ok(())
        }
        Op::GlobalGet { global_index } => {
            if !fcx.unreachable {
                memory::translate_global_get(fcx, ctx, llvm_module, global_index)?;
            }
            Ok(())
        }
        Op::GlobalSet { global_index } => {
            if !fcx.unreachable {
                memory::translate_global_set(fcx, ctx, llvm_module, global_index, code_offset)?;
            }
            Ok(())
        }

        // --- Constants ---
        Op::I32Const { value } => {
            if !fcx.unreachable {
                consts::i32_const(fcx, ctx, value);
            }
            Ok(())
        }
        Op::I64Const { value } => {
            if !fcx.unreachable {
                consts::i64_const(fcx, ctx, strategy, value, code_offset)?;
            }
            Ok(())
        }
        Op::F32Const { value } => {
            if !fcx.unreachable {
                consts::f32_const(fcx, ctx, value.bits());
            }
            Ok(())
        }
        Op::F64Const { value } => {
            if !fcx.unreachable {
                consts::f64_const(fcx, ctx, value.bits());
            }
            Ok(())
        }

        // --- Calls ---
        Op::Call { function_index } => {
            if !fcx.unreachable {
                calls::translate_call(fcx, ctx, llvm_module, function_index, code_offset)?;
            }
            Ok(())
        }
        Op::CallIndirect { index, table_index } => {
            if !fcx.unreachable {
                calls::translate_call_indirect(fcx, ctx, strategy, index, table_index, code_offset)?;
            }
            Ok(())
        }

        // --- Memory ---
        Op::I32Load { memarg } => load(fcx, ctx, strategy, ValType::I32, memarg, code_offset),
        Op::I64Load { memarg } => load(fcx, ctx, strategy, ValType::I64, memarg, code_offset),
        Op::F32Load { memarg } => load(fcx, ctx, strategy, ValType::F32, memarg, code_offset),
        Op::F64Load { memarg } => load(fcx, ctx, strategy, ValType::F64, memarg, code_offset),
        Op::I32Store { memarg } => store(fcx, ctx, strategy, ValType::I32, memarg, code_offset),
        Op::I64Store { memarg } => store(fcx, ctx, strategy, ValType::I64, memarg, code_offset),
        Op::F32Store { memarg } => store(fcx, ctx, strategy, ValType::F32, memarg, code_offset),
        Op::F64Store { memarg } => store(fcx, ctx, strategy, ValType::F64, memarg, code_offset),
        Op::MemorySize { .. } => {
            if !fcx.unreachable {
                memory::translate_memory_size(fcx, ctx, llvm_module, strategy)?;
            }
            Ok(())
        }
        Op::MemoryGrow { .. } => {
            if !fcx.unreachable {
                memory::translate_memory_grow(fcx, ctx, llvm_module, strategy)?;
            }
            Ok(())
        }

        // --- Numeric ---
        Op::I32Add => int_binop(fcx, ctx, IntBinOp::Add, ValType::I32, code_offset),
        Op::I32Sub => int_binop(fcx, ctx, IntBinOp::Sub, ValType::I32, code_offset),
        Op::I32Mul => int_binop(fcx, ctx, IntBinOp::Mul, ValType::I32, code_offset),
        Op::I32DivS => int_binop(fcx, ctx, IntBinOp::DivS, ValType::I32, code_offset),
        Op::I32DivU => int_binop(fcx, ctx, IntBinOp::DivU, ValType::I32, code_offset),
        Op::I32RemS => int_binop(fcx, ctx, IntBinOp::RemS, ValType::I32, code_offset),
        Op::I32RemU => int_binop(fcx, ctx, IntBinOp::RemU, ValType::I32, code_offset),
        Op::I32And => int_binop(fcx, ctx, IntBinOp::And, ValType::I32, code_offset),
        Op::I32Or => int_binop(fcx, ctx, IntBinOp::Or, ValType::I32, code_offset),
        Op::I32Xor => int_binop(fcx, ctx, IntBinOp::Xor, ValType::I32, code_offset),
        Op::I32Shl => int_binop(fcx, ctx, IntBinOp::Shl, ValType::I32, code_offset),
        Op::I32ShrS => int_binop(fcx, ctx, IntBinOp::ShrS, ValType::I32, code_offset),
        Op::I32ShrU => int_binop(fcx, ctx, IntBinOp::ShrU, ValType::I32, code_offset),
        Op::I32Rotl => int_binop(fcx, ctx, IntBinOp::Rotl, ValType::I32, code_offset),
        Op::I32Rotr => int_binop(fcx, ctx, IntBinOp::Rotr, ValType::I32, code_offset),
        Op::I64Add => int_binop(fcx, ctx, IntBinOp::Add, ValType::I64, code_offset),
        Op::I64Sub => int_binop(fcx, ctx, IntBinOp::Sub, ValType::I64, code_offset),
        Op::I64Mul => int_binop(fcx, ctx, IntBinOp::Mul, ValType::I64, code_offset),
        Op::I64DivS => int_binop(fcx, ctx, IntBinOp::DivS, ValType::I64, code_offset),
        Op::I64DivU => int_binop(fcx, ctx, IntBinOp::DivU, ValType::I64, code_offset),
        Op::I64RemS => int_binop(fcx, ctx, IntBinOp::RemS, ValType::I64, code_offset),
        Op::I64RemU => int_binop(fcx, ctx, IntBinOp::RemU, ValType::I64, code_offset),
        Op::I64And => int_binop(fcx, ctx, IntBinOp::And, ValType::I64, code_offset),
        Op::I64Or => int_binop(fcx, ctx, IntBinOp::Or, ValType::I64, code_offset),
        Op::I64Xor => int_binop(fcx, ctx, IntBinOp::Xor, ValType::I64, code_offset),
        Op::I64Shl => int_binop(fcx, ctx, IntBinOp::Shl, ValType::I64, code_offset),
        Op::I64ShrS => int_binop(fcx, ctx, IntBinOp::ShrS, ValType::I64, code_offset),
        Op::I64ShrU => int_binop(fcx, ctx, IntBinOp::ShrU, ValType::I64, code_offset),
        Op::I64Rotl => int_binop(fcx, ctx, IntBinOp::Rotl, ValType::I64, code_offset),
        Op::I64Rotr => int_binop(fcx, ctx, IntBinOp::Rotr, ValType::I64, code_offset),

        Op::I32Clz => int_unop(fcx, ctx, llvm_module, true, ValType::I32),
        Op::I32Ctz => int_unop(fcx, ctx, llvm_module, false, ValType::I32),
        Op::I32Popcnt => popcnt(fcx, ctx, llvm_module, ValType::I32),
        Op::I64Clz => int_unop(fcx, ctx, llvm_module, true, ValType::I64),
        Op::I64Ctz => int_unop(fcx, ctx, llvm_module, false, ValType::I64),
        Op::I64Popcnt => popcnt(fcx, ctx, llvm_module, ValType::I64),

        Op::I32Eqz => int_cmp(fcx, ctx, IntCmpOp::Eqz),
        Op::I32Eq => int_cmp(fcx, ctx, IntCmpOp::Eq),
        Op::I32Ne => int_cmp(fcx, ctx, IntCmpOp::Ne),
        Op::I32LtS => int_cmp(fcx, ctx, IntCmpOp::LtS),
        Op::I32LtU => int_cmp(fcx, ctx, IntCmpOp::LtU),
        Op::I32GtS => int_cmp(fcx, ctx, IntCmpOp::GtS),
        Op::I32GtU => int_cmp(fcx, ctx, IntCmpOp::GtU),
        Op::I32LeS => int_cmp(fcx, ctx, IntCmpOp::LeS),
        Op::I32LeU => int_cmp(fcx, ctx, IntCmpOp::LeU),
        Op::I32GeS => int_cmp(fcx, ctx, IntCmpOp::GeS),
        Op::I32GeU => int_cmp(fcx, ctx, IntCmpOp::GeU),
        Op::I64Eqz => int_cmp(fcx, ctx, IntCmpOp::Eqz),
        Op::I64Eq => int_cmp(fcx, ctx, IntCmpOp::Eq),
        Op::I64Ne => int_cmp(fcx, ctx, IntCmpOp::Ne),
        Op::I64LtS => int_cmp(fcx, ctx, IntCmpOp::LtS),
        Op::I64LtU => int_cmp(fcx, ctx, IntCmpOp::LtU),
        Op::I64GtS => int_cmp(fcx, ctx, IntCmpOp::GtS),
        Op::I64GtU => int_cmp(fcx, ctx, IntCmpOp::GtU),
        Op::I64LeS => int_cmp(fcx, ctx, IntCmpOp::LeS),
        Op::I64LeU => int_cmp(fcx, ctx, IntCmpOp::LeU),
        Op::I64GeS => int_cmp(fcx, ctx, IntCmpOp::GeS),
        Op::I64GeU => int_cmp(fcx, ctx, IntCmpOp::GeU),

        Op::F32Add => float_binop(fcx, FloatBinOp::Add, ValType::F32),
        Op::F32Sub => float_binop(fcx, FloatBinOp::Sub, ValType::F32),
        Op::F32Mul => float_binop(fcx, FloatBinOp::Mul, ValType::F32),
        Op::F32Div => float_binop(fcx, FloatBinOp::Div, ValType::F32),
        Op::F32Min => float_binop(fcx, FloatBinOp::Min, ValType::F32),
        Op::F32Max => float_binop(fcx, FloatBinOp::Max, ValType::F32),
        Op::F32Copysign => float_binop(fcx, FloatBinOp::CopySign, ValType::F32),
        Op::F64Add => float_binop(fcx, FloatBinOp::Add, ValType::F64),
        Op::F64Sub => float_binop(fcx, FloatBinOp::Sub, ValType::F64),
        Op::F64Mul => float_binop(fcx, FloatBinOp::Mul, ValType::F64),
        Op::F64Div => float_binop(fcx, FloatBinOp::Div, ValType::F64),
        Op::F64Min => float_binop(fcx, FloatBinOp::Min, ValType::F64),
        Op::F64Max => float_binop(fcx, FloatBinOp::Max, ValType::F64),
        Op::F64Copysign => float_binop(fcx, FloatBinOp::CopySign, ValType::F64),

        Op::F32Eq => float_cmp(fcx, ctx, FloatCmpOp::Eq),
        Op::F32Ne => float_cmp(fcx, ctx, FloatCmpOp::Ne),
        Op::F32Lt => float_cmp(fcx, ctx, FloatCmpOp::Lt),
        Op::F32Gt => float_cmp(fcx, ctx, FloatCmpOp::Gt),
        Op::F32Le => float_cmp(fcx, ctx, FloatCmpOp::Le),
        Op::F32Ge => float_cmp(fcx, ctx, FloatCmpOp::Ge),
        Op::F64Eq => float_cmp(fcx, ctx, FloatCmpOp::Eq),
        Op::F64Ne => float_cmp(fcx, ctx, FloatCmpOp::Ne),
        Op::F64Lt => float_cmp(fcx, ctx, FloatCmpOp::Lt),
        Op::F64Gt => float_cmp(fcx, ctx, FloatCmpOp::Gt),
        Op::F64Le => float_cmp(fcx, ctx, FloatCmpOp::Le),
        Op::F64Ge => float_cmp(fcx, ctx, FloatCmpOp::Ge),

        Op::I32WrapI64 => {
            if !fcx.unreachable {
                numeric::translate_i32_wrap_i64(fcx, ctx);
            }
            Ok(())
        }
        Op::I64ExtendI32S => {
            if !fcx.unreachable {
                numeric::translate_i64_extend_i32(fcx, ctx, true);
            }
            Ok(())
        }
        Op::I64ExtendI32U => {
            if !fcx.unreachable {
                numeric::translate_i64_extend_i32(fcx, ctx, false);
            }
            Ok(())
        }
        Op::F32DemoteF64 => {
            if !fcx.unreachable {
                numeric::translate_f32_demote_f64(fcx, ctx);
            }
            Ok(())
        }
        Op::F64PromoteF32 => {
            if !fcx.unreachable {
                numeric::translate_f64_promote_f32(fcx, ctx);
            }
            Ok(())
        }
        Op::I32TruncF32S | Op::I32TruncF64S => trunc(fcx, ctx, true, ValType::I32, code_offset),
        Op::I32TruncF32U | Op::I32TruncF64U => trunc(fcx, ctx, false, ValType::I32, code_offset),
        Op::I64TruncF32S | Op::I64TruncF64S => trunc(fcx, ctx, true, ValType::I64, code_offset),
        Op::I64TruncF32U | Op::I64TruncF64U => trunc(fcx, ctx, false, ValType::I64, code_offset),
        Op::I32TruncSatF32S | Op::I32TruncSatF64S => {
            if !fcx.unreachable {
                numeric::translate_float_to_int_sat(fcx, ctx, true, ValType::I32);
            }
            Ok(())
        }
        Op::I32TruncSatF32U | Op::I32TruncSatF64U => {
            if !fcx.unreachable {
                numeric::translate_float_to_int_sat(fcx, ctx, false, ValType::I32);
            }
            Ok(())
        }
        Op::I64TruncSatF32S | Op::I64TruncSatF64S => {
            if !fcx.unreachable {
                numeric::translate_float_to_int_sat(fcx, ctx, true, ValType::I64);
            }
            Ok(())
        }
        Op::I64TruncSatF32U | Op::I64TruncSatF64U => {
            if !fcx.unreachable {
                numeric::translate_float_to_int_sat(fcx, ctx, false, ValType::I64);
            }
            Ok(())
        }
        Op::F32ConvertI32S | Op::F32ConvertI64S => {
            if !fcx.unreachable {
                numeric::translate_int_to_float(fcx, ctx, true, ValType::F32);
            }
            Ok(())
        }
        Op::F32ConvertI32U | Op::F32ConvertI64U => {
            if !fcx.unreachable {
                numeric::translate_int_to_float(fcx, ctx, false, ValType::F32);
            }
            Ok(())
        }
        Op::F64ConvertI32S | Op::F64ConvertI64S => {
            if !fcx.unreachable {
                numeric::translate_int_to_float(fcx, ctx, true, ValType::F64);
            }
            Ok(())
        }
        Op::F64ConvertI32U | Op::F64ConvertI64U => {
            if !fcx.unreachable {
                numeric::translate_int_to_float(fcx, ctx, false, ValType::F64);
            }
            Ok(())
        }
        Op::I32ReinterpretF32 => {
            if !fcx.unreachable {
                numeric::translate_reinterpret(fcx, ctx, ValType::I32);
            }
            Ok(())
        }
        Op::I64ReinterpretF64 => {
            if !fcx.unreachable {
                numeric::translate_reinterpret(fcx, ctx, ValType::I64);
            }
            Ok(())
        }
        Op::F32ReinterpretI32 => {
            if !fcx.unreachable {
                numeric::translate_reinterpret(fcx, ctx, ValType::F32);
            }
            Ok(())
        }
        Op::F64ReinterpretI64 => {
            if !fcx.unreachable {
                numeric::translate_reinterpret(fcx, ctx, ValType::F64);
            }
            Ok(())
        }

        other => {
            log::debug!("bailing out on unimplemented opcode {:?}", other);
            Err(Error::Unsupported(format!("opcode not implemented: {:?}", other)))
        }
    }
}

fn load<'ctx>(
    fcx: &mut FuncContext<'_, 'ctx>,
    ctx: &'ctx Context,
    strategy: &dyn LoweringStrategy,
    ty: ValType,
    memarg: wasmparser::MemoryImmediate,
    code_offset: u32,
) -> Result<(), Error> {
    if fcx.unreachable {
        return Ok(());
    }
    memory::translate_load(fcx, ctx, strategy, ty, memarg.align as u32, memarg.offset as u32, code_offset)
}

fn store<'ctx>(
    fcx: &mut FuncContext<'_, 'ctx>,
    ctx: &'ctx Context,
    strategy: &dyn LoweringStrategy,
    ty: ValType,
    memarg: wasmparser::MemoryImmediate,
    code_offset: u32,
) -> Result<(), Error> {
    if fcx.unreachable {
        return Ok(());
    }
    memory::translate_store(fcx, ctx, strategy, ty, memarg.align as u32, memarg.offset as u32, code_offset)
}

fn int_binop<'ctx>(
    fcx: &mut FuncContext<'_, 'ctx>,
    ctx: &'ctx Context,
    op: IntBinOp,
    ty: ValType,
    code_offset: u32,
) -> Result<(), Error> {
    if fcx.unreachable {
        return Ok(());
    }
    numeric::translate_int_binop(fcx, ctx, op, ty, code_offset)
}

fn int_unop<'ctx>(
    fcx: &mut FuncContext<'_, 'ctx>,
    ctx: &'ctx Context,
    llvm_module: &LlvmModule<'ctx>,
    is_clz: bool,
    ty: ValType,
) -> Result<(), Error> {
    if !fcx.unreachable {
        numeric::translate_int_unop(fcx, ctx, llvm_module, is_clz, ty);
    }
    Ok(())
}

fn popcnt<'ctx>(
    fcx: &mut FuncContext<'_, 'ctx>,
    ctx: &'ctx Context,
    llvm_module: &LlvmModule<'ctx>,
    ty: ValType,
) -> Result<(), Error> {
    if !fcx.unreachable {
        numeric::translate_popcnt(fcx, ctx, llvm_module, ty);
    }
    Ok(())
}

fn int_cmp<'ctx>(fcx: &mut FuncContext<'_, 'ctx>, ctx: &'ctx Context, op: IntCmpOp) -> Result<(), Error> {
    if !fcx.unreachable {
        numeric::translate_int_cmp(fcx, ctx, op);
    }
    Ok(())
}

fn float_binop<'ctx>(fcx: &mut FuncContext<'_, 'ctx>, op: FloatBinOp, ty: ValType) -> Result<(), Error> {
    if !fcx.unreachable {
        numeric::translate_float_binop(fcx, op, ty);
    }
    Ok(())
}

fn float_cmp<'ctx>(fcx: &mut FuncContext<'_, 'ctx>, ctx: &'ctx Context, op: FloatCmpOp) -> Result<(), Error> {
    if !fcx.unreachable {
        numeric::translate_float_cmp(fcx, ctx, op);
    }
    Ok(())
}

fn trunc<'ctx>(
    fcx: &mut FuncContext<'_, 'ctx>,
    ctx: &'ctx Context,
    signed: bool,
    result_ty: ValType,
    code_offset: u32,
) -> Result<(), Error> {
    if !fcx.unreachable {
        numeric::translate_float_to_int_trapping(fcx, ctx, signed, result_ty, code_offset);
    }
    Ok(())
}
