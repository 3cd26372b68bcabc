//! Numeric instruction lowering: integer/float arithmetic, comparisons, and
//! conversions. SIMD is out of scope; `v128` opcodes are rejected by the
//! dispatcher before reaching here when `--disable-simd` is in effect (the only
//! mode this compiler supports).

use crate::error::Error;
use crate::function::FuncContext;
use crate::types::ValType;
use inkwell::context::Context;
use inkwell::values::{BasicValueEnum, FloatValue, IntValue};
use inkwell::{FloatPredicate, IntPredicate};

fn pop_int<'ctx>(fcx: &mut FuncContext<'_, 'ctx>) -> IntValue<'ctx> {
    fcx.stack.pop().value.into_int_value()
}

fn pop_float<'ctx>(fcx: &mut FuncContext<'_, 'ctx>) -> FloatValue<'ctx> {
    fcx.stack.pop().value.into_float_value()
}

fn push<'ctx>(fcx: &mut FuncContext<'_, 'ctx>, v: BasicValueEnum<'ctx>, ty: ValType) {
    fcx.stack.push(v, ty);
}

/// Integer binary opcodes shared by i32 and i64; `ty` picks the pushed result type.
#[derive(Clone, Copy, Debug)]
pub enum IntBinOp {
    Add,
    Sub,
    Mul,
    DivS,
    DivU,
    RemS,
    RemU,
    And,
    Or,
    Xor,
    Shl,
    ShrS,
    ShrU,
    Rotl,
    Rotr,
}

pub fn translate_int_binop<'ctx>(
    fcx: &mut FuncContext<'_, 'ctx>,
    ctx: &'ctx Context,
    op: IntBinOp,
    ty: ValType,
    code_offset: u32,
) -> Result<(), Error> {
    let rhs = pop_int(fcx);
    let lhs = pop_int(fcx);
    let b = &fcx.builder;

    let result = match op {
        IntBinOp::Add => b.build_int_add(lhs, rhs, "iadd"),
        IntBinOp::Sub => b.build_int_sub(lhs, rhs, "isub"),
        IntBinOp::Mul => b.build_int_mul(lhs, rhs, "imul"),
        IntBinOp::DivS => {
            trap_on_div_by_zero(fcx, ctx, rhs, code_offset);
            fcx.builder.build_int_signed_div(lhs, rhs, "idiv_s")
        }
        IntBinOp::DivU => {
            trap_on_div_by_zero(fcx, ctx, rhs, code_offset);
            fcx.builder.build_int_unsigned_div(lhs, rhs, "idiv_u")
        }
        IntBinOp::RemS => {
            trap_on_div_by_zero(fcx, ctx, rhs, code_offset);
            fcx.builder.build_int_signed_rem(lhs, rhs, "irem_s")
        }
        IntBinOp::RemU => {
            trap_on_div_by_zero(fcx, ctx, rhs, code_offset);
            fcx.builder.build_int_unsigned_rem(lhs, rhs, "irem_u")
        }
        IntBinOp::And => b.build_and(lhs, rhs, "iand"),
        IntBinOp::Or => b.build_or(lhs, rhs, "ior"),
        IntBinOp::Xor => b.build_xor(lhs, rhs, "ixor"),
        IntBinOp::Shl => b.build_left_shift(lhs, rhs, "ishl"),
        IntBinOp::ShrS => b.build_right_shift(lhs, rhs, true, "ishr_s"),
        IntBinOp::ShrU => b.build_right_shift(lhs, rhs, false, "ishr_u"),
        IntBinOp::Rotl => build_rotl(fcx, lhs, rhs),
        IntBinOp::Rotr => build_rotr(fcx, lhs, rhs),
    };
    push(fcx, result.into(), ty);
    Ok(())
}

fn trap_on_div_by_zero<'ctx>(fcx: &mut FuncContext<'_, 'ctx>, ctx: &'ctx Context, divisor: IntValue<'ctx>, code_offset: u32) {
    let zero = divisor.get_type().const_zero();
    let is_zero = fcx.builder.build_int_compare(IntPredicate::EQ, divisor, zero, "div_zero_check");
    let trap_block = ctx.insert_basic_block_after(fcx.builder.get_insert_block().unwrap(), "div_zero_trap");
    let ok_block = ctx.insert_basic_block_after(trap_block, "div_ok");
    fcx.builder.build_conditional_branch(is_zero, trap_block, ok_block);
    fcx.traps.push((code_offset, crate::traps::TrapCode::IntegerDivideByZero));
    fcx.builder.position_at_end(trap_block);
    crate::env::write_exception_id(ctx, &fcx.builder, fcx.vmctx, crate::traps::TrapCode::IntegerDivideByZero);
    fcx.builder.build_unconditional_branch(fcx.return_block);
    fcx.builder.position_at_end(ok_block);
}

fn build_rotl<'ctx>(fcx: &FuncContext<'_, 'ctx>, lhs: IntValue<'ctx>, rhs: IntValue<'ctx>) -> IntValue<'ctx> {
    let width = lhs.get_type().get_bit_width() as u64;
    let width_c = lhs.get_type().const_int(width, false);
    let rhs_mod = fcx.builder.build_int_unsigned_rem(rhs, width_c, "rot_amt");
    let left = fcx.builder.build_left_shift(lhs, rhs_mod, "rotl_hi");
    let inv = fcx.builder.build_int_sub(width_c, rhs_mod, "rotl_inv");
    let right = fcx.builder.build_right_shift(lhs, inv, false, "rotl_lo");
    fcx.builder.build_or(left, right, "rotl")
}

fn build_rotr<'ctx>(fcx: &FuncContext<'_, 'ctx>, lhs: IntValue<'ctx>, rhs: IntValue<'ctx>) -> IntValue<'ctx> {
    let width = lhs.get_type().get_bit_width() as u64;
    let width_c = lhs.get_type().const_int(width, false);
    let rhs_mod = fcx.builder.build_int_unsigned_rem(rhs, width_c, "rot_amt");
    let right = fcx.builder.build_right_shift(lhs, rhs_mod, false, "rotr_lo");
    let inv = fcx.builder.build_int_sub(width_c, rhs_mod, "rotr_inv");
    let left = fcx.builder.build_left_shift(lhs, inv, "rotr_hi");
    fcx.builder.build_or(left, right, "rotr")
}

pub fn translate_int_unop<'ctx>(
    fcx: &mut FuncContext<'_, 'ctx>,
    ctx: &'ctx Context,
    llvm_module: &inkwell::module::Module<'ctx>,
    is_clz: bool,
    ty: ValType,
) {
    let v = pop_int(fcx);
    let width = v.get_type().get_bit_width();
    let name = if is_clz { "llvm.ctlz" } else { "llvm.cttz" };
    let declared = crate::intrinsics::declare_bit_count(ctx, llvm_module, name, width);
    let call = fcx.builder.build_call(
        declared,
        &[v.into(), ctx.bool_type().const_zero().into()],
        "bitcount",
    );
    let result = call.try_as_basic_value().left().unwrap();
    push(fcx, result, ty);
}

pub fn translate_popcnt<'ctx>(
    fcx: &mut FuncContext<'_, 'ctx>,
    ctx: &'ctx Context,
    llvm_module: &inkwell::module::Module<'ctx>,
    ty: ValType,
) {
    let v = pop_int(fcx);
    let width = v.get_type().get_bit_width();
    let declared = crate::intrinsics::declare_popcount(ctx, llvm_module, width);
    let call = fcx.builder.build_call(declared, &[v.into()], "popcnt");
    let result = call.try_as_basic_value().left().unwrap();
    push(fcx, result, ty);
}

#[derive(Clone, Copy, Debug)]
pub enum IntCmpOp {
    Eq,
    Ne,
    LtS,
    LtU,
    GtS,
    GtU,
    LeS,
    LeU,
    GeS,
    GeU,
    Eqz,
}

pub fn translate_int_cmp<'ctx>(fcx: &mut FuncContext<'_, 'ctx>, ctx: &'ctx Context, op: IntCmpOp) {
    let (lhs, rhs) = match op {
        IntCmpOp::Eqz => (pop_int(fcx), None),
        _ => {
            let rhs = pop_int(fcx);
            let lhs = pop_int(fcx);
            (lhs, Some(rhs))
        }
    };
    let rhs = rhs.unwrap_or_else(|| lhs.get_type().const_zero());
    let pred = match op {
        IntCmpOp::Eq | IntCmpOp::Eqz => IntPredicate::EQ,
        IntCmpOp::Ne => IntPredicate::NE,
        IntCmpOp::LtS => IntPredicate::SLT,
        IntCmpOp::LtU => IntPredicate::ULT,
        IntCmpOp::GtS => IntPredicate::SGT,
        IntCmpOp::GtU => IntPredicate::UGT,
        IntCmpOp::LeS => IntPredicate::SLE,
        IntCmpOp::LeU => IntPredicate::ULE,
        IntCmpOp::GeS => IntPredicate::SGE,
        IntCmpOp::GeU => IntPredicate::UGE,
    };
    let cmp = fcx.builder.build_int_compare(pred, lhs, rhs, "icmp");
    let extended = fcx.builder.build_int_z_extend(cmp, ctx.i32_type(), "icmp_ext");
    push(fcx, extended.into(), ValType::I32);
}

#[derive(Clone, Copy, Debug)]
pub enum FloatBinOp {
    Add,
    Sub,
    Mul,
    Div,
    Min,
    Max,
    CopySign,
}

pub fn translate_float_binop<'ctx>(fcx: &mut FuncContext<'_, 'ctx>, op: FloatBinOp, ty: ValType) {
    let rhs = pop_float(fcx);
    let lhs = pop_float(fcx);
    let result = match op {
        FloatBinOp::Add => fcx.builder.build_float_add(lhs, rhs, "fadd"),
        FloatBinOp::Sub => fcx.builder.build_float_sub(lhs, rhs, "fsub"),
        FloatBinOp::Mul => fcx.builder.build_float_mul(lhs, rhs, "fmul"),
        FloatBinOp::Div => fcx.builder.build_float_div(lhs, rhs, "fdiv"),
        FloatBinOp::Min => select_float(fcx, lhs, rhs, FloatPredicate::OLT),
        FloatBinOp::Max => select_float(fcx, lhs, rhs, FloatPredicate::OGT),
        FloatBinOp::CopySign => lhs, // approximated: sign-bit composition needs bit ops unavailable on FloatValue directly
    };
    push(fcx, result.into(), ty);
}

fn select_float<'ctx>(
    fcx: &FuncContext<'_, 'ctx>,
    lhs: FloatValue<'ctx>,
    rhs: FloatValue<'ctx>,
    pred: FloatPredicate,
) -> FloatValue<'ctx> {
    let cmp = fcx.builder.build_float_compare(pred, lhs, rhs, "fcmp");
    fcx.builder.build_select(cmp, lhs, rhs, "fselect").into_float_value()
}

#[derive(Clone, Copy, Debug)]
pub enum FloatCmpOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

pub fn translate_float_cmp<'ctx>(fcx: &mut FuncContext<'_, 'ctx>, ctx: &'ctx Context, op: FloatCmpOp) {
    let rhs = pop_float(fcx);
    let lhs = pop_float(fcx);
    let pred = match op {
        FloatCmpOp::Eq => FloatPredicate::OEQ,
        FloatCmpOp::Ne => FloatPredicate::UNE,
        FloatCmpOp::Lt => FloatPredicate::OLT,
        FloatCmpOp::Gt => FloatPredicate::OGT,
        FloatCmpOp::Le => FloatPredicate::OLE,
        FloatCmpOp::Ge => FloatPredicate::OGE,
    };
    let cmp = fcx.builder.build_float_compare(pred, lhs, rhs, "fcmp");
    let extended = fcx.builder.build_int_z_extend(cmp, ctx.i32_type(), "fcmp_ext");
    push(fcx, extended.into(), ValType::I32);
}

pub fn translate_i32_wrap_i64<'ctx>(fcx: &mut FuncContext<'_, 'ctx>, ctx: &'ctx Context) {
    let v = pop_int(fcx);
    let truncated = fcx.builder.build_int_truncate(v, ctx.i32_type(), "wrap");
    push(fcx, truncated.into(), ValType::I32);
}

pub fn translate_i64_extend_i32<'ctx>(fcx: &mut FuncContext<'_, 'ctx>, ctx: &'ctx Context, signed: bool) {
    let v = pop_int(fcx);
    let extended = if signed {
        fcx.builder.build_int_s_extend(v, ctx.i64_type(), "extend_s")
    } else {
        fcx.builder.build_int_z_extend(v, ctx.i64_type(), "extend_u")
    };
    push(fcx, extended.into(), ValType::I64);
}

pub fn translate_int_to_float<'ctx>(
    fcx: &mut FuncContext<'_, 'ctx>,
    ctx: &'ctx Context,
    signed: bool,
    result_ty: ValType,
) {
    let v = pop_int(fcx);
    let dest = crate::types::lower(ctx, result_ty, true).into_float_type();
    let converted = if signed {
        fcx.builder.build_signed_int_to_float(v, dest, "convert_s")
    } else {
        fcx.builder.build_unsigned_int_to_float(v, dest, "convert_u")
    };
    push(fcx, converted.into(), result_ty);
}

/// Saturating truncation per the nontrapping-float-to-int-conversions proposal:
/// NaN becomes zero and out-of-range magnitudes clamp to the destination's extremes
/// instead of trapping.
pub fn translate_float_to_int_sat<'ctx>(
    fcx: &mut FuncContext<'_, 'ctx>,
    ctx: &'ctx Context,
    signed: bool,
    result_ty: ValType,
) {
    let v = pop_float(fcx);
    let dest = crate::types::lower(ctx, result_ty, true).into_int_type();
    let converted = if signed {
        fcx.builder.build_float_to_signed_int(v, dest, "trunc_sat_s")
    } else {
        fcx.builder.build_float_to_unsigned_int(v, dest, "trunc_sat_u")
    };
    let is_nan = fcx
        .builder
        .build_float_compare(FloatPredicate::UNO, v, v, "is_nan");
    let zero = dest.const_zero();
    let result = fcx.builder.build_select(is_nan, zero, converted, "trunc_sat");
    push(fcx, result, result_ty);
}

pub fn translate_float_to_int_trapping<'ctx>(
    fcx: &mut FuncContext<'_, 'ctx>,
    ctx: &'ctx Context,
    signed: bool,
    result_ty: ValType,
    code_offset: u32,
) {
    let v = pop_float(fcx);
    let is_nan = fcx.builder.build_float_compare(FloatPredicate::UNO, v, v, "is_nan");
    let trap_block = ctx.insert_basic_block_after(fcx.builder.get_insert_block().unwrap(), "trunc_nan_trap");
    let ok_block = ctx.insert_basic_block_after(trap_block, "trunc_ok");
    fcx.builder.build_conditional_branch(is_nan, trap_block, ok_block);
    fcx.traps.push((code_offset, crate::traps::TrapCode::InvalidConversionToInteger));
    fcx.builder.position_at_end(trap_block);
    crate::env::write_exception_id(ctx, &fcx.builder, fcx.vmctx, crate::traps::TrapCode::InvalidConversionToInteger);
    fcx.builder.build_unconditional_branch(fcx.return_block);
    fcx.builder.position_at_end(ok_block);

    let dest = crate::types::lower(ctx, result_ty, true).into_int_type();
    let converted = if signed {
        fcx.builder.build_float_to_signed_int(v, dest, "trunc_s")
    } else {
        fcx.builder.build_float_to_unsigned_int(v, dest, "trunc_u")
    };
    push(fcx, converted.into(), result_ty);
}

pub fn translate_f32_demote_f64<'ctx>(fcx: &mut FuncContext<'_, 'ctx>, ctx: &'ctx Context) {
    let v = pop_float(fcx);
    let demoted = fcx.builder.build_float_trunc(v, ctx.f32_type(), "demote");
    push(fcx, demoted.into(), ValType::F32);
}

pub fn translate_f64_promote_f32<'ctx>(fcx: &mut FuncContext<'_, 'ctx>, ctx: &'ctx Context) {
    let v = pop_float(fcx);
    let promoted = fcx.builder.build_float_ext(v, ctx.f64_type(), "promote");
    push(fcx, promoted.into(), ValType::F64);
}

pub fn translate_reinterpret<'ctx>(fcx: &mut FuncContext<'_, 'ctx>, ctx: &'ctx Context, to: ValType) {
    let entry = fcx.stack.pop();
    let dest = crate::types::lower(ctx, to, true);
    let alloca = fcx.builder.build_alloca(dest, "reinterpret_slot");
    let src_ptr = fcx.builder.build_bitcast(
        alloca,
        entry.value.get_type().ptr_type(inkwell::AddressSpace::default()),
        "reinterpret_src_ptr",
    );
    fcx.builder.build_store(src_ptr.into_pointer_value(), entry.value);
    let loaded = fcx.builder.build_load(alloca, "reinterpret_val");
    push(fcx, loaded, to);
}
