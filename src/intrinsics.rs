//! Declarations for the handful of LLVM intrinsics numeric lowering needs
//! (`llvm.ctlz`, `llvm.cttz`, `llvm.ctpop`), declared lazily and memoized by name
//! on the module the same way the rest of the compiler declares runtime hostcalls.

use inkwell::context::Context;
use inkwell::module::Module;
use inkwell::values::FunctionValue;

fn int_type_for_width<'ctx>(ctx: &'ctx Context, width: u32) -> inkwell::types::IntType<'ctx> {
    match width {
        32 => ctx.i32_type(),
        64 => ctx.i64_type(),
        other => ctx.custom_width_int_type(other),
    }
}

pub fn declare_bit_count<'ctx>(
    ctx: &'ctx Context,
    llvm_module: &Module<'ctx>,
    base_name: &str,
    width: u32,
) -> FunctionValue<'ctx> {
    let int_ty = int_type_for_width(ctx, width);
    let mangled = format!("{}.i{}", base_name, width);
    if let Some(existing) = llvm_module.get_function(&mangled) {
        return existing;
    }
    let fn_ty = int_ty.fn_type(&[int_ty.into(), ctx.bool_type().into()], false);
    llvm_module.add_function(&mangled, fn_ty, None)
}

pub fn declare_popcount<'ctx>(ctx: &'ctx Context, llvm_module: &Module<'ctx>, width: u32) -> FunctionValue<'ctx> {
    let int_ty = int_type_for_width(ctx, width);
    let mangled = format!("llvm.ctpop.i{}", width);
    if let Some(existing) = llvm_module.get_function(&mangled) {
        return existing;
    }
    let fn_ty = int_ty.fn_type(&[int_ty.into()], false);
    llvm_module.add_function(&mangled, fn_ty, None)
}
