//! Call and indirect-call lowering: direct calls pass the VM context as an implicit
//! first argument; `call_indirect` dispatches through the active
//! `LoweringStrategy`, which decides whether the table entry needs checking.

use crate::env::{write_exception_id, EmitCtx, LoweringStrategy};
use crate::error::Error;
use crate::function::FuncContext;
use crate::traps::TrapCode;
use crate::types::ValType;
use inkwell::context::Context;
use inkwell::module::Module as LlvmModule;
use inkwell::values::{BasicValueEnum, CallableValue};
use inkwell::{AddressSpace, IntPredicate};

/// Loads the host function pointer slot a direct `call` to an imported function
/// indirects through, rather than calling the declared extern symbol directly, so
/// an unlinked import can be null-checked in sandboxed mode.
fn load_import_func_ptr<'ctx>(
    fcx: &FuncContext<'_, 'ctx>,
    ctx: &'ctx Context,
    llvm_module: &LlvmModule<'ctx>,
    func_index: u32,
) -> inkwell::values::PointerValue<'ctx> {
    let table = llvm_module
        .get_global("import_func_ptrs")
        .expect("import_func_ptrs declared during module assembly");
    let i8ptr = ctx.i8_type().ptr_type(AddressSpace::default());
    let base = table.as_pointer_value().const_cast(i8ptr.ptr_type(AddressSpace::default()));
    let idx = ctx.i32_type().const_int(func_index as u64, false);
    let slot = unsafe { fcx.builder.build_gep(base, &[idx], "import_func_ptr_slot") };
    fcx.builder.build_load(slot, "import_func_ptr").into_pointer_value()
}

/// Branches to the shared return block if the vmctx `exception_id` field is
/// nonzero, propagating a trap raised by a callee without needing the caller to
/// inspect the callee's return value.
fn check_exception_propagation<'ctx>(fcx: &mut FuncContext<'_, 'ctx>, ctx: &'ctx Context) {
    if !fcx.sandboxed {
        return;
    }
    let field = unsafe {
        fcx.builder
            .build_gep(fcx.vmctx, &[ctx.i32_type().const_int(2, false)], "exception_id_field")
    };
    let casted = fcx
        .builder
        .build_bitcast(field, ctx.i32_type().ptr_type(AddressSpace::default()), "exception_id_ptr");
    let id = fcx.builder.build_load(casted.into_pointer_value(), "exception_id").into_int_value();
    let pending = fcx
        .builder
        .build_int_compare(IntPredicate::NE, id, ctx.i32_type().const_zero(), "exception_pending");

    let propagate_block = ctx.insert_basic_block_after(fcx.builder.get_insert_block().unwrap(), "propagate_exception");
    let ok_block = ctx.insert_basic_block_after(propagate_block, "call_ok");
    fcx.builder.build_conditional_branch(pending, propagate_block, ok_block);
    fcx.builder.position_at_end(propagate_block);
    fcx.builder.build_unconditional_branch(fcx.return_block);
    fcx.builder.position_at_end(ok_block);
}

/// `call func_index`: the callee's vmctx parameter is always this function's own
/// vmctx, since a single compiled module shares one VM context across all of its
/// functions. Imports are called through `import_func_ptrs[func_index]` rather
/// than the declared extern symbol directly, null-checked in sandboxed mode.
pub fn translate_call<'ctx>(
    fcx: &mut FuncContext<'_, 'ctx>,
    ctx: &'ctx Context,
    llvm_module: &LlvmModule<'ctx>,
    func_index: u32,
    code_offset: u32,
) -> Result<(), Error> {
    let callee_ty = fcx.decls.func_type(func_index).clone();
    let decl = fcx.decls.func(func_index)?;
    let is_import = decl.is_import();

    let mut args: Vec<BasicValueEnum> = Vec::with_capacity(callee_ty.params.len() + 1);
    args.push(fcx.vmctx.into());

    let mut popped = Vec::with_capacity(callee_ty.params.len());
    for _ in &callee_ty.params {
        popped.push(fcx.stack.pop());
    }
    popped.reverse();
    for entry in popped {
        args.push(entry.value);
    }

    let mut extra_slots = Vec::new();
    for extra_ty in callee_ty.results.iter().skip(1) {
        let alloca = fcx.builder.build_alloca(
            crate::types::lower(ctx, *extra_ty, fcx.sandboxed),
            "extra_result",
        );
        extra_slots.push(alloca);
        args.push(alloca.into());
    }

    let call = if is_import {
        log::debug!("calling import {} through import_func_ptrs[{}]", decl.symbol, func_index);
        let fp = load_import_func_ptr(fcx, ctx, llvm_module, func_index);

        if fcx.sandboxed {
            let null = fp.get_type().const_null();
            let is_null = fcx.builder.build_int_compare(
                IntPredicate::EQ,
                fcx.builder.build_ptr_to_int(fp, ctx.i64_type(), "fp_as_i64"),
                fcx.builder.build_ptr_to_int(null, ctx.i64_type(), "null_as_i64"),
                "fp_is_null",
            );
            let trap_block = ctx.insert_basic_block_after(fcx.builder.get_insert_block().unwrap(), "unlinked_import");
            let ok_block = ctx.insert_basic_block_after(trap_block, "import_ok");
            fcx.builder.build_conditional_branch(is_null, trap_block, ok_block);
            fcx.traps.push((code_offset, TrapCode::CallUnlinkedImportFunc));
            fcx.builder.position_at_end(trap_block);
            write_exception_id(ctx, &fcx.builder, fcx.vmctx, TrapCode::CallUnlinkedImportFunc);
            fcx.builder.build_unconditional_branch(fcx.return_block);
            fcx.builder.position_at_end(ok_block);
        }

        let vmctx_ty = fcx.vmctx.get_type();
        let fn_ty = callee_ty.lower_signature(ctx, vmctx_ty.into(), fcx.sandboxed);
        let callee_ptr_ty = fn_ty.ptr_type(AddressSpace::default());
        let casted = fcx.builder.build_bitcast(fp, callee_ptr_ty, "import_callee");
        fcx.builder
            .build_call(CallableValue::try_from(casted.into_pointer_value()).unwrap(), &args, "calltmp")
    } else {
        let callee = *fcx
            .func_values
            .get(func_index as usize)
            .ok_or_else(|| Error::FunctionIndexError(func_index.to_string()))?;
        fcx.builder.build_call(callee, &args, "calltmp")
    };

    check_exception_propagation(fcx, ctx);

    if let Some(first_ty) = callee_ty.results.first() {
        let ret = call.try_as_basic_value().left().expect("non-void call has a return value");
        fcx.stack.push(ret, *first_ty);
    }
    for (slot, ty) in extra_slots.iter().zip(callee_ty.results.iter().skip(1)) {
        let loaded = fcx.builder.build_load(*slot, "extra_result_load");
        fcx.stack.push(loaded, *ty);
    }
    Ok(())
}

pub fn translate_call_indirect<'ctx>(
    fcx: &mut FuncContext<'_, 'ctx>,
    ctx: &'ctx Context,
    strategy: &dyn LoweringStrategy,
    type_index: u32,
    table_index: u32,
    code_offset: u32,
) -> Result<(), Error> {
    let func_ty = fcx
        .decls
        .module
        .types
        .get(type_index as usize)
        .ok_or_else(|| Error::SignatureIndexError(type_index.to_string()))?
        .clone();
    let canonical = fcx.decls.module.canonical_type_index(type_index);

    let (table_base, table_len) = *fcx
        .tables
        .get(table_index as usize)
        .ok_or_else(|| Error::TableIndexError(table_index.to_string()))?;

    let index_entry = fcx.stack.pop();
    let index = index_entry.value.into_int_value();

    let mut popped = Vec::with_capacity(func_ty.params.len());
    for _ in &func_ty.params {
        popped.push(fcx.stack.pop());
    }
    popped.reverse();

    let vmctx_ty = fcx.vmctx.get_type();
    let callee_ty = func_ty.lower_signature(ctx, vmctx_ty.into(), strategy.is_sandboxed());

    let mut args: Vec<BasicValueEnum> = Vec::with_capacity(func_ty.params.len() + 1);
    args.push(fcx.vmctx.into());
    for entry in &popped {
        args.push(entry.value);
    }

    let mut extra_slots = Vec::new();
    for extra_ty in func_ty.results.iter().skip(1) {
        let alloca = fcx
            .builder
            .build_alloca(crate::types::lower(ctx, *extra_ty, strategy.is_sandboxed()), "extra_result");
        extra_slots.push(alloca);
        args.push(alloca.into());
    }

    let table_len_value = if strategy.is_sandboxed() {
        Some(ctx.i64_type().const_int(table_len as u64, false))
    } else {
        None
    };

    let mut ecx = EmitCtx {
        builder: &fcx.builder,
        vmctx: fcx.vmctx,
        func: fcx.func,
        traps: &mut fcx.traps,
    };
    let result = strategy.call_indirect(
        ctx,
        &mut ecx,
        table_base,
        table_len_value,
        index,
        callee_ty,
        canonical,
        &args,
        code_offset,
    )?;

    if let Some(ValType::Void) = func_ty.results.first() {
        // no push
    } else if let Some(first_ty) = func_ty.results.first() {
        let v = result.expect("non-void call_indirect produced a value");
        fcx.stack.push(v, *first_ty);
    }
    check_exception_propagation(fcx, ctx);

    for (slot, ty) in extra_slots.iter().zip(func_ty.results.iter().skip(1)) {
        let loaded = fcx.builder.build_load(*slot, "extra_result_load");
        fcx.stack.push(loaded, *ty);
    }
    Ok(())
}
