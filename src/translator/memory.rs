//! Memory, global, and `memory.size`/`memory.grow` lowering.

use crate::decls::GlobalVariant;
use crate::env::{EmitCtx, LoweringStrategy};
use crate::error::Error;
use crate::function::FuncContext;
use crate::runtime::{runtime_func_type, RuntimeFunc};
use crate::types::{lower, ValType};
use inkwell::context::Context;
use inkwell::{AddressSpace, IntPredicate};

/// Clamps a declared alignment hint to the access's natural alignment, matching the
/// original never trusting a module to claim over-alignment.
pub fn effective_align(declared_align: u32, access_width: u32) -> u32 {
    declared_align.min(access_width)
}

fn memory_base<'ctx>(
    fcx: &mut FuncContext<'_, 'ctx>,
    ctx: &'ctx Context,
    strategy: &dyn LoweringStrategy,
) -> Result<inkwell::values::PointerValue<'ctx>, Error> {
    if let Some(cached) = fcx.memory_base_cache {
        return Ok(cached);
    }
    let ecx = EmitCtx {
        builder: &fcx.builder,
        vmctx: fcx.vmctx,
        func: fcx.func,
        traps: &mut fcx.traps,
    };
    let base = strategy.memory_base(ctx, &ecx)?;
    fcx.memory_base_cache = Some(base);
    Ok(base)
}

pub fn translate_load<'ctx>(
    fcx: &mut FuncContext<'_, 'ctx>,
    ctx: &'ctx Context,
    strategy: &dyn LoweringStrategy,
    ty: ValType,
    _declared_align: u32,
    offset: u32,
    code_offset: u32,
) -> Result<(), Error> {
    let base = memory_base(fcx, ctx, strategy)?;
    let index_entry = fcx.stack.pop();
    let index = index_entry.value.into_int_value();
    let width = ty.size();

    let mut ecx = EmitCtx {
        builder: &fcx.builder,
        vmctx: fcx.vmctx,
        func: fcx.func,
        traps: &mut fcx.traps,
    };
    let addr = strategy.effective_address(ctx, &mut ecx, base, index, offset, width, code_offset)?;

    let elem_ty = lower(ctx, ty, strategy.is_sandboxed());
    let casted = fcx
        .builder
        .build_bitcast(addr, elem_ty.ptr_type(AddressSpace::default()), "typed_addr");
    let loaded = fcx.builder.build_load(casted.into_pointer_value(), "loaded");
    fcx.stack.push(loaded, ty);
    Ok(())
}

pub fn translate_store<'ctx>(
    fcx: &mut FuncContext<'_, 'ctx>,
    ctx: &'ctx Context,
    strategy: &dyn LoweringStrategy,
    ty: ValType,
    _declared_align: u32,
    offset: u32,
    code_offset: u32,
) -> Result<(), Error> {
    let base = memory_base(fcx, ctx, strategy)?;
    let value_entry = fcx.stack.pop();
    let index_entry = fcx.stack.pop();
    let index = index_entry.value.into_int_value();
    let width = ty.size();

    let mut ecx = EmitCtx {
        builder: &fcx.builder,
        vmctx: fcx.vmctx,
        func: fcx.func,
        traps: &mut fcx.traps,
    };
    let addr = strategy.effective_address(ctx, &mut ecx, base, index, offset, width, code_offset)?;

    let elem_ty = lower(ctx, ty, strategy.is_sandboxed());
    let casted = fcx
        .builder
        .build_bitcast(addr, elem_ty.ptr_type(AddressSpace::default()), "typed_addr");
    fcx.builder.build_store(casted.into_pointer_value(), value_entry.value);
    Ok(())
}

pub fn translate_memory_size<'ctx>(
    fcx: &mut FuncContext<'_, 'ctx>,
    ctx: &'ctx Context,
    llvm_module: &inkwell::module::Module<'ctx>,
    strategy: &dyn LoweringStrategy,
) -> Result<(), Error> {
    if strategy.is_sandboxed() {
        let rt = runtime_func_type(RuntimeFunc::MemSize);
        let func = llvm_module
            .get_function(rt.name)
            .expect("runtime hostcall declared during module assembly");
        let call = fcx.builder.build_call(func, &[fcx.vmctx.into()], "mem_size");
        let v = call.try_as_basic_value().left().unwrap();
        fcx.stack.push(v, ValType::I32);
    } else {
        // No-sandbox memory is fixed-size host memory; report it as a single page
        // so `memory.size` remains well-defined without a runtime call.
        fcx.stack.push(ctx.i32_type().const_int(1, false).into(), ValType::I32);
    }
    Ok(())
}

pub fn translate_memory_grow<'ctx>(
    fcx: &mut FuncContext<'_, 'ctx>,
    ctx: &'ctx Context,
    llvm_module: &inkwell::module::Module<'ctx>,
    strategy: &dyn LoweringStrategy,
) -> Result<(), Error> {
    let delta = fcx.stack.pop();
    if strategy.is_sandboxed() {
        let rt = runtime_func_type(RuntimeFunc::MemGrow);
        let func = llvm_module
            .get_function(rt.name)
            .expect("runtime hostcall declared during module assembly");
        let call = fcx
            .builder
            .build_call(func, &[fcx.vmctx.into(), delta.value], "mem_grow");
        let v = call.try_as_basic_value().left().unwrap();
        fcx.stack.push(v, ValType::I32);
        // The base pointer may have moved; invalidate the cache.
        fcx.memory_base_cache = None;
    } else {
        fcx.stack.push(ctx.i32_type().const_all_ones().into(), ValType::I32);
    }
    Ok(())
}

pub fn translate_global_get<'ctx>(
    fcx: &mut FuncContext<'_, 'ctx>,
    ctx: &'ctx Context,
    llvm_module: &inkwell::module::Module<'ctx>,
    global_index: u32,
) -> Result<(), Error> {
    let spec = fcx
        .decls
        .globals
        .get(global_index as usize)
        .ok_or_else(|| Error::GlobalIndexError(global_index.to_string()))?;
    let name = global_symbol_name(global_index, spec);
    let global = llvm_module
        .get_global(&name)
        .expect("global declared during module assembly");
    let loaded = fcx.builder.build_load(global.as_pointer_value(), "global_val");
    let _ = ctx;
    fcx.stack.push(loaded, spec.ty);
    Ok(())
}

/// Lowers `global.set`. When this writes the auxiliary stack top global and
/// `--enable-aux-stack-check` is on, the new value is compared against
/// `aux_stack_bottom` first and traps `StackOverflow` rather than let the
/// aux stack run into the heap.
pub fn translate_global_set<'ctx>(
    fcx: &mut FuncContext<'_, 'ctx>,
    ctx: &'ctx Context,
    llvm_module: &inkwell::module::Module<'ctx>,
    global_index: u32,
    code_offset: u32,
) -> Result<(), Error> {
    let spec = fcx
        .decls
        .globals
        .get(global_index as usize)
        .ok_or_else(|| Error::GlobalIndexError(global_index.to_string()))?;
    let name = global_symbol_name(global_index, spec);
    let global = llvm_module
        .get_global(&name)
        .expect("global declared during module assembly");
    let value = fcx.stack.pop();

    let checks_this_write = fcx.sandboxed
        && fcx.aux_stack_check
        && fcx.decls.aux_stack_global == Some(global_index);
    if checks_this_write {
        if let Some(bottom) = fcx.decls.aux_stack_bottom {
            debug_assert!(fcx.flags.has_op_set_global_aux_stack);
            let new_top = value.value.into_int_value();
            let top64 = if new_top.get_type().get_bit_width() == 32 {
                fcx.builder.build_int_z_extend(new_top, ctx.i64_type(), "aux_stack_top64")
            } else {
                new_top
            };
            let bottom_c = ctx.i64_type().const_int(bottom as u64, true);
            let underflow = fcx
                .builder
                .build_int_compare(IntPredicate::ULT, top64, bottom_c, "aux_stack_underflow");

            let exception_block = ctx.insert_basic_block_after(fcx.builder.get_insert_block().unwrap(), "aux_stack_overflow");
            let continue_block = ctx.insert_basic_block_after(exception_block, "aux_stack_ok");
            fcx.builder
                .build_conditional_branch(underflow, exception_block, continue_block);
            fcx.traps.push((code_offset, crate::traps::TrapCode::StackOverflow));

            fcx.builder.position_at_end(exception_block);
            crate::env::write_exception_id(ctx, &fcx.builder, fcx.vmctx, crate::traps::TrapCode::StackOverflow);
            fcx.builder.build_unconditional_branch(fcx.return_block);
            fcx.builder.position_at_end(continue_block);
        }
    }

    fcx.builder.build_store(global.as_pointer_value(), value.value);
    Ok(())
}

/// A defined global exported under a name is declared directly under that name so
/// a host loader can resolve it by its Wasm export rather than an internal index.
/// Unexported defined globals keep the synthetic `guest_global_N` symbol.
pub fn global_symbol_name(global_index: u32, spec: &crate::decls::GlobalSpec) -> String {
    match &spec.variant {
        GlobalVariant::Def(_) => spec
            .export_names
            .first()
            .cloned()
            .unwrap_or_else(|| format!("guest_global_{}", global_index)),
        GlobalVariant::Import { module, field } => format!("{}::{}", module, field),
    }
}
