//! Constant lowering, including no-sandbox relocation-directed rewriting of
//! `i64.const`.

use crate::env::{EmitCtx, LoweringStrategy};
use crate::error::Error;
use crate::frontend::relocation::{RelocationKind, SymbolKind};
use crate::function::FuncContext;
use crate::types::ValType;
use inkwell::context::Context;
use inkwell::AddressSpace;

pub fn i32_const<'ctx>(fcx: &mut FuncContext<'_, 'ctx>, ctx: &'ctx Context, value: i32) {
    let v = ctx.i32_type().const_int(value as u32 as u64, true);
    fcx.stack.push(v.into(), ValType::I32);
}

/// `f32.const`/`f64.const` NaN payloads are round-tripped through an alloca so the
/// backend never normalizes the bit pattern the way a plain float literal might.
pub fn f32_const<'ctx>(fcx: &mut FuncContext<'_, 'ctx>, ctx: &'ctx Context, bits: u32) {
    let value = f32::from_bits(bits);
    let v = if value.is_nan() {
        let alloca = fcx.builder.build_alloca(ctx.i32_type(), "f32_nan_bits");
        fcx.builder.build_store(alloca, ctx.i32_type().const_int(bits as u64, false));
        let casted = fcx
            .builder
            .build_bitcast(alloca, ctx.f32_type().ptr_type(AddressSpace::default()), "f32_nan_ptr");
        fcx.builder.build_load(casted.into_pointer_value(), "f32_nan")
    } else {
        ctx.f32_type().const_float(value as f64).into()
    };
    fcx.stack.push(v, ValType::F32);
}

pub fn f64_const<'ctx>(fcx: &mut FuncContext<'_, 'ctx>, ctx: &'ctx Context, bits: u64) {
    let value = f64::from_bits(bits);
    let v = if value.is_nan() {
        let alloca = fcx.builder.build_alloca(ctx.i64_type(), "f64_nan_bits");
        fcx.builder.build_store(alloca, ctx.i64_type().const_int(bits, false));
        let casted = fcx
            .builder
            .build_bitcast(alloca, ctx.f64_type().ptr_type(AddressSpace::default()), "f64_nan_ptr");
        fcx.builder.build_load(casted.into_pointer_value(), "f64_nan")
    } else {
        ctx.f64_type().const_float(value).into()
    };
    fcx.stack.push(v, ValType::F64);
}

pub fn i64_const<'ctx>(
    fcx: &mut FuncContext<'_, 'ctx>,
    ctx: &'ctx Context,
    strategy: &dyn LoweringStrategy,
    value: i64,
    code_offset: u32,
) -> Result<(), Error> {
    let relocation = fcx.decls.module.relocations.at_code_offset(code_offset as usize);

    let v = if strategy.is_sandboxed() || relocation.is_none() {
        if let Some(r) = relocation {
            log::trace!(
                "dropping relocation {:?} at code offset {} (sandboxed build never rewrites constants)",
                r.kind,
                code_offset
            );
        }
        ctx.i64_type().const_int(value as u64, true)
    } else {
        let relocation = relocation.unwrap();
        match relocation.kind {
            RelocationKind::TableIndexSleb64 | RelocationKind::TableIndexI64 => {
                let symbol = fcx.decls.module.symbols.get(relocation.symbol_index)?;
                if symbol.kind != SymbolKind::Function {
                    return Err(Error::UnresolvedRelocation {
                        kind: format!("{:?}", relocation.kind),
                        offset: code_offset as usize,
                    });
                }
                let func_index = symbol
                    .func_index
                    .ok_or_else(|| Error::UnresolvedRelocation {
                        kind: format!("{:?}", relocation.kind),
                        offset: code_offset as usize,
                    })?;
                let func_value = *fcx
                    .func_values
                    .get(func_index as usize)
                    .ok_or_else(|| Error::FunctionIndexError(func_index.to_string()))?;
                let fp = func_value.as_global_value().as_pointer_value();
                fcx.builder.build_ptr_to_int(fp, ctx.i64_type(), "func_ptr_i64")
            }
            RelocationKind::MemoryAddrSleb64 | RelocationKind::MemoryAddrI64 => {
                let ecx = EmitCtx {
                    builder: &fcx.builder,
                    vmctx: fcx.vmctx,
                    func: fcx.func,
                    traps: &mut fcx.traps,
                };
                strategy.lower_i64_const(ctx, &ecx, fcx.decls, value, Some(relocation))?
            }
            other => return Err(Error::UnsupportedRelocation(format!("{:?}", other))),
        }
    };
    fcx.stack.push(v.into(), ValType::I64);
    Ok(())
}
