//! The sandboxing policy as a strategy object: `LoweringStrategy` captures every
//! place memory, table, and call lowering differ between sandboxed and no-sandbox
//! compilation, so the opcode dispatcher never branches on a mode flag itself.

use crate::decls::ModuleDecls;
use crate::error::Error;
use crate::frontend::relocation::{Relocation, RelocationKind, SymbolKind};
use crate::traps::TrapCode;
use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::values::{BasicValueEnum, FunctionValue, IntValue, PointerValue};
use inkwell::{AddressSpace, IntPredicate};

/// Writes a trap's `exception_id` into the shared vmctx field every raise site
/// sets before branching to the function's return block, so a caller can tell a
/// trapping callee apart from one that legitimately returned zero.
pub fn write_exception_id<'ctx>(ctx: &'ctx Context, builder: &Builder<'ctx>, vmctx: PointerValue<'ctx>, code: TrapCode) {
    let field = unsafe { builder.build_gep(vmctx, &[ctx.i32_type().const_int(2, false)], "exception_id_field") };
    let casted = builder.build_bitcast(field, ctx.i32_type().ptr_type(AddressSpace::default()), "exception_id_ptr");
    builder.build_store(
        casted.into_pointer_value(),
        ctx.i32_type().const_int(code.exception_id() as u64, false),
    );
}

/// Per-function emission context a `LoweringStrategy` needs: the active builder,
/// the function's vmctx parameter, and a place to record raised traps.
pub struct EmitCtx<'a, 'ctx> {
    pub builder: &'a Builder<'ctx>,
    pub vmctx: PointerValue<'ctx>,
    pub func: FunctionValue<'ctx>,
    pub traps: &'a mut Vec<(u32, TrapCode)>,
}

/// Two implementations exist: `Sandboxed` (bounds-checked memory, table-indexed
/// indirect calls, trap on violation) and `NoSandbox` (pointers flow natively,
/// relocations resolve address-bearing constants, no checks are emitted).
pub trait LoweringStrategy {
    fn is_sandboxed(&self) -> bool;

    /// Materializes the memory base pointer for this function. Sandboxed mode loads
    /// it from vmctx; no-sandbox mode loads the same field, but accesses through it
    /// are never bounds-checked.
    fn memory_base<'ctx>(
        &self,
        ctx: &'ctx Context,
        ecx: &EmitCtx<'_, 'ctx>,
    ) -> Result<PointerValue<'ctx>, Error>;

    /// Computes the effective byte address for a memory access and, in sandboxed
    /// mode, emits the bounds check that traps to `OutOfBoundsMemoryAccess` on
    /// failure. `offset` is the access's static offset immediate; `index` is the
    /// dynamic index popped from the operand stack.
    fn effective_address<'ctx>(
        &self,
        ctx: &'ctx Context,
        ecx: &mut EmitCtx<'_, 'ctx>,
        base: PointerValue<'ctx>,
        index: IntValue<'ctx>,
        offset: u32,
        access_width: u32,
        code_offset: u32,
    ) -> Result<PointerValue<'ctx>, Error>;

    /// Lowers an `i64.const`, consulting `relocation` in no-sandbox mode to rewrite
    /// the constant into a host-address-bearing value when one covers this site.
    /// `decls` resolves a `MemoryAddr*` relocation's Data symbol to the segment it
    /// names and that segment's base offset.
    fn lower_i64_const<'ctx>(
        &self,
        ctx: &'ctx Context,
        ecx: &EmitCtx<'_, 'ctx>,
        decls: &ModuleDecls<'_>,
        value: i64,
        relocation: Option<&Relocation>,
    ) -> Result<IntValue<'ctx>, Error>;

    /// Lowers `call_indirect`: sandboxed mode bounds/type/null-checks the table
    /// entry before calling; no-sandbox mode treats the popped value as a host
    /// function pointer directly.
    fn call_indirect<'ctx>(
        &self,
        ctx: &'ctx Context,
        ecx: &mut EmitCtx<'_, 'ctx>,
        table_base: PointerValue<'ctx>,
        table_len: Option<IntValue<'ctx>>,
        index: IntValue<'ctx>,
        callee_ty: inkwell::types::FunctionType<'ctx>,
        canonical_type_index: u32,
        args: &[BasicValueEnum<'ctx>],
        code_offset: u32,
    ) -> Result<Option<BasicValueEnum<'ctx>>, Error>;
}

pub struct Sandboxed;

impl Sandboxed {
    pub fn new() -> Self {
        Self
    }

    fn raise<'ctx>(
        &self,
        ecx: &mut EmitCtx<'_, 'ctx>,
        cond: inkwell::values::IntValue<'ctx>,
        code: TrapCode,
        code_offset: u32,
        exception_block: inkwell::basic_block::BasicBlock<'ctx>,
        continue_block: inkwell::basic_block::BasicBlock<'ctx>,
    ) {
        log::debug!("raising {:?} at code offset {}", code, code_offset);
        ecx.builder
            .build_conditional_branch(cond, exception_block, continue_block);
        ecx.traps.push((code_offset, code));
    }
}

impl LoweringStrategy for Sandboxed {
    fn is_sandboxed(&self) -> bool {
        true
    }

    fn memory_base<'ctx>(
        &self,
        ctx: &'ctx Context,
        ecx: &EmitCtx<'_, 'ctx>,
    ) -> Result<PointerValue<'ctx>, Error> {
        let i8ptr = ctx.i8_type().ptr_type(AddressSpace::default());
        let field = unsafe {
            ecx.builder.build_gep(
                ecx.vmctx,
                &[ctx.i32_type().const_int(0, false)],
                "memory_base_field",
            )
        };
        let casted = ecx
            .builder
            .build_bitcast(field, i8ptr.ptr_type(AddressSpace::default()), "memory_base_ptr");
        let loaded = ecx.builder.build_load(casted.into_pointer_value(), "memory_base");
        Ok(loaded.into_pointer_value())
    }

    fn effective_address<'ctx>(
        &self,
        ctx: &'ctx Context,
        ecx: &mut EmitCtx<'_, 'ctx>,
        base: PointerValue<'ctx>,
        index: IntValue<'ctx>,
        offset: u32,
        access_width: u32,
        code_offset: u32,
    ) -> Result<PointerValue<'ctx>, Error> {
        let i64ty = ctx.i64_type();
        let index64 = if index.get_type().get_bit_width() == 32 {
            ecx.builder.build_int_z_extend(index, i64ty, "idx64")
        } else {
            index
        };
        let offset_c = i64ty.const_int(offset as u64, false);
        let eff = ecx.builder.build_int_add(index64, offset_c, "eff_addr");

        // Bounds check: eff + access_width must not exceed the cached memory size.
        // The memory-size global is read fresh at each check rather than cached
        // across calls, since `memory.grow` may have changed it.
        let mem_size_ptr = unsafe {
            ecx.builder
                .build_gep(ecx.vmctx, &[ctx.i32_type().const_int(1, false)], "mem_size_field")
        };
        let mem_size_casted = ecx
            .builder
            .build_bitcast(mem_size_ptr, i64ty.ptr_type(AddressSpace::default()), "mem_size_i64ptr");
        let mem_size = ecx
            .builder
            .build_load(mem_size_casted.into_pointer_value(), "mem_size")
            .into_int_value();

        let width_c = i64ty.const_int(access_width as u64, false);
        let needed = ecx.builder.build_int_add(eff, width_c, "needed");
        let oob = ecx
            .builder
            .build_int_compare(IntPredicate::UGT, needed, mem_size, "oob_check");

        let exception_block = ctx.insert_basic_block_after(ecx.builder.get_insert_block().unwrap(), "oob_trap");
        let continue_block = ctx.insert_basic_block_after(exception_block, "oob_ok");
        self.raise(
            ecx,
            oob,
            TrapCode::OutOfBoundsMemoryAccess,
            code_offset,
            exception_block,
            continue_block,
        );
        ecx.builder.position_at_end(exception_block);
        write_exception_id(ctx, ecx.builder, ecx.vmctx, TrapCode::OutOfBoundsMemoryAccess);
        ecx.builder.build_unconditional_branch(ecx.func.get_last_basic_block().unwrap());
        ecx.builder.position_at_end(continue_block);

        let addr = unsafe { ecx.builder.build_gep(base, &[eff], "access_addr") };
        Ok(addr)
    }

    fn lower_i64_const<'ctx>(
        &self,
        ctx: &'ctx Context,
        _ecx: &EmitCtx<'_, 'ctx>,
        _decls: &ModuleDecls<'_>,
        value: i64,
        _relocation: Option<&Relocation>,
    ) -> Result<IntValue<'ctx>, Error> {
        Ok(ctx.i64_type().const_int(value as u64, true))
    }

    fn call_indirect<'ctx>(
        &self,
        ctx: &'ctx Context,
        ecx: &mut EmitCtx<'_, 'ctx>,
        table_base: PointerValue<'ctx>,
        table_len: Option<IntValue<'ctx>>,
        index: IntValue<'ctx>,
        callee_ty: inkwell::types::FunctionType<'ctx>,
        canonical_type_index: u32,
        args: &[BasicValueEnum<'ctx>],
        code_offset: u32,
    ) -> Result<Option<BasicValueEnum<'ctx>>, Error> {
        let i64ty = ctx.i64_type();

        // 1. Bounds-check the index against the table length.
        if let Some(len) = table_len {
            let idx64 = ecx.builder.build_int_z_extend(index, i64ty, "idx64");
            let oob = ecx
                .builder
                .build_int_compare(IntPredicate::UGE, idx64, len, "table_oob");
            let trap_block = ctx.insert_basic_block_after(ecx.builder.get_insert_block().unwrap(), "undef_elem");
            let ok_block = ctx.insert_basic_block_after(trap_block, "elem_ok");
            ecx.builder.build_conditional_branch(oob, trap_block, ok_block);
            ecx.traps.push((code_offset, TrapCode::UndefinedElement));
            ecx.builder.position_at_end(trap_block);
            write_exception_id(ctx, ecx.builder, ecx.vmctx, TrapCode::UndefinedElement);
            ecx.builder.build_unconditional_branch(ecx.func.get_last_basic_block().unwrap());
            ecx.builder.position_at_end(ok_block);
        }

        // 2. Load the (signature, func_ptr) pair at `table_base[index]`.
        let slot = unsafe { ecx.builder.build_gep(table_base, &[index], "table_slot") };
        let sig_ptr = ecx
            .builder
            .build_struct_gep(slot, 0, "table_slot_sig")
            .map_err(|_| Error::IrBuild("table slot signature field".to_owned()))?;
        let sig = ecx.builder.build_load(sig_ptr, "slot_sig").into_int_value();
        let uninit = ecx.builder.build_int_compare(
            IntPredicate::EQ,
            sig,
            i64ty.const_int(u64::MAX, true),
            "slot_uninit",
        );
        let uninit_block = ctx.insert_basic_block_after(ecx.builder.get_insert_block().unwrap(), "uninit_elem");
        let after_uninit = ctx.insert_basic_block_after(uninit_block, "elem_init");
        ecx.builder.build_conditional_branch(uninit, uninit_block, after_uninit);
        ecx.traps.push((code_offset, TrapCode::UninitializedElement));
        ecx.builder.position_at_end(uninit_block);
        write_exception_id(ctx, ecx.builder, ecx.vmctx, TrapCode::UninitializedElement);
        ecx.builder.build_unconditional_branch(ecx.func.get_last_basic_block().unwrap());
        ecx.builder.position_at_end(after_uninit);

        let expected = i64ty.const_int(canonical_type_index as u64, false);
        let mismatch = ecx.builder.build_int_compare(IntPredicate::NE, sig, expected, "sig_mismatch");
        let mismatch_block = ctx.insert_basic_block_after(ecx.builder.get_insert_block().unwrap(), "bad_sig");
        let after_sig = ctx.insert_basic_block_after(mismatch_block, "sig_ok");
        ecx.builder.build_conditional_branch(mismatch, mismatch_block, after_sig);
        ecx.traps.push((code_offset, TrapCode::InvalidFunctionTypeIndex));
        ecx.builder.position_at_end(mismatch_block);
        write_exception_id(ctx, ecx.builder, ecx.vmctx, TrapCode::InvalidFunctionTypeIndex);
        ecx.builder.build_unconditional_branch(ecx.func.get_last_basic_block().unwrap());
        ecx.builder.position_at_end(after_sig);

        let fp_ptr = ecx
            .builder
            .build_struct_gep(slot, 1, "table_slot_fp")
            .map_err(|_| Error::IrBuild("table slot function-pointer field".to_owned()))?;
        let fp = ecx.builder.build_load(fp_ptr, "slot_fp").into_pointer_value();
        let null = fp.get_type().const_null();
        let is_null = ecx.builder.build_int_compare(
            IntPredicate::EQ,
            ecx.builder.build_ptr_to_int(fp, i64ty, "fp_as_i64"),
            ecx.builder.build_ptr_to_int(null, i64ty, "null_as_i64"),
            "fp_is_null",
        );
        let null_block = ctx.insert_basic_block_after(ecx.builder.get_insert_block().unwrap(), "unlinked_import");
        let after_null = ctx.insert_basic_block_after(null_block, "fp_ok");
        ecx.builder.build_conditional_branch(is_null, null_block, after_null);
        ecx.traps.push((code_offset, TrapCode::CallUnlinkedImportFunc));
        ecx.builder.position_at_end(null_block);
        write_exception_id(ctx, ecx.builder, ecx.vmctx, TrapCode::CallUnlinkedImportFunc);
        ecx.builder.build_unconditional_branch(ecx.func.get_last_basic_block().unwrap());
        ecx.builder.position_at_end(after_null);

        let callee_ptr_ty = callee_ty.ptr_type(AddressSpace::default());
        let casted = ecx.builder.build_bitcast(fp, callee_ptr_ty, "callee");
        let call = ecx
            .builder
            .build_call(inkwell::values::CallableValue::try_from(casted.into_pointer_value()).unwrap(), args, "calltmp");
        Ok(call.try_as_basic_value().left())
    }
}

pub struct NoSandbox;

impl LoweringStrategy for NoSandbox {
    fn is_sandboxed(&self) -> bool {
        false
    }

    fn memory_base<'ctx>(
        &self,
        ctx: &'ctx Context,
        ecx: &EmitCtx<'_, 'ctx>,
    ) -> Result<PointerValue<'ctx>, Error> {
        let i8ptr = ctx.i8_type().ptr_type(AddressSpace::default());
        let field = unsafe {
            ecx.builder.build_gep(
                ecx.vmctx,
                &[ctx.i32_type().const_int(0, false)],
                "memory_base_field",
            )
        };
        let casted = ecx
            .builder
            .build_bitcast(field, i8ptr.ptr_type(AddressSpace::default()), "memory_base_ptr");
        Ok(ecx.builder.build_load(casted.into_pointer_value(), "memory_base").into_pointer_value())
    }

    fn effective_address<'ctx>(
        &self,
        ctx: &'ctx Context,
        ecx: &mut EmitCtx<'_, 'ctx>,
        base: PointerValue<'ctx>,
        index: IntValue<'ctx>,
        offset: u32,
        _access_width: u32,
        _code_offset: u32,
    ) -> Result<PointerValue<'ctx>, Error> {
        let i64ty = ctx.i64_type();
        let index64 = if index.get_type().get_bit_width() == 32 {
            ecx.builder.build_int_z_extend(index, i64ty, "idx64")
        } else {
            index
        };
        let offset_c = i64ty.const_int(offset as u64, false);
        let eff = ecx.builder.build_int_add(index64, offset_c, "eff_addr");
        let addr = unsafe { ecx.builder.build_gep(base, &[eff], "access_addr") };
        Ok(addr)
    }

    fn lower_i64_const<'ctx>(
        &self,
        ctx: &'ctx Context,
        ecx: &EmitCtx<'_, 'ctx>,
        decls: &ModuleDecls<'_>,
        value: i64,
        relocation: Option<&Relocation>,
    ) -> Result<IntValue<'ctx>, Error> {
        let reloc = match relocation {
            None => return Ok(ctx.i64_type().const_int(value as u64, true)),
            Some(r) => r,
        };
        match reloc.kind {
            RelocationKind::MemoryAddrSleb64 | RelocationKind::MemoryAddrI64 => {
                let symbol = decls.module.symbols.get(reloc.symbol_index)?;
                if symbol.kind != SymbolKind::Data {
                    return Err(Error::UnresolvedRelocation {
                        kind: format!("{:?}", reloc.kind),
                        offset: reloc.offset as usize,
                    });
                }
                let data_symbol = symbol.data.as_ref().ok_or_else(|| Error::UnresolvedRelocation {
                    kind: format!("{:?}", reloc.kind),
                    offset: reloc.offset as usize,
                })?;
                let base_offset = decls.data_segment_base_offset(data_symbol.segment_index)?;
                let resolved = base_offset as i64 + data_symbol.offset_in_segment as i64 + value;
                log::debug!(
                    "resolving {:?} against data symbol {:?} (segment {}, base {}) -> {}",
                    reloc.kind,
                    symbol.name,
                    data_symbol.segment_index,
                    base_offset,
                    resolved
                );
                let mem_base = self.memory_base(ctx, ecx)?;
                let addend = ctx.i64_type().const_int(resolved as u64, true);
                let addr = unsafe { ecx.builder.build_gep(mem_base, &[addend], "reloc_mem_addr") };
                Ok(ecx.builder.build_ptr_to_int(addr, ctx.i64_type(), "reloc_mem_addr_i64"))
            }
            RelocationKind::TableIndexSleb64 | RelocationKind::TableIndexI64 => {
                Err(Error::Unsupported(
                    "table-index relocation resolution requires the module's declared \
                     function value; use `crate::translator::consts::lower_i64_const` \
                     instead of the strategy directly"
                        .to_owned(),
                ))
            }
            other => Err(Error::UnsupportedRelocation(format!("{:?}", other))),
        }
    }

    fn call_indirect<'ctx>(
        &self,
        ctx: &'ctx Context,
        ecx: &mut EmitCtx<'_, 'ctx>,
        _table_base: PointerValue<'ctx>,
        _table_len: Option<IntValue<'ctx>>,
        index: IntValue<'ctx>,
        callee_ty: inkwell::types::FunctionType<'ctx>,
        _canonical_type_index: u32,
        args: &[BasicValueEnum<'ctx>],
        _code_offset: u32,
    ) -> Result<Option<BasicValueEnum<'ctx>>, Error> {
        // The popped "index" is already a host function pointer: element segments
        // populate table cells with relocation-resolved pointers, not Wasm indices.
        let callee_ptr_ty = callee_ty.ptr_type(AddressSpace::default());
        let as_ptr = ecx
            .builder
            .build_int_to_ptr(index, ctx.i8_type().ptr_type(AddressSpace::default()), "idx_as_ptr");
        let casted = ecx.builder.build_bitcast(as_ptr, callee_ptr_ty, "callee");
        let call = ecx
            .builder
            .build_call(inkwell::values::CallableValue::try_from(casted.into_pointer_value()).unwrap(), args, "calltmp");
        Ok(call.try_as_basic_value().left())
    }
}
