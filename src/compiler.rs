//! Top-level compilation orchestration: parses a Wasm binary, builds the module
//! graph, declares every function/global/table in the LLVM module, and runs the
//! opcode dispatcher over each function body.

use crate::decls::ModuleDecls;
use crate::env::{LoweringStrategy, NoSandbox, Sandboxed};
use crate::error::Error;
use crate::frontend;
use crate::heap::HeapSettings;
use crate::runtime::{runtime_func_type, RuntimeFunc};
use crate::table::{self, Elem};
use crate::traps::TrapSite;
use crate::types::{lower, ValType};
use inkwell::context::Context;
use inkwell::module::Module as LlvmModule;
use inkwell::values::{BasicMetadataValueEnum, FunctionValue, PointerValue};
use inkwell::AddressSpace;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptLevel {
    None,
    Speed,
    SpeedAndSize,
}

impl Default for OptLevel {
    fn default() -> Self {
        OptLevel::SpeedAndSize
    }
}

#[derive(Clone, Debug)]
pub struct CompilerOptions {
    pub sandboxed: bool,
    pub opt_level: OptLevel,
    pub heap_settings: HeapSettings,
    /// Emit a stack-overflow check on every write to the auxiliary stack top
    /// global, trapping before the aux stack runs into the heap.
    pub aux_stack_check: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            sandboxed: true,
            opt_level: OptLevel::default(),
            heap_settings: HeapSettings::default(),
            aux_stack_check: false,
        }
    }
}

/// An active data segment's resolved placement and owned bytes, carried from
/// `ModuleDecls::data_segments` into the compiled artifact so `output` can emit it
/// as an initializer the host loader applies before running the start function.
#[derive(Clone, Debug)]
pub struct DataSegmentInit {
    pub memory_index: u32,
    pub base_offset: u64,
    pub bytes: Vec<u8>,
}

/// A finished compilation: the populated LLVM module plus the per-function trap
/// manifests `output` needs to emit the sidecar that maps a trapping address back
/// to a `TrapCode`.
pub struct CompiledModule<'ctx> {
    pub llvm_module: LlvmModule<'ctx>,
    pub function_traps: Vec<(String, Vec<TrapSite>)>,
    pub heap: Option<crate::heap::HeapSpec>,
    pub data_segments: Vec<DataSegmentInit>,
}

pub fn compile<'ctx>(
    ctx: &'ctx Context,
    wasm: &[u8],
    module_name: &str,
    opts: &CompilerOptions,
) -> Result<CompiledModule<'ctx>, Error> {
    let parsed = frontend::parse(wasm)?;
    let decls = ModuleDecls::new(parsed, &opts.heap_settings)?;
    log::debug!(
        "module {} has {} functions ({} imported), {} globals, {} data segments",
        module_name,
        decls.functions.len(),
        decls.module.imports.funcs.len(),
        decls.globals.len(),
        decls.data_segments.len(),
    );

    let llvm_module = ctx.create_module(module_name);

    let vmctx_struct = ctx.opaque_struct_type("vmctx");
    vmctx_struct.set_body(
        &[
            ctx.i8_type().ptr_type(AddressSpace::default()).into(),
            ctx.i64_type().into(),
            ctx.i32_type().into(),
        ],
        false,
    );
    let vmctx_ptr_type: inkwell::types::BasicTypeEnum = vmctx_struct.ptr_type(AddressSpace::default()).into();

    if opts.sandboxed {
        declare_runtime_hostcalls(ctx, &llvm_module, vmctx_ptr_type);
    }

    let func_values = declare_functions(ctx, &llvm_module, &decls, vmctx_ptr_type, opts.sandboxed)?;
    declare_import_func_ptrs(ctx, &llvm_module, &decls);
    declare_export_wrappers(ctx, &llvm_module, &decls, &func_values, vmctx_ptr_type, opts.sandboxed)?;
    declare_globals(ctx, &llvm_module, &decls, opts.sandboxed)?;
    let tables = declare_tables(ctx, &llvm_module, &decls, &func_values, opts.sandboxed)?;

    let strategy: Box<dyn LoweringStrategy> = if opts.sandboxed {
        Box::new(Sandboxed::new())
    } else {
        Box::new(NoSandbox)
    };

    let import_count = decls.module.imports.funcs.len() as u32;
    let mut function_traps = Vec::with_capacity(decls.module.code.len());

    for (i, (_offset, code)) in decls.module.code.iter().enumerate() {
        let func_index = import_count + i as u32;
        let decl = decls.func(func_index)?;
        let func_value = func_values[func_index as usize];
        let func_ty = decls.func_type(func_index).clone();

        let body = wasmparser::FunctionBody::new(0, code);
        let declared_locals = read_declared_locals(&body)?;
        let operators_reader = body.get_operators_reader()?;
        let operators_tail = &code[operators_reader.original_position()..];

        let mut fcx = crate::function::FuncContext::new(
            ctx,
            &llvm_module,
            &decls,
            &func_values,
            &tables,
            func_value,
            &func_ty.params,
            &declared_locals,
            operators_tail,
            opts.sandboxed,
            opts.aux_stack_check,
        )
        .map_err(|e| Error::FunctionTranslation {
            symbol: decl.symbol.clone(),
            source: Box::new(e),
        })?;

        crate::translator::translate_function(
            &mut fcx,
            ctx,
            &llvm_module,
            strategy.as_ref(),
            operators_reader,
            func_ty.results.clone(),
        )
        .map_err(|e| Error::FunctionTranslation {
            symbol: decl.symbol.clone(),
            source: Box::new(e),
        })?;

        let sites = crate::traps::TrapManifest::from_sites(fcx.traps).finish();
        function_traps.push((decl.symbol.clone(), sites));
    }

    let data_segments = decls
        .data_segments
        .iter()
        .map(|seg| DataSegmentInit {
            memory_index: seg.memory_index,
            base_offset: seg.base_offset,
            bytes: seg.bytes.to_vec(),
        })
        .collect();

    Ok(CompiledModule {
        llvm_module,
        function_traps,
        heap: decls.heap.clone(),
        data_segments,
    })
}

/// Declares the `import_func_ptrs` global: one host function pointer slot per
/// imported function, null-initialized until a host loader links them. A direct
/// `call` to an imported function indirects through this array rather than
/// calling the declared extern symbol, so an unlinked import traps instead of
/// faulting on an unresolved symbol.
fn declare_import_func_ptrs<'ctx>(ctx: &'ctx Context, llvm_module: &LlvmModule<'ctx>, decls: &ModuleDecls<'_>) {
    let import_count = decls.module.imports.funcs.len();
    let i8ptr = ctx.i8_type().ptr_type(AddressSpace::default());
    let array_ty = i8ptr.array_type(import_count as u32);
    let global = llvm_module.add_global(array_ty, None, "import_func_ptrs");
    let nulls: Vec<_> = (0..import_count).map(|_| i8ptr.const_null()).collect();
    global.set_initializer(&array_ty.const_array(&nulls));
    log::debug!("declared import_func_ptrs[{}]", import_count);
}

/// For every defined function exported under one or more names, declares a thin
/// wrapper function under each export name that forwards its arguments to the
/// real function and returns its result. This keeps the function's own symbol
/// (`guest_func_N` or its debug name) stable across export renaming while still
/// giving a host loader a directly callable symbol per Wasm export.
fn declare_export_wrappers<'ctx>(
    ctx: &'ctx Context,
    llvm_module: &LlvmModule<'ctx>,
    decls: &ModuleDecls<'_>,
    func_values: &[FunctionValue<'ctx>],
    vmctx_ptr_type: inkwell::types::BasicTypeEnum<'ctx>,
    sandboxed: bool,
) -> Result<(), Error> {
    for decl in &decls.functions {
        if decl.is_import() || decl.export_names.is_empty() {
            continue;
        }
        let func_ty = decls.func_type(decl.func_index);
        let fn_ty = func_ty.lower_signature(ctx, vmctx_ptr_type, sandboxed);
        let target = func_values[decl.func_index as usize];

        for export_name in &decl.export_names {
            log::debug!("wrapping {} under export name {}", decl.symbol, export_name);
            let wrapper = llvm_module.add_function(export_name, fn_ty, None);
            let builder = ctx.create_builder();
            let entry = ctx.append_basic_block(wrapper, "entry");
            builder.position_at_end(entry);

            let args: Vec<BasicMetadataValueEnum> = wrapper.get_param_iter().map(|p| p.into()).collect();
            let call = builder.build_call(target, &args, "wrapped_call");
            match call.try_as_basic_value().left() {
                Some(v) => {
                    builder.build_return(Some(&v));
                }
                None => {
                    builder.build_return(None);
                }
            }
        }
    }
    Ok(())
}

fn declare_runtime_hostcalls<'ctx>(
    ctx: &'ctx Context,
    llvm_module: &LlvmModule<'ctx>,
    vmctx_ptr_type: inkwell::types::BasicTypeEnum<'ctx>,
) {
    for f in [RuntimeFunc::MemSize, RuntimeFunc::MemGrow] {
        let rt = runtime_func_type(f);
        let mut params = vec![vmctx_ptr_type];
        for p in &rt.params {
            params.push(lower(ctx, *p, true));
        }
        let param_meta: Vec<_> = params.iter().map(|t| (*t).into()).collect();
        let fn_ty = match rt.results.first() {
            Some(r) => lower(ctx, *r, true).fn_type(&param_meta, false),
            None => ctx.void_type().fn_type(&param_meta, false),
        };
        llvm_module.add_function(rt.name, fn_ty, None);
    }
}

fn declare_functions<'ctx>(
    ctx: &'ctx Context,
    llvm_module: &LlvmModule<'ctx>,
    decls: &ModuleDecls<'_>,
    vmctx_ptr_type: inkwell::types::BasicTypeEnum<'ctx>,
    sandboxed: bool,
) -> Result<Vec<FunctionValue<'ctx>>, Error> {
    let mut out = Vec::with_capacity(decls.functions.len());
    for decl in &decls.functions {
        let func_ty = decls.func_type(decl.func_index);
        let fn_ty = func_ty.lower_signature(ctx, vmctx_ptr_type, sandboxed);
        let name = match &decl.import_name {
            Some((module, field)) => format!("{}::{}", module, field),
            None => decl.symbol.clone(),
        };
        let func_value = llvm_module.add_function(&name, fn_ty, None);
        out.push(func_value);
    }
    Ok(out)
}

fn declare_globals<'ctx>(
    ctx: &'ctx Context,
    llvm_module: &LlvmModule<'ctx>,
    decls: &ModuleDecls<'_>,
    sandboxed: bool,
) -> Result<(), Error> {
    for (i, spec) in decls.globals.iter().enumerate() {
        let llvm_ty = lower(ctx, spec.ty, sandboxed);
        let name = crate::translator::memory::global_symbol_name(i as u32, spec);
        let global = llvm_module.add_global(llvm_ty, None, &name);
        match &spec.variant {
            crate::decls::GlobalVariant::Def(def) => {
                let init: inkwell::values::BasicValueEnum = match def {
                    crate::decls::GlobalDef::I32(v) => ctx.i32_type().const_int(*v as u32 as u64, true).into(),
                    crate::decls::GlobalDef::I64(v) => ctx.i64_type().const_int(*v as u64, true).into(),
                    crate::decls::GlobalDef::F32(v) => ctx.f32_type().const_float(*v as f64).into(),
                    crate::decls::GlobalDef::F64(v) => ctx.f64_type().const_float(*v).into(),
                };
                global.set_initializer(&init);
            }
            crate::decls::GlobalVariant::Import { .. } => {
                // Resolved externally; no initializer to set here.
            }
        }
    }
    Ok(())
}

fn declare_tables<'ctx>(
    ctx: &'ctx Context,
    llvm_module: &LlvmModule<'ctx>,
    decls: &ModuleDecls<'_>,
    func_values: &[FunctionValue<'ctx>],
    sandboxed: bool,
) -> Result<Vec<(PointerValue<'ctx>, u32)>, Error> {
    let elem_ty = ctx.struct_type(
        &[ctx.i64_type().into(), ctx.i8_type().ptr_type(AddressSpace::default()).into()],
        false,
    );
    let fp_ptr_ty = ctx.i8_type().ptr_type(AddressSpace::default());

    let mut out = Vec::with_capacity(decls.module.tables.len());
    for (table_index, _table) in decls.module.tables.iter().enumerate() {
        let elems = table::table_elements(decls, table_index as u32)?;
        let mut slot_values = Vec::with_capacity(elems.len());
        for elem in &elems {
            let (sig, fp) = match elem {
                Elem::Empty => (u64::MAX, fp_ptr_ty.const_null()),
                Elem::Func(func_index) => {
                    let canonical = decls.func(*func_index)?.canonical_type_index as u64;
                    let func_value = func_values
                        .get(*func_index as usize)
                        .ok_or_else(|| Error::FunctionIndexError(func_index.to_string()))?;
                    if !sandboxed {
                        // Enforce the Open Question decision: a no-sandbox table slot
                        // must be backed by a table-index relocation, not a bare
                        // Wasm-level function reference.
                        table::resolve_no_sandbox_symbol(decls, *func_index)?;
                    }
                    let fp = func_value
                        .as_global_value()
                        .as_pointer_value()
                        .const_cast(fp_ptr_ty);
                    (canonical, fp)
                }
            };
            slot_values.push(elem_ty.const_named_struct(&[
                ctx.i64_type().const_int(sig, false).into(),
                fp.into(),
            ]));
        }

        let array_ty = elem_ty.array_type(slot_values.len() as u32);
        let global = llvm_module.add_global(array_ty, None, &format!("guest_table_{}", table_index));
        global.set_initializer(&array_ty.const_array(&slot_values));

        let base = global
            .as_pointer_value()
            .const_cast(elem_ty.ptr_type(AddressSpace::default()));
        out.push((base, slot_values.len() as u32));
    }
    Ok(out)
}

/// Reads the `(count, type)*` local-declaration prefix of a function body and
/// expands it into one `ValType` per local slot.
fn read_declared_locals(body: &wasmparser::FunctionBody<'_>) -> Result<Vec<ValType>, Error> {
    let mut reader = body.get_locals_reader()?;
    let mut out = Vec::new();
    for _ in 0..reader.get_count() {
        let (count, ty) = reader.read()?;
        for _ in 0..count {
            out.push(ValType::from_wasmparser(ty));
        }
    }
    Ok(out)
}
