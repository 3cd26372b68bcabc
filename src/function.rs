//! Function Context Builder: for a single Wasm function, creates the IR function,
//! allocates local slots, and prepares the entry/return blocks and per-function
//! flags the dispatcher and lowerings consult.

use crate::decls::ModuleDecls;
use crate::error::Error;
use crate::stack::{BlockFrame, FrameKind, SymbolicStack};
use crate::traps::TrapCode;
use crate::types::{lower, ValType};
use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::module::Module as LlvmModule;
use inkwell::values::{BasicValueEnum, FunctionValue, PointerValue};
use inkwell::AddressSpace;

/// Flags populated by a pre-scan of a function's opcodes, consulted by lowerings to
/// decide whether to cache the memory base pointer, whether a stack-overflow check
/// is worth emitting, and so on.
#[derive(Debug, Default, Clone, Copy)]
pub struct FuncFlags {
    pub has_memory_operations: bool,
    pub has_op_memory_grow: bool,
    pub has_op_call: bool,
    pub has_op_call_indirect: bool,
    /// Set when the function writes the auxiliary stack top global, so the
    /// lowering knows a stack-overflow check is worth emitting there.
    pub has_op_set_global_aux_stack: bool,
}

pub fn scan_flags(code: &[u8], aux_stack_global: Option<u32>) -> Result<FuncFlags, Error> {
    let mut flags = FuncFlags::default();
    let reader = wasmparser::OperatorsReader::new(wasmparser::BinaryReader::new(code));
    for op in reader {
        let op = op?;
        match op {
            wasmparser::Operator::I32Load { .. }
            | wasmparser::Operator::I64Load { .. }
            | wasmparser::Operator::F32Load { .. }
            | wasmparser::Operator::F64Load { .. }
            | wasmparser::Operator::I32Store { .. }
            | wasmparser::Operator::I64Store { .. }
            | wasmparser::Operator::F32Store { .. }
            | wasmparser::Operator::F64Store { .. } => flags.has_memory_operations = true,
            wasmparser::Operator::MemoryGrow { .. } => {
                flags.has_memory_operations = true;
                flags.has_op_memory_grow = true;
            }
            wasmparser::Operator::MemorySize { .. } => flags.has_memory_operations = true,
            wasmparser::Operator::Call { .. } => flags.has_op_call = true,
            wasmparser::Operator::CallIndirect { .. } => flags.has_op_call_indirect = true,
            wasmparser::Operator::GlobalSet { global_index } if Some(global_index) == aux_stack_global => {
                flags.has_op_set_global_aux_stack = true;
            }
            _ => {}
        }
    }
    Ok(flags)
}

/// Per-function state threaded through the opcode dispatcher.
pub struct FuncContext<'a, 'ctx> {
    pub decls: &'a ModuleDecls<'a>,
    /// Every function declared in the LLVM module so far, indexed by Wasm function
    /// index, so call/const lowering can reference another function's value
    /// without re-declaring it.
    pub func_values: &'a [FunctionValue<'ctx>],
    /// Table base pointer and static element count, one entry per declared table.
    pub tables: &'a [(PointerValue<'ctx>, u32)],
    pub func: FunctionValue<'ctx>,
    pub vmctx: PointerValue<'ctx>,
    pub builder: Builder<'ctx>,
    pub locals: Vec<PointerValue<'ctx>>,
    pub local_types: Vec<ValType>,
    pub stack: SymbolicStack<'ctx>,
    pub flags: FuncFlags,
    pub memory_base_cache: Option<PointerValue<'ctx>>,
    pub return_block: inkwell::basic_block::BasicBlock<'ctx>,
    pub traps: Vec<(u32, TrapCode)>,
    pub extra_result_slots: Vec<PointerValue<'ctx>>,
    pub sandboxed: bool,
    pub aux_stack_check: bool,
    /// Set once a `br`/`br_table`/`unreachable`/`return` has terminated the current
    /// block; subsequent opcodes up to the matching `else`/`end` are decoded (to keep
    /// the frame stack in sync) but emit no IR.
    pub unreachable: bool,
}

impl<'a, 'ctx> FuncContext<'a, 'ctx> {
    /// Builds the entry block, allocates locals (Wasm parameters first, then
    /// declared locals zero-initialized), and creates the shared return block every
    /// trapping and non-trapping exit path converges on.
    pub fn new(
        ctx: &'ctx Context,
        llvm_module: &LlvmModule<'ctx>,
        decls: &'a ModuleDecls<'a>,
        func_values: &'a [FunctionValue<'ctx>],
        tables: &'a [(PointerValue<'ctx>, u32)],
        func: FunctionValue<'ctx>,
        param_types: &[ValType],
        declared_locals: &[ValType],
        code: &[u8],
        sandboxed: bool,
        aux_stack_check: bool,
    ) -> Result<Self, Error> {
        let entry = ctx.append_basic_block(func, "entry");
        let builder = ctx.create_builder();
        builder.position_at_end(entry);

        let vmctx = func
            .get_nth_param(0)
            .expect("every function takes vmctx as its first parameter")
            .into_pointer_value();

        let mut locals = Vec::new();
        let mut local_types = Vec::new();
        let mut extra_result_slots = Vec::new();

        for (i, ty) in param_types.iter().enumerate() {
            let alloca = builder.build_alloca(lower(ctx, *ty, sandboxed), &format!("local{}", i));
            builder.build_store(alloca, func.get_nth_param(i as u32 + 1).unwrap());
            locals.push(alloca);
            local_types.push(*ty);
        }
        for (i, ty) in declared_locals.iter().enumerate() {
            let alloca = builder.build_alloca(lower(ctx, *ty, sandboxed), &format!("local{}", param_types.len() + i));
            let zero: BasicValueEnum = match ty {
                ValType::I32 => ctx.i32_type().const_zero().into(),
                ValType::I64 => ctx.i64_type().const_zero().into(),
                ValType::F32 => ctx.f32_type().const_zero().into(),
                ValType::F64 => ctx.f64_type().const_zero().into(),
                ValType::V128 => ctx.i128_type().const_zero().into(),
                ValType::FuncRef => {
                    if sandboxed {
                        ctx.i32_type().const_zero().into()
                    } else {
                        ctx.i8_type().ptr_type(AddressSpace::default()).const_null().into()
                    }
                }
                ValType::Void => return Err(Error::IrBuild("void local".to_owned())),
            };
            builder.build_store(alloca, zero);
            locals.push(alloca);
            local_types.push(*ty);
        }

        let param_count = func.count_params() as usize - 1 /* vmctx */ - param_types.len();
        for i in 0..param_count {
            let idx = (1 + param_types.len() + i) as u32;
            extra_result_slots.push(func.get_nth_param(idx).unwrap().into_pointer_value());
        }

        let flags = scan_flags(code, decls.aux_stack_global)?;
        let return_block = ctx.append_basic_block(func, "return");

        let _ = llvm_module;
        Ok(Self {
            decls,
            func_values,
            tables,
            func,
            vmctx,
            builder,
            locals,
            local_types,
            stack: SymbolicStack::new(),
            flags,
            memory_base_cache: None,
            return_block,
            traps: Vec::new(),
            extra_result_slots,
            sandboxed,
            aux_stack_check,
            unreachable: false,
        })
    }

    pub fn enter_function_frame(&mut self, result_types: Vec<ValType>) {
        let frame = BlockFrame {
            kind: FrameKind::Function,
            param_types: Vec::new(),
            result_types,
            target_block: self.return_block,
            merge_block: self.return_block,
            else_block: None,
            incoming: vec![Vec::new(); 0],
            stack_height_on_entry: 0,
            reachable: true,
        };
        let n = frame.result_types.len();
        let mut frame = frame;
        frame.incoming = vec![Vec::new(); n];
        self.stack.enter_frame(frame);
    }
}
