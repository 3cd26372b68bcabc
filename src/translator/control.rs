//! Structured control-flow lowering: Wasm's block/loop/if nesting is converted
//! into an LLVM CFG with merge-point phi nodes, mirroring how the dispatcher
//! threads a single `SymbolicStack` through the whole function body.

use crate::decls::ModuleDecls;
use crate::error::Error;
use crate::function::FuncContext;
use crate::stack::{BlockFrame, FrameKind};
use crate::types::{FuncType, ValType};
use inkwell::context::Context;
use inkwell::values::BasicValueEnum;
use inkwell::IntPredicate;

/// Resolves a Wasm block-type immediate into its param/result signature. A `Type`
/// immediate names an empty signature, a single value type names a single result,
/// and a function-type index can carry both params and results (multi-value).
pub fn resolve_block_type(
    decls: &ModuleDecls,
    ty: wasmparser::TypeOrFuncType,
) -> Result<FuncType, Error> {
    match ty {
        wasmparser::TypeOrFuncType::Type(wasmparser::Type::EmptyBlockType) => {
            Ok(FuncType { params: vec![], results: vec![] })
        }
        wasmparser::TypeOrFuncType::Type(t) => Ok(FuncType {
            params: vec![],
            results: vec![ValType::from_wasmparser(t)],
        }),
        wasmparser::TypeOrFuncType::FuncType(index) => decls
            .module
            .types
            .get(index as usize)
            .cloned()
            .ok_or_else(|| Error::SignatureIndexError(index.to_string())),
    }
}

/// Finalizes the values currently on top of the operand stack as this block's
/// contribution to its own merge point, recording them as phi inputs from the
/// current insertion block. No-op if the current position is already unreachable.
fn seal_fallthrough<'ctx>(fcx: &mut FuncContext<'_, 'ctx>, arity: usize) {
    if fcx.unreachable {
        return;
    }
    let current_block = fcx.builder.get_insert_block().unwrap();
    let values: Vec<BasicValueEnum> = fcx.stack.top_n(arity).iter().map(|e| e.value).collect();
    fcx.stack.current_frame_mut().record_incoming(&values, current_block);
}

pub fn translate_block<'ctx>(
    fcx: &mut FuncContext<'_, 'ctx>,
    ctx: &'ctx Context,
    sig: FuncType,
) -> Result<(), Error> {
    let merge_block = ctx.insert_basic_block_after(fcx.builder.get_insert_block().unwrap(), "block_end");
    let n = sig.results.len();
    let frame = BlockFrame {
        kind: FrameKind::Block,
        param_types: sig.params,
        result_types: sig.results,
        target_block: merge_block,
        merge_block,
        else_block: None,
        incoming: vec![Vec::new(); n],
        stack_height_on_entry: fcx.stack.height(),
        reachable: !fcx.unreachable,
    };
    fcx.stack.enter_frame(frame);
    Ok(())
}

pub fn translate_loop<'ctx>(
    fcx: &mut FuncContext<'_, 'ctx>,
    ctx: &'ctx Context,
    sig: FuncType,
) -> Result<(), Error> {
    let was_unreachable = fcx.unreachable;
    let header = ctx.insert_basic_block_after(fcx.builder.get_insert_block().unwrap(), "loop_header");
    if !was_unreachable {
        fcx.builder.build_unconditional_branch(header);
    }
    let merge_block = ctx.insert_basic_block_after(header, "loop_end");
    fcx.builder.position_at_end(header);

    let n = sig.results.len();
    let frame = BlockFrame {
        kind: FrameKind::Loop,
        param_types: sig.params,
        result_types: sig.results,
        target_block: header,
        merge_block,
        else_block: None,
        incoming: vec![Vec::new(); n],
        stack_height_on_entry: fcx.stack.height(),
        reachable: !was_unreachable,
    };
    fcx.stack.enter_frame(frame);
    fcx.unreachable = was_unreachable;
    Ok(())
}

pub fn translate_if<'ctx>(
    fcx: &mut FuncContext<'_, 'ctx>,
    ctx: &'ctx Context,
    sig: FuncType,
) -> Result<(), Error> {
    let was_unreachable = fcx.unreachable;
    // Per the validator's polymorphic-stack rule, code after `unreachable` may
    // contain an `if` whose condition was never actually pushed; don't touch the
    // operand stack in that case, only keep the block structure in sync.
    let cond = if was_unreachable {
        None
    } else {
        Some(fcx.stack.pop().value.into_int_value())
    };

    let then_block = ctx.insert_basic_block_after(fcx.builder.get_insert_block().unwrap(), "if_then");
    let else_block = ctx.insert_basic_block_after(then_block, "if_else");
    let merge_block = ctx.insert_basic_block_after(else_block, "if_end");

    if let Some(cond) = cond {
        let zero = cond.get_type().const_zero();
        let test = fcx.builder.build_int_compare(IntPredicate::NE, cond, zero, "if_cond");
        fcx.builder.build_conditional_branch(test, then_block, else_block);
    }
    fcx.builder.position_at_end(then_block);

    let n = sig.results.len();
    let frame = BlockFrame {
        kind: FrameKind::If,
        param_types: sig.params,
        result_types: sig.results,
        target_block: merge_block,
        merge_block,
        else_block: Some(else_block),
        incoming: vec![Vec::new(); n],
        stack_height_on_entry: fcx.stack.height(),
        reachable: !was_unreachable,
    };
    fcx.stack.enter_frame(frame);
    fcx.unreachable = was_unreachable;
    Ok(())
}

pub fn translate_else<'ctx>(fcx: &mut FuncContext<'_, 'ctx>, _ctx: &'ctx Context) -> Result<(), Error> {
    let arity = fcx.stack.current_frame().result_types.len();
    seal_fallthrough(fcx, arity);

    let frame = fcx.stack.current_frame_mut();
    let else_block = frame.else_block.expect("`else` only valid inside an `if` frame");
    let entry_height = frame.stack_height_on_entry;
    fcx.stack.truncate(entry_height);
    fcx.builder.position_at_end(else_block);
    fcx.unreachable = !fcx.stack.current_frame().reachable;
    Ok(())
}

pub fn translate_end<'ctx>(fcx: &mut FuncContext<'_, 'ctx>, ctx: &'ctx Context) -> Result<(), Error> {
    let arity = fcx.stack.current_frame().result_types.len();
    seal_fallthrough(fcx, arity);
    if !fcx.unreachable {
        let merge = fcx.stack.current_frame().merge_block;
        fcx.builder.build_unconditional_branch(merge);
    }

    let frame = fcx.stack.exit_frame();

    // An `if` with no `else` falls through to its own merge block carrying the
    // block's param values as its results (only valid when params == results).
    if frame.kind == FrameKind::If {
        if let Some(else_block) = frame.else_block {
            if else_block.get_first_use().is_none() && else_block.get_terminator().is_none() {
                fcx.builder.position_at_end(else_block);
                fcx.builder.build_unconditional_branch(frame.merge_block);
            }
        }
    }

    fcx.builder.position_at_end(frame.merge_block);
    fcx.stack.truncate(frame.stack_height_on_entry);

    for (slot, incoming) in frame.incoming.iter().enumerate() {
        let ty = frame.result_types[slot];
        if incoming.is_empty() {
            // Unreachable merge point; synthesize a poison-free placeholder so the
            // stack stays well-typed for code a validator has already ruled dead.
            fcx.stack.push(zero_value(ctx, ty, fcx.sandboxed), ty);
            continue;
        }
        let llvm_ty = crate::types::lower(ctx, ty, fcx.sandboxed);
        let phi = fcx.builder.build_phi(llvm_ty, "merge");
        for inc in incoming {
            phi.add_incoming(&[(&inc.value as &dyn inkwell::values::BasicValue, inc.block)]);
        }
        fcx.stack.push(phi.as_basic_value(), ty);
    }

    fcx.unreachable = false;
    Ok(())
}

fn zero_value<'ctx>(ctx: &'ctx Context, ty: ValType, sandboxed: bool) -> BasicValueEnum<'ctx> {
    match ty {
        ValType::I32 => ctx.i32_type().const_zero().into(),
        ValType::I64 => ctx.i64_type().const_zero().into(),
        ValType::F32 => ctx.f32_type().const_zero().into(),
        ValType::F64 => ctx.f64_type().const_zero().into(),
        ValType::V128 => ctx.i128_type().const_zero().into(),
        ValType::FuncRef => {
            if sandboxed {
                ctx.i32_type().const_zero().into()
            } else {
                ctx.i8_type().ptr_type(inkwell::AddressSpace::default()).const_null().into()
            }
        }
        ValType::Void => ctx.i32_type().const_zero().into(),
    }
}

pub fn translate_br<'ctx>(fcx: &mut FuncContext<'_, 'ctx>, relative_depth: u32) -> Result<(), Error> {
    if fcx.unreachable {
        return Ok(());
    }
    let arity = fcx.stack.frame_at_depth(relative_depth).branch_arity();
    let values: Vec<BasicValueEnum> = fcx.stack.top_n(arity).iter().map(|e| e.value).collect();
    let current_block = fcx.builder.get_insert_block().unwrap();
    let target = fcx.stack.frame_at_depth(relative_depth).branch_target();
    fcx.stack
        .frame_at_depth_mut(relative_depth)
        .record_incoming(&values, current_block);
    fcx.builder.build_unconditional_branch(target);
    fcx.unreachable = true;
    Ok(())
}

pub fn translate_br_if<'ctx>(
    fcx: &mut FuncContext<'_, 'ctx>,
    ctx: &'ctx Context,
    relative_depth: u32,
) -> Result<(), Error> {
    if fcx.unreachable {
        return Ok(());
    }
    let cond = fcx.stack.pop().value.into_int_value();
    let arity = fcx.stack.frame_at_depth(relative_depth).branch_arity();
    let values: Vec<BasicValueEnum> = fcx.stack.top_n(arity).iter().map(|e| e.value).collect();
    let current_block = fcx.builder.get_insert_block().unwrap();
    let target = fcx.stack.frame_at_depth(relative_depth).branch_target();
    fcx.stack
        .frame_at_depth_mut(relative_depth)
        .record_incoming(&values, current_block);

    let cont = ctx.insert_basic_block_after(current_block, "br_if_cont");
    let zero = cond.get_type().const_zero();
    let test = fcx.builder.build_int_compare(IntPredicate::NE, cond, zero, "br_if_cond");
    fcx.builder.build_conditional_branch(test, target, cont);
    fcx.builder.position_at_end(cont);
    Ok(())
}

pub fn translate_br_table<'ctx>(
    fcx: &mut FuncContext<'_, 'ctx>,
    ctx: &'ctx Context,
    targets: &[u32],
    default: u32,
) -> Result<(), Error> {
    if fcx.unreachable {
        return Ok(());
    }
    let index = fcx.stack.pop().value.into_int_value();
    let current_block = fcx.builder.get_insert_block().unwrap();

    let default_arity = fcx.stack.frame_at_depth(default).branch_arity();
    let values: Vec<BasicValueEnum> = fcx.stack.top_n(default_arity).iter().map(|e| e.value).collect();
    for &depth in targets.iter().chain(std::iter::once(&default)) {
        fcx.stack.frame_at_depth_mut(depth).record_incoming(&values, current_block);
    }

    let default_block = fcx.stack.frame_at_depth(default).branch_target();
    let cases: Vec<(inkwell::values::IntValue<'ctx>, inkwell::basic_block::BasicBlock<'ctx>)> = targets
        .iter()
        .enumerate()
        .map(|(i, &depth)| {
            (
                ctx.i32_type().const_int(i as u64, false),
                fcx.stack.frame_at_depth(depth).branch_target(),
            )
        })
        .collect();
    fcx.builder.build_switch(index, default_block, &cases);
    fcx.unreachable = true;
    Ok(())
}

pub fn translate_return<'ctx>(fcx: &mut FuncContext<'_, 'ctx>) -> Result<(), Error> {
    if fcx.unreachable {
        return Ok(());
    }
    let arity = fcx.stack.frame_at_depth(fcx.stack.frame_depth() as u32 - 1).result_types.len();
    let values: Vec<BasicValueEnum> = fcx.stack.top_n(arity).iter().map(|e| e.value).collect();
    let current_block = fcx.builder.get_insert_block().unwrap();
    let return_block = fcx.return_block;
    let outermost_depth = (fcx.stack.frame_depth() - 1) as u32;
    fcx.stack.frame_at_depth_mut(outermost_depth).record_incoming(&values, current_block);
    fcx.builder.build_unconditional_branch(return_block);
    fcx.unreachable = true;
    Ok(())
}

pub fn translate_unreachable<'ctx>(
    fcx: &mut FuncContext<'_, 'ctx>,
    ctx: &'ctx Context,
    code_offset: u32,
) -> Result<(), Error> {
    if fcx.unreachable {
        return Ok(());
    }
    fcx.traps.push((code_offset, crate::traps::TrapCode::Unreachable));
    fcx.builder.build_unreachable();
    let _ = ctx;
    fcx.unreachable = true;
    Ok(())
}

pub fn translate_drop<'ctx>(fcx: &mut FuncContext<'_, 'ctx>) {
    if !fcx.unreachable {
        fcx.stack.pop();
    }
}

pub fn translate_select<'ctx>(fcx: &mut FuncContext<'_, 'ctx>) -> Result<(), Error> {
    if fcx.unreachable {
        return Ok(());
    }
    let cond = fcx.stack.pop();
    let b = fcx.stack.pop();
    let a = fcx.stack.pop();
    let zero = cond.value.into_int_value().get_type().const_zero();
    let test = fcx
        .builder
        .build_int_compare(IntPredicate::NE, cond.value.into_int_value(), zero, "select_cond");
    let result = fcx.builder.build_select(test, a.value, b.value, "select");
    fcx.stack.push(result, a.ty);
    Ok(())
}
