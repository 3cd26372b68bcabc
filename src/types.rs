//! Type Lowering: maps Wasm value types to LLVM types and computes cell widths.

use inkwell::context::Context;
use inkwell::types::{BasicTypeEnum, FunctionType};
use inkwell::AddressSpace;

/// A Wasm value type, as seen by the translator. `Void` only ever appears as a
/// function result arity of zero; it has no runtime representation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValType {
    I32,
    I64,
    F32,
    F64,
    V128,
    FuncRef,
    Void,
}

impl ValType {
    pub fn from_wasmparser(ty: wasmparser::Type) -> Self {
        match ty {
            wasmparser::Type::I32 => ValType::I32,
            wasmparser::Type::I64 => ValType::I64,
            wasmparser::Type::F32 => ValType::F32,
            wasmparser::Type::F64 => ValType::F64,
            wasmparser::Type::V128 => ValType::V128,
            wasmparser::Type::FuncRef | wasmparser::Type::ExternRef => ValType::FuncRef,
            wasmparser::Type::EmptyBlockType => ValType::Void,
            other => panic!("unsupported wasm value type: {:?}", other),
        }
    }

    /// Cell width of this type, used to size the symbolic stack and multi-result
    /// out-buffers. One cell is 4 bytes.
    pub fn cell_num(&self) -> u32 {
        match self {
            ValType::I32 | ValType::F32 | ValType::FuncRef => 1,
            ValType::I64 | ValType::F64 => 2,
            ValType::V128 => 4,
            ValType::Void => 0,
        }
    }

    pub fn size(&self) -> u32 {
        self.cell_num() * 4
    }

    pub fn is_int(&self) -> bool {
        matches!(self, ValType::I32 | ValType::I64)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, ValType::F32 | ValType::F64)
    }
}

/// Lowers a single Wasm value type to its LLVM representation. `FuncRef` is lowered
/// as an I32 table index in sandboxed mode, and as an opaque pointer in no-sandbox
/// mode; callers pass `sandboxed` to select the right lowering.
pub fn lower<'ctx>(ctx: &'ctx Context, ty: ValType, sandboxed: bool) -> BasicTypeEnum<'ctx> {
    match ty {
        ValType::I32 => ctx.i32_type().into(),
        ValType::I64 => ctx.i64_type().into(),
        ValType::F32 => ctx.f32_type().into(),
        ValType::F64 => ctx.f64_type().into(),
        ValType::V128 => ctx.i128_type().into(),
        ValType::FuncRef => {
            if sandboxed {
                ctx.i32_type().into()
            } else {
                ctx.i8_type().ptr_type(AddressSpace::default()).into()
            }
        }
        ValType::Void => panic!("Void has no basic-type representation"),
    }
}

/// A function type: ordered parameter types and ordered result types. Two function
/// types are equal exactly when their parameter and result sequences match.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FuncType {
    pub params: Vec<ValType>,
    pub results: Vec<ValType>,
}

impl FuncType {
    /// The IR function type for this Wasm type: the first result (if any) is the IR
    /// return value, and additional results are turned into pointer-typed
    /// out-parameters appended after the Wasm parameters. The VM-context pointer is
    /// always the first IR parameter.
    pub fn lower_signature<'ctx>(
        &self,
        ctx: &'ctx Context,
        vmctx_type: BasicTypeEnum<'ctx>,
        sandboxed: bool,
    ) -> FunctionType<'ctx> {
        let mut param_types: Vec<BasicTypeEnum> = Vec::with_capacity(self.params.len() + 2);
        param_types.push(vmctx_type);
        for p in &self.params {
            param_types.push(lower(ctx, *p, sandboxed));
        }
        for extra in self.results.iter().skip(1) {
            let cell_ty = lower(ctx, *extra, sandboxed);
            param_types.push(cell_ty.ptr_type(AddressSpace::default()).into());
        }
        let param_meta: Vec<_> = param_types.iter().map(|t| (*t).into()).collect();
        match self.results.first() {
            None => ctx.void_type().fn_type(&param_meta, false),
            Some(ValType::Void) => ctx.void_type().fn_type(&param_meta, false),
            Some(r) => lower(ctx, *r, sandboxed).fn_type(&param_meta, false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_widths_match_sizes() {
        for ty in [ValType::I32, ValType::I64, ValType::F32, ValType::F64, ValType::V128] {
            assert_eq!(ty.size(), ty.cell_num() * 4);
        }
    }

    #[test]
    fn void_has_zero_cells() {
        assert_eq!(ValType::Void.cell_num(), 0);
    }
}
