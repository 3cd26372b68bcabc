//! Declarations for the small set of host runtime functions sandboxed code calls
//! into: growing/querying linear memory. No-sandbox mode never emits calls to
//! these, since its memory is fixed-size host memory.

use crate::types::ValType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeFunc {
    MemSize,
    MemGrow,
}

pub struct RuntimeFuncType {
    pub name: &'static str,
    pub params: Vec<ValType>,
    pub results: Vec<ValType>,
}

pub fn runtime_func_type(f: RuntimeFunc) -> RuntimeFuncType {
    match f {
        RuntimeFunc::MemSize => RuntimeFuncType {
            name: "waotc_vmctx_current_memory",
            params: vec![],
            results: vec![ValType::I32],
        },
        RuntimeFunc::MemGrow => RuntimeFuncType {
            name: "waotc_vmctx_grow_memory",
            params: vec![ValType::I32],
            results: vec![ValType::I32],
        },
    }
}
