//! Crate-wide error type.
//!
//! Mirrors the "last error" slot of the component this crate generalizes: a single
//! scalar error describing why a compilation failed, never a chain of causes beyond
//! what `#[source]` already carries.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("error")]
    Any(#[from] anyhow::Error),

    #[error("malformed wasm input")]
    WasmValidation(#[from] wasmparser::BinaryReaderError),

    #[error("I/O error")]
    IOError(#[from] std::io::Error),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("decode error at offset {offset}: {message}")]
    Decode { offset: usize, message: String },

    #[error("function translation error in {symbol}")]
    FunctionTranslation {
        symbol: String,
        #[source]
        source: Box<Error>,
    },

    #[error("LLVM IR build failure: {0}")]
    IrBuild(String),

    #[error("memory specs: {0}")]
    MemorySpecs(String),

    #[error("function index out of bounds: {0}")]
    FunctionIndexError(String),

    #[error("global out of bounds: {0}")]
    GlobalIndexError(String),

    #[error("table index out of bounds: {0}")]
    TableIndexError(String),

    #[error("signature out of bounds: {0}")]
    SignatureIndexError(String),

    #[error("global {0} is initialized by referencing another global, but that global is not an import")]
    GlobalInitError(u32),

    #[error("table element initializer out of range for table with {table_len} slots: base {base} + {count} elements")]
    ElementInitializerOutOfRange {
        table_len: usize,
        base: usize,
        count: usize,
    },

    #[error("relocation kind {kind:?} at offset {offset} has no resolvable symbol")]
    UnresolvedRelocation { kind: String, offset: usize },

    #[error("unsupported relocation kind {0:?} attached to i64.const")]
    UnsupportedRelocation(String),

    #[error("relocation symbol index {0} out of bounds")]
    SymbolIndexError(u32),

    #[error("data segment index {0} out of bounds")]
    DataSegmentIndexError(u32),

    #[error("output error: {0}")]
    Output(String),

    #[error("input error: {0}")]
    Input(String),

    #[error("path error: {0}")]
    PathError(String),

    #[error("host machine is not a supported target")]
    UnsupportedIsa,
}
