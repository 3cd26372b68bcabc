//! `waotc`: ahead-of-time compiles a WebAssembly module into LLVM IR, function by
//! function, for either sandboxed execution (bounds-checked memory, type-checked
//! indirect calls) or a no-sandbox mode where address-bearing constants and table
//! entries are rewritten by relocations to native host pointers.

pub mod compiler;
pub mod decls;
pub mod env;
pub mod error;
pub mod frontend;
pub mod function;
pub mod heap;
pub mod intrinsics;
pub mod output;
pub mod pointer;
pub mod runtime;
pub mod stack;
pub mod table;
pub mod traps;
pub mod translator;
pub mod types;

pub use compiler::{CompilerOptions, OptLevel};
pub use error::Error;
pub use heap::HeapSettings;
pub use output::CodegenOutput;

use inkwell::context::Context;
use std::path::Path;

/// Builder-style entry point: configure, then `compile` a Wasm binary to the
/// requested output format. Mirrors the fluent `with_*` construction the teacher
/// exposes from its own top-level driver, adapted to this crate's options.
pub struct Waotc {
    opts: CompilerOptions,
    module_name: String,
}

impl Default for Waotc {
    fn default() -> Self {
        Self {
            opts: CompilerOptions::default(),
            module_name: "guest".to_owned(),
        }
    }
}

impl Waotc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sandboxed(mut self, sandboxed: bool) -> Self {
        self.opts.sandboxed = sandboxed;
        self
    }

    pub fn with_opt_level(mut self, opt_level: OptLevel) -> Self {
        self.opts.opt_level = opt_level;
        self
    }

    pub fn with_heap_settings(mut self, settings: HeapSettings) -> Self {
        self.opts.heap_settings = settings;
        self
    }

    pub fn with_aux_stack_check(mut self, enabled: bool) -> Self {
        self.opts.aux_stack_check = enabled;
        self
    }

    pub fn with_module_name(mut self, name: impl Into<String>) -> Self {
        self.module_name = name.into();
        self
    }

    /// Compiles `wasm` and writes the chosen output format to `output_path`.
    pub fn compile_file(&self, wasm: &[u8], format: CodegenOutput, output_path: &Path) -> Result<(), Error> {
        log::info!(
            "compiling {} bytes of wasm to {} ({:?}, sandboxed={})",
            wasm.len(),
            output_path.display(),
            format,
            self.opts.sandboxed
        );
        let ctx = Context::create();
        let compiled = compiler::compile(&ctx, wasm, &self.module_name, &self.opts)?;
        output::write_output(&compiled, format, output_path)
    }
}
