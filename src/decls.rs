//! Resolves the parsed module graph into the declarations the translator consumes:
//! function signatures and names, table layouts, global specs, and the heap spec.

use crate::error::Error;
use crate::frontend::{ExportKind, GlobalInit, ParsedModule};
use crate::heap::{self, HeapSettings, HeapSpec};
use crate::types::{FuncType, ValType};

#[derive(Clone, Debug)]
pub enum GlobalVariant {
    Def(GlobalDef),
    Import { module: String, field: String },
}

#[derive(Clone, Copy, Debug)]
pub enum GlobalDef {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

#[derive(Clone, Debug)]
pub struct GlobalSpec {
    pub ty: ValType,
    pub mutable: bool,
    pub variant: GlobalVariant,
    pub export_names: Vec<String>,
}

/// A data segment's placement, resolved to an absolute base offset within its
/// memory so relocation-directed constant lowering can add a symbol's
/// `offset_in_segment` to a single known number instead of re-deriving it.
#[derive(Clone, Debug)]
pub struct DataSegmentSpec<'a> {
    pub memory_index: u32,
    pub base_offset: u64,
    pub bytes: &'a [u8],
}

#[derive(Clone, Debug)]
pub struct FunctionDecl {
    pub func_index: u32,
    pub type_index: u32,
    pub canonical_type_index: u32,
    pub import_name: Option<(String, String)>,
    pub export_names: Vec<String>,
    pub symbol: String,
}

impl FunctionDecl {
    pub fn is_import(&self) -> bool {
        self.import_name.is_some()
    }
}

pub struct ModuleDecls<'a> {
    pub module: ParsedModule<'a>,
    pub functions: Vec<FunctionDecl>,
    pub globals: Vec<GlobalSpec>,
    pub heap: Option<HeapSpec>,
    /// Index of the `__stack_pointer` global, the auxiliary stack top tracked by
    /// wasm-ld-style toolchains, if the module exports one.
    pub aux_stack_global: Option<u32>,
    /// Lowest address the auxiliary stack may reach, taken from the `__heap_base`
    /// global's constant initializer when the module exports one.
    pub aux_stack_bottom: Option<i64>,
    /// Active data segments, in declaration order, with their base offset resolved
    /// so `R_WASM_MEMORY_ADDR_*` relocations can add a symbol's `offset_in_segment`
    /// without re-deriving the segment's placement. Passive segments get a base
    /// offset of 0; they have no relocation-addressable placement until a
    /// `memory.init` (unsupported here) activates them.
    pub data_segments: Vec<DataSegmentSpec<'a>>,
}

impl<'a> ModuleDecls<'a> {
    pub fn new(module: ParsedModule<'a>, heap_settings: &HeapSettings) -> Result<Self, Error> {
        let functions = Self::build_functions(&module);
        let globals = Self::build_globals(&module)?;
        let heap = heap::build_heap_spec(
            module.memories.len(),
            module.memories.first().map(|m| m.minimum).unwrap_or(0),
            module.memories.first().and_then(|m| m.maximum),
            heap_settings,
        )?;
        let (aux_stack_global, aux_stack_bottom) = Self::find_aux_stack(&module, &globals);
        let data_segments = Self::build_data_segments(&module);
        Ok(Self {
            module,
            functions,
            globals,
            heap,
            aux_stack_global,
            aux_stack_bottom,
            data_segments,
        })
    }

    fn build_data_segments(module: &ParsedModule<'a>) -> Vec<DataSegmentSpec<'a>> {
        module
            .data
            .iter()
            .map(|seg| DataSegmentSpec {
                memory_index: seg.memory_index,
                base_offset: seg.offset.unwrap_or(0) as u64,
                bytes: seg.data,
            })
            .collect()
    }

    pub fn data_segment_base_offset(&self, segment_index: u32) -> Result<u64, Error> {
        self.data_segments
            .get(segment_index as usize)
            .map(|s| s.base_offset)
            .ok_or(Error::DataSegmentIndexError(segment_index))
    }

    fn find_aux_stack(module: &ParsedModule<'_>, globals: &[GlobalSpec]) -> (Option<u32>, Option<i64>) {
        let aux_stack_global = module
            .exports
            .iter()
            .find(|e| e.kind == ExportKind::Global && e.name == "__stack_pointer")
            .map(|e| e.index);
        let aux_stack_bottom = module
            .exports
            .iter()
            .find(|e| e.kind == ExportKind::Global && e.name == "__heap_base")
            .and_then(|e| globals.get(e.index as usize))
            .and_then(|g| match g.variant {
                GlobalVariant::Def(GlobalDef::I32(v)) => Some(v as i64),
                GlobalVariant::Def(GlobalDef::I64(v)) => Some(v),
                _ => None,
            });
        (aux_stack_global, aux_stack_bottom)
    }

    fn build_functions(module: &ParsedModule<'_>) -> Vec<FunctionDecl> {
        let mut out = Vec::with_capacity(module.total_func_count() as usize);
        for (i, (modname, field, type_index)) in module.imports.funcs.iter().enumerate() {
            out.push(FunctionDecl {
                func_index: i as u32,
                type_index: *type_index,
                canonical_type_index: module.canonical_type_index(*type_index),
                import_name: Some((modname.clone(), field.clone())),
                export_names: Vec::new(),
                symbol: format!("guest_func_{}", i),
            });
        }
        let base = module.imports.funcs.len() as u32;
        for (i, type_index) in module.func_type_indices.iter().enumerate() {
            let func_index = base + i as u32;
            out.push(FunctionDecl {
                func_index,
                type_index: *type_index,
                canonical_type_index: module.canonical_type_index(*type_index),
                import_name: None,
                export_names: Vec::new(),
                symbol: module
                    .func_names
                    .get(&func_index)
                    .cloned()
                    .unwrap_or_else(|| format!("guest_func_{}", func_index)),
            });
        }
        for export in &module.exports {
            if export.kind == ExportKind::Func {
                if let Some(f) = out.get_mut(export.index as usize) {
                    f.export_names.push(export.name.clone());
                }
            }
        }
        out
    }

    fn build_globals(module: &ParsedModule<'_>) -> Result<Vec<GlobalSpec>, Error> {
        let mut out = Vec::with_capacity(module.globals.len());
        for (ix, g) in module.globals.iter().enumerate() {
            let variant = match &g.initializer {
                GlobalInit::I32Const(v) => GlobalVariant::Def(GlobalDef::I32(*v)),
                GlobalInit::I64Const(v) => GlobalVariant::Def(GlobalDef::I64(*v)),
                GlobalInit::F32Const(bits) => GlobalVariant::Def(GlobalDef::F32(f32::from_bits(*bits))),
                GlobalInit::F64Const(bits) => GlobalVariant::Def(GlobalDef::F64(f64::from_bits(*bits))),
                GlobalInit::GetGlobal(ref_ix) => {
                    match module.globals.get(*ref_ix as usize) {
                        Some(ref_decl) if matches!(ref_decl.initializer, GlobalInit::Import) => {
                            let (m, f, _, _) = &module.imports.globals[*ref_ix as usize];
                            GlobalVariant::Import {
                                module: m.clone(),
                                field: f.clone(),
                            }
                        }
                        _ => return Err(Error::GlobalInitError(ix as u32)),
                    }
                }
                GlobalInit::Import => {
                    let (m, f, _, _) = module
                        .imports
                        .globals
                        .get(ix)
                        .ok_or(Error::GlobalInitError(ix as u32))?;
                    GlobalVariant::Import {
                        module: m.clone(),
                        field: f.clone(),
                    }
                }
            };
            let export_names = module
                .exports
                .iter()
                .filter(|e| e.kind == ExportKind::Global && e.index == ix as u32)
                .map(|e| e.name.clone())
                .collect();
            out.push(GlobalSpec {
                ty: g.ty,
                mutable: g.mutable,
                variant,
                export_names,
            });
        }
        Ok(out)
    }

    pub fn func(&self, func_index: u32) -> Result<&FunctionDecl, Error> {
        self.functions
            .get(func_index as usize)
            .ok_or_else(|| Error::FunctionIndexError(func_index.to_string()))
    }

    pub fn func_type(&self, func_index: u32) -> &FuncType {
        self.module.func_type(func_index)
    }

    pub fn start_func(&self) -> Option<u32> {
        self.module.start
    }
}
