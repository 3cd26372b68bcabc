//! Front-end binary parser: walks a Wasm module's sections with `wasmparser` and
//! produces the compile-time module graph the core translator consumes. This module
//! makes no lowering decisions; it only resolves indices and types.

pub mod relocation;

use crate::error::Error;
use crate::types::{FuncType, ValType};
use relocation::{RelocationTable, SymbolTable};
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElemType {
    FuncRef,
}

#[derive(Clone, Debug)]
pub struct TableType {
    pub elem_ty: ElemType,
    pub minimum: u32,
    pub maximum: Option<u32>,
}

#[derive(Clone, Debug)]
pub struct MemoryType {
    pub minimum: u32,
    pub maximum: Option<u32>,
}

#[derive(Clone, Debug)]
pub enum GlobalInit {
    I32Const(i32),
    I64Const(i64),
    F32Const(u32),
    F64Const(u64),
    GetGlobal(u32),
    Import,
}

#[derive(Clone, Debug)]
pub struct GlobalDef {
    pub ty: ValType,
    pub mutable: bool,
    pub initializer: GlobalInit,
}

#[derive(Clone, Debug)]
pub struct Export {
    pub name: String,
    pub kind: ExportKind,
    pub index: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportKind {
    Func,
    Table,
    Memory,
    Global,
}

#[derive(Clone, Debug)]
pub struct ElementSegment {
    pub table_index: u32,
    /// `None` when the offset expression references a global rather than a constant
    /// (rejected, as in the teacher, since non-function table elements and
    /// global-relative offsets are both unsupported here).
    pub offset: Option<u32>,
    pub elems: Vec<u32>,
}

#[derive(Clone, Debug)]
pub struct DataSegment<'a> {
    pub memory_index: u32,
    pub offset: Option<u32>,
    pub data: &'a [u8],
}

#[derive(Clone, Debug, Default)]
pub struct Imports {
    /// (module, field, type_index)
    pub funcs: Vec<(String, String, u32)>,
    pub globals: Vec<(String, String, ValType, bool)>,
    pub tables: Vec<(String, String, TableType)>,
    pub memories: Vec<(String, String, MemoryType)>,
}

/// The fully parsed module graph, borrowing the original binary for code and data
/// slices.
pub struct ParsedModule<'a> {
    pub types: Vec<FuncType>,
    pub imports: Imports,
    /// Type index for each function defined in this module (import functions are
    /// excluded; their types live in `imports.funcs`).
    pub func_type_indices: Vec<u32>,
    pub tables: Vec<TableType>,
    pub memories: Vec<MemoryType>,
    pub globals: Vec<GlobalDef>,
    pub exports: Vec<Export>,
    pub start: Option<u32>,
    pub elements: Vec<ElementSegment>,
    pub data: Vec<DataSegment<'a>>,
    /// `(code_offset_in_binary, code_bytes)` for each defined function, in order.
    pub code: Vec<(usize, &'a [u8])>,
    pub func_names: HashMap<u32, String>,
    pub relocations: RelocationTable,
    pub symbols: SymbolTable,
}

impl<'a> ParsedModule<'a> {
    pub fn total_func_count(&self) -> u32 {
        (self.imports.funcs.len() + self.func_type_indices.len()) as u32
    }

    pub fn is_imported_func(&self, func_index: u32) -> bool {
        (func_index as usize) < self.imports.funcs.len()
    }

    pub fn func_type(&self, func_index: u32) -> &FuncType {
        let idx = func_index as usize;
        let type_index = if idx < self.imports.funcs.len() {
            self.imports.funcs[idx].2
        } else {
            self.func_type_indices[idx - self.imports.funcs.len()]
        };
        &self.types[type_index as usize]
    }

    /// The canonical type index for a function type: the smallest index whose type
    /// is structurally equal to it. Used so `call_indirect` type checks compare a
    /// single integer.
    pub fn canonical_type_index(&self, type_index: u32) -> u32 {
        let ty = &self.types[type_index as usize];
        self.types
            .iter()
            .position(|t| t == ty)
            .expect("a type is always structurally equal to itself") as u32
    }
}

pub fn parse(wasm: &[u8]) -> Result<ParsedModule<'_>, Error> {
    wasmparser::validate(wasm, None)?;

    let mut types = Vec::new();
    let mut imports = Imports::default();
    let mut func_type_indices = Vec::new();
    let mut tables = Vec::new();
    let mut memories = Vec::new();
    let mut globals = Vec::new();
    let mut exports = Vec::new();
    let mut start = None;
    let mut elements = Vec::new();
    let mut data = Vec::new();
    let mut code = Vec::new();
    let mut func_names = HashMap::new();
    let mut relocations = RelocationTable::default();
    let mut symbols = SymbolTable::default();

    let mut reader = wasmparser::ModuleReader::new(wasm)?;
    while !reader.eof() {
        let section = reader.read()?;
        match section.code {
            wasmparser::SectionCode::Type => {
                let mut r = section.get_type_section_reader()?;
                for _ in 0..r.get_count() {
                    match r.read()? {
                        wasmparser::TypeDef::Func(ft) => {
                            types.push(FuncType {
                                params: ft.params.iter().map(|t| ValType::from_wasmparser(*t)).collect(),
                                results: ft.returns.iter().map(|t| ValType::from_wasmparser(*t)).collect(),
                            });
                        }
                    }
                }
            }
            wasmparser::SectionCode::Import => {
                let mut r = section.get_import_section_reader()?;
                for _ in 0..r.get_count() {
                    let import = r.read()?;
                    match import.ty {
                        wasmparser::ImportSectionEntryType::Function(type_index) => {
                            imports.funcs.push((
                                import.module.to_owned(),
                                import.field.unwrap_or("").to_owned(),
                                type_index,
                            ));
                        }
                        wasmparser::ImportSectionEntryType::Global(g) => {
                            imports.globals.push((
                                import.module.to_owned(),
                                import.field.unwrap_or("").to_owned(),
                                ValType::from_wasmparser(g.content_type),
                                g.mutable,
                            ));
                        }
                        wasmparser::ImportSectionEntryType::Table(t) => {
                            imports.tables.push((
                                import.module.to_owned(),
                                import.field.unwrap_or("").to_owned(),
                                TableType {
                                    elem_ty: ElemType::FuncRef,
                                    minimum: t.limits.initial,
                                    maximum: t.limits.maximum,
                                },
                            ));
                        }
                        wasmparser::ImportSectionEntryType::Memory(m) => {
                            imports.memories.push((
                                import.module.to_owned(),
                                import.field.unwrap_or("").to_owned(),
                                MemoryType {
                                    minimum: m.limits.initial,
                                    maximum: m.limits.maximum,
                                },
                            ));
                        }
                        wasmparser::ImportSectionEntryType::Tag(_) => {
                            return Err(Error::Unsupported("tag imports".to_owned()));
                        }
                    }
                }
            }
            wasmparser::SectionCode::Function => {
                let mut r = section.get_function_section_reader()?;
                for _ in 0..r.get_count() {
                    func_type_indices.push(r.read()?);
                }
            }
            wasmparser::SectionCode::Table => {
                let mut r = section.get_table_section_reader()?;
                for _ in 0..r.get_count() {
                    let t = r.read()?;
                    tables.push(TableType {
                        elem_ty: ElemType::FuncRef,
                        minimum: t.limits.initial,
                        maximum: t.limits.maximum,
                    });
                }
            }
            wasmparser::SectionCode::Memory => {
                let mut r = section.get_memory_section_reader()?;
                for _ in 0..r.get_count() {
                    let m = r.read()?;
                    memories.push(MemoryType {
                        minimum: m.limits.initial,
                        maximum: m.limits.maximum,
                    });
                }
            }
            wasmparser::SectionCode::Global => {
                let mut r = section.get_global_section_reader()?;
                for _ in 0..r.get_count() {
                    let g = r.read()?;
                    let init = lower_init_expr(&g.init_expr)?;
                    globals.push(GlobalDef {
                        ty: ValType::from_wasmparser(g.ty.content_type),
                        mutable: g.ty.mutable,
                        initializer: init,
                    });
                }
            }
            wasmparser::SectionCode::Export => {
                let mut r = section.get_export_section_reader()?;
                for _ in 0..r.get_count() {
                    let e = r.read()?;
                    let kind = match e.kind {
                        wasmparser::ExternalKind::Function => ExportKind::Func,
                        wasmparser::ExternalKind::Table => ExportKind::Table,
                        wasmparser::ExternalKind::Memory => ExportKind::Memory,
                        wasmparser::ExternalKind::Global => ExportKind::Global,
                        wasmparser::ExternalKind::Tag => {
                            return Err(Error::Unsupported("tag exports".to_owned()))
                        }
                    };
                    exports.push(Export {
                        name: e.field.to_owned(),
                        kind,
                        index: e.index,
                    });
                }
            }
            wasmparser::SectionCode::Start => {
                start = Some(section.get_start_section_content()?);
            }
            wasmparser::SectionCode::Element => {
                let mut r = section.get_element_section_reader()?;
                for _ in 0..r.get_count() {
                    let elem = r.read()?;
                    let table_index = elem.table_index.unwrap_or(0);
                    let offset = match elem.init_expr {
                        Some(ref e) => match lower_init_expr(e)? {
                            GlobalInit::I32Const(v) => Some(v as u32),
                            _ => None,
                        },
                        None => None,
                    };
                    let mut elems = Vec::new();
                    let mut items = elem.items.get_items_reader()?;
                    for _ in 0..items.get_count() {
                        match items.read()? {
                            wasmparser::ElementItem::Func(idx) => elems.push(idx),
                            wasmparser::ElementItem::Expr(_) => {
                                return Err(Error::Unsupported(
                                    "non-function-index element items".to_owned(),
                                ))
                            }
                        }
                    }
                    elements.push(ElementSegment {
                        table_index,
                        offset,
                        elems,
                    });
                }
            }
            wasmparser::SectionCode::Code => {
                let mut r = section.get_code_section_reader()?;
                for _ in 0..r.get_count() {
                    let body = r.read()?;
                    let range = body.range();
                    code.push((range.start, &wasm[range.start..range.end]));
                }
            }
            wasmparser::SectionCode::Data => {
                let mut r = section.get_data_section_reader()?;
                for _ in 0..r.get_count() {
                    let d = r.read()?;
                    let offset = match d.kind {
                        wasmparser::DataKind::Active { memory_index: _, ref init_expr } => {
                            match lower_init_expr(init_expr)? {
                                GlobalInit::I32Const(v) => Some(v as u32),
                                _ => None,
                            }
                        }
                        wasmparser::DataKind::Passive => None,
                    };
                    let memory_index = match d.kind {
                        wasmparser::DataKind::Active { memory_index, .. } => memory_index,
                        wasmparser::DataKind::Passive => 0,
                    };
                    data.push(DataSegment {
                        memory_index,
                        offset,
                        data: d.data,
                    });
                }
            }
            wasmparser::SectionCode::Custom { name, .. } => {
                let mut reader = section.get_binary_reader();
                let len = reader.bytes_remaining();
                let bytes = reader.read_bytes(len)?;
                match name {
                    "name" => {
                        parse_name_section(bytes, &mut func_names);
                    }
                    "linking" => {
                        symbols = relocation::parse_linking_section(bytes)?;
                    }
                    "reloc.CODE" => {
                        relocations.code.extend(relocation::parse_reloc_section(bytes)?);
                    }
                    "reloc.DATA" => {
                        relocations.data.extend(relocation::parse_reloc_section(bytes)?);
                    }
                    _ => {}
                }
            }
            wasmparser::SectionCode::DataCount => {
                let _ = section.get_data_count_section_content()?;
            }
            wasmparser::SectionCode::Tag => {
                return Err(Error::Unsupported("tag section".to_owned()));
            }
        }
    }

    Ok(ParsedModule {
        types,
        imports,
        func_type_indices,
        tables,
        memories,
        globals,
        exports,
        start,
        elements,
        data,
        code,
        func_names,
        relocations,
        symbols,
    })
}

fn lower_init_expr(expr: &wasmparser::InitExpr<'_>) -> Result<GlobalInit, Error> {
    let mut reader = expr.get_operators_reader();
    let op = reader.read()?;
    Ok(match op {
        wasmparser::Operator::I32Const { value } => GlobalInit::I32Const(value),
        wasmparser::Operator::I64Const { value } => GlobalInit::I64Const(value),
        wasmparser::Operator::F32Const { value } => GlobalInit::F32Const(value.bits()),
        wasmparser::Operator::F64Const { value } => GlobalInit::F64Const(value.bits()),
        wasmparser::Operator::GlobalGet { global_index } => GlobalInit::GetGlobal(global_index),
        other => {
            return Err(Error::Decode {
                offset: 0,
                message: format!("unsupported init expr operator: {:?}", other),
            })
        }
    })
}

fn parse_name_section(bytes: &[u8], out: &mut HashMap<u32, String>) {
    // The name section's function-name subsection uses a small (subsection id,
    // size, payload) framing of its own; failures here are informational only (they
    // only affect diagnostics), so a parse error silently yields no names.
    let mut pos = 0usize;
    while pos < bytes.len() {
        let subsection_id = bytes[pos];
        pos += 1;
        let (size, used) = match leb128_u32(&bytes[pos..]) {
            Some(v) => v,
            None => return,
        };
        pos += used;
        if pos + size as usize > bytes.len() {
            return;
        }
        if subsection_id == 1 {
            // function names
            let payload = &bytes[pos..pos + size as usize];
            let mut p = 0usize;
            if let Some((count, used)) = leb128_u32(&payload[p..]) {
                p += used;
                for _ in 0..count {
                    let (idx, used) = match leb128_u32(&payload[p..]) {
                        Some(v) => v,
                        None => return,
                    };
                    p += used;
                    let (len, used) = match leb128_u32(&payload[p..]) {
                        Some(v) => v,
                        None => return,
                    };
                    p += used;
                    if p + len as usize > payload.len() {
                        return;
                    }
                    if let Ok(s) = std::str::from_utf8(&payload[p..p + len as usize]) {
                        out.insert(idx, s.to_owned());
                    }
                    p += len as usize;
                }
            }
        }
        pos += size as usize;
    }
}

fn leb128_u32(bytes: &[u8]) -> Option<(u32, usize)> {
    let mut result: u32 = 0;
    let mut shift = 0;
    for (i, &byte) in bytes.iter().enumerate() {
        result |= ((byte & 0x7f) as u32) << shift;
        if byte & 0x80 == 0 {
            return Some((result, i + 1));
        }
        shift += 7;
        if shift > 35 {
            return None;
        }
    }
    None
}
