//! Linker relocation and symbol tables, as carried by the `linking` and
//! `reloc.CODE`/`reloc.DATA` custom sections of an object-file-style Wasm binary.
//! Consumed only in no-sandbox mode: this is what lets a constant in the code
//! section resolve to a real host address once linked.
//!
//! Follows the tool-conventions Linking document's symbol and relocation
//! vocabulary; parsing here is intentionally permissive (unknown symbol/relocation
//! kinds are skipped rather than rejected), since only the kinds the core actually
//! consumes (`R_WASM_MEMORY_ADDR_SLEB64`, `R_WASM_TABLE_INDEX_SLEB64`, and a few
//! adjacent encodings) are meaningful to the translator.

use crate::error::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelocationKind {
    MemoryAddrLeb,
    MemoryAddrSleb,
    MemoryAddrI32,
    MemoryAddrSleb64,
    MemoryAddrI64,
    TableIndexSleb,
    TableIndexI32,
    TableIndexSleb64,
    TableIndexI64,
    TypeIndexLeb,
    FunctionIndexLeb,
    GlobalIndexLeb,
    Other(u8),
}

impl RelocationKind {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => RelocationKind::FunctionIndexLeb,
            1 => RelocationKind::TableIndexSleb,
            2 => RelocationKind::TableIndexI32,
            3 => RelocationKind::MemoryAddrLeb,
            4 => RelocationKind::MemoryAddrSleb,
            5 => RelocationKind::MemoryAddrI32,
            6 => RelocationKind::TypeIndexLeb,
            7 => RelocationKind::GlobalIndexLeb,
            10 => RelocationKind::MemoryAddrI64,
            11 => RelocationKind::MemoryAddrSleb64,
            12 => RelocationKind::TableIndexSleb64,
            13 => RelocationKind::TableIndexI64,
            other => RelocationKind::Other(other),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Relocation {
    pub kind: RelocationKind,
    pub offset: u32,
    pub symbol_index: u32,
    pub addend: i32,
}

#[derive(Clone, Debug, Default)]
pub struct RelocationTable {
    pub code: Vec<Relocation>,
    pub data: Vec<Relocation>,
}

impl RelocationTable {
    /// The relocation (if any) covering a given code-section byte offset.
    pub fn at_code_offset(&self, offset: usize) -> Option<&Relocation> {
        self.code.iter().find(|r| r.offset as usize == offset)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SymbolKind {
    Function,
    Data,
    Global,
    Section,
    Tag,
    Table,
}

#[derive(Clone, Debug)]
pub struct DataSymbol {
    pub segment_index: u32,
    pub offset_in_segment: u32,
    pub size: u32,
}

#[derive(Clone, Debug)]
pub struct Symbol {
    pub kind: SymbolKind,
    pub name: String,
    pub defined: bool,
    /// For function symbols: the Wasm function index.
    pub func_index: Option<u32>,
    /// For data symbols: which segment and offset within it this symbol names.
    pub data: Option<DataSymbol>,
}

#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
    pub symbols: Vec<Symbol>,
}

impl SymbolTable {
    pub fn get(&self, index: u32) -> Result<&Symbol, Error> {
        self.symbols
            .get(index as usize)
            .ok_or(Error::SymbolIndexError(index))
    }
}

/// Parses a `reloc.CODE`/`reloc.DATA` custom section body: a LEB128 relocation
/// count followed by that many `(type: u8, offset: u32, index: u32, addend: i32?)`
/// records (the addend is present only for the `_SLEB`/address-bearing kinds).
pub fn parse_reloc_section(bytes: &[u8]) -> Result<Vec<Relocation>, Error> {
    let mut p = Reader::new(bytes);
    let count = p.leb_u32()?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let kind = RelocationKind::from_u8(p.u8()?);
        let offset = p.leb_u32()?;
        let symbol_index = p.leb_u32()?;
        let addend = match kind {
            RelocationKind::MemoryAddrLeb
            | RelocationKind::MemoryAddrSleb
            | RelocationKind::MemoryAddrI32
            | RelocationKind::MemoryAddrSleb64
            | RelocationKind::MemoryAddrI64 => p.leb_i32()?,
            _ => 0,
        };
        out.push(Relocation {
            kind,
            offset,
            symbol_index,
            addend,
        });
    }
    Ok(out)
}

/// Parses a `linking` custom section's symbol table subsection into a flat
/// `SymbolTable`. Only the `SYMTAB` subsection is interpreted; other subsections
/// (segment info, init funcs, comdats) don't affect lowering and are skipped.
pub fn parse_linking_section(bytes: &[u8]) -> Result<SymbolTable, Error> {
    let mut p = Reader::new(bytes);
    let _version = p.leb_u32()?;
    let mut symbols = SymbolTable::default();
    while !p.eof() {
        let subsection_id = p.u8()?;
        let size = p.leb_u32()?;
        let body = p.take(size as usize)?;
        if subsection_id == 8 {
            // WASM_SYMBOL_TABLE
            symbols = parse_symbol_table(body)?;
        }
    }
    Ok(symbols)
}

fn parse_symbol_table(bytes: &[u8]) -> Result<SymbolTable, Error> {
    let mut p = Reader::new(bytes);
    let count = p.leb_u32()?;
    let mut symbols = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let kind_byte = p.u8()?;
        let flags = p.leb_u32()?;
        let defined = flags & 0x10 == 0; // WASM_SYM_UNDEFINED
        let (kind, name, func_index, data) = match kind_byte {
            0 => {
                // SYMTAB_FUNCTION
                let index = p.leb_u32()?;
                let name = if defined || flags & 0x4 != 0 {
                    p.name()?
                } else {
                    String::new()
                };
                (SymbolKind::Function, name, Some(index), None)
            }
            1 => {
                // SYMTAB_DATA
                let name = p.name()?;
                let (segment_index, offset_in_segment, size) = if defined {
                    (p.leb_u32()?, p.leb_u32()?, p.leb_u32()?)
                } else {
                    (0, 0, 0)
                };
                (
                    SymbolKind::Data,
                    name,
                    None,
                    Some(DataSymbol {
                        segment_index,
                        offset_in_segment,
                        size,
                    }),
                )
            }
            2 => {
                // SYMTAB_GLOBAL
                let index = p.leb_u32()?;
                let name = if defined || flags & 0x4 != 0 { p.name()? } else { String::new() };
                (SymbolKind::Global, name, Some(index), None)
            }
            3 => {
                // SYMTAB_SECTION
                let index = p.leb_u32()?;
                (SymbolKind::Section, String::new(), Some(index), None)
            }
            4 => {
                // SYMTAB_EVENT / SYMTAB_TAG
                let index = p.leb_u32()?;
                let name = if defined || flags & 0x4 != 0 { p.name()? } else { String::new() };
                (SymbolKind::Tag, name, Some(index), None)
            }
            5 => {
                // SYMTAB_TABLE
                let index = p.leb_u32()?;
                let name = if defined || flags & 0x4 != 0 { p.name()? } else { String::new() };
                (SymbolKind::Table, name, Some(index), None)
            }
            other => {
                return Err(Error::Decode {
                    offset: 0,
                    message: format!("unknown linking symbol kind {}", other),
                })
            }
        };
        symbols.push(Symbol {
            kind,
            name,
            defined,
            func_index,
            data,
        });
    }
    Ok(SymbolTable { symbols })
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn eof(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn u8(&mut self) -> Result<u8, Error> {
        let b = *self.bytes.get(self.pos).ok_or_else(|| Error::Decode {
            offset: self.pos,
            message: "unexpected end of section".to_owned(),
        })?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], Error> {
        if self.pos + n > self.bytes.len() {
            return Err(Error::Decode {
                offset: self.pos,
                message: "section truncated".to_owned(),
            });
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn leb_u32(&mut self) -> Result<u32, Error> {
        let mut result: u32 = 0;
        let mut shift = 0;
        loop {
            let byte = self.u8()?;
            result |= ((byte & 0x7f) as u32) << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
        }
    }

    fn leb_i32(&mut self) -> Result<i32, Error> {
        let mut result: i64 = 0;
        let mut shift = 0;
        loop {
            let byte = self.u8()?;
            result |= ((byte & 0x7f) as i64) << shift;
            shift += 7;
            if byte & 0x80 == 0 {
                if shift < 64 && (byte & 0x40) != 0 {
                    result |= -(1i64 << shift);
                }
                return Ok(result as i32);
            }
        }
    }

    fn name(&mut self) -> Result<String, Error> {
        let len = self.leb_u32()? as usize;
        let bytes = self.take(len)?;
        Ok(std::str::from_utf8(bytes)
            .map_err(|_| Error::Decode {
                offset: self.pos,
                message: "symbol name is not valid utf-8".to_owned(),
            })?
            .to_owned())
    }
}
