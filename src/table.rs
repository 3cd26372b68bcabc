//! Table layout: resolves element segments into a flat per-slot element list, and
//! decides how no-sandbox mode must source each slot's function pointer.

use crate::decls::ModuleDecls;
use crate::error::Error;
use crate::frontend::relocation::{RelocationKind, SymbolKind};

#[derive(Debug, Clone, Copy)]
pub enum Elem {
    Func(u32),
    Empty,
}

/// Resolves table 0's element segments into one `Elem` per slot. Only `funcref`
/// tables with constant-offset segments are supported, matching the sandboxed
/// lowering's requirements.
pub fn table_elements(decls: &ModuleDecls<'_>, table_index: u32) -> Result<Vec<Elem>, Error> {
    let table = decls
        .module
        .tables
        .get(table_index as usize)
        .ok_or_else(|| Error::TableIndexError(table_index.to_string()))?;

    let mut elems = vec![Elem::Empty; table.minimum as usize];

    for seg in decls.module.elements.iter().filter(|s| s.table_index == table_index) {
        let offset = seg.offset.ok_or_else(|| {
            Error::Unsupported("table elements with a global-index offset".to_owned())
        })? as usize;

        let final_len = offset
            .checked_add(seg.elems.len())
            .expect("table length overflowed usize");
        if final_len > elems.len() {
            return Err(Error::ElementInitializerOutOfRange {
                table_len: elems.len(),
                base: offset,
                count: seg.elems.len(),
            });
        }
        for (i, func_index) in seg.elems.iter().enumerate() {
            elems[offset + i] = Elem::Func(*func_index);
        }
    }

    Ok(elems)
}

/// In no-sandbox mode, a table slot's function pointer must come from a
/// `R_WASM_TABLE_INDEX_*` relocation on the element segment's function-index entry,
/// per the Open Question decision recorded in `DESIGN.md`: element segments always
/// resolve through relocations in no-sandbox mode, and a slot with no covering
/// relocation is a compile error rather than a silently null entry.
pub fn resolve_no_sandbox_symbol(
    decls: &ModuleDecls<'_>,
    func_index: u32,
) -> Result<u32, Error> {
    decls
        .module
        .symbols
        .symbols
        .iter()
        .position(|s| s.kind == SymbolKind::Function && s.func_index == Some(func_index))
        .map(|i| i as u32)
        .ok_or_else(|| Error::UnresolvedRelocation {
            kind: format!("{:?}", RelocationKind::TableIndexSleb64),
            offset: func_index as usize,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decls::ModuleDecls;
    use crate::frontend;
    use crate::heap::HeapSettings;

    #[test]
    fn empty_table_yields_all_empty_slots() {
        let wasm = wat::parse_str("(module (table 3 funcref))").unwrap();
        let parsed = frontend::parse(&wasm).unwrap();
        let decls = ModuleDecls::new(parsed, &HeapSettings::default()).unwrap();
        let elems = table_elements(&decls, 0).unwrap();
        assert_eq!(elems.len(), 3);
        assert!(elems.iter().all(|e| matches!(e, Elem::Empty)));
    }
}
