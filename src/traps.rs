//! Trap codes raised by emitted sandboxed code, and the per-function manifest that
//! records where each one can fire.
//!
//! Names follow the `EXCE_*` catalogue of the reference exception table rather than
//! inventing new ones, so a diagnostic dump lines up with the well-known Wasm AOT
//! trap vocabulary.

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum TrapCode {
    Unreachable,
    OutOfBoundsMemoryAccess,
    IntegerOverflow,
    IntegerDivideByZero,
    InvalidConversionToInteger,
    UndefinedElement,
    UninitializedElement,
    CallUnlinkedImportFunc,
    InvalidFunctionTypeIndex,
    StackOverflow,
}

impl TrapCode {
    /// The nonzero value written to the `exception_id` vmctx field when this trap
    /// fires. Biased by one so `0` unambiguously means "no exception pending".
    pub fn exception_id(&self) -> u32 {
        *self as u32 + 1
    }

    pub fn name(&self) -> &'static str {
        match self {
            TrapCode::Unreachable => "EXCE_UNREACHABLE",
            TrapCode::OutOfBoundsMemoryAccess => "EXCE_OUT_OF_BOUNDS_MEMORY_ACCESS",
            TrapCode::IntegerOverflow => "EXCE_INTEGER_OVERFLOW",
            TrapCode::IntegerDivideByZero => "EXCE_INTEGER_DIVIDE_BY_ZERO",
            TrapCode::InvalidConversionToInteger => "EXCE_INVALID_CONVERSION_TO_INTEGER",
            TrapCode::UndefinedElement => "EXCE_UNDEFINED_ELEMENT",
            TrapCode::UninitializedElement => "EXCE_UNINITIALIZED_ELEMENT",
            TrapCode::CallUnlinkedImportFunc => "EXCE_CALL_UNLINKED_IMPORT_FUNC",
            TrapCode::InvalidFunctionTypeIndex => "EXCE_INVALID_FUNCTION_TYPE_INDEX",
            TrapCode::StackOverflow => "EXCE_STACK_OVERFLOW",
        }
    }
}

/// One site in a function body at which a trap can be raised.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrapSite {
    pub offset: u32,
    pub code: TrapCode,
}

/// A function's trap manifest, sorted by offset so a faulting PC can be mapped back
/// to its trap kind with a binary search.
#[derive(Clone, Debug, Default)]
pub struct TrapManifest {
    sites: Vec<TrapSite>,
}

impl TrapManifest {
    pub fn new() -> Self {
        Self { sites: Vec::new() }
    }

    /// Builds a manifest from the `(offset, code)` pairs a function's dispatcher
    /// recorded as it lowered each opcode, in whatever order they were pushed.
    pub fn from_sites(sites: Vec<(u32, TrapCode)>) -> Self {
        Self {
            sites: sites.into_iter().map(|(offset, code)| TrapSite { offset, code }).collect(),
        }
    }

    pub fn push(&mut self, offset: u32, code: TrapCode) {
        self.sites.push(TrapSite { offset, code });
    }

    pub fn finish(mut self) -> Vec<TrapSite> {
        self.sites.sort_by_key(|s| s.offset);
        self.sites
    }

    pub fn lookup_addr(sites: &[TrapSite], addr: u32) -> Option<TrapCode> {
        sites
            .binary_search_by_key(&addr, |s| s.offset)
            .ok()
            .map(|i| sites[i].code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_finds_exact_offset() {
        let mut m = TrapManifest::new();
        m.push(4, TrapCode::OutOfBoundsMemoryAccess);
        m.push(20, TrapCode::Unreachable);
        let sites = m.finish();
        assert_eq!(
            TrapManifest::lookup_addr(&sites, 20),
            Some(TrapCode::Unreachable)
        );
        assert_eq!(TrapManifest::lookup_addr(&sites, 5), None);
    }
}
