//! Settings controlling how a module's single linear memory is reserved.

use crate::pointer::WASM_PAGE_SIZE;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeapSettings {
    pub min_reserved_size: u64,
    pub max_reserved_size: u64,
    pub guard_size: u64,
}

impl Default for HeapSettings {
    fn default() -> Self {
        Self {
            min_reserved_size: 4 * 1024 * 1024,
            max_reserved_size: 6 * 1024 * 1024 * 1024,
            guard_size: 4 * 1024 * 1024,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeapSpec {
    pub reserved_size: u64,
    pub guard_size: u64,
    pub initial_size: u64,
    pub max_size: Option<u64>,
}

/// Computes a module's heap spec from its declared memory 0 and the compiler's
/// heap settings. Returns `Ok(None)` when the module declares no memory.
pub fn build_heap_spec(
    memory_count: usize,
    minimum_pages: u32,
    maximum_pages: Option<u32>,
    settings: &HeapSettings,
) -> Result<Option<HeapSpec>, crate::error::Error> {
    match memory_count {
        0 => Ok(None),
        1 => {
            let initial_size = minimum_pages as u64 * WASM_PAGE_SIZE;
            let reserved_size = std::cmp::max(initial_size, settings.min_reserved_size);
            if reserved_size > settings.max_reserved_size {
                return Err(crate::error::Error::MemorySpecs(format!(
                    "module reserved size ({}) exceeds max reserved size ({})",
                    reserved_size, settings.max_reserved_size
                )));
            }
            let max_size = maximum_pages.map(|pages| pages as u64 * WASM_PAGE_SIZE);
            Ok(Some(HeapSpec {
                reserved_size,
                guard_size: settings.guard_size,
                initial_size,
                max_size,
            }))
        }
        _ => Err(crate::error::Error::Unsupported(
            "waotc only supports memory 0".to_owned(),
        )),
    }
}
