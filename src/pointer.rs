//! Native pointer width of the compilation host.

#[cfg(target_pointer_width = "64")]
pub const NATIVE_POINTER_SIZE: usize = 8;
#[cfg(target_pointer_width = "32")]
pub const NATIVE_POINTER_SIZE: usize = 4;

/// Size in bytes of a table slot: a signature index paired with a function pointer,
/// both native-pointer-sized.
pub const TABLE_ELEM_SIZE: usize = NATIVE_POINTER_SIZE * 2;

/// Size of a Wasm linear memory page.
pub const WASM_PAGE_SIZE: u64 = 64 * 1024;
