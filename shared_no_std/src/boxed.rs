//! Heap placement that reports pool exhaustion instead of aborting.

use alloc::{
    alloc::{alloc, Layout},
    boxed::Box,
};

/// Moves `value` onto the heap, handing it back if the allocation fails.
pub fn try_box<T>(value: T) -> Result<Box<T>, T> {
    let layout = Layout::new::<T>();
    if layout.size() == 0 {
        return Ok(Box::new(value));
    }

    // SAFETY: the layout has a non-zero size
    let raw = unsafe { alloc(layout) };
    unsafe { place(value, raw) }
}

/// # Safety
///
/// `raw` must be null or a fresh global allocation with the layout of `T`.
unsafe fn place<T>(value: T, raw: *mut u8) -> Result<Box<T>, T> {
    if raw.is_null() {
        return Err(value);
    }

    let ptr = raw as *mut T;
    ptr.write(value);
    Ok(Box::from_raw(ptr))
}
