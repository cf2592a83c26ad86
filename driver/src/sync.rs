//! Kernel lock backing the event queue.

use alloc::boxed::Box;
use core::cell::UnsafeCell;

use shared_no_std::{boxed::try_box, queue::QueueLock};
use wdk_sys::{
    ntddk::{ExAcquireFastMutex, ExReleaseFastMutex},
    FAST_MUTEX,
};

use crate::ffi::ExInitializeFastMutex;

/// A FAST_MUTEX living at a fixed heap address.
///
/// Acquiring raises to APC_LEVEL, so it is only usable from PASSIVE_LEVEL or APC_LEVEL
/// callers; the process notify routine and read dispatch both run at PASSIVE_LEVEL.
pub struct FastMutex {
    mutex: Box<UnsafeCell<FAST_MUTEX>>,
}

impl FastMutex {
    /// Returns `None` if the pool cannot hold the mutex.
    pub fn new() -> Option<Self> {
        // zeroed, then initialised in place at its final address
        let mutex = try_box(UnsafeCell::new(unsafe { core::mem::zeroed::<FAST_MUTEX>() })).ok()?;
        unsafe { ExInitializeFastMutex(mutex.get()) };

        Some(FastMutex { mutex })
    }
}

// SAFETY: the FAST_MUTEX is only touched through the Ex* routines, which are callable from
// any thread.
unsafe impl Send for FastMutex {}
unsafe impl Sync for FastMutex {}

unsafe impl QueueLock for FastMutex {
    fn acquire(&self) {
        unsafe { ExAcquireFastMutex(self.mutex.get()) };
    }

    unsafe fn release(&self) {
        ExReleaseFastMutex(self.mutex.get());
    }
}
