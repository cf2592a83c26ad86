use core::slice;

use shared_no_std::dispatch;
use wdk::println;
use wdk_sys::{NTSTATUS, PIRP, STATUS_INSUFFICIENT_RESOURCES, _IO_STACK_LOCATION, _MM_PAGE_PRIORITY::NormalPagePriority};

use crate::{ffi::MmGetSystemAddressForMdlSafe, PrcMonContext};

/// The destination of an IRP_MJ_READ on a DO_DIRECT_IO device.
struct ReadBuffer {
    len: u32,
    pirp: PIRP,
}

impl ReadBuffer {
    /// Creates a new instance of the read buffer type
    fn new(p_stack_location: *mut _IO_STACK_LOCATION, pirp: PIRP) -> Self {
        ReadBuffer {
            len: unsafe { (*p_stack_location).Parameters.Read.Length },
            pirp,
        }
    }

    /// Maps the caller's locked pages into system space so they can be written without
    /// faulting.
    ///
    /// # Returns
    ///
    /// The mapped buffer, or None if the IRP has no MDL or the mapping failed. A zero
    /// length read maps nothing and always succeeds.
    fn map(&mut self) -> Option<&mut [u8]> {
        if self.len == 0 {
            return Some(Default::default());
        }

        let mdl = unsafe { (*self.pirp).MdlAddress };
        if mdl.is_null() {
            println!("[prcmon] [-] Read IRP carries no MDL.");
            return None;
        }

        let buffer = unsafe { MmGetSystemAddressForMdlSafe(mdl, NormalPagePriority as u32) };
        if buffer.is_null() {
            println!("[prcmon] [-] Failed to lock buffer.");
            return None;
        }

        // the MDL describes exactly Parameters.Read.Length bytes
        Some(unsafe { slice::from_raw_parts_mut(buffer as *mut u8, self.len as usize) })
    }
}

/// Copies queued records into the reader's buffer.
///
/// # Returns
///
/// Success: the number of bytes written, possibly zero.
///
/// Error: STATUS_INSUFFICIENT_RESOURCES if the buffer could not be mapped, in which case
/// the queue is left alone.
pub fn handle_read(
    ctx: &PrcMonContext,
    p_stack_location: *mut _IO_STACK_LOCATION,
    pirp: PIRP,
) -> Result<usize, NTSTATUS> {
    let mut read_buffer = ReadBuffer::new(p_stack_location, pirp);

    dispatch::read(&ctx.queue, read_buffer.map()).map_err(|e| {
        println!("[prcmon] [-] Read failed: {e}");
        STATUS_INSUFFICIENT_RESOURCES
    })
}
