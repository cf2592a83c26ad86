//! Read side of the device.
//!
//! Opening and closing the device carry no state, so the only request with logic
//! behind it is a read: copy as many whole records as fit into the caller's
//! buffer and return straight away, even when nothing is queued.

use core::fmt;

use crate::queue::{EventQueue, QueueLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchError {
    /// The destination buffer could not be locked into memory for the copy.
    BufferNotResident,
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::BufferNotResident => write!(f, "read buffer could not be mapped"),
        }
    }
}

/// Serves one read request.
///
/// `destination` is `None` when the caller's buffer could not be made resident, in which
/// case the queue is not touched. Returns the number of bytes written, which is zero when
/// the queue is empty or its oldest record does not fit.
pub fn read<L: QueueLock>(
    queue: &EventQueue<L>,
    destination: Option<&mut [u8]>,
) -> Result<usize, DispatchError> {
    let destination = destination.ok_or(DispatchError::BufferNotResident)?;
    if destination.is_empty() {
        return Ok(0);
    }

    Ok(queue.drain(destination))
}
