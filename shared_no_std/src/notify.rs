//! Turning process lifecycle notifications into queued records.
//!
//! The driver's notify routine builds a [`ProcessNotification`] from the structures the
//! kernel hands it and calls [`capture`]. The notification only borrows from those
//! structures, so nothing the kernel owns outlives the callback.

use crate::{
    queue::{EventQueue, QueueLock},
    record::{CodecError, EventRecord},
};

/// A process creation or exit, borrowed for the duration of one notify callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessNotification<'a> {
    Created {
        time: i64,
        process_id: u32,
        parent_process_id: u32,
        command_line: Option<&'a [u16]>,
    },
    Exited {
        time: i64,
        process_id: u32,
        exit_status: u32,
    },
}

/// Outcome of a successful capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Captured {
    Queued,
    /// Queued, but the oldest record was dropped to make room.
    QueuedWithEviction,
}

/// Encodes the notification and pushes it onto the queue.
///
/// On error nothing is queued; the caller logs and moves on, the event is lost.
pub fn capture<L: QueueLock>(
    queue: &EventQueue<L>,
    notification: ProcessNotification<'_>,
) -> Result<Captured, CodecError> {
    let record = match notification {
        ProcessNotification::Created {
            time,
            process_id,
            parent_process_id,
            command_line,
        } => EventRecord::process_create(time, process_id, parent_process_id, command_line)?,
        ProcessNotification::Exited {
            time,
            process_id,
            exit_status,
        } => EventRecord::process_exit(time, process_id, exit_status)?,
    };

    if queue.push(record) {
        Ok(Captured::QueuedWithEviction)
    } else {
        Ok(Captured::Queued)
    }
}
