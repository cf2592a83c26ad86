//! The bounded FIFO holding records until the reader collects them.
//!
//! The queue is shared between the process notify routine (any number of threads at once)
//! and the read dispatch routine. Every access goes through one blocking lock supplied by
//! the embedder: a FAST_MUTEX in the driver, a plain test lock on the host.

use alloc::collections::{TryReserveError, VecDeque};
use core::{cell::UnsafeCell, fmt};

use crate::{
    constants::{QUEUE_MAX_DEPTH, QUEUE_SOFT_CAPACITY},
    record::EventRecord,
};

/// A blocking, non-reentrant mutual exclusion primitive.
///
/// # Safety
///
/// Implementors must guarantee that between a return from `acquire` and the matching
/// `release` no other caller returns from `acquire`.
pub unsafe trait QueueLock {
    /// Blocks until the lock is held by the caller.
    fn acquire(&self);

    /// Releases the lock.
    ///
    /// # Safety
    ///
    /// The caller must currently hold the lock.
    unsafe fn release(&self);
}

/// Holds a [`QueueLock`] for as long as it is in scope.
pub struct AutoLock<'a, L: QueueLock> {
    lock: &'a L,
}

impl<'a, L: QueueLock> AutoLock<'a, L> {
    pub fn new(lock: &'a L) -> Self {
        lock.acquire();
        AutoLock { lock }
    }
}

impl<L: QueueLock> Drop for AutoLock<'_, L> {
    fn drop(&mut self) {
        // SAFETY: acquired in `new`
        unsafe { self.lock.release() };
    }
}

#[derive(Debug)]
pub enum QueueError {
    /// The backing storage for the queue could not be reserved.
    AllocationFailed(TryReserveError),
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueError::AllocationFailed(e) => write!(f, "unable to reserve queue storage: {e}"),
        }
    }
}

struct RecordList {
    items: VecDeque<EventRecord>,
    evicted: u64,
}

/// Bounded FIFO of [`EventRecord`]s guarded by a single lock.
pub struct EventQueue<L: QueueLock> {
    lock: L,
    list: UnsafeCell<RecordList>,
}

// SAFETY: the list is only reached through `locked`, which holds the lock for the whole
// access, and records are plain owned bytes.
unsafe impl<L: QueueLock + Sync> Sync for EventQueue<L> {}
unsafe impl<L: QueueLock + Send> Send for EventQueue<L> {}

impl<L: QueueLock> EventQueue<L> {
    /// Creates an empty queue, reserving room for the deepest it can get so that pushing
    /// never allocates while the lock is held.
    pub fn new(lock: L) -> Result<Self, QueueError> {
        let mut items = VecDeque::new();
        items
            .try_reserve_exact(QUEUE_MAX_DEPTH)
            .map_err(QueueError::AllocationFailed)?;

        Ok(EventQueue {
            lock,
            list: UnsafeCell::new(RecordList { items, evicted: 0 }),
        })
    }

    fn locked<R>(&self, f: impl FnOnce(&mut RecordList) -> R) -> R {
        let _guard = AutoLock::new(&self.lock);
        // SAFETY: the guard gives us exclusive access until it is dropped, and the
        // reference does not escape the closure.
        let list = unsafe { &mut *self.list.get() };
        f(list)
    }

    /// Appends a record at the tail. When the queue already holds more than
    /// [`QUEUE_SOFT_CAPACITY`] records the oldest one is dropped first.
    ///
    /// Returns `true` if a record was evicted to make room.
    pub fn push(&self, record: EventRecord) -> bool {
        self.locked(|list| {
            let evicted = if list.items.len() > QUEUE_SOFT_CAPACITY {
                list.items.pop_front();
                list.evicted += 1;
                true
            } else {
                false
            };
            list.items.push_back(record);
            evicted
        })
    }

    /// Moves as many whole records as fit into `out`, oldest first, and returns the number
    /// of bytes written. Stops at the first record larger than the space left, which stays
    /// at the head for the next call.
    pub fn drain(&self, out: &mut [u8]) -> usize {
        self.locked(|list| {
            let mut written = 0;
            while let Some(head) = list.items.front() {
                let size = head.size();
                if size > out.len() - written {
                    break;
                }

                out[written..written + size].copy_from_slice(head.as_bytes());
                written += size;
                list.items.pop_front();
            }
            written
        })
    }

    /// Frees every queued record without copying it anywhere. Returns how many were freed.
    pub fn drain_all(&self) -> usize {
        self.locked(|list| {
            let count = list.items.len();
            list.items.clear();
            count
        })
    }

    /// Current queue depth.
    pub fn len(&self) -> usize {
        self.locked(|list| list.items.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of records dropped to overflow since the queue was created.
    pub fn evicted(&self) -> u64 {
        self.locked(|list| list.evicted)
    }

    #[cfg(test)]
    pub(crate) fn snapshot(&self) -> alloc::vec::Vec<alloc::vec::Vec<u8>> {
        self.locked(|list| list.items.iter().map(|r| r.as_bytes().to_vec()).collect())
    }
}


#[cfg(test)]
mod tests {
    use super::{test_lock::SpinLock, *};
    use crate::record::{decode_records, Record, PROCESS_EXIT_SIZE};
    use alloc::{sync::Arc, vec, vec::Vec};

    fn queue() -> EventQueue<SpinLock> {
        EventQueue::new(SpinLock::default()).unwrap()
    }

    fn exit(pid: u32) -> EventRecord {
        EventRecord::process_exit(0, pid, 0).unwrap()
    }

    fn pids(bytes: &[u8]) -> Vec<u32> {
        decode_records(bytes).map(|r| r.unwrap().process_id()).collect()
    }

    #[test]
    fn drain_returns_records_in_push_order() {
        let q = queue();
        for pid in 1..=5 {
            assert!(!q.push(exit(pid)));
        }
        assert_eq!(q.len(), 5);

        let mut buf = [0u8; 4096];
        let n = q.drain(&mut buf);
        assert_eq!(n, 5 * PROCESS_EXIT_SIZE);
        assert_eq!(pids(&buf[..n]), vec![1, 2, 3, 4, 5]);
        assert!(q.is_empty());
    }

    #[test]
    fn drain_empty_queue_returns_zero() {
        let q = queue();
        let mut buf = [0u8; 64];
        assert_eq!(q.drain(&mut buf), 0);
        assert_eq!(q.drain(&mut []), 0);
    }

    #[test]
    fn drain_never_splits_a_record() {
        let q = queue();
        for pid in 1..=3 {
            q.push(exit(pid));
        }

        // room for two records and a bit
        let mut buf = [0u8; PROCESS_EXIT_SIZE * 2 + 10];
        let n = q.drain(&mut buf);
        assert_eq!(n, PROCESS_EXIT_SIZE * 2);
        assert_eq!(pids(&buf[..n]), vec![1, 2]);
        assert_eq!(q.len(), 1);

        let n = q.drain(&mut buf);
        assert_eq!(pids(&buf[..n]), vec![3]);
    }

    #[test]
    fn head_too_large_leaves_queue_untouched() {
        let q = queue();
        let cmd: Vec<u16> = "C:\\Windows\\System32\\svchost.exe -k netsvcs".encode_utf16().collect();
        q.push(EventRecord::process_create(0, 7, 4, Some(cmd.as_slice())).unwrap());
        q.push(exit(7));
        let before = q.snapshot();

        let mut buf = [0u8; 40];
        assert_eq!(q.drain(&mut buf), 0);
        assert_eq!(q.snapshot(), before);
        assert_eq!(buf, [0u8; 40]);
    }

    #[test]
    fn overflow_evicts_oldest_first() {
        let q = queue();
        for pid in 0..=QUEUE_SOFT_CAPACITY as u32 {
            assert!(!q.push(exit(pid)));
        }
        assert_eq!(q.len(), QUEUE_MAX_DEPTH);

        assert!(q.push(exit(5000)));
        assert_eq!(q.len(), QUEUE_MAX_DEPTH);
        assert_eq!(q.evicted(), 1);

        let snapshot = q.snapshot();
        assert_eq!(Record::decode(&snapshot[0]).unwrap().process_id(), 1);
        assert_eq!(Record::decode(snapshot.last().unwrap()).unwrap().process_id(), 5000);
    }

    #[test]
    fn push_onto_exactly_soft_capacity_evicts_nothing() {
        let q = queue();
        for pid in 0..QUEUE_SOFT_CAPACITY as u32 {
            q.push(exit(pid));
        }

        // depth 1000 is not over the limit yet, so this grows the queue to 1001
        assert!(!q.push(exit(9999)));
        assert_eq!(q.len(), QUEUE_SOFT_CAPACITY + 1);
        assert_eq!(q.evicted(), 0);

        // and the next push evicts pid 0
        assert!(q.push(exit(10_000)));
        let snapshot = q.snapshot();
        assert_eq!(Record::decode(&snapshot[0]).unwrap().process_id(), 1);
        assert_eq!(Record::decode(snapshot.last().unwrap()).unwrap().process_id(), 10_000);
    }

    #[test]
    fn drain_all_frees_everything() {
        let q = queue();
        for pid in 0..1000 {
            q.push(exit(pid));
        }
        assert_eq!(q.drain_all(), 1000);
        assert!(q.is_empty());
        assert_eq!(q.drain_all(), 0);
    }

    #[test]
    fn concurrent_pushes_keep_count_and_per_thread_order() {
        const THREADS: u32 = 8;
        const PER_THREAD: u32 = 200;

        let q = Arc::new(queue());
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let q = Arc::clone(&q);
                std::thread::spawn(move || {
                    for i in 0..PER_THREAD {
                        q.push(exit(t * 10_000 + i));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let pushes = (THREADS * PER_THREAD) as usize;
        let evicted = q.evicted() as usize;
        assert_eq!(q.len(), pushes - evicted);
        assert_eq!(q.len(), QUEUE_MAX_DEPTH);

        let mut buf = vec![0u8; QUEUE_MAX_DEPTH * PROCESS_EXIT_SIZE];
        let n = q.drain(&mut buf);
        let drained = pids(&buf[..n]);
        assert_eq!(drained.len(), QUEUE_MAX_DEPTH);

        // each producer's records stay in the order it pushed them
        for t in 0..THREADS {
            let mine: Vec<u32> = drained.iter().copied().filter(|p| p / 10_000 == t).collect();
            assert!(mine.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
