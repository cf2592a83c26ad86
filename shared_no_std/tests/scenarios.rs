use std::sync::atomic::{AtomicBool, Ordering};

use shared_no_std::{
    constants::QUEUE_SOFT_CAPACITY,
    dispatch,
    notify::{capture, ProcessNotification},
    queue::{EventQueue, QueueLock},
    record::{decode_records, EventRecord, Record, PROCESS_EXIT_SIZE},
};

#[derive(Default)]
struct TestLock {
    held: AtomicBool,
}

unsafe impl QueueLock for TestLock {
    fn acquire(&self) {
        while self
            .held
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            std::thread::yield_now();
        }
    }

    unsafe fn release(&self) {
        self.held.store(false, Ordering::Release);
    }
}

fn queue() -> EventQueue<TestLock> {
    EventQueue::new(TestLock::default()).unwrap()
}

fn notepad() -> Vec<u16> {
    "notepad.exe".encode_utf16().collect()
}

#[test]
fn create_then_exit_drain_in_order() {
    let q = queue();
    let cmd = notepad();

    let create = EventRecord::process_create(10, 100, 4, Some(cmd.as_slice())).unwrap();
    let exit = EventRecord::process_exit(20, 100, 0).unwrap();
    let mut expected = create.as_bytes().to_vec();
    expected.extend_from_slice(exit.as_bytes());

    capture(
        &q,
        ProcessNotification::Created {
            time: 10,
            process_id: 100,
            parent_process_id: 4,
            command_line: Some(cmd.as_slice()),
        },
    )
    .unwrap();
    capture(
        &q,
        ProcessNotification::Exited {
            time: 20,
            process_id: 100,
            exit_status: 0,
        },
    )
    .unwrap();

    let mut buf = vec![0u8; 4096];
    let n = dispatch::read(&q, Some(&mut buf[..])).unwrap();
    assert_eq!(&buf[..n], &expected[..]);

    let records: Vec<Record> = decode_records(&buf[..n]).map(Result::unwrap).collect();
    assert_eq!(records.len(), 2);
    assert!(matches!(records[0], Record::ProcessCreate(info) if info.parent_process_id == 4));
    assert!(matches!(records[1], Record::ProcessExit(info) if info.process_id == 100));
    assert!(q.is_empty());
}

#[test]
fn read_smaller_than_head_returns_nothing() {
    let q = queue();
    let cmd = notepad();
    q.push(EventRecord::process_create(1, 100, 4, Some(cmd.as_slice())).unwrap());

    let mut small = [0u8; 16];
    assert_eq!(dispatch::read(&q, Some(&mut small[..])), Ok(0));
    assert_eq!(q.len(), 1);

    // the same record comes out whole once there is room for it
    let mut buf = [0u8; 128];
    let n = dispatch::read(&q, Some(&mut buf[..])).unwrap();
    let records: Vec<_> = decode_records(&buf[..n]).collect();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].unwrap().process_id(), 100);
}

#[test]
fn slow_reader_loses_oldest_events() {
    let q = queue();
    let total = QUEUE_SOFT_CAPACITY as u32 + 50;
    for pid in 0..total {
        q.push(EventRecord::process_exit(0, pid, 0).unwrap());
    }

    let mut buf = vec![0u8; 2048 * PROCESS_EXIT_SIZE];
    let n = dispatch::read(&q, Some(&mut buf[..])).unwrap();
    let pids: Vec<u32> = decode_records(&buf[..n]).map(|r| r.unwrap().process_id()).collect();

    assert_eq!(pids.len(), QUEUE_SOFT_CAPACITY + 1);
    assert_eq!(*pids.last().unwrap(), total - 1);
    assert_eq!(pids[0], total - pids.len() as u32);
    assert_eq!(q.evicted() as usize, total as usize - pids.len());
}

#[test]
fn concurrent_producers_and_reader() {
    use std::sync::Arc;

    const PRODUCERS: u32 = 4;
    const PER_PRODUCER: u32 = 500;

    let q = Arc::new(queue());
    let producers: Vec<_> = (0..PRODUCERS)
        .map(|t| {
            let q = Arc::clone(&q);
            std::thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    let cmd: Vec<u16> = format!("worker{t}.exe --n {i}").encode_utf16().collect();
                    capture(
                        &q,
                        ProcessNotification::Created {
                            time: i as i64,
                            process_id: t * 100_000 + i,
                            parent_process_id: t,
                            command_line: Some(cmd.as_slice()),
                        },
                    )
                    .unwrap();
                }
            })
        })
        .collect();

    let mut seen = 0usize;
    let mut buf = vec![0u8; 1024];
    while producers.iter().any(|p| !p.is_finished()) {
        let n = dispatch::read(&q, Some(&mut buf[..])).unwrap();
        for record in decode_records(&buf[..n]) {
            let Record::ProcessCreate(info) = record.unwrap() else {
                panic!("only creations were pushed");
            };
            let cmd = info.command_line.unwrap().to_string_lossy();
            assert_eq!(cmd, format!("worker{}.exe --n {}", info.parent_process_id, info.time));
            seen += 1;
        }
    }
    for p in producers {
        p.join().unwrap();
    }

    loop {
        let n = dispatch::read(&q, Some(&mut buf[..])).unwrap();
        if n == 0 {
            break;
        }
        seen += decode_records(&buf[..n]).count();
    }

    assert_eq!(seen + q.evicted() as usize, (PRODUCERS * PER_PRODUCER) as usize);
    assert!(q.is_empty());
}
