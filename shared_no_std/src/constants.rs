// Constant literals (or types not part of the Windows API) for use across the project

// these should end with the same name
pub static NT_DEVICE_NAME: &str = "\\Device\\PrcMon";
pub static DOS_DEVICE_NAME: &str = "\\??\\PrcMon";
pub static DRIVER_UM_NAME: &str = "\\\\.\\PrcMon"; // \\.\ sets device namespace

/// Once the queue holds more than this many records, the oldest is evicted before the
/// next one is inserted, so the observed depth peaks at `QUEUE_SOFT_CAPACITY + 1`.
pub const QUEUE_SOFT_CAPACITY: usize = 1000;

/// Upper bound on the number of records the queue can hold at any instant.
pub const QUEUE_MAX_DEPTH: usize = QUEUE_SOFT_CAPACITY + 1;

// version info
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PrcMonVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl core::fmt::Display for PrcMonVersion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

pub static VERSION_DRIVER: PrcMonVersion = PrcMonVersion { major: 0, minor: 1, patch: 0 };
pub static VERSION_CLIENT: PrcMonVersion = PrcMonVersion { major: 0, minor: 1, patch: 0 };

/// Oldest kernel the driver loads on: 6.1, Windows 7.
pub const MIN_OS_MAJOR: u32 = 6;
pub const MIN_OS_MINOR: u32 = 1;

// client defaults, the buffer fits the largest possible record so a read can always
// make progress
pub const CLIENT_READ_BUFFER_SIZE: usize = crate::record::MAX_RECORD_SIZE;
pub const CLIENT_POLL_INTERVAL_MS: u64 = 200;
