//! Bringing the driver up and tearing it down.
//!
//! Startup creates three kernel resources in order: the device object, its DOS alias and
//! the process notify registration. Each one is flagged once it exists, and teardown only
//! undoes what is flagged, so it is safe after a partial startup and safe to call twice.

use core::{
    fmt,
    sync::atomic::{AtomicBool, Ordering},
};

use crate::{
    constants::{MIN_OS_MAJOR, MIN_OS_MINOR},
    queue::{EventQueue, QueueLock},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OsVersion {
    pub major: u32,
    pub minor: u32,
    pub build: u32,
}

impl OsVersion {
    pub fn is_supported(&self) -> bool {
        (self.major, self.minor) >= (MIN_OS_MAJOR, MIN_OS_MINOR)
    }
}

impl fmt::Display for OsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.build)
    }
}

/// The kernel services startup and teardown are built from.
pub trait DriverPlatform {
    /// Status code reported by a failing kernel call.
    type Status: Copy + fmt::Debug;

    fn os_version(&self) -> OsVersion;

    fn create_device(&mut self) -> Result<(), Self::Status>;
    fn create_symbolic_link(&mut self) -> Result<(), Self::Status>;
    fn register_process_callback(&mut self) -> Result<(), Self::Status>;

    fn unregister_process_callback(&mut self) -> Result<(), Self::Status>;
    fn delete_symbolic_link(&mut self);
    fn delete_device(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupError<S> {
    /// The OS is older than the oldest supported version; nothing was created.
    UnsupportedPlatform(OsVersion),
    DeviceCreation(S),
    SymbolicLink(S),
    CallbackRegistration(S),
}

impl<S: Copy> StartupError<S> {
    /// The status of the failed kernel call, if the failure came from one.
    pub fn status(&self) -> Option<S> {
        match self {
            StartupError::UnsupportedPlatform(_) => None,
            StartupError::DeviceCreation(s)
            | StartupError::SymbolicLink(s)
            | StartupError::CallbackRegistration(s) => Some(*s),
        }
    }
}

impl<S: fmt::Debug> fmt::Display for StartupError<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartupError::UnsupportedPlatform(v) => write!(f, "OS version {v} is not supported"),
            StartupError::DeviceCreation(s) => write!(f, "unable to create device: {s:?}"),
            StartupError::SymbolicLink(s) => write!(f, "unable to create symbolic link: {s:?}"),
            StartupError::CallbackRegistration(s) => write!(f, "unable to register process callback: {s:?}"),
        }
    }
}

/// Tracks which resources currently exist.
#[derive(Debug, Default)]
pub struct Lifecycle {
    device: AtomicBool,
    symbolic_link: AtomicBool,
    callback: AtomicBool,
}

impl Lifecycle {
    pub const fn new() -> Self {
        Lifecycle {
            device: AtomicBool::new(false),
            symbolic_link: AtomicBool::new(false),
            callback: AtomicBool::new(false),
        }
    }

    /// Checks the OS version, then creates the device, the symbolic link and registers the
    /// notify routine. On any failure everything created so far is torn down again.
    pub fn start<P: DriverPlatform, L: QueueLock>(
        &self,
        platform: &mut P,
        queue: &EventQueue<L>,
    ) -> Result<(), StartupError<P::Status>> {
        let version = platform.os_version();
        if !version.is_supported() {
            return Err(StartupError::UnsupportedPlatform(version));
        }

        if let Err(e) = self.bring_up(platform) {
            self.teardown(platform, queue);
            return Err(e);
        }

        Ok(())
    }

    fn bring_up<P: DriverPlatform>(&self, platform: &mut P) -> Result<(), StartupError<P::Status>> {
        platform.create_device().map_err(StartupError::DeviceCreation)?;
        self.device.store(true, Ordering::SeqCst);

        platform.create_symbolic_link().map_err(StartupError::SymbolicLink)?;
        self.symbolic_link.store(true, Ordering::SeqCst);

        platform
            .register_process_callback()
            .map_err(StartupError::CallbackRegistration)?;
        self.callback.store(true, Ordering::SeqCst);

        Ok(())
    }

    /// Unregisters the notify routine, frees every queued record, then removes the symbolic
    /// link and the device, each only if it exists. Returns the number of records freed.
    ///
    /// The notify routine goes first so nothing can push while the queue is emptied. If the
    /// kernel refuses to remove it, it stays flagged as registered and the caller must keep
    /// the queue alive.
    pub fn teardown<P: DriverPlatform, L: QueueLock>(&self, platform: &mut P, queue: &EventQueue<L>) -> usize {
        if self.callback.swap(false, Ordering::SeqCst) && platform.unregister_process_callback().is_err() {
            self.callback.store(true, Ordering::SeqCst);
        }

        let freed = queue.drain_all();

        if self.symbolic_link.swap(false, Ordering::SeqCst) {
            platform.delete_symbolic_link();
        }
        if self.device.swap(false, Ordering::SeqCst) {
            platform.delete_device();
        }

        freed
    }

    /// Whether the notify routine can still be called.
    pub fn callback_registered(&self) -> bool {
        self.callback.load(Ordering::SeqCst)
    }
}
