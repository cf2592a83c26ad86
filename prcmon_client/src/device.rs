//! The handle to the PrcMon device.

use std::iter::once;

use shared_no_std::constants::DRIVER_UM_NAME;
use windows::{
    core::PCWSTR,
    Win32::{
        Foundation::{CloseHandle, GENERIC_READ, HANDLE},
        Storage::FileSystem::{CreateFileW, ReadFile, FILE_ATTRIBUTE_NORMAL, FILE_SHARE_MODE, OPEN_EXISTING},
    },
};

/// An open handle to \\.\PrcMon. The handle is closed when this goes out of scope.
pub struct DriverHandle {
    handle: HANDLE,
}

impl DriverHandle {
    /// Opens the device for reading.
    ///
    /// # Errors
    ///
    /// Fails if the driver is not loaded, or the caller lacks the rights to open it.
    pub fn open() -> windows::core::Result<Self> {
        let path: Vec<u16> = DRIVER_UM_NAME.encode_utf16().chain(once(0)).collect();

        let handle = unsafe {
            CreateFileW(
                PCWSTR::from_raw(path.as_ptr()),
                GENERIC_READ.0,
                FILE_SHARE_MODE(0),
                None,
                OPEN_EXISTING,
                FILE_ATTRIBUTE_NORMAL,
                HANDLE::default(),
            )?
        };

        Ok(DriverHandle { handle })
    }

    /// Reads whatever whole records the driver has queued. Returns immediately, with zero
    /// bytes when nothing is waiting.
    pub fn read(&self, buf: &mut [u8]) -> windows::core::Result<usize> {
        let mut bytes_read: u32 = 0;
        unsafe { ReadFile(self.handle, Some(buf), Some(&mut bytes_read as *mut u32), None)? };

        Ok(bytes_read as usize)
    }
}

impl Drop for DriverHandle {
    fn drop(&mut self) {
        if !self.handle.is_invalid() {
            if let Err(e) = unsafe { CloseHandle(self.handle) } {
                log::error!("Unable to close handle to the driver. Error: {e}");
            }
        }
    }
}
