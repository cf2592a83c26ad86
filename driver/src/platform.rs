//! The kernel calls behind driver startup and teardown.

use alloc::vec::Vec;
use core::ptr::null_mut;

use shared_no_std::{
    constants::{DOS_DEVICE_NAME, NT_DEVICE_NAME},
    lifecycle::{DriverPlatform, OsVersion},
};
use wdk::{nt_success, println};
use wdk_sys::{
    ntddk::{
        IoCreateDevice, IoCreateSymbolicLink, IoDeleteDevice, IoDeleteSymbolicLink, PsSetCreateProcessNotifyRoutineEx,
        RtlGetVersion,
    },
    DO_DIRECT_IO, DRIVER_OBJECT, FALSE, FILE_DEVICE_SECURE_OPEN, FILE_DEVICE_UNKNOWN, NTSTATUS, PDEVICE_OBJECT,
    RTL_OSVERSIONINFOW, TRUE,
};

use crate::{
    core::core_callback_notify_ps,
    utils::{ToU16Vec, ToUnicodeString},
};

/// Creates and removes the PrcMon device, its symbolic link and the process notify
/// registration for one driver object.
pub struct WdkPlatform {
    driver: *mut DRIVER_OBJECT,
    // backing storage for the UNICODE_STRINGs handed to the I/O manager
    nt_name: Vec<u16>,
    dos_name: Vec<u16>,
}

impl WdkPlatform {
    pub fn new(driver: *mut DRIVER_OBJECT) -> Self {
        WdkPlatform {
            driver,
            nt_name: NT_DEVICE_NAME.to_u16_vec(),
            dos_name: DOS_DEVICE_NAME.to_u16_vec(),
        }
    }
}

impl DriverPlatform for WdkPlatform {
    type Status = NTSTATUS;

    fn os_version(&self) -> OsVersion {
        let mut info: RTL_OSVERSIONINFOW = unsafe { core::mem::zeroed() };
        info.dwOSVersionInfoSize = core::mem::size_of::<RTL_OSVERSIONINFOW>() as u32;

        // RtlGetVersion always succeeds for RTL_OSVERSIONINFOW
        let _ = unsafe { RtlGetVersion(&mut info) };

        let version = OsVersion {
            major: info.dwMajorVersion,
            minor: info.dwMinorVersion,
            build: info.dwBuildNumber,
        };
        println!("[prcmon] [i] OS Version: {version}");

        version
    }

    fn create_device(&mut self) -> Result<(), NTSTATUS> {
        let mut nt_name = self.nt_name.to_unicode_string().map_err(|e| e.status())?;
        let mut device_object: PDEVICE_OBJECT = null_mut();

        let res = unsafe {
            IoCreateDevice(
                self.driver,
                0,
                &mut nt_name,
                FILE_DEVICE_UNKNOWN, // If a type of hardware does not match any of the defined types, specify a value of either FILE_DEVICE_UNKNOWN
                FILE_DEVICE_SECURE_OPEN,
                FALSE as u8,
                &mut device_object,
            )
        };
        if !nt_success(res) {
            println!("[prcmon] [-] Unable to create device via IoCreateDevice. Failed with code: {res}.");
            return Err(res);
        }

        // Reads are served straight into the caller's locked pages through an MDL.
        unsafe { (*device_object).Flags |= DO_DIRECT_IO };

        Ok(())
    }

    fn create_symbolic_link(&mut self) -> Result<(), NTSTATUS> {
        let mut nt_name = self.nt_name.to_unicode_string().map_err(|e| e.status())?;
        let mut dos_name = self.dos_name.to_unicode_string().map_err(|e| e.status())?;

        let res = unsafe { IoCreateSymbolicLink(&mut dos_name, &mut nt_name) };
        if !nt_success(res) {
            println!("[prcmon] [-] Failed to create driver symbolic link. Error: {res}");
            return Err(res);
        }

        Ok(())
    }

    fn register_process_callback(&mut self) -> Result<(), NTSTATUS> {
        let res = unsafe { PsSetCreateProcessNotifyRoutineEx(Some(core_callback_notify_ps), FALSE as u8) };
        if !nt_success(res) {
            println!("[prcmon] [-] Failed to register process callback. Error: {res}");
            return Err(res);
        }

        Ok(())
    }

    fn unregister_process_callback(&mut self) -> Result<(), NTSTATUS> {
        let res = unsafe { PsSetCreateProcessNotifyRoutineEx(Some(core_callback_notify_ps), TRUE as u8) };
        if !nt_success(res) {
            println!("[prcmon] [-] Error removing PsSetCreateProcessNotifyRoutineEx from callback routines. Error: {res}");
            return Err(res);
        }

        Ok(())
    }

    fn delete_symbolic_link(&mut self) {
        let Ok(mut dos_name) = self.dos_name.to_unicode_string() else {
            return;
        };

        let res = unsafe { IoDeleteSymbolicLink(&mut dos_name) };
        if !nt_success(res) {
            println!("[prcmon] [-] Failed to delete symbolic link. Error: {res}");
        }
    }

    fn delete_device(&mut self) {
        let device = unsafe { (*self.driver).DeviceObject };
        if !device.is_null() {
            unsafe { IoDeleteDevice(device) };
        }
    }
}
