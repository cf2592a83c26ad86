// PrcMon Windows Kernel Mode Driver written in Rust
//
// Records every process creation and exit on the system and hands them to a single
// user mode reader through \\.\PrcMon.

#![no_std]
extern crate alloc;

#[cfg(not(test))]
extern crate wdk_panic;

use ::core::{
    ptr::null_mut,
    sync::atomic::{AtomicPtr, Ordering},
};

use alloc::boxed::Box;
use device_comms::handle_read;
use ffi::IoGetCurrentIrpStackLocation;
use platform::WdkPlatform;
use shared_no_std::{
    boxed::try_box,
    constants::VERSION_DRIVER,
    lifecycle::{Lifecycle, StartupError},
    queue::EventQueue,
};
use sync::FastMutex;
use wdk::println;
use wdk_sys::{
    ntddk::IofCompleteRequest, DEVICE_OBJECT, DRIVER_OBJECT, IO_NO_INCREMENT, IRP_MJ_CLOSE, IRP_MJ_CREATE, IRP_MJ_READ,
    NTSTATUS, PCUNICODE_STRING, PIRP, PUNICODE_STRING, STATUS_INSUFFICIENT_RESOURCES, STATUS_NOT_SUPPORTED,
    STATUS_SUCCESS, STATUS_UNSUCCESSFUL,
};

mod core;
mod device_comms;
mod ffi;
mod platform;
mod sync;
mod utils;

use wdk_alloc::WdkAllocator;
#[global_allocator]
static GLOBAL_ALLOCATOR: WdkAllocator = WdkAllocator;

/// State shared between the notify routine, the dispatch routines and unload.
pub struct PrcMonContext {
    pub queue: EventQueue<FastMutex>,
    pub lifecycle: Lifecycle,
}

/// The notify routine gets no context argument, so the context is reachable through this
/// pointer for as long as the driver is loaded. Set before the routine is registered and
/// cleared only after it is unregistered.
static PRCMON_CONTEXT: AtomicPtr<PrcMonContext> = AtomicPtr::new(null_mut());

pub(crate) fn context() -> Option<&'static PrcMonContext> {
    let ptr = PRCMON_CONTEXT.load(Ordering::SeqCst);
    if ptr.is_null() {
        None
    } else {
        Some(unsafe { &*ptr })
    }
}

/// DriverEntry is required to start the driver, and acts as the main entrypoint
/// for our driver.
#[export_name = "DriverEntry"] // WDF expects a symbol with the name DriverEntry
pub unsafe extern "system" fn driver_entry(driver: &mut DRIVER_OBJECT, registry_path: PCUNICODE_STRING) -> NTSTATUS {
    println!("[prcmon] [i] Starting PrcMon driver... Version: {}", VERSION_DRIVER);

    configure_driver(driver, registry_path as *mut _)
}

/// This deals with setting up the driver and any callbacks / configurations required
/// for its operation and lifetime.
pub unsafe extern "C" fn configure_driver(driver: *mut DRIVER_OBJECT, _registry_path: PUNICODE_STRING) -> NTSTATUS {
    //
    // Initialise the context holding the event queue
    //
    let Some(lock) = FastMutex::new() else {
        println!("[prcmon] [-] Unable to allocate the queue lock.");
        return STATUS_INSUFFICIENT_RESOURCES;
    };
    let queue = match EventQueue::new(lock) {
        Ok(q) => q,
        Err(e) => {
            println!("[prcmon] [-] {e}");
            return STATUS_INSUFFICIENT_RESOURCES;
        }
    };
    let context = match try_box(PrcMonContext {
        queue,
        lifecycle: Lifecycle::new(),
    }) {
        Ok(c) => c,
        Err(_) => {
            println!("[prcmon] [-] Unable to allocate the driver context.");
            return STATUS_INSUFFICIENT_RESOURCES;
        }
    };
    PRCMON_CONTEXT.store(Box::into_raw(context), Ordering::SeqCst);

    //
    // Configure the drivers callbacks
    //
    (*driver).MajorFunction[IRP_MJ_CREATE as usize] = Some(prcmon_create_close);
    (*driver).MajorFunction[IRP_MJ_CLOSE as usize] = Some(prcmon_create_close);
    (*driver).MajorFunction[IRP_MJ_READ as usize] = Some(prcmon_read);
    (*driver).DriverUnload = Some(driver_exit);

    //
    // Create the device and symbolic link, then start intercepting process creation
    //
    let Some(ctx) = context() else {
        return STATUS_UNSUCCESSFUL;
    };
    let mut platform = WdkPlatform::new(driver);

    match ctx.lifecycle.start(&mut platform, &ctx.queue) {
        Ok(()) => {
            println!("[prcmon] [+] DriverEntry completed successfully");
            STATUS_SUCCESS
        }
        Err(e) => {
            println!("[prcmon] [-] Failed to start: {e}");
            // start has already undone whatever it created
            release_context();

            match e {
                StartupError::UnsupportedPlatform(_) => STATUS_NOT_SUPPORTED,
                _ => e.status().unwrap_or(STATUS_UNSUCCESSFUL),
            }
        }
    }
}

/// Frees the context once nothing can reach it any more.
fn release_context() {
    let ptr = PRCMON_CONTEXT.swap(null_mut(), Ordering::SeqCst);
    if !ptr.is_null() {
        // allow rust to clean up the memory
        unsafe {
            let _ = Box::from_raw(ptr);
        }
    }
}

/// Driver unload functions when it is to exit.
///
/// # Safety
///
/// This function makes use of unsafe code.
extern "C" fn driver_exit(driver: *mut DRIVER_OBJECT) {
    println!("[prcmon] [i] unloading driver...");

    let mut still_registered = false;
    if let Some(ctx) = context() {
        let mut platform = WdkPlatform::new(driver);
        let freed = ctx.lifecycle.teardown(&mut platform, &ctx.queue);
        println!(
            "[prcmon] [i] freed {freed} unread records, {} dropped to overflow while loaded",
            ctx.queue.evicted()
        );
        still_registered = ctx.lifecycle.callback_registered();
    }

    // the notify routine may still read the context, so it is leaked rather than freed
    if still_registered {
        println!("[prcmon] [-] Process callback still registered, leaving the driver context allocated.");
    } else {
        release_context();
    }

    println!("[prcmon] driver unloaded successfully...");
}

unsafe extern "C" fn prcmon_create_close(_device: *mut DEVICE_OBJECT, pirp: PIRP) -> NTSTATUS {
    (*pirp).IoStatus.__bindgen_anon_1.Status = STATUS_SUCCESS;
    (*pirp).IoStatus.Information = 0;
    IofCompleteRequest(pirp, IO_NO_INCREMENT as i8);

    STATUS_SUCCESS
}

/// Device read handler.
///
/// Drains whole records into the caller's buffer and completes immediately, with zero
/// bytes if nothing is queued.
///
/// # Arguments
///
/// - '_device': Unused
/// - 'irp': A pointer to the I/O request packet (IRP) that contains information about the request
unsafe extern "C" fn prcmon_read(_device: *mut DEVICE_OBJECT, pirp: PIRP) -> NTSTATUS {
    let p_stack_location = IoGetCurrentIrpStackLocation(pirp);

    let result = match context() {
        Some(ctx) if !p_stack_location.is_null() => handle_read(ctx, p_stack_location, pirp),
        _ => {
            println!("[prcmon] [-] Unable to service read request.");
            Err(STATUS_UNSUCCESSFUL)
        }
    };

    let (status, information) = match result {
        Ok(count) => (STATUS_SUCCESS, count),
        Err(e) => (e, 0),
    };

    (*pirp).IoStatus.__bindgen_anon_1.Status = status;
    (*pirp).IoStatus.Information = information as u64;

    // indicates that the caller has completed all processing for a given I/O request and
    // is returning the given IRP to the I/O manager
    // https://learn.microsoft.com/en-us/windows-hardware/drivers/ddi/wdm/nf-wdm-iocompleterequest
    IofCompleteRequest(pirp, IO_NO_INCREMENT as i8);

    status
}
