// ******************************************************************** //
// ************************** CORE CALLBACKS ************************** //
// ******************************************************************** //

use shared_no_std::notify::{capture, ProcessNotification};
use wdk::println;
use wdk_sys::{HANDLE, PEPROCESS, PS_CREATE_NOTIFY_INFO};

use crate::{
    context,
    ffi::{KeQuerySystemTime, PsGetProcessExitStatus},
    utils::unicode_as_slice,
};

/// Callback function for a process being created or exiting on the system.
///
/// Runs at PASSIVE_LEVEL on whichever thread the kernel is using for the transition, and
/// may run on several threads at once. Everything borrowed from `created` is copied into
/// the record before returning.
pub unsafe extern "C" fn core_callback_notify_ps(process: PEPROCESS, pid: HANDLE, created: *mut PS_CREATE_NOTIFY_INFO) {
    let Some(ctx) = context() else {
        return;
    };

    let time = KeQuerySystemTime();
    let process_id = pid as usize as u32;

    // created contains information about the new process, if it is null, it is exiting.
    let notification = if !created.is_null() {
        let info = &*created;
        ProcessNotification::Created {
            time,
            process_id,
            parent_process_id: info.ParentProcessId as usize as u32,
            command_line: unicode_as_slice(info.CommandLine),
        }
    } else {
        ProcessNotification::Exited {
            time,
            process_id,
            exit_status: PsGetProcessExitStatus(process) as u32,
        }
    };

    if let Err(e) = capture(&ctx.queue, notification) {
        println!("[prcmon] [-] Dropping event for process {process_id}: {e}");
    }
}
