// FFI for functions not yet implemented in the Rust Windows Driver project

use core::ptr::{null_mut, read_volatile};

use wdk_sys::{
    ntddk::{KeInitializeEvent, MmMapLockedPagesSpecifyCache},
    FALSE, FAST_MUTEX, FM_LOCK_BIT, MDL_MAPPED_TO_SYSTEM_VA, MDL_SOURCE_IS_NONPAGED_POOL, NTSTATUS, PEPROCESS,
    PIO_STACK_LOCATION, PIRP, PMDL, PVOID,
    _EVENT_TYPE::SynchronizationEvent,
    _MEMORY_CACHING_TYPE::MmCached,
    _MODE::KernelMode,
};

#[link(name = "ntoskrnl")]
extern "system" {
    /// Exit status of a process, valid once it has started terminating.
    pub fn PsGetProcessExitStatus(process: PEPROCESS) -> NTSTATUS;
}

pub unsafe fn IoGetCurrentIrpStackLocation(irp: PIRP) -> PIO_STACK_LOCATION {
    assert!((*irp).CurrentLocation <= (*irp).StackCount + 1);
    (*irp)
        .Tail
        .Overlay
        .__bindgen_anon_2
        .__bindgen_anon_1
        .CurrentStackLocation
}

#[allow(non_snake_case)]
pub unsafe fn ExInitializeFastMutex(kmutex: *mut FAST_MUTEX) {
    core::ptr::write_volatile(&mut (*kmutex).Count, FM_LOCK_BIT as i32);

    (*kmutex).Owner = core::ptr::null_mut();
    (*kmutex).Contention = 0;
    KeInitializeEvent(&mut (*kmutex).Event, SynchronizationEvent, FALSE as _)
}

/// Returns a system space address for the pages described by the MDL, mapping them if
/// they are not mapped already. Null if the mapping could not be made.
#[allow(non_snake_case)]
pub unsafe fn MmGetSystemAddressForMdlSafe(mdl: PMDL, priority: u32) -> PVOID {
    let flags = (*mdl).MdlFlags as u32;
    if flags & (MDL_MAPPED_TO_SYSTEM_VA | MDL_SOURCE_IS_NONPAGED_POOL) != 0 {
        (*mdl).MappedSystemVa
    } else {
        MmMapLockedPagesSpecifyCache(mdl, KernelMode as _, MmCached, null_mut(), FALSE as _, priority)
    }
}

/// KUSER_SHARED_DATA.SystemTime, the same address on x64 and arm64.
const KUSER_SHARED_DATA_SYSTEM_TIME: usize = 0xFFFF_F780_0000_0014;

#[repr(C)]
struct KSystemTime {
    low_part: u32,
    high1_time: i32,
    high2_time: i32,
}

/// Current system time in 100ns intervals since 1601-01-01 UTC.
///
/// The kernel updates the high part twice around the low part, so a read is only
/// consistent once both copies agree.
#[allow(non_snake_case)]
pub unsafe fn KeQuerySystemTime() -> i64 {
    let time = KUSER_SHARED_DATA_SYSTEM_TIME as *const KSystemTime;
    loop {
        let high1 = read_volatile(&(*time).high1_time);
        let low = read_volatile(&(*time).low_part);
        let high2 = read_volatile(&(*time).high2_time);
        if high1 == high2 {
            return ((high1 as i64) << 32) | low as i64;
        }
        core::hint::spin_loop();
    }
}
