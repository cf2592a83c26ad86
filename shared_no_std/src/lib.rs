//! Types and logic shared between the PrcMon kernel driver and the user mode client.
//!
//! Everything in here is `no_std` so that the driver can link it; the kernel specific
//! bindings (FAST_MUTEX, IRPs, notify routines) live in the driver crate and plug into
//! the traits defined here.

#![no_std]
extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod boxed;
pub mod constants;
pub mod dispatch;
pub mod lifecycle;
pub mod notify;
pub mod queue;
pub mod record;
