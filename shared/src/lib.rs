//! Types shared between the kmon driver and user-mode readers.
//!
//! * [`constants`] – endpoint names and device-control codes.
//! * [`records`]   – monitor records the driver queues for user mode.
//! * [`frames`]    – length-prefixed framing used by `IOCTL_READ_DATA`.

#![cfg_attr(feature = "kernel", no_std)]

extern crate alloc; // gives Vec and String

pub mod constants;
pub mod frames;
pub mod records;
