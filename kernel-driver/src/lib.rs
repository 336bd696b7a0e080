//! Kmon I/O endpoint: request dispatch core and device lifecycle.
//!
//! A named device is created, published under a symbolic link and wired to
//! a fixed major-function table: CREATE, READ, WRITE and CLEANUP have their
//! own handlers, every other request goes through the generic control
//! handler. A single [`RequestManager`] owned by the [`Driver`] carries the
//! state shared between requests.
//!
//! The object-manager primitives are behind [`ObjectManager`];
//! [`namespace::Namespace`] implements them in memory so the whole core runs
//! in user mode.

pub mod config;
pub mod consts;
pub mod core;
pub mod device;
pub mod dispatch;
pub mod handlers;
pub mod helpers;
pub mod irp;
pub mod logging;
pub mod manager;
pub mod namespace;

use std::sync::Arc;

pub use crate::config::DriverConfig;
pub use crate::core::{Driver, DriverState, RegistrationInfo, Stage, StartError};
pub use crate::device::ObjectManager;
pub use crate::irp::{CancelToken, FileObject, Irp, MajorFunction};
pub use crate::manager::RequestManager;

/*------------ DriverEntry -------------------------------*/

/// Build a driver over `om` and start it, the way the loader's entry call
/// does. The returned driver unloads when dropped.
pub fn driver_entry(
    om: Arc<dyn ObjectManager>,
    config: DriverConfig,
    registration: &RegistrationInfo,
) -> Result<Driver, StartError> {
    let mut driver = Driver::new(om, config);
    driver.start(registration)?;
    Ok(driver)
}
