//! Kmon device: object-manager boundary, registration and guards.
//!
//!  * `register_endpoint` creates the device; it can take requests but is
//!    not discoverable yet.
//!  * `publish_alias` creates the symbolic link that makes it visible.
//!  * Both return guards that undo the acquisition on drop unless the
//!    lifecycle commits them. Neither function rolls anything back itself.
//!  * `teardown_endpoint` removes the alias before the device, always.

use std::sync::Arc;

use crate::config::DeviceConfig;
use crate::consts::*;
use crate::helpers::{make_unicode, UnicodeName};

/*──────────────────────────── device type ───────────────────────────────*/

/// `FILE_DEVICE_UNKNOWN`, matching the CTL_CODE device type of our IOCTLs.
pub const KMON_DEVICE_TYPE: u32 = shared::constants::FILE_DEVICE_UNKNOWN;

/*──────────────────────── object-manager boundary ───────────────────────*/

/// Opaque handle the object manager returns for a created device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(pub u64);

/// Arguments of `IoCreateDevice` this driver uses.
#[derive(Debug, Clone)]
pub struct DeviceCreate<'a> {
    pub name: &'a UnicodeName,
    pub device_type: u32,
    pub characteristics: u32,
    pub exclusive: bool,
}

/// Host primitives for naming objects. Implemented by the kernel shim in a
/// real build and by [`crate::namespace::Namespace`] in user mode.
pub trait ObjectManager: Send + Sync {
    fn create_device(&self, request: &DeviceCreate<'_>) -> Result<DeviceHandle, NTSTATUS>;
    fn delete_device(&self, device: DeviceHandle);
    fn create_symbolic_link(&self, link: &UnicodeName, target: &UnicodeName) -> Result<(), NTSTATUS>;
    fn delete_symbolic_link(&self, link: &UnicodeName) -> Result<(), NTSTATUS>;
}

/*──────────────────────────── names ─────────────────────────────────────*/

/// Device name and alias, fixed once bound.
#[derive(Debug, Clone)]
pub struct EndpointNames {
    pub device: UnicodeName,
    pub alias: UnicodeName,
}

impl EndpointNames {
    pub fn bind(cfg: &DeviceConfig) -> Result<Self, NTSTATUS> {
        let device = make_unicode(&cfg.name)?;
        let alias = make_unicode(&cfg.alias)?;
        if device.key() == alias.key() {
            return Err(STATUS_OBJECT_NAME_COLLISION);
        }
        Ok(Self { device, alias })
    }
}

/*──────────────────────────── device object ─────────────────────────────*/

#[derive(Debug)]
pub struct DeviceObject {
    handle: DeviceHandle,
    name: UnicodeName,
    alias: Option<UnicodeName>,
    device_type: u32,
    characteristics: u32,
    flags: u32,
}

impl DeviceObject {
    pub fn handle(&self) -> DeviceHandle {
        self.handle
    }

    pub fn name(&self) -> &UnicodeName {
        &self.name
    }

    /// Alias the device is published under, if any.
    pub fn alias(&self) -> Option<&UnicodeName> {
        self.alias.as_ref()
    }

    pub fn device_type(&self) -> u32 {
        self.device_type
    }

    pub fn characteristics(&self) -> u32 {
        self.characteristics
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    /// Advertise direct transfer: handlers get pre-mapped buffers.
    pub fn set_direct_io(&mut self) {
        self.flags = (self.flags & !DO_BUFFERED_IO) | DO_DIRECT_IO;
    }

    pub fn is_direct_io(&self) -> bool {
        self.flags & DO_DIRECT_IO != 0
    }

    /// Clear `DO_DEVICE_INITIALIZING` once dispatch is wired.
    pub fn finish_initializing(&mut self) {
        self.flags &= !DO_DEVICE_INITIALIZING;
    }

    pub fn is_initializing(&self) -> bool {
        self.flags & DO_DEVICE_INITIALIZING != 0
    }
}

/*──────────────────────────── guards ────────────────────────────────────*/

/// Created device; deleted on drop unless committed.
pub struct DeviceGuard {
    om: Arc<dyn ObjectManager>,
    device: Option<DeviceObject>,
}

impl DeviceGuard {
    pub fn device(&self) -> &DeviceObject {
        // `device` is only taken by `commit`, which consumes the guard.
        self.device.as_ref().unwrap_or_else(|| unreachable!())
    }

    pub fn device_mut(&mut self) -> &mut DeviceObject {
        self.device.as_mut().unwrap_or_else(|| unreachable!())
    }

    /// Keep the device; from here on teardown is the caller's job.
    pub fn commit(mut self) -> DeviceObject {
        self.device.take().unwrap_or_else(|| unreachable!())
    }
}

impl Drop for DeviceGuard {
    fn drop(&mut self) {
        if let Some(dev) = self.device.take() {
            log::warn!("rolling back device {}", dev.name);
            self.om.delete_device(dev.handle);
        }
    }
}

/// Published alias; removed on drop unless committed.
pub struct LinkGuard {
    om: Arc<dyn ObjectManager>,
    link: Option<UnicodeName>,
}

impl LinkGuard {
    pub fn link(&self) -> &UnicodeName {
        self.link.as_ref().unwrap_or_else(|| unreachable!())
    }

    pub fn commit(mut self) -> UnicodeName {
        self.link.take().unwrap_or_else(|| unreachable!())
    }
}

impl Drop for LinkGuard {
    fn drop(&mut self) {
        if let Some(link) = self.link.take() {
            log::warn!("rolling back symbolic link {}", link);
            if let Err(st) = self.om.delete_symbolic_link(&link) {
                log::error!("IoDeleteSymbolicLink({}) failed {:#010x}", link, st);
            }
        }
    }
}

/*──────────────────────────── registration ──────────────────────────────*/

/// Create the device object under `names.device`.
pub fn register_endpoint(
    om: &Arc<dyn ObjectManager>,
    names: &EndpointNames,
    cfg: &DeviceConfig,
) -> Result<DeviceGuard, NTSTATUS> {
    let characteristics = if cfg.secure_open { FILE_DEVICE_SECURE_OPEN } else { 0 };
    let request = DeviceCreate {
        name: &names.device,
        device_type: KMON_DEVICE_TYPE,
        characteristics,
        exclusive: cfg.exclusive,
    };

    let handle = om.create_device(&request).map_err(|st| {
        log::error!("IoCreateDevice({}) failed {:#010x}", names.device, st);
        st
    })?;

    let mut flags = DO_DEVICE_INITIALIZING;
    if cfg.exclusive {
        flags |= DO_EXCLUSIVE;
    }

    log::debug!("device {} created ({:?})", names.device, handle);
    Ok(DeviceGuard {
        om: Arc::clone(om),
        device: Some(DeviceObject {
            handle,
            name: names.device.clone(),
            alias: None,
            device_type: KMON_DEVICE_TYPE,
            characteristics,
            flags,
        }),
    })
}

/// Publish `alias` as a symbolic link to the guarded device.
pub fn publish_alias(
    om: &Arc<dyn ObjectManager>,
    device: &DeviceGuard,
    alias: &UnicodeName,
) -> Result<LinkGuard, NTSTATUS> {
    let target = device.device().name();
    om.create_symbolic_link(alias, target).map_err(|st| {
        log::error!("IoCreateSymbolicLink({} -> {}) failed {:#010x}", alias, target, st);
        st
    })?;

    log::debug!("alias {} -> {} published", alias, target);
    Ok(LinkGuard {
        om: Arc::clone(om),
        link: Some(alias.clone()),
    })
}

/// Record the committed alias on the committed device.
pub fn attach_alias(device: &mut DeviceObject, alias: UnicodeName) {
    device.alias = Some(alias);
}

/// Remove the alias, then delete the device.
pub fn teardown_endpoint(om: &dyn ObjectManager, mut device: DeviceObject) {
    if let Some(link) = device.alias.take() {
        if let Err(st) = om.delete_symbolic_link(&link) {
            log::error!("IoDeleteSymbolicLink({}) failed {:#010x}", link, st);
        }
    }
    om.delete_device(device.handle);
    log::debug!("device {} deleted", device.name);
}
