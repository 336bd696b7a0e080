//! In-memory object namespace.
//!
//! Stands in for the kernel object manager when the driver is hosted in
//! user mode: it tracks device names, symbolic links and handles with the
//! same collision and lookup rules, keeps a journal of every mutation, and
//! can be told to fail the next create call.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::consts::*;
use crate::device::{DeviceCreate, DeviceHandle, ObjectManager};
use crate::helpers::UnicodeName;

/// One mutation applied to the namespace, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceOp {
    CreateDevice(String),
    DeleteDevice(String),
    CreateLink(String),
    DeleteLink(String),
}

/// Failure to inject into the next matching call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    CreateDevice(NTSTATUS),
    CreateLink(NTSTATUS),
}

#[derive(Debug)]
struct DeviceEntry {
    name: String,
    exclusive: bool,
}

#[derive(Debug, Default)]
struct State {
    next_handle: u64,
    /// lowercase name -> handle
    names: HashMap<String, DeviceHandle>,
    devices: HashMap<DeviceHandle, DeviceEntry>,
    /// lowercase link -> lowercase target
    links: HashMap<String, String>,
    journal: Vec<NamespaceOp>,
    faults: Vec<Fault>,
}

#[derive(Debug, Default)]
pub struct Namespace {
    state: Mutex<State>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A panic while holding the lock leaves plain maps behind; keep going.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fail the next call of the matching kind with the given status.
    pub fn inject(&self, fault: Fault) {
        self.lock().faults.push(fault);
    }

    pub fn device_exists(&self, name: &str) -> bool {
        self.lock().names.contains_key(&name.to_lowercase())
    }

    pub fn link_exists(&self, link: &str) -> bool {
        self.lock().links.contains_key(&link.to_lowercase())
    }

    /// Whether `path` (a device name or alias) reaches a live device.
    pub fn resolve(&self, path: &str) -> bool {
        let st = self.lock();
        let key = path.to_lowercase();
        let target = st.links.get(&key).unwrap_or(&key);
        st.names.contains_key(target)
    }

    /// Links whose target no longer exists.
    pub fn dangling_links(&self) -> Vec<String> {
        let st = self.lock();
        let mut out: Vec<String> = st
            .links
            .iter()
            .filter(|(_, target)| !st.names.contains_key(*target))
            .map(|(link, _)| link.clone())
            .collect();
        out.sort();
        out
    }

    pub fn device_count(&self) -> usize {
        self.lock().devices.len()
    }

    pub fn link_count(&self) -> usize {
        self.lock().links.len()
    }

    /// Whether the device under `name` was created exclusive.
    pub fn is_exclusive(&self, name: &str) -> Option<bool> {
        let st = self.lock();
        let handle = st.names.get(&name.to_lowercase())?;
        st.devices.get(handle).map(|d| d.exclusive)
    }

    pub fn journal(&self) -> Vec<NamespaceOp> {
        self.lock().journal.clone()
    }

    fn take_fault(st: &mut State, pick: impl Fn(&Fault) -> Option<NTSTATUS>) -> Option<NTSTATUS> {
        let pos = st.faults.iter().position(|f| pick(f).is_some())?;
        pick(&st.faults.remove(pos))
    }
}

impl ObjectManager for Namespace {
    fn create_device(&self, request: &DeviceCreate<'_>) -> Result<DeviceHandle, NTSTATUS> {
        let mut st = self.lock();
        if let Some(status) = Self::take_fault(&mut st, |f| match f {
            Fault::CreateDevice(s) => Some(*s),
            _ => None,
        }) {
            return Err(status);
        }

        let key = request.name.key();
        if st.names.contains_key(&key) || st.links.contains_key(&key) {
            return Err(STATUS_OBJECT_NAME_COLLISION);
        }

        st.next_handle += 1;
        let handle = DeviceHandle(st.next_handle);
        st.names.insert(key, handle);
        st.devices.insert(
            handle,
            DeviceEntry {
                name: request.name.to_string(),
                exclusive: request.exclusive,
            },
        );
        st.journal.push(NamespaceOp::CreateDevice(request.name.to_string()));
        Ok(handle)
    }

    fn delete_device(&self, device: DeviceHandle) {
        let mut st = self.lock();
        match st.devices.remove(&device) {
            Some(entry) => {
                st.names.remove(&entry.name.to_lowercase());
                st.journal.push(NamespaceOp::DeleteDevice(entry.name));
            }
            None => log::warn!("delete of unknown device handle {:?}", device),
        }
    }

    fn create_symbolic_link(&self, link: &UnicodeName, target: &UnicodeName) -> Result<(), NTSTATUS> {
        let mut st = self.lock();
        if let Some(status) = Self::take_fault(&mut st, |f| match f {
            Fault::CreateLink(s) => Some(*s),
            _ => None,
        }) {
            return Err(status);
        }

        let key = link.key();
        if st.links.contains_key(&key) || st.names.contains_key(&key) {
            return Err(STATUS_OBJECT_NAME_COLLISION);
        }
        if !st.names.contains_key(&target.key()) {
            return Err(STATUS_OBJECT_NAME_NOT_FOUND);
        }

        st.links.insert(key, target.key());
        st.journal.push(NamespaceOp::CreateLink(link.to_string()));
        Ok(())
    }

    fn delete_symbolic_link(&self, link: &UnicodeName) -> Result<(), NTSTATUS> {
        let mut st = self.lock();
        if st.links.remove(&link.key()).is_none() {
            return Err(STATUS_OBJECT_NAME_NOT_FOUND);
        }
        st.journal.push(NamespaceOp::DeleteLink(link.to_string()));
        Ok(())
    }
}
