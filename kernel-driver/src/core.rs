//! Driver lifecycle: staged startup with rollback, ordered teardown, and
//! the request entry point.
//!
//! Startup walks `Unstarted → NamesBound → DeviceCreated → AliasPublished →
//! TableInstalled → ManagerReady`. A failing stage leaves the driver in
//! `Failed(stage)` after unwinding the stages already completed, newest
//! first, so no alias or device is left behind. Teardown removes the alias,
//! then the device, then releases the manager and flushes tracing.

use std::fmt;
use std::sync::Arc;

use log::Level;
use thiserror::Error;

use crate::config::DriverConfig;
use crate::consts::*;
use crate::device::{
    attach_alias, publish_alias, register_endpoint, teardown_endpoint, DeviceObject, EndpointNames,
    ObjectManager,
};
use crate::dispatch::{standard_table, DispatchContext, DispatchTable};
use crate::irp::Irp;
use crate::kmon_log;
use crate::logging;
use crate::manager::RequestManager;

/*──────────────────────────── states ────────────────────────────────────*/

/// Startup stage, named after what it acquires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    NameBinding,
    DeviceCreation,
    AliasPublication,
    TableInstallation,
    ManagerInit,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::NameBinding => "name binding",
            Stage::DeviceCreation => "device creation",
            Stage::AliasPublication => "alias publication",
            Stage::TableInstallation => "dispatch installation",
            Stage::ManagerInit => "manager initialization",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Unstarted,
    NamesBound,
    DeviceCreated,
    AliasPublished,
    TableInstalled,
    ManagerReady,
    Failed(Stage),
}

#[derive(Debug, Error)]
pub enum StartError {
    #[error("driver is already started")]
    AlreadyStarted,

    #[error("{stage} failed: {status:#010x}")]
    Registration { stage: Stage, status: NTSTATUS },

    #[error("request manager unavailable: {status:#010x}")]
    Manager { status: NTSTATUS },
}

impl StartError {
    /// NTSTATUS to hand back to the loader.
    pub fn status(&self) -> NTSTATUS {
        match self {
            StartError::AlreadyStarted => STATUS_OBJECT_NAME_COLLISION,
            StartError::Registration { status, .. } | StartError::Manager { status } => *status,
        }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            StartError::AlreadyStarted => None,
            StartError::Registration { stage, .. } => Some(*stage),
            StartError::Manager { .. } => Some(Stage::ManagerInit),
        }
    }
}

/// What the loader passes to the entry point.
#[derive(Debug, Clone, Default)]
pub struct RegistrationInfo {
    /// Service key of the driver, e.g. `\Registry\Machine\System\...\kmon`.
    pub registry_path: String,
}

/*──────────────────────────── driver ────────────────────────────────────*/

struct Running {
    device: DeviceObject,
    table: DispatchTable,
    manager: Option<Arc<RequestManager>>,
}

pub struct Driver {
    om: Arc<dyn ObjectManager>,
    config: DriverConfig,
    state: DriverState,
    running: Option<Running>,
}

impl Driver {
    pub fn new(om: Arc<dyn ObjectManager>, config: DriverConfig) -> Self {
        Self {
            om,
            config,
            state: DriverState::Unstarted,
            running: None,
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Whether the endpoint currently exists.
    pub fn is_present(&self) -> bool {
        self.running.is_some()
    }

    /// Running without a manager.
    pub fn is_degraded(&self) -> bool {
        self.running.as_ref().is_some_and(|r| r.manager.is_none())
    }

    pub fn device(&self) -> Option<&DeviceObject> {
        self.running.as_ref().map(|r| &r.device)
    }

    pub fn dispatch_table(&self) -> Option<&DispatchTable> {
        self.running.as_ref().map(|r| &r.table)
    }

    pub fn manager(&self) -> Option<&Arc<RequestManager>> {
        self.running.as_ref().and_then(|r| r.manager.as_ref())
    }

    fn fail(&mut self, err: StartError) -> StartError {
        if let Some(stage) = err.stage() {
            self.state = DriverState::Failed(stage);
        }
        kmon_log!(Level::Error, "lifecycle", "startup failed: {}", err);
        err
    }

    /// Bring the endpoint up. On error nothing stays visible and every
    /// partially acquired resource has been released.
    pub fn start(&mut self, reg: &RegistrationInfo) -> Result<(), StartError> {
        if self.running.is_some() {
            return Err(StartError::AlreadyStarted);
        }

        if self.config.logging.enable {
            match logging::init_tracing(&self.config.logging) {
                Ok(true) => {}
                Ok(false) => log::debug!("logger already installed, keeping it"),
                Err(e) => log::warn!("tracing setup failed: {}", e),
            }
        }
        kmon_log!(Level::Info, "lifecycle", "driver loading, registry path: {}", reg.registry_path);

        /* 1 ▸ names */
        let names = EndpointNames::bind(&self.config.device).map_err(|status| {
            self.fail(StartError::Registration { stage: Stage::NameBinding, status })
        })?;
        self.state = DriverState::NamesBound;

        /* 2 ▸ device object */
        let mut device = register_endpoint(&self.om, &names, &self.config.device).map_err(|status| {
            self.fail(StartError::Registration { stage: Stage::DeviceCreation, status })
        })?;
        self.state = DriverState::DeviceCreated;

        /* 3 ▸ symbolic link */
        let link = match publish_alias(&self.om, &device, &names.alias) {
            Ok(link) => link,
            Err(status) => {
                drop(device);
                return Err(self.fail(StartError::Registration { stage: Stage::AliasPublication, status }));
            }
        };
        self.state = DriverState::AliasPublished;

        /* 4 ▸ dispatch table + direct I/O */
        let table = standard_table();
        device.device_mut().set_direct_io();
        debug_assert!(device.device().is_direct_io());
        device.device_mut().finish_initializing();
        self.state = DriverState::TableInstalled;

        /* 5 ▸ request manager */
        let manager = match self.start_manager() {
            Ok(manager) => manager,
            Err(status) if self.config.manager.required => {
                drop(link);
                drop(device);
                return Err(self.fail(StartError::Manager { status }));
            }
            Err(status) => {
                kmon_log!(
                    Level::Warn,
                    "lifecycle",
                    "request manager unavailable ({:#010x}); running degraded",
                    status
                );
                None
            }
        };
        self.state = DriverState::ManagerReady;

        let alias = link.commit();
        let mut device = device.commit();
        attach_alias(&mut device, alias);
        kmon_log!(
            Level::Info,
            "lifecycle",
            "endpoint {} published as {}",
            device.name(),
            names.alias
        );

        self.running = Some(Running { device, table, manager });
        Ok(())
    }

    /// Build and initialize the manager. `Ok(None)` when it is disabled.
    fn start_manager(&self) -> Result<Option<Arc<RequestManager>>, NTSTATUS> {
        let cfg = &self.config.manager;
        let Some(mut manager) = RequestManager::create(cfg) else {
            return if cfg.required {
                Err(STATUS_INSUFFICIENT_RESOURCES)
            } else {
                log::info!("request manager disabled by configuration");
                Ok(None)
            };
        };
        manager.init()?;
        Ok(Some(Arc::new(manager)))
    }

    /// Tear the endpoint down. Safe to call repeatedly and after a failed
    /// start; a driver that is not running is left as is.
    pub fn stop(&mut self) {
        let Some(Running { device, table, manager }) = self.running.take() else {
            if self.state != DriverState::Unstarted {
                log::debug!("stop: nothing running (state {:?})", self.state);
                self.state = DriverState::Unstarted;
            }
            return;
        };
        kmon_log!(Level::Info, "lifecycle", "driver unloading…");

        /* 1 ▸ alias, 2 ▸ device */
        teardown_endpoint(self.om.as_ref(), device);
        drop(table);

        /* 3 ▸ manager */
        if let Some(manager) = manager {
            manager.shutdown();
            if Arc::strong_count(&manager) > 1 {
                log::warn!("request manager still referenced after unload");
            }
        }

        self.state = DriverState::Unstarted;
        kmon_log!(Level::Info, "lifecycle", "driver unloaded.");

        /* 4 ▸ tracing */
        logging::flush_tracing();
    }

    /// Request entry point: route `irp` through the installed table.
    pub fn dispatch(&self, irp: &mut Irp) -> NTSTATUS {
        let Some(running) = &self.running else {
            return irp.complete(STATUS_NO_SUCH_DEVICE, 0);
        };
        let ctx = DispatchContext {
            device: &running.device,
            manager: running.manager.as_deref(),
        };
        let status = running.table.dispatch(&ctx, irp);
        if !irp.is_completed() {
            log::error!("{:?} handler returned without completing the request", irp.major());
            return irp.complete(STATUS_UNSUCCESSFUL, 0);
        }
        status
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.stop();
    }
}
