//! IRP handlers installed by `dispatch::standard_table`.
//!
//! Every handler completes its request before returning; nothing is left
//! pending. Without a manager (degraded mode) the specific handlers still
//! answer with defined, empty results and manager-only requests are
//! refused with `STATUS_DEVICE_NOT_READY`.

use shared::constants::{IOCTL_READ_DATA, IOCTL_WRITE_DATA, METHOD_IN_DIRECT, METHOD_OUT_DIRECT, ioctl_method};

use crate::consts::*;
use crate::dispatch::DispatchContext;
use crate::irp::{Irp, MajorFunction};
use crate::manager::{DrainError, RequestManager};

/*──────────────────────────── specific handlers ─────────────────────────*/

/// IRP_MJ_CREATE: admit the caller as a new session.
pub fn dispatch_create(ctx: &DispatchContext<'_>, irp: &mut Irp) -> NTSTATUS {
    if irp.is_cancelled() {
        return irp.complete(STATUS_CANCELLED, 0);
    }
    let file = irp.file();
    match ctx.manager {
        None => {
            log::debug!("open by pid {} without manager; no session tracked", file.process_id);
            irp.complete(STATUS_SUCCESS, 0)
        }
        Some(manager) => match manager.open_session(&file) {
            Ok(()) => irp.complete(STATUS_SUCCESS, 0),
            Err(st) => irp.complete(st, 0),
        },
    }
}

/// IRP_MJ_READ: copy buffered session bytes into the mapped buffer.
/// An empty session or zero-length buffer completes with zero bytes.
pub fn dispatch_read(ctx: &DispatchContext<'_>, irp: &mut Irp) -> NTSTATUS {
    if irp.is_cancelled() {
        return irp.complete(STATUS_CANCELLED, 0);
    }
    let Some(manager) = ctx.manager else {
        return irp.complete(STATUS_SUCCESS, 0);
    };
    let id = irp.file().id;
    let cancel = irp.cancel_token().clone();
    match manager.read(id, irp.mdl_mut(), &cancel) {
        Ok(n) => irp.complete(STATUS_SUCCESS, n),
        Err(st) => irp.complete(st, 0),
    }
}

/// IRP_MJ_WRITE: take as much of the mapped buffer as the session has room
/// for and report the consumed length.
pub fn dispatch_write(ctx: &DispatchContext<'_>, irp: &mut Irp) -> NTSTATUS {
    if irp.is_cancelled() {
        return irp.complete(STATUS_CANCELLED, 0);
    }
    let Some(manager) = ctx.manager else {
        return irp.complete(STATUS_SUCCESS, 0);
    };
    let id = irp.file().id;
    match manager.write(id, irp.mdl(), irp.cancel_token()) {
        Ok(n) => irp.complete(STATUS_SUCCESS, n),
        Err(st) => irp.complete(st, 0),
    }
}

/// IRP_MJ_CLEANUP: last handle closed; drop the caller's session.
pub fn dispatch_cleanup(ctx: &DispatchContext<'_>, irp: &mut Irp) -> NTSTATUS {
    if let Some(manager) = ctx.manager {
        let file = irp.file();
        if !manager.close_session(file.id) {
            log::debug!("cleanup for unknown session {} (pid {})", file.id, file.process_id);
        }
    }
    irp.complete(STATUS_SUCCESS, 0)
}

/*──────────────────────────── generic control ───────────────────────────*/

/// Default handler: classify the request and either service it or reject
/// it with an explicit status.
pub fn dispatch_control(ctx: &DispatchContext<'_>, irp: &mut Irp) -> NTSTATUS {
    match irp.major() {
        MajorFunction::DeviceControl | MajorFunction::InternalDeviceControl => device_control(ctx, irp),
        // CLEANUP already released the session.
        MajorFunction::Close | MajorFunction::FlushBuffers | MajorFunction::Shutdown => {
            irp.complete(STATUS_SUCCESS, 0)
        }
        other => {
            log::debug!("{:?} not supported on {}", other, ctx.device.name());
            irp.complete(STATUS_INVALID_DEVICE_REQUEST, 0)
        }
    }
}

/// IRP_MJ_DEVICE_CONTROL: route based on IOCTL code.
fn device_control(ctx: &DispatchContext<'_>, irp: &mut Irp) -> NTSTATUS {
    let code = irp.io_control_code();
    let Some(manager) = ctx.manager else {
        log::warn!("IOCTL {:#010x} refused: manager unavailable", code);
        return irp.complete(STATUS_DEVICE_NOT_READY, 0);
    };
    match code {
        IOCTL_READ_DATA => read_data(manager, irp),
        IOCTL_WRITE_DATA => write_data(manager, irp),
        _ => {
            log::debug!("unknown IOCTL {:#010x}", code);
            irp.complete(STATUS_INVALID_DEVICE_REQUEST, 0)
        }
    }
}

/// IOCTL_READ_DATA (OUT_DIRECT): drain queued records as frames.
fn read_data(manager: &RequestManager, irp: &mut Irp) -> NTSTATUS {
    debug_assert_eq!(ioctl_method(IOCTL_READ_DATA), METHOD_OUT_DIRECT);
    let cancel = irp.cancel_token().clone();
    match manager.drain_records(irp.mdl_mut(), &cancel) {
        Ok(n) => irp.complete(STATUS_SUCCESS, n),
        Err(DrainError::TooSmall { needed }) => irp.complete(STATUS_BUFFER_TOO_SMALL, needed),
        Err(DrainError::Status(st)) => irp.complete(st, 0),
    }
}

/// IOCTL_WRITE_DATA (IN_DIRECT): little-endian `u32` category mask.
fn write_data(manager: &RequestManager, irp: &mut Irp) -> NTSTATUS {
    debug_assert_eq!(ioctl_method(IOCTL_WRITE_DATA), METHOD_IN_DIRECT);
    if irp.is_cancelled() {
        return irp.complete(STATUS_CANCELLED, 0);
    }
    let Some(bytes) = irp.mdl().first_chunk::<4>() else {
        return irp.complete(STATUS_BUFFER_TOO_SMALL, 4);
    };
    manager.set_category_mask(u32::from_le_bytes(*bytes));
    irp.complete(STATUS_SUCCESS, 4)
}
