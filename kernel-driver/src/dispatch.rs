//! dispatch.rs
//! Table-driven dispatcher for IRP major functions.
//!
//! The table is filled with a default handler first and only then are the
//! specific slots overridden, so any request kind without an override still
//! gets deterministic handling. Once built it is never modified.

use crate::consts::NTSTATUS;
use crate::device::DeviceObject;
use crate::handlers;
use crate::irp::{Irp, MajorFunction, MAJOR_FUNCTION_COUNT};
use crate::manager::RequestManager;

/// What a handler gets besides the request itself.
#[derive(Clone, Copy)]
pub struct DispatchContext<'a> {
    pub device: &'a DeviceObject,
    /// `None` when the manager failed or is disabled (degraded mode).
    pub manager: Option<&'a RequestManager>,
}

/// Prototype for IRP handlers. A handler completes the request it is given
/// and returns the completion status.
pub type DispatchFn = fn(ctx: &DispatchContext<'_>, irp: &mut Irp) -> NTSTATUS;

/// Mutable table, only reachable during installation.
pub struct DispatchTableBuilder {
    handlers: [DispatchFn; MAJOR_FUNCTION_COUNT],
    overridden: [bool; MAJOR_FUNCTION_COUNT],
}

impl DispatchTableBuilder {
    /// All slots initialize to `default`.
    pub fn new(default: DispatchFn) -> Self {
        Self {
            handlers: [default; MAJOR_FUNCTION_COUNT],
            overridden: [false; MAJOR_FUNCTION_COUNT],
        }
    }

    /// Replace the handler of one major function.
    pub fn register(mut self, major: MajorFunction, handler: DispatchFn) -> Self {
        self.handlers[major.index()] = handler;
        self.overridden[major.index()] = true;
        self
    }

    pub fn build(self) -> DispatchTable {
        DispatchTable {
            handlers: self.handlers,
            overridden: self.overridden,
        }
    }
}

/// Frozen major-function table.
pub struct DispatchTable {
    handlers: [DispatchFn; MAJOR_FUNCTION_COUNT],
    overridden: [bool; MAJOR_FUNCTION_COUNT],
}

impl DispatchTable {
    #[inline]
    pub fn handler(&self, major: MajorFunction) -> DispatchFn {
        self.handlers[major.index()]
    }

    /// Whether `major` has its own handler rather than the default one.
    pub fn is_overridden(&self, major: MajorFunction) -> bool {
        self.overridden[major.index()]
    }

    /// Route `irp` to its handler.
    pub fn dispatch(&self, ctx: &DispatchContext<'_>, irp: &mut Irp) -> NTSTATUS {
        (self.handler(irp.major()))(ctx, irp)
    }
}

/// The endpoint's table: generic control everywhere, with open, read,
/// write and cleanup overridden.
pub fn standard_table() -> DispatchTable {
    DispatchTableBuilder::new(handlers::dispatch_control)
        .register(MajorFunction::Create, handlers::dispatch_create)
        .register(MajorFunction::Read, handlers::dispatch_read)
        .register(MajorFunction::Write, handlers::dispatch_write)
        .register(MajorFunction::Cleanup, handlers::dispatch_cleanup)
        .build()
}
