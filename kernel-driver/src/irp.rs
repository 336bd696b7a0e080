//! I/O request packets as seen by the dispatch core.
//!
//! Raw major-function codes are translated into [`MajorFunction`] when an
//! [`Irp`] is built, so nothing past this boundary handles out-of-range
//! codes. Buffers follow direct-transfer semantics: the caller's data is
//! already mapped into [`Irp::mdl`] before a handler runs.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use crate::consts::*;

/*──────────────────────────── major functions ───────────────────────────*/

/// Closed set of request kinds, one per `IRP_MJ_*` code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MajorFunction {
    Create = IRP_MJ_CREATE,
    CreateNamedPipe = IRP_MJ_CREATE_NAMED_PIPE,
    Close = IRP_MJ_CLOSE,
    Read = IRP_MJ_READ,
    Write = IRP_MJ_WRITE,
    QueryInformation = IRP_MJ_QUERY_INFORMATION,
    SetInformation = IRP_MJ_SET_INFORMATION,
    QueryEa = IRP_MJ_QUERY_EA,
    SetEa = IRP_MJ_SET_EA,
    FlushBuffers = IRP_MJ_FLUSH_BUFFERS,
    QueryVolumeInformation = IRP_MJ_QUERY_VOLUME_INFORMATION,
    SetVolumeInformation = IRP_MJ_SET_VOLUME_INFORMATION,
    DirectoryControl = IRP_MJ_DIRECTORY_CONTROL,
    FileSystemControl = IRP_MJ_FILE_SYSTEM_CONTROL,
    DeviceControl = IRP_MJ_DEVICE_CONTROL,
    InternalDeviceControl = IRP_MJ_INTERNAL_DEVICE_CONTROL,
    Shutdown = IRP_MJ_SHUTDOWN,
    LockControl = IRP_MJ_LOCK_CONTROL,
    Cleanup = IRP_MJ_CLEANUP,
    CreateMailslot = IRP_MJ_CREATE_MAILSLOT,
    QuerySecurity = IRP_MJ_QUERY_SECURITY,
    SetSecurity = IRP_MJ_SET_SECURITY,
    Power = IRP_MJ_POWER,
    SystemControl = IRP_MJ_SYSTEM_CONTROL,
    DeviceChange = IRP_MJ_DEVICE_CHANGE,
    QueryQuota = IRP_MJ_QUERY_QUOTA,
    SetQuota = IRP_MJ_SET_QUOTA,
    Pnp = IRP_MJ_PNP,
}

/// Number of dispatch slots (`IRP_MJ_MAXIMUM_FUNCTION + 1`).
pub const MAJOR_FUNCTION_COUNT: usize = IRP_MJ_MAXIMUM_FUNCTION as usize + 1;

impl MajorFunction {
    /// Every major function, in code order.
    pub const ALL: [MajorFunction; MAJOR_FUNCTION_COUNT] = [
        MajorFunction::Create,
        MajorFunction::CreateNamedPipe,
        MajorFunction::Close,
        MajorFunction::Read,
        MajorFunction::Write,
        MajorFunction::QueryInformation,
        MajorFunction::SetInformation,
        MajorFunction::QueryEa,
        MajorFunction::SetEa,
        MajorFunction::FlushBuffers,
        MajorFunction::QueryVolumeInformation,
        MajorFunction::SetVolumeInformation,
        MajorFunction::DirectoryControl,
        MajorFunction::FileSystemControl,
        MajorFunction::DeviceControl,
        MajorFunction::InternalDeviceControl,
        MajorFunction::Shutdown,
        MajorFunction::LockControl,
        MajorFunction::Cleanup,
        MajorFunction::CreateMailslot,
        MajorFunction::QuerySecurity,
        MajorFunction::SetSecurity,
        MajorFunction::Power,
        MajorFunction::SystemControl,
        MajorFunction::DeviceChange,
        MajorFunction::QueryQuota,
        MajorFunction::SetQuota,
        MajorFunction::Pnp,
    ];

    #[inline]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Slot of this function in a dispatch table.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl TryFrom<u8> for MajorFunction {
    type Error = NTSTATUS;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        MajorFunction::ALL
            .get(code as usize)
            .copied()
            .ok_or(STATUS_INVALID_DEVICE_REQUEST)
    }
}

/*──────────────────────────── request pieces ────────────────────────────*/

/// Caller-side identity of an open handle; one session per file object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileObject {
    pub id: u64,
    pub process_id: u32,
}

/// Cancellation flag shared between the framework and the handler.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Final status of a request, as reported back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoStatusBlock {
    pub status: NTSTATUS,
    /// Bytes transferred (or required, for `STATUS_BUFFER_TOO_SMALL`).
    pub information: usize,
}

/*──────────────────────────────── IRP ───────────────────────────────────*/

#[derive(Debug)]
pub struct Irp {
    major: MajorFunction,
    file: FileObject,
    io_control_code: u32,
    /// Direct-mode transfer buffer (the locked-down MDL pages).
    mdl: Vec<u8>,
    io_status: Option<IoStatusBlock>,
    cancel: CancelToken,
}

impl Irp {
    pub fn new(major: MajorFunction, file: FileObject) -> Self {
        Self {
            major,
            file,
            io_control_code: 0,
            mdl: Vec::new(),
            io_status: None,
            cancel: CancelToken::new(),
        }
    }

    /// Build a request from a raw framework code, rejecting unknown codes.
    pub fn from_raw(code: u8, file: FileObject) -> Result<Self, NTSTATUS> {
        MajorFunction::try_from(code).map(|major| Self::new(major, file))
    }

    pub fn create(file: FileObject) -> Self {
        Self::new(MajorFunction::Create, file)
    }

    /// Read of up to `length` bytes into a zeroed, pre-mapped buffer.
    pub fn read(file: FileObject, length: usize) -> Self {
        Self::new(MajorFunction::Read, file).with_mdl(vec![0; length])
    }

    pub fn write(file: FileObject, data: &[u8]) -> Self {
        Self::new(MajorFunction::Write, file).with_mdl(data.to_vec())
    }

    pub fn cleanup(file: FileObject) -> Self {
        Self::new(MajorFunction::Cleanup, file)
    }

    pub fn close(file: FileObject) -> Self {
        Self::new(MajorFunction::Close, file)
    }

    /// `IRP_MJ_DEVICE_CONTROL` whose direct buffer is `buffer`
    /// (output space for OUT_DIRECT codes, input data for IN_DIRECT codes).
    pub fn device_control(file: FileObject, io_control_code: u32, buffer: Vec<u8>) -> Self {
        let mut irp = Self::new(MajorFunction::DeviceControl, file).with_mdl(buffer);
        irp.io_control_code = io_control_code;
        irp
    }

    pub fn with_mdl(mut self, mdl: Vec<u8>) -> Self {
        self.mdl = mdl;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[inline]
    pub fn major(&self) -> MajorFunction {
        self.major
    }

    #[inline]
    pub fn file(&self) -> FileObject {
        self.file
    }

    #[inline]
    pub fn io_control_code(&self) -> u32 {
        self.io_control_code
    }

    pub fn mdl(&self) -> &[u8] {
        &self.mdl
    }

    pub fn mdl_mut(&mut self) -> &mut [u8] {
        &mut self.mdl
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Finish the request and return the given status.
    ///
    /// A request completes exactly once; a second completion is a handler
    /// bug and keeps the first status.
    pub fn complete(&mut self, status: NTSTATUS, information: usize) -> NTSTATUS {
        match self.io_status {
            Some(done) => {
                log::error!(
                    "{:?} completed twice ({:#010x} then {:#010x})",
                    self.major,
                    done.status,
                    status
                );
                done.status
            }
            None => {
                self.io_status = Some(IoStatusBlock { status, information });
                status
            }
        }
    }

    pub fn is_completed(&self) -> bool {
        self.io_status.is_some()
    }

    pub fn io_status(&self) -> Option<IoStatusBlock> {
        self.io_status
    }

    /// Bytes reported in `IoStatus.Information`, zero while pending.
    pub fn information(&self) -> usize {
        self.io_status.map_or(0, |s| s.information)
    }

    /// Data the handler produced (`mdl[..information]`).
    pub fn output(&self) -> &[u8] {
        let n = self.information().min(self.mdl.len());
        &self.mdl[..n]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILE: FileObject = FileObject { id: 1, process_id: 42 };

    #[test]
    fn raw_codes_map_onto_major_functions() {
        for (code, major) in MajorFunction::ALL.iter().enumerate() {
            assert_eq!(major.code() as usize, code);
            assert_eq!(MajorFunction::try_from(code as u8), Ok(*major));
        }
    }

    #[test]
    fn out_of_range_code_is_rejected_at_the_boundary() {
        let err = Irp::from_raw(IRP_MJ_MAXIMUM_FUNCTION + 1, FILE).unwrap_err();
        assert_eq!(err, STATUS_INVALID_DEVICE_REQUEST);
        assert!(Irp::from_raw(0xff, FILE).is_err());
    }

    #[test]
    fn completion_is_sticky() {
        let mut irp = Irp::read(FILE, 8);
        assert!(!irp.is_completed());
        assert_eq!(irp.complete(STATUS_SUCCESS, 3), STATUS_SUCCESS);
        assert_eq!(irp.complete(STATUS_CANCELLED, 0), STATUS_SUCCESS);
        assert_eq!(irp.information(), 3);
        assert_eq!(irp.output().len(), 3);
    }

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let irp = Irp::create(FILE).with_cancel(token.clone());
        assert!(!irp.is_cancelled());
        token.cancel();
        assert!(irp.is_cancelled());
    }
}
