//! Assorted WDK constants: NTSTATUS values, device flags, IRP major codes.

#![allow(non_camel_case_types)]

/*────────── status ─────────*/

pub type NTSTATUS = i32;

pub const STATUS_SUCCESS:                NTSTATUS = 0x0000_0000;
pub const STATUS_UNSUCCESSFUL:           NTSTATUS = 0xC000_0001_u32 as i32;
pub const STATUS_NOT_IMPLEMENTED:        NTSTATUS = 0xC000_0002_u32 as i32;
pub const STATUS_INVALID_HANDLE:         NTSTATUS = 0xC000_0008_u32 as i32;
pub const STATUS_INVALID_PARAMETER:      NTSTATUS = 0xC000_000D_u32 as i32;
pub const STATUS_NO_SUCH_DEVICE:         NTSTATUS = 0xC000_000E_u32 as i32;
pub const STATUS_INVALID_DEVICE_REQUEST: NTSTATUS = 0xC000_0010_u32 as i32;
pub const STATUS_BUFFER_TOO_SMALL:       NTSTATUS = 0xC000_0023_u32 as i32;
pub const STATUS_OBJECT_NAME_INVALID:    NTSTATUS = 0xC000_0033_u32 as i32;
pub const STATUS_OBJECT_NAME_NOT_FOUND:  NTSTATUS = 0xC000_0034_u32 as i32;
pub const STATUS_OBJECT_NAME_COLLISION:  NTSTATUS = 0xC000_0035_u32 as i32;
pub const STATUS_DELETE_PENDING:         NTSTATUS = 0xC000_0056_u32 as i32;
pub const STATUS_INSUFFICIENT_RESOURCES: NTSTATUS = 0xC000_009A_u32 as i32;
pub const STATUS_DEVICE_NOT_READY:       NTSTATUS = 0xC000_00A3_u32 as i32;
pub const STATUS_TOO_MANY_OPENED_FILES:  NTSTATUS = 0xC000_011F_u32 as i32;
pub const STATUS_CANCELLED:              NTSTATUS = 0xC000_0120_u32 as i32;

/// `NT_SUCCESS`: success and informational codes are non-negative.
#[inline]
pub const fn nt_success(status: NTSTATUS) -> bool {
    status >= 0
}

/// Priority boost passed on completion; this driver never boosts.
pub const IO_NO_INCREMENT: i8 = 0;

/*────────── device object ─────────*/

pub const DO_BUFFERED_IO:         u32 = 0x0000_0004;
pub const DO_EXCLUSIVE:           u32 = 0x0000_0008;
pub const DO_DIRECT_IO:           u32 = 0x0000_0010;
pub const DO_DEVICE_INITIALIZING: u32 = 0x0000_0080;

pub const FILE_DEVICE_SECURE_OPEN: u32 = 0x0000_0100;

/*────────── IRP major functions ─────────*/

pub const IRP_MJ_CREATE:                   u8 = 0x00;
pub const IRP_MJ_CREATE_NAMED_PIPE:        u8 = 0x01;
pub const IRP_MJ_CLOSE:                    u8 = 0x02;
pub const IRP_MJ_READ:                     u8 = 0x03;
pub const IRP_MJ_WRITE:                    u8 = 0x04;
pub const IRP_MJ_QUERY_INFORMATION:        u8 = 0x05;
pub const IRP_MJ_SET_INFORMATION:          u8 = 0x06;
pub const IRP_MJ_QUERY_EA:                 u8 = 0x07;
pub const IRP_MJ_SET_EA:                   u8 = 0x08;
pub const IRP_MJ_FLUSH_BUFFERS:            u8 = 0x09;
pub const IRP_MJ_QUERY_VOLUME_INFORMATION: u8 = 0x0a;
pub const IRP_MJ_SET_VOLUME_INFORMATION:   u8 = 0x0b;
pub const IRP_MJ_DIRECTORY_CONTROL:        u8 = 0x0c;
pub const IRP_MJ_FILE_SYSTEM_CONTROL:      u8 = 0x0d;
pub const IRP_MJ_DEVICE_CONTROL:           u8 = 0x0e;
pub const IRP_MJ_INTERNAL_DEVICE_CONTROL:  u8 = 0x0f;
pub const IRP_MJ_SHUTDOWN:                 u8 = 0x10;
pub const IRP_MJ_LOCK_CONTROL:             u8 = 0x11;
pub const IRP_MJ_CLEANUP:                  u8 = 0x12;
pub const IRP_MJ_CREATE_MAILSLOT:          u8 = 0x13;
pub const IRP_MJ_QUERY_SECURITY:           u8 = 0x14;
pub const IRP_MJ_SET_SECURITY:             u8 = 0x15;
pub const IRP_MJ_POWER:                    u8 = 0x16;
pub const IRP_MJ_SYSTEM_CONTROL:           u8 = 0x17;
pub const IRP_MJ_DEVICE_CHANGE:            u8 = 0x18;
pub const IRP_MJ_QUERY_QUOTA:              u8 = 0x19;
pub const IRP_MJ_SET_QUOTA:                u8 = 0x1a;
pub const IRP_MJ_PNP:                      u8 = 0x1b;

pub const IRP_MJ_MAXIMUM_FUNCTION: u8 = IRP_MJ_PNP;
