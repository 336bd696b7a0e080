//! Names and control codes agreed between the driver and its callers.

/*────────── endpoint names ─────────*/

/// Internal object-manager name of the device.
pub const DEVICE_NAME: &str = r"\Device\KmonDevice";
/// Symbolic link published for user-mode discovery.
pub const SYMBOLIC_LINK: &str = r"\??\KmonDevice";
/// Path a Win32 caller opens to reach [`SYMBOLIC_LINK`].
pub const USER_DEVICE_PATH: &str = r"\\.\KmonDevice";

/*────────── CTL_CODE pieces ─────────*/

pub const FILE_DEVICE_UNKNOWN: u32 = 0x0000_0022;

pub const METHOD_BUFFERED:   u32 = 0;
pub const METHOD_IN_DIRECT:  u32 = 1;
pub const METHOD_OUT_DIRECT: u32 = 2;
pub const METHOD_NEITHER:    u32 = 3;

pub const FILE_ANY_ACCESS:   u32 = 0;
pub const FILE_READ_ACCESS:  u32 = 1;
pub const FILE_WRITE_ACCESS: u32 = 2;

/// Rust equivalent of the `CTL_CODE` macro.
pub const fn ctl_code(device_type: u32, function: u32, method: u32, access: u32) -> u32 {
    (device_type << 16) | (access << 14) | (function << 2) | method
}

/// Transfer method encoded in the two low bits of an IOCTL.
pub const fn ioctl_method(code: u32) -> u32 {
    code & 0x3
}

/// Function number (bits 2..=13) of an IOCTL.
pub const fn ioctl_function(code: u32) -> u32 {
    (code >> 2) & 0x0FFF
}

/*────────── device-control codes ─────────*/

/// Drain queued monitor records into the caller's (direct) output buffer.
///
/// Function 0x1100 is wider than the 12-bit function field; its bit 12
/// lands on the access bits, so the code is `0x0022_4402` and decodes as
/// function `0x100`. Clients built with the C `CTL_CODE` macro compute the
/// same value.
pub const IOCTL_READ_DATA: u32 =
    ctl_code(FILE_DEVICE_UNKNOWN, 0x1100, METHOD_OUT_DIRECT, FILE_READ_ACCESS);

/// Update the record category mask from the caller's (direct) input buffer.
///
/// Same overlap as [`IOCTL_READ_DATA`]: `0x0022_C405`, function `0x101`.
pub const IOCTL_WRITE_DATA: u32 =
    ctl_code(FILE_DEVICE_UNKNOWN, 0x1101, METHOD_IN_DIRECT, FILE_WRITE_ACCESS);

/*────────── record category mask ─────────*/

pub const CATEGORY_PROCESS:  u32 = 0x1;
pub const CATEGORY_REGISTRY: u32 = 0x2;
pub const CATEGORY_FILE:     u32 = 0x4;
pub const CATEGORY_NETWORK:  u32 = 0x8;
pub const CATEGORY_ALL:      u32 =
    CATEGORY_PROCESS | CATEGORY_REGISTRY | CATEGORY_FILE | CATEGORY_NETWORK;
