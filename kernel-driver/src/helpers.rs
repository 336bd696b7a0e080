use std::fmt;

use chrono::{DateTime, Utc};
use prost_types::Timestamp;

use crate::consts::{NTSTATUS, STATUS_OBJECT_NAME_INVALID};

/// Largest `UNICODE_STRING::Length` in bytes (one code unit kept for the NUL).
const MAX_NAME_BYTES: usize = (u16::MAX as usize) - 1;

/// Object-manager name held as UTF-16, the way `UNICODE_STRING` carries it.
///
/// Names are validated on construction: non-empty, rooted at `\`, no
/// embedded NUL, and short enough for a counted `UNICODE_STRING`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct UnicodeName {
    buffer: Vec<u16>,
}

impl UnicodeName {
    /// UTF-16 code units, without terminator.
    pub fn as_wide(&self) -> &[u16] {
        &self.buffer
    }

    /// `UNICODE_STRING::Length`.
    pub fn byte_len(&self) -> usize {
        self.buffer.len() * 2
    }

    /// Comparison key; the object namespace is case-insensitive.
    pub fn key(&self) -> String {
        self.to_string().to_lowercase()
    }
}

impl fmt::Display for UnicodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&uni_to_string(&self.buffer))
    }
}

impl fmt::Debug for UnicodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.to_string())
    }
}

/// Converts a Rust string slice into a validated [`UnicodeName`].
pub fn make_unicode(s: &str) -> Result<UnicodeName, NTSTATUS> {
    if !s.starts_with('\\') || s.contains('\0') {
        return Err(STATUS_OBJECT_NAME_INVALID);
    }
    let buffer: Vec<u16> = s.encode_utf16().collect();
    if buffer.len() < 2 || buffer.len() * 2 > MAX_NAME_BYTES {
        return Err(STATUS_OBJECT_NAME_INVALID);
    }
    Ok(UnicodeName { buffer })
}

/// Convert UTF-16 code units to a Rust `String`.
pub fn uni_to_string(wide: &[u16]) -> String {
    String::from_utf16_lossy(wide)
}

/// Convert a wall-clock instant to a protobuf `Timestamp`.
pub fn to_timestamp(at: DateTime<Utc>) -> Timestamp {
    Timestamp {
        seconds: at.timestamp(),
        nanos: at.timestamp_subsec_nanos() as i32,
    }
}

/// Current system time as a protobuf `Timestamp`.
pub fn now_timestamp() -> Timestamp {
    to_timestamp(Utc::now())
}
