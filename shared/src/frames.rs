//! Length-prefixed framing for records copied out by `IOCTL_READ_DATA`.
//!
//! Each frame is a little-endian `u32` body length followed by the protobuf
//! encoding of one [`MonitorRecord`]. The driver only ever writes whole
//! frames, so a well-formed buffer ends exactly on a frame boundary.

use alloc::vec::Vec;

use prost::Message;

use crate::records::MonitorRecord;

/// Size of the length prefix in front of every frame.
pub const FRAME_HEADER_LEN: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("truncated frame at offset {offset}: need {needed} bytes, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("record decode error at offset {offset}: {error}")]
    Decode {
        offset: usize,
        error: prost::DecodeError,
    },
}

/// Bytes one record occupies on the wire, header included.
pub fn frame_len(record: &MonitorRecord) -> usize {
    FRAME_HEADER_LEN + record.encoded_len()
}

/// Write one frame into `out`, returning the number of bytes written,
/// or `None` when `out` is too small to hold the whole frame.
pub fn write_frame(record: &MonitorRecord, out: &mut [u8]) -> Option<usize> {
    let body = record.encoded_len();
    let total = FRAME_HEADER_LEN + body;
    if total > out.len() || u32::try_from(body).is_err() {
        return None;
    }
    out[..FRAME_HEADER_LEN].copy_from_slice(&(body as u32).to_le_bytes());
    let mut dst = &mut out[FRAME_HEADER_LEN..total];
    record.encode(&mut dst).ok()?;
    Some(total)
}

/// Append one frame to a growable buffer and return its size, or `None`
/// when the body is too long for the `u32` prefix (`out` is left as is).
pub fn encode_frame(record: &MonitorRecord, out: &mut Vec<u8>) -> Option<usize> {
    let body = record.encoded_len();
    let prefix = u32::try_from(body).ok()?;
    let start = out.len();
    out.reserve(FRAME_HEADER_LEN + body);
    out.extend_from_slice(&prefix.to_le_bytes());
    if record.encode(out).is_err() {
        out.truncate(start);
        return None;
    }
    Some(FRAME_HEADER_LEN + body)
}

/// Split a buffer filled by the driver back into records.
pub fn decode_frames(raw: &[u8]) -> Result<Vec<MonitorRecord>, FrameError> {
    let mut records = Vec::new();
    let mut cursor = 0;

    while cursor < raw.len() {
        if cursor + FRAME_HEADER_LEN > raw.len() {
            return Err(FrameError::Truncated {
                offset: cursor,
                needed: FRAME_HEADER_LEN,
                available: raw.len() - cursor,
            });
        }
        let mut len = [0u8; FRAME_HEADER_LEN];
        len.copy_from_slice(&raw[cursor..cursor + FRAME_HEADER_LEN]);
        let body = u32::from_le_bytes(len) as usize;
        let start = cursor + FRAME_HEADER_LEN;

        if start + body > raw.len() {
            return Err(FrameError::Truncated {
                offset: start,
                needed: body,
                available: raw.len() - start,
            });
        }

        let record = MonitorRecord::decode(&raw[start..start + body])
            .map_err(|error| FrameError::Decode { offset: start, error })?;
        records.push(record);
        cursor = start + body;
    }

    Ok(records)
}
