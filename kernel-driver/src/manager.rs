//! Request manager: state shared across requests.
//!
//! One instance per started driver, built after the device and dispatch
//! table exist and handed to handlers through `DispatchContext`.
//!
//! Key responsibilities:
//! - Track one session per open file object (CREATE .. CLEANUP).
//! - Buffer bytes written to a session until a read drains them.
//! - Queue monitor records for `IOCTL_READ_DATA`, filtered by category.
//!
//! Locking: the session map lock is only held to look up, insert or remove
//! an `Arc<Session>`; buffer copies happen under the session's own lock.
//! The record queue is lock-free; only the single drain path is serialized.

use std::collections::{HashMap, VecDeque};
use std::sync::{
    Arc, Mutex, MutexGuard,
    atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
};

use crossbeam::queue::ArrayQueue;
use shared::constants::CATEGORY_ALL;
use shared::frames::{frame_len, write_frame};
use shared::records::MonitorRecord;

use crate::config::{ManagerConfig, EVENT_QUEUE_LIMIT, MAX_SESSIONS_LIMIT, SESSION_BUFFER_LIMIT};
use crate::consts::*;
use crate::helpers::now_timestamp;
use crate::irp::{CancelToken, FileObject};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/*──────────────────────────── sessions ──────────────────────────────────*/

#[derive(Debug)]
pub struct Session {
    process_id: u32,
    buffer: Mutex<VecDeque<u8>>,
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
}

impl Session {
    fn new(process_id: u32) -> Self {
        Self {
            process_id,
            // grows with the data, bounded by `session_buffer_bytes`
            buffer: Mutex::new(VecDeque::new()),
            bytes_in: AtomicU64::new(0),
            bytes_out: AtomicU64::new(0),
        }
    }

    pub fn process_id(&self) -> u32 {
        self.process_id
    }

    /// Bytes buffered and not yet read.
    pub fn pending(&self) -> usize {
        lock(&self.buffer).len()
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_in.load(Ordering::Relaxed)
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_out.load(Ordering::Relaxed)
    }
}

/// Point-in-time counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ManagerStats {
    pub sessions: usize,
    pub queued_records: usize,
    pub dropped_records: u64,
    pub filtered_records: u64,
}

/*──────────────────────────── manager ───────────────────────────────────*/

#[derive(Debug)]
pub struct RequestManager {
    config: ManagerConfig,
    ready: AtomicBool,
    sessions: Mutex<HashMap<u64, Arc<Session>>>,
    records: Option<ArrayQueue<MonitorRecord>>,
    /// Record popped by a drain that did not fit; goes out first next time.
    carry: Mutex<Option<MonitorRecord>>,
    category_mask: AtomicU32,
    dropped: AtomicU64,
    filtered: AtomicU64,
}

impl RequestManager {
    /// Construct the manager; `None` when `[manager] enabled = false`.
    pub fn create(config: &ManagerConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        Some(Self {
            config: config.clone(),
            ready: AtomicBool::new(false),
            sessions: Mutex::new(HashMap::new()),
            records: None,
            carry: Mutex::new(None),
            category_mask: AtomicU32::new(config.category_mask & CATEGORY_ALL),
            dropped: AtomicU64::new(0),
            filtered: AtomicU64::new(0),
        })
    }

    /// Validate limits and allocate the record queue.
    pub fn init(&mut self) -> Result<(), NTSTATUS> {
        let cfg = &self.config;
        let within = |value: usize, max: usize| (1..=max).contains(&value);
        if !within(cfg.max_sessions, MAX_SESSIONS_LIMIT)
            || !within(cfg.session_buffer_bytes, SESSION_BUFFER_LIMIT)
            || !within(cfg.event_queue_depth, EVENT_QUEUE_LIMIT)
        {
            log::error!(
                "manager limits out of range (sessions={}, buffer={}, queue={})",
                cfg.max_sessions,
                cfg.session_buffer_bytes,
                cfg.event_queue_depth
            );
            return Err(STATUS_INVALID_PARAMETER);
        }
        self.records = Some(ArrayQueue::new(cfg.event_queue_depth));
        self.ready.store(true, Ordering::Release);
        log::info!(
            "manager ready: {} session(s) max, {} B per session, {} queued record(s)",
            cfg.max_sessions,
            cfg.session_buffer_bytes,
            cfg.event_queue_depth
        );
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    fn queue(&self) -> Result<&ArrayQueue<MonitorRecord>, NTSTATUS> {
        match &self.records {
            Some(q) if self.is_ready() => Ok(q),
            _ => Err(STATUS_DEVICE_NOT_READY),
        }
    }

    /*──────── sessions ────────*/

    /// Admit a new caller. Fails when the manager is shutting down, the
    /// file object is already open, or the session limit is reached.
    pub fn open_session(&self, file: &FileObject) -> Result<(), NTSTATUS> {
        if !self.is_ready() {
            return Err(STATUS_DELETE_PENDING);
        }
        let mut sessions = lock(&self.sessions);
        if sessions.contains_key(&file.id) {
            return Err(STATUS_INVALID_PARAMETER);
        }
        if sessions.len() >= self.config.max_sessions {
            log::warn!("session limit {} reached, refusing pid {}", self.config.max_sessions, file.process_id);
            return Err(STATUS_TOO_MANY_OPENED_FILES);
        }
        sessions.insert(
            file.id,
            Arc::new(Session::new(file.process_id)),
        );
        log::debug!("session {} opened by pid {}", file.id, file.process_id);
        Ok(())
    }

    pub fn session(&self, id: u64) -> Option<Arc<Session>> {
        lock(&self.sessions).get(&id).cloned()
    }

    /// Drop the session of `id`; `false` when it was not open.
    pub fn close_session(&self, id: u64) -> bool {
        let removed = lock(&self.sessions).remove(&id);
        if let Some(session) = &removed {
            log::debug!(
                "session {} closed ({} B in, {} B out, {} B discarded)",
                id,
                session.bytes_written(),
                session.bytes_read(),
                session.pending()
            );
        }
        removed.is_some()
    }

    pub fn session_count(&self) -> usize {
        lock(&self.sessions).len()
    }

    /// Append as much of `data` as the session buffer has room for and
    /// return the number of bytes consumed.
    pub fn write(&self, id: u64, data: &[u8], cancel: &CancelToken) -> Result<usize, NTSTATUS> {
        let session = self.session(id).ok_or(STATUS_INVALID_HANDLE)?;
        let mut buf = lock(&session.buffer);
        if cancel.is_cancelled() {
            return Err(STATUS_CANCELLED);
        }
        let room = self.config.session_buffer_bytes.saturating_sub(buf.len());
        let n = room.min(data.len());
        if buf.try_reserve(n).is_err() {
            log::warn!("session {} could not grow by {} B", id, n);
            return Err(STATUS_INSUFFICIENT_RESOURCES);
        }
        buf.extend(&data[..n]);
        session.bytes_in.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }

    /// Move up to `out.len()` buffered bytes into `out`.
    pub fn read(&self, id: u64, out: &mut [u8], cancel: &CancelToken) -> Result<usize, NTSTATUS> {
        let session = self.session(id).ok_or(STATUS_INVALID_HANDLE)?;
        let mut buf = lock(&session.buffer);
        if cancel.is_cancelled() {
            return Err(STATUS_CANCELLED);
        }
        let n = buf.len().min(out.len());
        for (dst, src) in out.iter_mut().zip(buf.drain(..n)) {
            *dst = src;
        }
        session.bytes_out.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }

    /*──────── monitor records ────────*/

    pub fn category_mask(&self) -> u32 {
        self.category_mask.load(Ordering::Acquire)
    }

    /// Replace the category mask; unknown bits are ignored.
    pub fn set_category_mask(&self, mask: u32) -> u32 {
        let mask = mask & CATEGORY_ALL;
        let old = self.category_mask.swap(mask, Ordering::AcqRel);
        log::info!("category mask {:#x} -> {:#x}", old, mask);
        mask
    }

    /// Queue a record from a monitoring callback. Returns `false` when the
    /// record was filtered out, unclassifiable, or the queue was full.
    pub fn post_record(&self, mut record: MonitorRecord) -> bool {
        let Ok(queue) = self.queue() else {
            return false;
        };
        let accepted = record
            .category()
            .is_some_and(|c| self.category_mask() & c.mask() != 0);
        if !accepted {
            self.filtered.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        if record.ts.is_none() {
            record.ts = Some(now_timestamp());
        }
        match queue.push(record) {
            Ok(()) => true,
            Err(_full) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Copy whole frames into `out` until the next one does not fit.
    ///
    /// Returns the bytes written. If not even the first pending record fits,
    /// it stays queued and the error carries `STATUS_BUFFER_TOO_SMALL` with
    /// the size it needs.
    pub fn drain_records(&self, out: &mut [u8], cancel: &CancelToken) -> Result<usize, DrainError> {
        let queue = self.queue().map_err(DrainError::Status)?;
        let mut carry = lock(&self.carry);
        if cancel.is_cancelled() {
            return Err(DrainError::Status(STATUS_CANCELLED));
        }

        let mut written = 0;
        loop {
            let Some(record) = carry.take().or_else(|| queue.pop()) else {
                break;
            };
            match write_frame(&record, &mut out[written..]) {
                Some(n) => written += n,
                None => {
                    let needed = frame_len(&record);
                    *carry = Some(record);
                    if written == 0 {
                        return Err(DrainError::TooSmall { needed });
                    }
                    break;
                }
            }
        }
        Ok(written)
    }

    pub fn stats(&self) -> ManagerStats {
        let queued = self.records.as_ref().map_or(0, ArrayQueue::len)
            + usize::from(lock(&self.carry).is_some());
        ManagerStats {
            sessions: self.session_count(),
            queued_records: queued,
            dropped_records: self.dropped.load(Ordering::Relaxed),
            filtered_records: self.filtered.load(Ordering::Relaxed),
        }
    }

    /// Stop admitting work and release all per-session and queued state.
    pub fn shutdown(&self) {
        self.ready.store(false, Ordering::Release);
        let sessions = std::mem::take(&mut *lock(&self.sessions));
        let mut discarded = 0usize;
        if let Some(q) = &self.records {
            while q.pop().is_some() {
                discarded += 1;
            }
        }
        discarded += usize::from(lock(&self.carry).take().is_some());
        log::info!(
            "manager released: {} session(s), {} record(s) discarded",
            sessions.len(),
            discarded
        );
    }
}

/// Why a record drain produced nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainError {
    TooSmall { needed: usize },
    Status(NTSTATUS),
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::constants::{CATEGORY_FILE, CATEGORY_PROCESS};
    use shared::frames::decode_frames;
    use shared::records::{monitor_record::Payload, DataType, FileData};

    fn ready(cfg: ManagerConfig) -> RequestManager {
        let mut m = RequestManager::create(&cfg).unwrap();
        m.init().unwrap();
        m
    }

    fn file_record(pid: u32, path: &str) -> MonitorRecord {
        MonitorRecord {
            ts: None,
            kind: DataType::FileWrite as i32,
            pid,
            payload: Some(Payload::File(FileData {
                path: path.into(),
                ..Default::default()
            })),
        }
    }

    const FILE: FileObject = FileObject { id: 9, process_id: 300 };

    #[test]
    fn disabled_manager_is_not_constructed() {
        let cfg = ManagerConfig { enabled: false, ..Default::default() };
        assert!(RequestManager::create(&cfg).is_none());
    }

    #[test]
    fn init_rejects_zero_limits() {
        let cfg = ManagerConfig { event_queue_depth: 0, ..Default::default() };
        let mut m = RequestManager::create(&cfg).unwrap();
        assert_eq!(m.init(), Err(STATUS_INVALID_PARAMETER));
        assert!(!m.is_ready());
    }

    #[test]
    fn init_rejects_oversized_limits() {
        for cfg in [
            ManagerConfig { max_sessions: MAX_SESSIONS_LIMIT + 1, ..Default::default() },
            ManagerConfig { session_buffer_bytes: usize::MAX, ..Default::default() },
            ManagerConfig { event_queue_depth: usize::MAX, ..Default::default() },
        ] {
            let mut m = RequestManager::create(&cfg).unwrap();
            assert_eq!(m.init(), Err(STATUS_INVALID_PARAMETER), "{cfg:?}");
            assert!(!m.is_ready());
        }
    }

    #[test]
    fn session_buffer_is_not_preallocated() {
        let m = ready(ManagerConfig { session_buffer_bytes: SESSION_BUFFER_LIMIT, ..Default::default() });
        m.open_session(&FILE).unwrap();
        let session = m.session(FILE.id).unwrap();
        assert_eq!(lock(&session.buffer).capacity(), 0);
        assert_eq!(m.write(FILE.id, b"abc", &CancelToken::new()), Ok(3));
        assert_eq!(session.pending(), 3);
    }

    #[test]
    fn session_limit_is_enforced() {
        let m = ready(ManagerConfig { max_sessions: 1, ..Default::default() });
        m.open_session(&FILE).unwrap();
        let other = FileObject { id: 10, process_id: 301 };
        assert_eq!(m.open_session(&other), Err(STATUS_TOO_MANY_OPENED_FILES));
        assert_eq!(m.open_session(&FILE), Err(STATUS_INVALID_PARAMETER));
        assert!(m.close_session(FILE.id));
        assert!(m.open_session(&other).is_ok());
    }

    #[test]
    fn write_is_partial_when_buffer_is_nearly_full() {
        let m = ready(ManagerConfig { session_buffer_bytes: 8, ..Default::default() });
        let cancel = CancelToken::new();
        m.open_session(&FILE).unwrap();
        assert_eq!(m.write(FILE.id, b"abcdef", &cancel), Ok(6));
        assert_eq!(m.write(FILE.id, b"ghijkl", &cancel), Ok(2));

        let mut out = [0u8; 16];
        assert_eq!(m.read(FILE.id, &mut out, &cancel), Ok(8));
        assert_eq!(&out[..8], b"abcdefgh");
        assert_eq!(m.read(FILE.id, &mut out, &cancel), Ok(0));
    }

    #[test]
    fn unknown_session_is_an_invalid_handle() {
        let m = ready(ManagerConfig::default());
        let mut out = [0u8; 4];
        assert_eq!(m.read(77, &mut out, &CancelToken::new()), Err(STATUS_INVALID_HANDLE));
    }

    #[test]
    fn cancelled_transfer_moves_no_bytes() {
        let m = ready(ManagerConfig::default());
        m.open_session(&FILE).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        assert_eq!(m.write(FILE.id, b"xyz", &cancel), Err(STATUS_CANCELLED));
        assert_eq!(m.session(FILE.id).unwrap().pending(), 0);
    }

    #[test]
    fn records_outside_mask_are_filtered() {
        let m = ready(ManagerConfig { category_mask: CATEGORY_PROCESS, ..Default::default() });
        assert!(!m.post_record(file_record(1, "C:\\a")));
        assert_eq!(m.stats().filtered_records, 1);

        m.set_category_mask(CATEGORY_FILE);
        assert!(m.post_record(file_record(1, "C:\\a")));
        assert_eq!(m.stats().queued_records, 1);
    }

    #[test]
    fn full_queue_drops_and_counts() {
        let m = ready(ManagerConfig { event_queue_depth: 2, ..Default::default() });
        assert!(m.post_record(file_record(1, "a")));
        assert!(m.post_record(file_record(2, "b")));
        assert!(!m.post_record(file_record(3, "c")));
        assert_eq!(m.stats().dropped_records, 1);
    }

    #[test]
    fn drain_keeps_record_that_does_not_fit() {
        let m = ready(ManagerConfig::default());
        m.post_record(file_record(1, "C:\\first"));
        m.post_record(file_record(2, "C:\\second"));
        let cancel = CancelToken::new();

        let mut tiny = [0u8; 3];
        let needed = match m.drain_records(&mut tiny, &cancel) {
            Err(DrainError::TooSmall { needed }) => needed,
            other => panic!("expected TooSmall, got {other:?}"),
        };
        assert_eq!(m.stats().queued_records, 2);

        let mut one = vec![0u8; needed];
        let n = m.drain_records(&mut one, &cancel).unwrap();
        let got = decode_frames(&one[..n]).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].pid, 1);
        assert!(got[0].ts.is_some());

        let mut big = [0u8; 512];
        let n = m.drain_records(&mut big, &cancel).unwrap();
        assert_eq!(decode_frames(&big[..n]).unwrap()[0].pid, 2);
        assert_eq!(m.drain_records(&mut big, &cancel), Ok(0));
    }

    #[test]
    fn shutdown_releases_everything() {
        let m = ready(ManagerConfig::default());
        m.open_session(&FILE).unwrap();
        m.post_record(file_record(1, "a"));
        m.shutdown();
        assert_eq!(m.stats(), ManagerStats { sessions: 0, queued_records: 0, ..m.stats() });
        assert_eq!(m.open_session(&FILE), Err(STATUS_DELETE_PENDING));
    }
}
