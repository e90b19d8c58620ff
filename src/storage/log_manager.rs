use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::common::{Lsn, Result};

/// Size of the per-record frame header: lsn (8) + payload length (4).
const RECORD_HEADER_SIZE: usize = 12;

/// LogManager is the write-ahead log sink. Records are appended to an
/// in-memory buffer and persisted by `flush`. The buffer pool flushes the
/// log before writing back any dirty page, so no page ever reaches disk
/// ahead of the log records that describe it.
///
/// Recovery replay is out of scope; this component only guarantees the
/// write-ahead ordering.
pub struct LogManager {
    next_lsn: AtomicU64,
    persistent_lsn: AtomicU64,
    buffer: Mutex<Vec<u8>>,
    file: Mutex<File>,
}

impl LogManager {
    /// Opens (or creates) the log file at `log_path` in append mode.
    pub fn new<P: AsRef<Path>>(log_path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(log_path)?;

        Ok(Self {
            next_lsn: AtomicU64::new(1),
            persistent_lsn: AtomicU64::new(0),
            buffer: Mutex::new(Vec::new()),
            file: Mutex::new(file),
        })
    }

    /// Appends a record to the log buffer and returns its LSN. The record
    /// is not durable until the next `flush`.
    pub fn append_record(&self, payload: &[u8]) -> Lsn {
        let mut buffer = self.buffer.lock();
        let lsn = self.next_lsn.fetch_add(1, Ordering::SeqCst);

        buffer.reserve(RECORD_HEADER_SIZE + payload.len());
        buffer.extend_from_slice(&lsn.to_le_bytes());
        buffer.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        buffer.extend_from_slice(payload);

        lsn
    }

    /// Persists all buffered records and advances `persistent_lsn`.
    pub fn flush(&self) -> Result<()> {
        let mut buffer = self.buffer.lock();
        if buffer.is_empty() {
            return Ok(());
        }

        let mut file = self.file.lock();
        file.write_all(&buffer)?;
        file.sync_data()?;
        buffer.clear();

        let durable = self.next_lsn.load(Ordering::SeqCst) - 1;
        self.persistent_lsn.store(durable, Ordering::SeqCst);
        log::trace!("wal flushed through lsn {}", durable);

        Ok(())
    }

    /// The highest LSN known to be on disk.
    pub fn persistent_lsn(&self) -> Lsn {
        self.persistent_lsn.load(Ordering::SeqCst)
    }

    pub fn next_lsn(&self) -> Lsn {
        self.next_lsn.load(Ordering::SeqCst)
    }
}
