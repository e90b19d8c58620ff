use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::common::{PageId, Result, PAGE_SIZE};

/// DiskManager is responsible for reading and writing pages to/from disk.
/// It owns a single database file and hands out page IDs from a monotonic
/// counter. Page 0 is reserved for the header page and is materialized
/// (zeroed) when the file is first created.
pub struct DiskManager {
    /// The database file; the mutex guards the file cursor.
    file: Mutex<File>,
    db_path: PathBuf,
    /// Next page ID to hand out. Deallocated IDs are not recycled.
    next_page_id: AtomicU32,
    num_deallocated: AtomicU32,
    num_reads: AtomicU32,
    num_writes: AtomicU32,
}

impl DiskManager {
    /// Opens the database file at `db_path`, creating it if necessary.
    /// The page-id counter is seeded from the file size so that reopening
    /// an existing database continues allocation where it left off.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&db_path)?;

        let file_size = file.metadata()?.len();
        let pages_in_file = (file_size / PAGE_SIZE as u64) as u32;

        let dm = Self {
            file: Mutex::new(file),
            db_path,
            next_page_id: AtomicU32::new(pages_in_file.max(1)),
            num_deallocated: AtomicU32::new(0),
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
        };

        // Fresh database: lay down the zeroed header page at page 0.
        if pages_in_file == 0 {
            let zeros = [0u8; PAGE_SIZE];
            dm.write_page(PageId::new(0), &zeros)?;
        }

        Ok(dm)
    }

    /// Reads a page from disk into the provided buffer. Pages that were
    /// allocated but never written read back as zeros.
    pub fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");

        let byte_offset = (page_id.as_u32() as u64) * (PAGE_SIZE as u64);

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(byte_offset))?;

        let bytes_read = file.read(data)?;
        if bytes_read < PAGE_SIZE {
            data[bytes_read..].fill(0);
        }

        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Writes a page to disk from the provided buffer.
    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");

        let byte_offset = (page_id.as_u32() as u64) * (PAGE_SIZE as u64);

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(byte_offset))?;
        file.write_all(data)?;
        file.flush()?;

        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Allocates a new page on disk and returns its page ID.
    pub fn allocate_page(&self) -> Result<PageId> {
        let page_id = PageId::new(self.next_page_id.fetch_add(1, Ordering::SeqCst));

        // Extend the file so the page exists even before its first flush.
        let zeros = [0u8; PAGE_SIZE];
        self.write_page(page_id, &zeros)?;

        Ok(page_id)
    }

    /// Releases a page ID. IDs are not recycled; the slot simply becomes
    /// dead space until a compaction pass (not implemented here).
    pub fn deallocate_page(&self, _page_id: PageId) -> Result<()> {
        self.num_deallocated.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn num_pages(&self) -> u32 {
        self.next_page_id.load(Ordering::Relaxed)
    }

    pub fn num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    pub fn num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }

    pub fn num_deallocated(&self) -> u32 {
        self.num_deallocated.load(Ordering::Relaxed)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn sync(&self) -> Result<()> {
        self.file.lock().sync_all()?;
        Ok(())
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        let _ = self.file.get_mut().sync_all();
    }
}
