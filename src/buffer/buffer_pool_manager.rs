use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::{BedrockError, FrameId, PageId, Result, INVALID_PAGE_ID, PAGE_SIZE};
use crate::storage::disk::{DiskManager, DiskScheduler};
use crate::storage::LogManager;

use super::{ExtendibleHashTable, FrameHeader, LruKReplacer, ReadPageGuard, WritePageGuard};

/// Shared state reachable from page guards.
pub(crate) struct BufferPoolState {
    frames: Vec<Arc<FrameHeader>>,
    /// Page table: maps resident page IDs to frame IDs
    page_table: ExtendibleHashTable<PageId, FrameId>,
    /// Frames not currently holding any page
    free_list: Mutex<VecDeque<FrameId>>,
    replacer: LruKReplacer,
    /// Serializes frame acquisition, mapping changes, and guard release.
    /// Without it, an unpin-to-zero could mark a frame evictable right
    /// after a concurrent fetch re-pinned it.
    latch: Mutex<()>,
}

impl BufferPoolState {
    /// Called by a guard on drop, after it has released the frame latch.
    /// Folds the guard's dirty observation into the frame and re-marks the
    /// frame evictable once the last pin goes away.
    pub(crate) fn release_frame(&self, frame: &FrameHeader, is_dirty: bool) {
        let _guard = self.latch.lock();
        if is_dirty {
            frame.set_dirty(true);
        }
        if let Some(0) = frame.unpin() {
            self.replacer.set_evictable(frame.frame_id(), true);
        }
    }
}

/// BufferPoolManager mediates all page access: it owns a fixed set of
/// frames, maps resident page IDs to frames through an extendible hash
/// table, and picks eviction victims with an LRU-K replacer.
///
/// Access is handed out as pinned RAII guards; the manager latch serializes
/// frame acquisition, mapping changes, and guard release, and is held
/// across disk I/O. Frame data latches are independent of it.
pub struct BufferPoolManager {
    pool_size: usize,
    state: Arc<BufferPoolState>,
    disk_scheduler: DiskScheduler,
    log_manager: Option<Arc<LogManager>>,
}

impl BufferPoolManager {
    pub fn new(
        pool_size: usize,
        replacer_k: usize,
        disk_manager: Arc<DiskManager>,
        log_manager: Option<Arc<LogManager>>,
    ) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);

        for i in 0..pool_size {
            let frame_id = FrameId::new(i as u32);
            frames.push(Arc::new(FrameHeader::new(frame_id)));
            free_list.push_back(frame_id);
        }

        let state = Arc::new(BufferPoolState {
            frames,
            page_table: ExtendibleHashTable::new(crate::common::DEFAULT_BUCKET_SIZE),
            free_list: Mutex::new(free_list),
            replacer: LruKReplacer::new(replacer_k, pool_size),
            latch: Mutex::new(()),
        });

        Self {
            pool_size,
            state,
            disk_scheduler: DiskScheduler::new(disk_manager),
            log_manager,
        }
    }

    /// Allocates a fresh page and returns it pinned for writing. The frame
    /// comes from the free list, or from evicting the LRU-K victim (writing
    /// it back first when dirty).
    pub fn new_page(&self) -> Result<WritePageGuard> {
        let guard = self.state.latch.lock();

        let frame_id = self.acquire_frame()?;
        let page_id = self.disk_scheduler.disk_manager().allocate_page()?;

        let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);
        frame.set_page_id(page_id);
        frame.pin();

        self.state.page_table.insert(page_id, frame_id);
        self.state.replacer.record_access(frame_id);
        self.state.replacer.set_evictable(frame_id, false);

        drop(guard);
        // Safety: the Arc keeps the frame alive for the guard's lifetime.
        Ok(unsafe { WritePageGuard::new(page_id, frame, Arc::clone(&self.state)) })
    }

    /// Fetches a page for shared access, reading it from disk if it is not
    /// resident. The returned guard holds a pin and the frame's read latch.
    pub fn checked_read_page(&self, page_id: PageId) -> Result<ReadPageGuard> {
        let frame = self.fetch_frame(page_id)?;
        Ok(unsafe { ReadPageGuard::new(page_id, frame, Arc::clone(&self.state)) })
    }

    /// Fetches a page for exclusive access. The returned guard holds a pin
    /// and the frame's write latch.
    pub fn checked_write_page(&self, page_id: PageId) -> Result<WritePageGuard> {
        let frame = self.fetch_frame(page_id)?;
        Ok(unsafe { WritePageGuard::new(page_id, frame, Arc::clone(&self.state)) })
    }

    /// Writes a page's bytes to disk, regardless of the dirty flag, and
    /// clears the flag on success. Returns false when the page is not
    /// resident.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        if page_id == INVALID_PAGE_ID {
            return Err(BedrockError::InvalidPageId(page_id));
        }

        let _guard = self.state.latch.lock();

        let Some(frame_id) = self.state.page_table.find(&page_id) else {
            return Ok(false);
        };
        let frame = &self.state.frames[frame_id.as_usize()];

        self.flush_wal()?;

        let mut data = [0u8; PAGE_SIZE];
        frame.copy_to(&mut data);
        self.disk_scheduler.schedule_write_sync(page_id, &data)?;

        frame.set_dirty(false);
        Ok(true)
    }

    /// Flushes every resident frame.
    pub fn flush_all_pages(&self) -> Result<()> {
        let _guard = self.state.latch.lock();

        self.flush_wal()?;

        for frame in &self.state.frames {
            let page_id = frame.page_id();
            if page_id == INVALID_PAGE_ID {
                continue;
            }

            let mut data = [0u8; PAGE_SIZE];
            frame.copy_to(&mut data);
            self.disk_scheduler.schedule_write_sync(page_id, &data)?;
            frame.set_dirty(false);
        }

        Ok(())
    }

    /// Drops a page from the pool and releases its id. Succeeds trivially
    /// when the page is not resident; fails while the page is pinned. Never
    /// writes back.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let _guard = self.state.latch.lock();

        let Some(frame_id) = self.state.page_table.find(&page_id) else {
            self.disk_scheduler.disk_manager().deallocate_page(page_id)?;
            return Ok(true);
        };
        let frame = &self.state.frames[frame_id.as_usize()];

        if frame.pin_count() > 0 {
            return Err(BedrockError::PageStillPinned(page_id));
        }

        self.state.page_table.remove(&page_id);
        self.state.replacer.remove(frame_id);
        frame.reset();
        self.state.free_list.lock().push_back(frame_id);

        self.disk_scheduler.disk_manager().deallocate_page(page_id)?;
        Ok(true)
    }

    /// Returns the pin count of a resident page, None otherwise.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        self.state
            .page_table
            .find(&page_id)
            .map(|frame_id| self.state.frames[frame_id.as_usize()].pin_count())
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn free_frame_count(&self) -> usize {
        self.state.free_list.lock().len()
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        self.disk_scheduler.disk_manager()
    }

    /// Pins the frame holding `page_id`, loading the page from disk into a
    /// newly acquired frame when it is not resident.
    fn fetch_frame(&self, page_id: PageId) -> Result<Arc<FrameHeader>> {
        if page_id == INVALID_PAGE_ID {
            return Err(BedrockError::InvalidPageId(page_id));
        }

        let _guard = self.state.latch.lock();

        if let Some(frame_id) = self.state.page_table.find(&page_id) {
            let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);
            frame.pin();
            self.state.replacer.record_access(frame_id);
            self.state.replacer.set_evictable(frame_id, false);
            return Ok(frame);
        }

        let frame_id = self.acquire_frame()?;
        let frame = Arc::clone(&self.state.frames[frame_id.as_usize()]);

        let mut data = [0u8; PAGE_SIZE];
        self.disk_scheduler.schedule_read_sync(page_id, &mut data)?;

        frame.set_page_id(page_id);
        frame.copy_from(&data);
        frame.set_dirty(false);
        frame.pin();

        self.state.page_table.insert(page_id, frame_id);
        self.state.replacer.record_access(frame_id);
        self.state.replacer.set_evictable(frame_id, false);

        Ok(frame)
    }

    /// Obtains a clean frame: free list first, else evict the LRU-K victim,
    /// writing it back (WAL first) when dirty.
    fn acquire_frame(&self) -> Result<FrameId> {
        if let Some(frame_id) = self.state.free_list.lock().pop_front() {
            return Ok(frame_id);
        }

        let Some(frame_id) = self.state.replacer.evict() else {
            return Err(BedrockError::BufferPoolFull);
        };

        let frame = &self.state.frames[frame_id.as_usize()];
        let old_page_id = frame.page_id();

        if frame.is_dirty() {
            self.flush_wal()?;

            let mut data = [0u8; PAGE_SIZE];
            frame.copy_to(&mut data);
            self.disk_scheduler.schedule_write_sync(old_page_id, &data)?;
            log::debug!("evicted dirty page {} from frame {}", old_page_id, frame_id);
        }

        self.state.page_table.remove(&old_page_id);
        frame.reset();

        Ok(frame_id)
    }

    /// The write-ahead rule: log records must be durable before any page
    /// that reflects them reaches disk.
    fn flush_wal(&self) -> Result<()> {
        if let Some(log_manager) = &self.log_manager {
            log_manager.flush()?;
        }
        Ok(())
    }
}
