use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::{PageId, PAGE_SIZE};

use super::buffer_pool_manager::BufferPoolState;
use super::FrameHeader;

/// RAII guard for read access to a page. Holds the frame's read latch and a
/// pin; dropping the guard releases the latch first, then unpins (marking
/// the frame evictable again at pin count zero).
pub struct ReadPageGuard {
    page_id: PageId,
    frame: Arc<FrameHeader>,
    pool: Arc<BufferPoolState>,
    data_guard: Option<RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>>>,
}

impl ReadPageGuard {
    /// # Safety
    /// The read guard's lifetime is erased to 'static; the `Arc<FrameHeader>`
    /// held alongside it keeps the lock alive for the guard's whole life.
    pub(crate) unsafe fn new(
        page_id: PageId,
        frame: Arc<FrameHeader>,
        pool: Arc<BufferPoolState>,
    ) -> Self {
        let data_guard = frame.data.read();
        let data_guard: RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>> =
            std::mem::transmute(data_guard);

        Self {
            page_id,
            frame,
            pool,
            data_guard: Some(data_guard),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data_guard.as_ref().unwrap()[..]
    }
}

impl Deref for ReadPageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl Drop for ReadPageGuard {
    fn drop(&mut self) {
        // Unlatch before unpin
        self.data_guard.take();
        self.pool.release_frame(&self.frame, false);
    }
}

/// RAII guard for write access to a page. Holds the frame's write latch and
/// a pin; the first `data_mut` marks the residency dirty. Drop order is
/// unlatch, then unpin.
pub struct WritePageGuard {
    page_id: PageId,
    frame: Arc<FrameHeader>,
    pool: Arc<BufferPoolState>,
    is_dirty: bool,
    data_guard: Option<RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>>>,
}

impl WritePageGuard {
    /// # Safety
    /// Same contract as [`ReadPageGuard::new`].
    pub(crate) unsafe fn new(
        page_id: PageId,
        frame: Arc<FrameHeader>,
        pool: Arc<BufferPoolState>,
    ) -> Self {
        let data_guard = frame.data.write();
        let data_guard: RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>> =
            std::mem::transmute(data_guard);

        Self {
            page_id,
            frame,
            pool,
            is_dirty: false,
            data_guard: Some(data_guard),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn data(&self) -> &[u8] {
        &self.data_guard.as_ref().unwrap()[..]
    }

    /// Mutable view of the page bytes; marks the page dirty.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.is_dirty = true;
        &mut self.data_guard.as_mut().unwrap()[..]
    }
}

impl Deref for WritePageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl DerefMut for WritePageGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data_mut()
    }
}

impl Drop for WritePageGuard {
    fn drop(&mut self) {
        // Unlatch before unpin
        self.data_guard.take();
        self.pool.release_frame(&self.frame, self.is_dirty);
    }
}
