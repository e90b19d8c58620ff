use std::sync::Arc;

use crate::buffer::{BufferPoolManager, ReadPageGuard};
use crate::common::{RecordId, Result, INVALID_PAGE_ID};

use super::tree_page::LeafPageRef;

/// Forward scan over the leaf chain. The iterator keeps a read guard (pin
/// plus read latch) on its current leaf and releases it before stepping to
/// `next_page_id`, so it never waits while holding a latch.
pub struct IndexIterator {
    bpm: Arc<BufferPoolManager>,
    guard: Option<ReadPageGuard>,
    index: usize,
    key_size: usize,
}

impl IndexIterator {
    pub(crate) fn new(
        bpm: Arc<BufferPoolManager>,
        guard: Option<ReadPageGuard>,
        index: usize,
        key_size: usize,
    ) -> Self {
        Self {
            bpm,
            guard,
            index,
            key_size,
        }
    }

    pub(crate) fn end(bpm: Arc<BufferPoolManager>, key_size: usize) -> Self {
        Self::new(bpm, None, 0, key_size)
    }

    /// True once the scan has run off the end of the leaf chain.
    pub fn is_end(&self) -> bool {
        self.guard.is_none()
    }

    /// Yields the current entry and advances, hopping to the next leaf when
    /// this one is exhausted.
    pub fn next_entry(&mut self) -> Result<Option<(Vec<u8>, RecordId)>> {
        loop {
            let next_page_id = {
                let Some(guard) = self.guard.as_ref() else {
                    return Ok(None);
                };
                let leaf = LeafPageRef::new(guard.data(), self.key_size);
                if self.index < leaf.size() {
                    let key = leaf.key_at(self.index).to_vec();
                    let value = leaf.value_at(self.index);
                    self.index += 1;
                    return Ok(Some((key, value)));
                }
                leaf.next_page_id()
            };

            // unpin this leaf before fetching its successor
            self.guard = None;
            self.index = 0;
            if next_page_id == INVALID_PAGE_ID {
                return Ok(None);
            }
            self.guard = Some(self.bpm.checked_read_page(next_page_id)?);
        }
    }
}

impl Iterator for IndexIterator {
    type Item = Result<(Vec<u8>, RecordId)>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
