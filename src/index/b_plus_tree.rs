use std::cmp::Ordering;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockWriteGuard};

use crate::buffer::{BufferPoolManager, ReadPageGuard, WritePageGuard};
use crate::common::{
    BedrockError, PageId, RecordId, Result, HEADER_PAGE_ID, INVALID_PAGE_ID, PAGE_SIZE,
};
use crate::storage::page::{HeaderPage, HeaderPageRef};

use super::index_iterator::IndexIterator;
use super::key_comparator::KeyComparator;
use super::tree_page::{
    is_leaf_page, page_max_size_of, page_min_size_of, page_size_of, set_page_parent_id,
    InternalPage, InternalPageRef, LeafPage, LeafPageRef, CHILD_ID_SIZE,
    INTERNAL_PAGE_HEADER_SIZE, LEAF_PAGE_HEADER_SIZE, RECORD_ID_SIZE,
};

/// A concurrent B+ tree index over opaque fixed-width keys, stored in pages
/// managed by the buffer pool.
///
/// Concurrency follows latch crabbing: readers couple per-page read latches
/// down the tree; writers first try an optimistic pass that write-latches
/// only the leaf, and fall back to a pessimistic pass that write-latches the
/// full descent, releasing every held ancestor as soon as the current node
/// is safe for the operation. A tree-level reader/writer latch guards
/// `root_page_id` itself and is always acquired before any page latch.
pub struct BPlusTree {
    index_name: String,
    root_page_id: RwLock<PageId>,
    bpm: Arc<BufferPoolManager>,
    comparator: Arc<dyn KeyComparator>,
    key_size: usize,
    leaf_max_size: usize,
    internal_max_size: usize,
}

impl BPlusTree {
    /// Opens the index named `index_name`, recovering its root page id from
    /// the header page when the index already exists.
    pub fn new(
        index_name: impl Into<String>,
        bpm: Arc<BufferPoolManager>,
        comparator: Arc<dyn KeyComparator>,
        key_size: usize,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Result<Self> {
        assert!(key_size > 0);
        assert!(leaf_max_size >= 3);
        assert!(internal_max_size >= 3);
        // A leaf holds up to max entries while splitting; an internal node
        // up to max + 1 children.
        assert!(
            LEAF_PAGE_HEADER_SIZE + leaf_max_size * (key_size + RECORD_ID_SIZE) <= PAGE_SIZE
        );
        assert!(
            INTERNAL_PAGE_HEADER_SIZE + (internal_max_size + 1) * (key_size + CHILD_ID_SIZE)
                <= PAGE_SIZE
        );

        let index_name = index_name.into();
        let root_page_id = {
            let guard = bpm.checked_read_page(HEADER_PAGE_ID)?;
            HeaderPageRef::new(guard.data())
                .get_root_id(&index_name)
                .unwrap_or(INVALID_PAGE_ID)
        };

        Ok(Self {
            index_name,
            root_page_id: RwLock::new(root_page_id),
            bpm,
            comparator,
            key_size,
            leaf_max_size,
            internal_max_size,
        })
    }

    pub fn is_empty(&self) -> bool {
        *self.root_page_id.read() == INVALID_PAGE_ID
    }

    pub fn root_page_id(&self) -> PageId {
        *self.root_page_id.read()
    }

    /// Point lookup. Couples read latches from the root down and returns
    /// the value stored under `key`, if any.
    pub fn get_value(&self, key: &[u8]) -> Result<Option<RecordId>> {
        assert_eq!(key.len(), self.key_size);
        let cmp = &*self.comparator;

        let root_latch = self.root_page_id.read();
        let root_id = *root_latch;
        if root_id == INVALID_PAGE_ID {
            return Ok(None);
        }
        let mut cur = self.bpm.checked_read_page(root_id)?;
        drop(root_latch);

        loop {
            if is_leaf_page(cur.data()) {
                let leaf = LeafPageRef::new(cur.data(), self.key_size);
                let idx = leaf.lower_bound(key, cmp);
                if idx < leaf.size() && cmp.compare(leaf.key_at(idx), key) == Ordering::Equal {
                    return Ok(Some(leaf.value_at(idx)));
                }
                return Ok(None);
            }
            let child_id = InternalPageRef::new(cur.data(), self.key_size).lookup(key, cmp);
            // the child is latched before the parent guard is replaced
            cur = self.bpm.checked_read_page(child_id)?;
        }
    }

    /// Inserts `key -> value`. Returns false when the key already exists.
    pub fn insert(&self, key: &[u8], value: RecordId) -> Result<bool> {
        assert_eq!(key.len(), self.key_size);

        if self.is_empty() {
            let mut root_latch = self.root_page_id.write();
            // double-check under the exclusive latch
            if *root_latch == INVALID_PAGE_ID {
                self.start_new_tree(&mut root_latch, key, value)?;
                return Ok(true);
            }
        }

        if let Some(inserted) = self.insert_optimistic(key, value)? {
            return Ok(inserted);
        }
        self.insert_pessimistic(key, value)
    }

    /// Removes `key`. Absent keys are a no-op.
    pub fn remove(&self, key: &[u8]) -> Result<()> {
        assert_eq!(key.len(), self.key_size);

        if self.is_empty() {
            return Ok(());
        }
        if self.remove_optimistic(key)?.is_some() {
            return Ok(());
        }
        self.remove_pessimistic(key)
    }

    /// Iterator positioned at the first entry of the leftmost leaf.
    pub fn begin(&self) -> Result<IndexIterator> {
        let root_latch = self.root_page_id.read();
        let root_id = *root_latch;
        if root_id == INVALID_PAGE_ID {
            return Ok(IndexIterator::end(Arc::clone(&self.bpm), self.key_size));
        }
        let mut cur = self.bpm.checked_read_page(root_id)?;
        drop(root_latch);

        loop {
            if is_leaf_page(cur.data()) {
                return Ok(IndexIterator::new(
                    Arc::clone(&self.bpm),
                    Some(cur),
                    0,
                    self.key_size,
                ));
            }
            let child_id = InternalPageRef::new(cur.data(), self.key_size).child_at(0);
            cur = self.bpm.checked_read_page(child_id)?;
        }
    }

    /// Iterator positioned at the first entry whose key is >= `key`.
    pub fn begin_at(&self, key: &[u8]) -> Result<IndexIterator> {
        assert_eq!(key.len(), self.key_size);
        let cmp = &*self.comparator;

        let root_latch = self.root_page_id.read();
        let root_id = *root_latch;
        if root_id == INVALID_PAGE_ID {
            return Ok(IndexIterator::end(Arc::clone(&self.bpm), self.key_size));
        }
        let mut cur = self.bpm.checked_read_page(root_id)?;
        drop(root_latch);

        loop {
            if is_leaf_page(cur.data()) {
                let index = LeafPageRef::new(cur.data(), self.key_size).lower_bound(key, cmp);
                return Ok(IndexIterator::new(
                    Arc::clone(&self.bpm),
                    Some(cur),
                    index,
                    self.key_size,
                ));
            }
            let child_id = InternalPageRef::new(cur.data(), self.key_size).lookup(key, cmp);
            cur = self.bpm.checked_read_page(child_id)?;
        }
    }

    /// The past-the-end iterator.
    pub fn end(&self) -> IndexIterator {
        IndexIterator::end(Arc::clone(&self.bpm), self.key_size)
    }

    /// Creates the first leaf as the new root. Caller holds the root latch
    /// exclusively and has verified the tree is empty.
    fn start_new_tree(
        &self,
        root_slot: &mut PageId,
        key: &[u8],
        value: RecordId,
    ) -> Result<()> {
        let mut guard = self.bpm.new_page()?;
        let root_id = guard.page_id();
        {
            let mut leaf = LeafPage::new(guard.data_mut(), self.key_size);
            leaf.init(root_id, INVALID_PAGE_ID, self.leaf_max_size);
            leaf.set_kv(0, key, value);
            leaf.set_size(1);
        }
        drop(guard);

        *root_slot = root_id;
        self.update_root_page_id(root_id, true)?;
        log::debug!("b+tree '{}' created root page {}", self.index_name, root_id);
        Ok(())
    }

    /// Optimistic insert: read-latch down to the leaf's parent, write-latch
    /// only the leaf. Returns None when the leaf may split, in which case
    /// the caller restarts with the pessimistic pass.
    fn insert_optimistic(&self, key: &[u8], value: RecordId) -> Result<Option<bool>> {
        let cmp = &*self.comparator;

        let root_latch = self.root_page_id.read();
        let root_id = *root_latch;
        if root_id == INVALID_PAGE_ID {
            return Ok(None);
        }

        // While the parent's read latch (or, for a root leaf, the shared
        // root latch) is held, no split or merge can change which leaf owns
        // this key, so the leaf's read latch can be traded for a write
        // latch.
        let mut _parent: Option<ReadPageGuard> = None;
        let mut cur = self.bpm.checked_read_page(root_id)?;
        while !is_leaf_page(cur.data()) {
            let child_id = InternalPageRef::new(cur.data(), self.key_size).lookup(key, cmp);
            let child = self.bpm.checked_read_page(child_id)?;
            _parent = Some(cur);
            cur = child;
        }

        let leaf_id = cur.page_id();
        drop(cur);
        let mut leaf_guard = self.bpm.checked_write_page(leaf_id)?;

        let mut leaf = LeafPage::new(leaf_guard.data_mut(), self.key_size);
        if leaf.size() >= leaf.max_size() - 1 {
            return Ok(None);
        }
        let idx = leaf.lower_bound(key, cmp);
        if idx < leaf.size() && cmp.compare(leaf.key_at(idx), key) == Ordering::Equal {
            return Ok(Some(false));
        }
        leaf.insert(key, value, cmp);
        Ok(Some(true))
    }

    /// Optimistic remove, same shape as [`Self::insert_optimistic`].
    fn remove_optimistic(&self, key: &[u8]) -> Result<Option<()>> {
        let cmp = &*self.comparator;

        let root_latch = self.root_page_id.read();
        let root_id = *root_latch;
        if root_id == INVALID_PAGE_ID {
            return Ok(Some(()));
        }

        let mut _parent: Option<ReadPageGuard> = None;
        let mut cur = self.bpm.checked_read_page(root_id)?;
        while !is_leaf_page(cur.data()) {
            let child_id = InternalPageRef::new(cur.data(), self.key_size).lookup(key, cmp);
            let child = self.bpm.checked_read_page(child_id)?;
            _parent = Some(cur);
            cur = child;
        }

        let leaf_is_root = _parent.is_none();
        let leaf_id = cur.page_id();
        drop(cur);
        let mut leaf_guard = self.bpm.checked_write_page(leaf_id)?;

        let mut leaf = LeafPage::new(leaf_guard.data_mut(), self.key_size);
        let safe = if leaf_is_root {
            leaf.size() > 1
        } else {
            leaf.size() > leaf.min_size()
        };
        if !safe {
            return Ok(None);
        }
        leaf.remove(key, cmp);
        Ok(Some(()))
    }

    /// Pessimistic descent: write-latch every page on the path, releasing
    /// all held ancestors (and the root latch) whenever the current page is
    /// safe for `op`. Returns with `path` holding the unsafe suffix ending
    /// at the leaf.
    fn descend_for_write<'a>(
        &self,
        key: &[u8],
        root_id: PageId,
        root_latch: &mut Option<RwLockWriteGuard<'a, PageId>>,
        path: &mut Vec<WritePageGuard>,
        op: WriteOp,
    ) -> Result<()> {
        let cmp = &*self.comparator;
        let mut cur_id = root_id;

        loop {
            let guard = self.bpm.checked_write_page(cur_id)?;
            let safe = {
                let data = guard.data();
                let size = page_size_of(data);
                let is_root = path.is_empty();
                match op {
                    WriteOp::Insert => {
                        if is_leaf_page(data) {
                            size < page_max_size_of(data) - 1
                        } else {
                            size < page_max_size_of(data)
                        }
                    }
                    WriteOp::Remove => {
                        if is_root {
                            if is_leaf_page(data) {
                                size > 1
                            } else {
                                size > 2
                            }
                        } else {
                            size > page_min_size_of(data)
                        }
                    }
                }
            };
            path.push(guard);
            if safe {
                let keep_from = path.len() - 1;
                path.drain(..keep_from);
                *root_latch = None;
            }

            let last = path.last().ok_or_else(|| {
                BedrockError::IndexCorrupted("write descent lost its path".into())
            })?;
            if is_leaf_page(last.data()) {
                return Ok(());
            }
            cur_id = InternalPageRef::new(last.data(), self.key_size).lookup(key, cmp);
        }
    }

    fn insert_pessimistic(&self, key: &[u8], value: RecordId) -> Result<bool> {
        let cmp = &*self.comparator;

        let mut root_latch_guard = self.root_page_id.write();
        if *root_latch_guard == INVALID_PAGE_ID {
            self.start_new_tree(&mut root_latch_guard, key, value)?;
            return Ok(true);
        }

        let root_id = *root_latch_guard;
        let mut root_latch = Some(root_latch_guard);
        let mut path: Vec<WritePageGuard> = Vec::new();
        self.descend_for_write(key, root_id, &mut root_latch, &mut path, WriteOp::Insert)?;

        {
            let leaf_guard = path.last_mut().ok_or_else(|| {
                BedrockError::IndexCorrupted("insert descent produced no leaf".into())
            })?;
            let mut leaf = LeafPage::new(leaf_guard.data_mut(), self.key_size);
            let idx = leaf.lower_bound(key, cmp);
            if idx < leaf.size() && cmp.compare(leaf.key_at(idx), key) == Ordering::Equal {
                return Ok(false);
            }
            leaf.insert(key, value, cmp);
            if leaf.size() < leaf.max_size() {
                return Ok(true);
            }
        }

        self.split_and_propagate(&mut root_latch, &mut path)?;
        Ok(true)
    }

    /// Splits the overflowing leaf at the end of `path` and walks the
    /// separator up through the held ancestors, splitting internal nodes as
    /// long as they overflow. Growing past `path[0]` means growing past the
    /// root.
    fn split_and_propagate<'a>(
        &self,
        root_latch: &mut Option<RwLockWriteGuard<'a, PageId>>,
        path: &mut [WritePageGuard],
    ) -> Result<()> {
        let cmp = &*self.comparator;
        let mut level = path.len() - 1;

        // Split the leaf: ceil(size/2) entries stay, the new right sibling
        // is spliced into the leaf chain, and its first key becomes the
        // separator to push up.
        let mut right_guard = self.bpm.new_page()?;
        let mut separator = {
            let right_id = right_guard.page_id();
            let mut left = LeafPage::new(path[level].data_mut(), self.key_size);
            let mut right = LeafPage::new(right_guard.data_mut(), self.key_size);
            right.init(right_id, left.parent_page_id(), self.leaf_max_size);
            right.set_next_page_id(left.next_page_id());
            left.set_next_page_id(right_id);
            left.move_half_to(&mut right);
            right.key_at(0).to_vec()
        };

        loop {
            if level == 0 {
                // the split node was the root: grow the tree by one level
                let left_id = path[0].page_id();
                let right_id = right_guard.page_id();

                let mut new_root_guard = self.bpm.new_page()?;
                let new_root_id = new_root_guard.page_id();
                {
                    let mut root = InternalPage::new(new_root_guard.data_mut(), self.key_size);
                    root.init(new_root_id, INVALID_PAGE_ID, self.internal_max_size);
                    root.populate_new_root(left_id, &separator, right_id);
                }
                set_page_parent_id(path[0].data_mut(), new_root_id);
                set_page_parent_id(right_guard.data_mut(), new_root_id);

                let latch = root_latch.as_mut().ok_or_else(|| {
                    BedrockError::IndexCorrupted("root split without the root latch".into())
                })?;
                **latch = new_root_id;
                self.update_root_page_id(new_root_id, false)?;
                log::debug!(
                    "b+tree '{}' root grew to page {}",
                    self.index_name,
                    new_root_id
                );
                return Ok(());
            }

            // hand the new right node to the parent
            let right_id = right_guard.page_id();
            let parent_id = path[level - 1].page_id();
            {
                let mut parent = InternalPage::new(path[level - 1].data_mut(), self.key_size);
                parent.insert(&separator, right_id, cmp);
            }
            set_page_parent_id(right_guard.data_mut(), parent_id);

            if page_size_of(path[level - 1].data()) <= self.internal_max_size {
                return Ok(());
            }

            // the parent overflowed: split it and keep walking up
            let mut new_right_guard = self.bpm.new_page()?;
            separator = {
                let new_right_id = new_right_guard.page_id();
                let mut left = InternalPage::new(path[level - 1].data_mut(), self.key_size);
                let mut right = InternalPage::new(new_right_guard.data_mut(), self.key_size);
                right.init(new_right_id, left.parent_page_id(), self.internal_max_size);
                left.move_half_to(&mut right);
                right.key_at(0).to_vec()
            };

            // reparent the children that moved; the two nodes this cascade
            // already holds are updated through their held guards
            let new_right_id = new_right_guard.page_id();
            let moved_children: Vec<PageId> = {
                let right = InternalPageRef::new(new_right_guard.data(), self.key_size);
                (0..right.size()).map(|i| right.child_at(i)).collect()
            };
            for child in moved_children {
                if child == path[level].page_id() {
                    set_page_parent_id(path[level].data_mut(), new_right_id);
                } else if child == right_guard.page_id() {
                    set_page_parent_id(right_guard.data_mut(), new_right_id);
                } else {
                    let mut child_guard = self.bpm.checked_write_page(child)?;
                    set_page_parent_id(child_guard.data_mut(), new_right_id);
                }
            }

            right_guard = new_right_guard;
            level -= 1;
        }
    }

    fn remove_pessimistic(&self, key: &[u8]) -> Result<()> {
        let cmp = &*self.comparator;

        let root_latch_guard = self.root_page_id.write();
        if *root_latch_guard == INVALID_PAGE_ID {
            return Ok(());
        }

        let root_id = *root_latch_guard;
        let mut root_latch = Some(root_latch_guard);
        let mut path: Vec<WritePageGuard> = Vec::new();
        let mut deleted: Vec<PageId> = Vec::new();
        self.descend_for_write(key, root_id, &mut root_latch, &mut path, WriteOp::Remove)?;

        {
            let leaf_guard = path.last_mut().ok_or_else(|| {
                BedrockError::IndexCorrupted("remove descent produced no leaf".into())
            })?;
            let mut leaf = LeafPage::new(leaf_guard.data_mut(), self.key_size);
            if !leaf.remove(key, cmp) {
                return Ok(());
            }
        }

        let mut level = path.len() - 1;
        loop {
            let (node_is_leaf, node_size) = {
                let data = path[level].data();
                (is_leaf_page(data), page_size_of(data))
            };

            if level == 0 {
                if let Some(latch) = root_latch.as_mut() {
                    if node_is_leaf {
                        if node_size == 0 {
                            // the last key is gone; the tree is empty again
                            let old_root = path[0].page_id();
                            **latch = INVALID_PAGE_ID;
                            self.update_root_page_id(INVALID_PAGE_ID, false)?;
                            deleted.push(old_root);
                        }
                    } else if node_size == 1 {
                        // a root with a single child hands the root over
                        let old_root = path[0].page_id();
                        let new_root =
                            InternalPageRef::new(path[0].data(), self.key_size).child_at(0);
                        {
                            let mut child_guard = self.bpm.checked_write_page(new_root)?;
                            set_page_parent_id(child_guard.data_mut(), INVALID_PAGE_ID);
                        }
                        **latch = new_root;
                        self.update_root_page_id(new_root, false)?;
                        deleted.push(old_root);
                        log::debug!(
                            "b+tree '{}' root collapsed to page {}",
                            self.index_name,
                            new_root
                        );
                    }
                }
                break;
            }

            if node_size >= page_min_size_of(path[level].data()) {
                break;
            }

            let node_id = path[level].page_id();
            let (node_idx, left_id, right_id) = {
                let parent = InternalPageRef::new(path[level - 1].data(), self.key_size);
                let idx = parent.child_index(node_id).ok_or_else(|| {
                    BedrockError::IndexCorrupted(format!(
                        "page {} missing from its parent",
                        node_id
                    ))
                })?;
                let left = (idx > 0).then(|| parent.child_at(idx - 1));
                let right = (idx + 1 < parent.size()).then(|| parent.child_at(idx + 1));
                (idx, left, right)
            };

            // left sibling before right sibling
            let mut left_guard = match left_id {
                Some(id) => Some(self.bpm.checked_write_page(id)?),
                None => None,
            };

            if let Some(lg) = left_guard.as_mut() {
                if page_size_of(lg.data()) > page_min_size_of(lg.data()) {
                    let (upper, lower) = path.split_at_mut(level);
                    self.borrow_from_left(&mut upper[level - 1], &mut lower[0], lg, node_idx)?;
                    break;
                }
            }

            let mut right_guard = match right_id {
                Some(id) => Some(self.bpm.checked_write_page(id)?),
                None => None,
            };

            if let Some(rg) = right_guard.as_mut() {
                if page_size_of(rg.data()) > page_min_size_of(rg.data()) {
                    let (upper, lower) = path.split_at_mut(level);
                    self.borrow_from_right(&mut upper[level - 1], &mut lower[0], rg, node_idx)?;
                    break;
                }
            }

            // no sibling can lend: merge into the left node of the pair
            {
                let (upper, lower) = path.split_at_mut(level);
                let parent_guard = &mut upper[level - 1];
                let node_guard = &mut lower[0];
                if let Some(mut lg) = left_guard {
                    self.merge_pair(parent_guard, &mut lg, node_guard, node_idx)?;
                    deleted.push(node_guard.page_id());
                } else if let Some(mut rg) = right_guard {
                    self.merge_pair(parent_guard, node_guard, &mut rg, node_idx + 1)?;
                    deleted.push(rg.page_id());
                } else {
                    return Err(BedrockError::IndexCorrupted(format!(
                        "non-root page {} has no siblings",
                        node_id
                    )));
                }
            }

            // the parent lost a separator; keep checking upward
            path.truncate(level);
            level -= 1;
        }

        // deletes run after every latch is released
        drop(path);
        drop(root_latch);
        for page_id in deleted {
            self.bpm.delete_page(page_id)?;
        }
        Ok(())
    }

    /// Moves the last entry of the left sibling into `node` and refreshes
    /// the parent separator at `node_idx`.
    fn borrow_from_left(
        &self,
        parent_guard: &mut WritePageGuard,
        node_guard: &mut WritePageGuard,
        left_guard: &mut WritePageGuard,
        node_idx: usize,
    ) -> Result<()> {
        let cmp = &*self.comparator;

        if is_leaf_page(node_guard.data()) {
            let (key, value) = {
                let mut left = LeafPage::new(left_guard.data_mut(), self.key_size);
                let last = left.size() - 1;
                let key = left.key_at(last).to_vec();
                let value = left.value_at(last);
                left.remove_at(last);
                (key, value)
            };
            LeafPage::new(node_guard.data_mut(), self.key_size).insert(&key, value, cmp);
            InternalPage::new(parent_guard.data_mut(), self.key_size).set_key_at(node_idx, &key);
        } else {
            let node_id = node_guard.page_id();
            let old_separator = {
                let parent = InternalPageRef::new(parent_guard.data(), self.key_size);
                parent.key_at(node_idx).to_vec()
            };
            let (moved_child, new_separator) = {
                let mut left = InternalPage::new(left_guard.data_mut(), self.key_size);
                let last = left.size() - 1;
                let moved_child = left.child_at(last);
                let new_separator = left.key_at(last).to_vec();
                left.remove_at(last);
                (moved_child, new_separator)
            };
            InternalPage::new(node_guard.data_mut(), self.key_size)
                .prepend_child(moved_child, &old_separator);
            InternalPage::new(parent_guard.data_mut(), self.key_size)
                .set_key_at(node_idx, &new_separator);

            let mut child_guard = self.bpm.checked_write_page(moved_child)?;
            set_page_parent_id(child_guard.data_mut(), node_id);
        }
        Ok(())
    }

    /// Moves the first entry of the right sibling into `node` and refreshes
    /// the parent separator at `node_idx + 1`.
    fn borrow_from_right(
        &self,
        parent_guard: &mut WritePageGuard,
        node_guard: &mut WritePageGuard,
        right_guard: &mut WritePageGuard,
        node_idx: usize,
    ) -> Result<()> {
        let cmp = &*self.comparator;

        if is_leaf_page(node_guard.data()) {
            let (key, value, new_separator) = {
                let mut right = LeafPage::new(right_guard.data_mut(), self.key_size);
                let key = right.key_at(0).to_vec();
                let value = right.value_at(0);
                right.remove_at(0);
                let new_separator = right.key_at(0).to_vec();
                (key, value, new_separator)
            };
            LeafPage::new(node_guard.data_mut(), self.key_size).insert(&key, value, cmp);
            InternalPage::new(parent_guard.data_mut(), self.key_size)
                .set_key_at(node_idx + 1, &new_separator);
        } else {
            let node_id = node_guard.page_id();
            let old_separator = {
                let parent = InternalPageRef::new(parent_guard.data(), self.key_size);
                parent.key_at(node_idx + 1).to_vec()
            };
            let (moved_child, new_separator) = {
                let mut right = InternalPage::new(right_guard.data_mut(), self.key_size);
                let moved_child = right.child_at(0);
                let new_separator = right.key_at(1).to_vec();
                right.remove_at(0);
                (moved_child, new_separator)
            };
            {
                let mut node = InternalPage::new(node_guard.data_mut(), self.key_size);
                node.append_entry(&old_separator, moved_child);
            }
            InternalPage::new(parent_guard.data_mut(), self.key_size)
                .set_key_at(node_idx + 1, &new_separator);

            let mut child_guard = self.bpm.checked_write_page(moved_child)?;
            set_page_parent_id(child_guard.data_mut(), node_id);
        }
        Ok(())
    }

    /// Folds `right` into `left` and drops the separator at
    /// `right_idx_in_parent`. The caller marks `right` for deletion.
    fn merge_pair(
        &self,
        parent_guard: &mut WritePageGuard,
        left_guard: &mut WritePageGuard,
        right_guard: &mut WritePageGuard,
        right_idx_in_parent: usize,
    ) -> Result<()> {
        if is_leaf_page(left_guard.data()) {
            let mut left = LeafPage::new(left_guard.data_mut(), self.key_size);
            let mut right = LeafPage::new(right_guard.data_mut(), self.key_size);
            left.absorb(&mut right);
        } else {
            let left_id = left_guard.page_id();
            let separator = {
                let parent = InternalPageRef::new(parent_guard.data(), self.key_size);
                parent.key_at(right_idx_in_parent).to_vec()
            };
            let moved_children: Vec<PageId> = {
                let right = InternalPageRef::new(right_guard.data(), self.key_size);
                (0..right.size()).map(|i| right.child_at(i)).collect()
            };
            {
                let mut left = InternalPage::new(left_guard.data_mut(), self.key_size);
                let mut right = InternalPage::new(right_guard.data_mut(), self.key_size);
                left.absorb(&separator, &mut right);
            }
            for child in moved_children {
                let mut child_guard = self.bpm.checked_write_page(child)?;
                set_page_parent_id(child_guard.data_mut(), left_id);
            }
        }

        InternalPage::new(parent_guard.data_mut(), self.key_size).remove_at(right_idx_in_parent);
        Ok(())
    }

    /// Records a root page id change in the header page. `insert_record`
    /// distinguishes a first-time registration from an update, though
    /// either form repairs a missing record.
    fn update_root_page_id(&self, root_id: PageId, insert_record: bool) -> Result<()> {
        let mut guard = self.bpm.checked_write_page(HEADER_PAGE_ID)?;
        let mut header = HeaderPage::new(guard.data_mut());
        let ok = if insert_record {
            header.insert_record(&self.index_name, root_id)
                || header.update_record(&self.index_name, root_id)
        } else {
            header.update_record(&self.index_name, root_id)
                || header.insert_record(&self.index_name, root_id)
        };
        if ok {
            Ok(())
        } else {
            Err(BedrockError::HeaderPageFull)
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum WriteOp {
    Insert,
    Remove,
}
