//! Integration tests for the B+ tree index

use std::sync::Arc;

use bedrock::buffer::BufferPoolManager;
use bedrock::common::{PageId, RecordId, SlotId};
use bedrock::index::{BPlusTree, InternalPageRef, LeafPageRef, U32Comparator};
use bedrock::storage::disk::DiskManager;

use tempfile::NamedTempFile;

fn create_bpm(pool_size: usize) -> (Arc<BufferPoolManager>, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let disk_manager = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let bpm = Arc::new(BufferPoolManager::new(pool_size, 2, disk_manager, None));
    (bpm, temp_file)
}

fn create_tree(
    bpm: &Arc<BufferPoolManager>,
    leaf_max: usize,
    internal_max: usize,
) -> BPlusTree {
    BPlusTree::new(
        "test_index",
        Arc::clone(bpm),
        Arc::new(U32Comparator),
        4,
        leaf_max,
        internal_max,
    )
    .unwrap()
}

fn key(v: u32) -> [u8; 4] {
    v.to_le_bytes()
}

fn rid(v: u32) -> RecordId {
    RecordId::new(PageId::new(v), SlotId::new((v % 100) as u16))
}

#[test]
fn test_btree_empty() {
    let (bpm, _temp) = create_bpm(10);
    let tree = create_tree(&bpm, 3, 3);

    assert!(tree.is_empty());
    assert_eq!(tree.get_value(&key(1)).unwrap(), None);

    let mut iter = tree.begin().unwrap();
    assert!(iter.is_end());
    assert_eq!(iter.next_entry().unwrap(), None);
}

#[test]
fn test_btree_insert_and_get() {
    let (bpm, _temp) = create_bpm(10);
    let tree = create_tree(&bpm, 3, 3);

    assert!(tree.insert(&key(10), rid(10)).unwrap());
    assert!(tree.insert(&key(20), rid(20)).unwrap());
    assert!(tree.insert(&key(30), rid(30)).unwrap());

    assert_eq!(tree.get_value(&key(10)).unwrap(), Some(rid(10)));
    assert_eq!(tree.get_value(&key(20)).unwrap(), Some(rid(20)));
    assert_eq!(tree.get_value(&key(30)).unwrap(), Some(rid(30)));
    assert_eq!(tree.get_value(&key(40)).unwrap(), None);
}

#[test]
fn test_btree_duplicate_insert_rejected() {
    let (bpm, _temp) = create_bpm(10);
    let tree = create_tree(&bpm, 3, 3);

    assert!(tree.insert(&key(10), rid(10)).unwrap());
    assert!(!tree.insert(&key(10), rid(11)).unwrap());
    // the original value survives
    assert_eq!(tree.get_value(&key(10)).unwrap(), Some(rid(10)));
}

#[test]
fn test_btree_split_scenario() {
    // leaf_max = internal_max = 3. After inserting 10, 20, 30, 40, 25 the
    // root is an internal node with three leaves: [10,20] [25] [30,40] and
    // separators 25, 30.
    let (bpm, _temp) = create_bpm(10);
    let tree = create_tree(&bpm, 3, 3);

    for v in [10u32, 20, 30, 40, 25] {
        assert!(tree.insert(&key(v), rid(v)).unwrap());
    }

    let root_guard = bpm.checked_read_page(tree.root_page_id()).unwrap();
    let root = InternalPageRef::new(root_guard.data(), 4);
    assert_eq!(root.size(), 3);
    assert_eq!(root.key_at(1), key(25));
    assert_eq!(root.key_at(2), key(30));

    let left_guard = bpm.checked_read_page(root.child_at(0)).unwrap();
    let left = LeafPageRef::new(left_guard.data(), 4);
    assert_eq!(left.size(), 2);
    assert_eq!(left.key_at(0), key(10));
    assert_eq!(left.key_at(1), key(20));

    let mid_guard = bpm.checked_read_page(root.child_at(1)).unwrap();
    let mid = LeafPageRef::new(mid_guard.data(), 4);
    assert_eq!(mid.size(), 1);
    assert_eq!(mid.key_at(0), key(25));

    let right_guard = bpm.checked_read_page(root.child_at(2)).unwrap();
    let right = LeafPageRef::new(right_guard.data(), 4);
    assert_eq!(right.size(), 2);
    assert_eq!(right.key_at(0), key(30));
    assert_eq!(right.key_at(1), key(40));

    // the leaf chain is stitched left to right
    assert_eq!(left.next_page_id(), mid.page_id());
    assert_eq!(mid.next_page_id(), right.page_id());
}

#[test]
fn test_btree_remove_merge_scenario() {
    // Continuing from the split scenario, Remove(10) underflows the left
    // leaf; its right neighbor [25] cannot lend, so the pair merges and
    // the root keeps two children: [20,25] and [30,40] under separator 30.
    let (bpm, _temp) = create_bpm(10);
    let tree = create_tree(&bpm, 3, 3);

    for v in [10u32, 20, 30, 40, 25] {
        tree.insert(&key(v), rid(v)).unwrap();
    }
    tree.remove(&key(10)).unwrap();

    assert_eq!(tree.get_value(&key(10)).unwrap(), None);

    let root_guard = bpm.checked_read_page(tree.root_page_id()).unwrap();
    let root = InternalPageRef::new(root_guard.data(), 4);
    assert_eq!(root.size(), 2);
    assert_eq!(root.key_at(1), key(30));

    let left_guard = bpm.checked_read_page(root.child_at(0)).unwrap();
    let left = LeafPageRef::new(left_guard.data(), 4);
    assert_eq!(left.size(), 2);
    assert_eq!(left.key_at(0), key(20));
    assert_eq!(left.key_at(1), key(25));

    let right_guard = bpm.checked_read_page(root.child_at(1)).unwrap();
    let right = LeafPageRef::new(right_guard.data(), 4);
    assert_eq!(right.size(), 2);
    assert_eq!(right.key_at(0), key(30));
    assert_eq!(right.key_at(1), key(40));

    assert_eq!(left.next_page_id(), right.page_id());
}

#[test]
fn test_btree_remove_to_empty() {
    let (bpm, _temp) = create_bpm(10);
    let tree = create_tree(&bpm, 3, 3);

    for v in [1u32, 2, 3] {
        tree.insert(&key(v), rid(v)).unwrap();
    }
    for v in [1u32, 2, 3] {
        tree.remove(&key(v)).unwrap();
    }

    assert!(tree.is_empty());
    assert_eq!(tree.get_value(&key(1)).unwrap(), None);

    // the tree grows back from empty
    assert!(tree.insert(&key(7), rid(7)).unwrap());
    assert_eq!(tree.get_value(&key(7)).unwrap(), Some(rid(7)));
}

#[test]
fn test_btree_remove_absent_is_noop() {
    let (bpm, _temp) = create_bpm(10);
    let tree = create_tree(&bpm, 3, 3);

    tree.insert(&key(5), rid(5)).unwrap();
    tree.remove(&key(99)).unwrap();
    tree.remove(&key(5)).unwrap();
    tree.remove(&key(5)).unwrap(); // second remove of the same key

    assert_eq!(tree.get_value(&key(5)).unwrap(), None);
}

#[test]
fn test_btree_insert_many_ascending() {
    let (bpm, _temp) = create_bpm(64);
    let tree = create_tree(&bpm, 4, 4);

    for v in 0..1000u32 {
        assert!(tree.insert(&key(v), rid(v)).unwrap());
    }
    for v in 0..1000u32 {
        assert_eq!(tree.get_value(&key(v)).unwrap(), Some(rid(v)), "key {}", v);
    }
}

#[test]
fn test_btree_insert_many_descending() {
    let (bpm, _temp) = create_bpm(64);
    let tree = create_tree(&bpm, 4, 4);

    for v in (0..500u32).rev() {
        assert!(tree.insert(&key(v), rid(v)).unwrap());
    }
    for v in 0..500u32 {
        assert_eq!(tree.get_value(&key(v)).unwrap(), Some(rid(v)), "key {}", v);
    }
}

#[test]
fn test_btree_random_insert_remove() {
    use rand::seq::SliceRandom;
    use rand::thread_rng;

    let (bpm, _temp) = create_bpm(64);
    let tree = create_tree(&bpm, 4, 4);

    let mut keys: Vec<u32> = (0..600).collect();
    keys.shuffle(&mut thread_rng());

    for &v in &keys {
        assert!(tree.insert(&key(v), rid(v)).unwrap());
    }

    let mut to_remove = keys.clone();
    to_remove.shuffle(&mut thread_rng());
    let removed: Vec<u32> = to_remove.drain(..300).collect();

    for &v in &removed {
        tree.remove(&key(v)).unwrap();
    }

    for &v in &keys {
        let expected = if removed.contains(&v) { None } else { Some(rid(v)) };
        assert_eq!(tree.get_value(&key(v)).unwrap(), expected, "key {}", v);
    }

    // surviving keys still scan in ascending order with no duplicates
    let mut expected: Vec<u32> = keys
        .iter()
        .copied()
        .filter(|v| !removed.contains(v))
        .collect();
    expected.sort_unstable();

    let scanned: Vec<u32> = tree
        .begin()
        .unwrap()
        .map(|entry| u32::from_le_bytes(entry.unwrap().0.try_into().unwrap()))
        .collect();
    assert_eq!(scanned, expected);
}

#[test]
fn test_btree_iterator_scenario() {
    // After inserting {5,10,15,20,25}: a full scan yields all five keys in
    // order and begin_at(12) starts at 15.
    let (bpm, _temp) = create_bpm(10);
    let tree = create_tree(&bpm, 3, 3);

    for v in [5u32, 10, 15, 20, 25] {
        tree.insert(&key(v), rid(v)).unwrap();
    }

    let scanned: Vec<u32> = tree
        .begin()
        .unwrap()
        .map(|entry| u32::from_le_bytes(entry.unwrap().0.try_into().unwrap()))
        .collect();
    assert_eq!(scanned, vec![5, 10, 15, 20, 25]);

    let from_12: Vec<u32> = tree
        .begin_at(&key(12))
        .unwrap()
        .map(|entry| u32::from_le_bytes(entry.unwrap().0.try_into().unwrap()))
        .collect();
    assert_eq!(from_12, vec![15, 20, 25]);

    let mut iter = tree.begin_at(&key(99)).unwrap();
    assert_eq!(iter.next_entry().unwrap(), None);
}

#[test]
fn test_btree_iterator_values() {
    let (bpm, _temp) = create_bpm(32);
    let tree = create_tree(&bpm, 4, 4);

    for v in 0..100u32 {
        tree.insert(&key(v), rid(v)).unwrap();
    }

    let mut iter = tree.begin().unwrap();
    let mut expected = 0u32;
    while let Some((k, v)) = iter.next_entry().unwrap() {
        assert_eq!(k, key(expected));
        assert_eq!(v, rid(expected));
        expected += 1;
    }
    assert_eq!(expected, 100);
    assert!(iter.is_end());
}

#[test]
fn test_btree_persistence() {
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path().to_path_buf();

    {
        let disk_manager = Arc::new(DiskManager::new(&path).unwrap());
        let bpm = Arc::new(BufferPoolManager::new(16, 2, disk_manager, None));
        let tree = BPlusTree::new(
            "persistent_index",
            Arc::clone(&bpm),
            Arc::new(U32Comparator),
            4,
            4,
            4,
        )
        .unwrap();

        for v in 0..200u32 {
            tree.insert(&key(v), rid(v)).unwrap();
        }
        bpm.flush_all_pages().unwrap();
    }

    {
        let disk_manager = Arc::new(DiskManager::new(&path).unwrap());
        let bpm = Arc::new(BufferPoolManager::new(16, 2, disk_manager, None));
        // the root page id comes back from the header page
        let tree = BPlusTree::new(
            "persistent_index",
            Arc::clone(&bpm),
            Arc::new(U32Comparator),
            4,
            4,
            4,
        )
        .unwrap();

        assert!(!tree.is_empty());
        for v in 0..200u32 {
            assert_eq!(
                tree.get_value(&key(v)).unwrap(),
                Some(rid(v)),
                "key {} lost across reopen",
                v
            );
        }
    }
}

#[test]
fn test_btree_scan_after_mixed_workload() {
    // After interleaved inserts and removes the leaf chain still scans
    // strictly ascending with nothing lost.
    let (bpm, _temp) = create_bpm(64);
    let tree = create_tree(&bpm, 4, 4);

    for v in 0..400u32 {
        tree.insert(&key(v), rid(v)).unwrap();
    }
    for v in (0..400u32).step_by(3) {
        tree.remove(&key(v)).unwrap();
    }

    let mut last: Option<u32> = None;
    let mut count = 0usize;
    for entry in tree.begin().unwrap() {
        let (k, _) = entry.unwrap();
        let v = u32::from_le_bytes(k.try_into().unwrap());
        if let Some(prev) = last {
            assert!(v > prev, "scan went backwards: {} after {}", v, prev);
        }
        last = Some(v);
        count += 1;
    }
    assert_eq!(count, 400 - 134); // 134 keys divisible by 3 below 400
}
