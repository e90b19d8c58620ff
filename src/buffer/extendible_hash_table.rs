use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use parking_lot::Mutex;

/// A bucket holds up to `bucket_size` entries and knows how many low hash
/// bits it discriminates on.
#[derive(Debug)]
struct Bucket<K, V> {
    local_depth: u32,
    items: Vec<(K, V)>,
}

impl<K: Eq, V> Bucket<K, V> {
    fn new(local_depth: u32, capacity: usize) -> Self {
        Self {
            local_depth,
            items: Vec::with_capacity(capacity),
        }
    }

    fn find_mut(&mut self, key: &K) -> Option<&mut V> {
        self.items.iter_mut().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

struct Directory<K, V> {
    global_depth: u32,
    /// Directory slot -> index into `buckets`. A bucket with local depth d
    /// is referenced by exactly 2^(global_depth - d) slots.
    dir: Vec<usize>,
    buckets: Vec<Bucket<K, V>>,
}

/// Extendible hash table with directory doubling on bucket overflow.
///
/// The buffer pool uses this as its page table (page id -> frame id), but
/// the structure is generic over any hashable key. Buckets are never
/// merged; the directory only grows.
pub struct ExtendibleHashTable<K, V> {
    bucket_size: usize,
    inner: Mutex<Directory<K, V>>,
}

impl<K, V> ExtendibleHashTable<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Creates a table with a single depth-0 bucket of `bucket_size` slots.
    pub fn new(bucket_size: usize) -> Self {
        assert!(bucket_size > 0);
        Self {
            bucket_size,
            inner: Mutex::new(Directory {
                global_depth: 0,
                dir: vec![0],
                buckets: vec![Bucket::new(0, bucket_size)],
            }),
        }
    }

    fn hash(key: &K) -> u64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish()
    }

    fn index_of(global_depth: u32, key: &K) -> usize {
        let mask = (1usize << global_depth) - 1;
        (Self::hash(key) as usize) & mask
    }

    /// Looks up the value stored under `key`.
    pub fn find(&self, key: &K) -> Option<V> {
        let inner = self.inner.lock();
        let idx = Self::index_of(inner.global_depth, key);
        let bucket = &inner.buckets[inner.dir[idx]];
        bucket
            .items
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    /// Inserts `key -> value`, overwriting any existing entry. A full target
    /// bucket is split (doubling the directory when its local depth has
    /// reached the global depth) until the insert lands.
    pub fn insert(&self, key: K, value: V) {
        let mut inner = self.inner.lock();

        let idx = Self::index_of(inner.global_depth, &key);
        let bucket_idx = inner.dir[idx];
        if let Some(slot) = inner.buckets[bucket_idx].find_mut(&key) {
            *slot = value;
            return;
        }

        loop {
            let idx = Self::index_of(inner.global_depth, &key);
            let bucket_idx = inner.dir[idx];
            if inner.buckets[bucket_idx].items.len() < self.bucket_size {
                inner.buckets[bucket_idx].items.push((key, value));
                return;
            }
            Self::split_bucket(&mut inner, bucket_idx, self.bucket_size);
        }
    }

    /// Removes the entry for `key`. Returns whether it existed.
    pub fn remove(&self, key: &K) -> bool {
        let mut inner = self.inner.lock();
        let idx = Self::index_of(inner.global_depth, key);
        let bucket_idx = inner.dir[idx];
        let items = &mut inner.buckets[bucket_idx].items;
        match items.iter().position(|(k, _)| k == key) {
            Some(pos) => {
                items.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Splits the bucket at `bucket_idx` by one more hash bit. The existing
    /// arena slot is reused for the clear-bit half; the set-bit half gets a
    /// fresh slot, and every directory entry that pointed at the old bucket
    /// is rewired by its own bit.
    fn split_bucket(inner: &mut Directory<K, V>, bucket_idx: usize, bucket_size: usize) {
        let local_depth = inner.buckets[bucket_idx].local_depth;
        if local_depth == inner.global_depth {
            let cur_size = inner.dir.len();
            inner.dir.reserve(cur_size);
            inner.dir.extend_from_within(..cur_size);
            inner.global_depth += 1;
        }

        let items = std::mem::take(&mut inner.buckets[bucket_idx].items);
        inner.buckets[bucket_idx].local_depth = local_depth + 1;
        let sibling_idx = inner.buckets.len();
        inner.buckets.push(Bucket::new(local_depth + 1, bucket_size));

        let bit = 1usize << local_depth;
        for (k, v) in items {
            if (Self::hash(&k) as usize) & bit != 0 {
                inner.buckets[sibling_idx].items.push((k, v));
            } else {
                inner.buckets[bucket_idx].items.push((k, v));
            }
        }

        for (slot, target) in inner.dir.iter_mut().enumerate() {
            if *target == bucket_idx && slot & bit != 0 {
                *target = sibling_idx;
            }
        }
    }

    pub fn global_depth(&self) -> u32 {
        self.inner.lock().global_depth
    }

    /// Local depth of the bucket referenced by directory slot `dir_index`.
    pub fn local_depth(&self, dir_index: usize) -> u32 {
        let inner = self.inner.lock();
        inner.buckets[inner.dir[dir_index]].local_depth
    }

    pub fn num_buckets(&self) -> usize {
        self.inner.lock().buckets.len()
    }

    /// Number of directory slots (2^global_depth).
    pub fn dir_size(&self) -> usize {
        self.inner.lock().dir.len()
    }

    /// How many directory slots reference the same bucket as slot
    /// `dir_index`. The split invariant demands this equals
    /// 2^(global_depth - local_depth).
    pub fn slot_refcount(&self, dir_index: usize) -> usize {
        let inner = self.inner.lock();
        let target = inner.dir[dir_index];
        inner.dir.iter().filter(|&&b| b == target).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_table_insert_find() {
        let table = ExtendibleHashTable::<u32, u32>::new(4);

        table.insert(1, 100);
        table.insert(2, 200);

        assert_eq!(table.find(&1), Some(100));
        assert_eq!(table.find(&2), Some(200));
        assert_eq!(table.find(&3), None);
    }

    #[test]
    fn test_hash_table_overwrite() {
        let table = ExtendibleHashTable::<u32, u32>::new(4);

        table.insert(1, 100);
        table.insert(1, 111);

        assert_eq!(table.find(&1), Some(111));
    }

    #[test]
    fn test_hash_table_remove() {
        let table = ExtendibleHashTable::<u32, u32>::new(4);

        table.insert(1, 100);
        assert!(table.remove(&1));
        assert!(!table.remove(&1));
        assert_eq!(table.find(&1), None);
    }

    #[test]
    fn test_hash_table_split_keeps_entries() {
        let table = ExtendibleHashTable::<u32, u32>::new(2);

        for i in 0..64 {
            table.insert(i, i * 10);
        }
        for i in 0..64 {
            assert_eq!(table.find(&i), Some(i * 10), "lost key {}", i);
        }
        assert!(table.global_depth() > 0);
    }

    #[test]
    fn test_hash_table_directory_invariant() {
        let table = ExtendibleHashTable::<u32, u32>::new(2);

        for i in 0..128 {
            table.insert(i, i);
        }

        let g = table.global_depth();
        for slot in 0..table.dir_size() {
            let d = table.local_depth(slot);
            assert!(d <= g);
            assert_eq!(table.slot_refcount(slot), 1usize << (g - d));
        }
    }
}
