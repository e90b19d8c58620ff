use crate::common::{PageId, PAGE_SIZE};

const RECORD_COUNT_OFFSET: usize = 0;
const RECORDS_OFFSET: usize = 4;

/// Fixed width of an index name within a header record.
pub const MAX_INDEX_NAME_LEN: usize = 32;
const RECORD_SIZE: usize = MAX_INDEX_NAME_LEN + 4;

/// Maximum number of (name, root page id) records the header page can hold.
pub const MAX_HEADER_RECORDS: usize = (PAGE_SIZE - RECORDS_OFFSET) / RECORD_SIZE;

/// Mutable view over the header page (page 0). The page stores a count
/// followed by fixed-width records of a NUL-padded index name and the
/// index's root page id.
pub struct HeaderPage<'a> {
    data: &'a mut [u8],
}

impl<'a> HeaderPage<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn init(&mut self) {
        self.data.fill(0);
    }

    pub fn record_count(&self) -> usize {
        HeaderPageRef::new(self.data).record_count()
    }

    pub fn get_root_id(&self, name: &str) -> Option<PageId> {
        HeaderPageRef::new(self.data).get_root_id(name)
    }

    /// Adds a record for `name`. Returns false when the name is invalid,
    /// already present, or the page is full.
    pub fn insert_record(&mut self, name: &str, root_id: PageId) -> bool {
        if name.is_empty() || name.len() > MAX_INDEX_NAME_LEN {
            return false;
        }
        if self.find_record(name).is_some() {
            return false;
        }
        let count = self.record_count();
        if count >= MAX_HEADER_RECORDS {
            return false;
        }

        let offset = RECORDS_OFFSET + count * RECORD_SIZE;
        self.data[offset..offset + MAX_INDEX_NAME_LEN].fill(0);
        self.data[offset..offset + name.len()].copy_from_slice(name.as_bytes());
        self.data[offset + MAX_INDEX_NAME_LEN..offset + RECORD_SIZE]
            .copy_from_slice(&root_id.as_u32().to_le_bytes());

        self.set_record_count(count + 1);
        true
    }

    /// Updates the root page id of an existing record. Returns false when
    /// the name is not present.
    pub fn update_record(&mut self, name: &str, root_id: PageId) -> bool {
        match self.find_record(name) {
            Some(index) => {
                let offset = RECORDS_OFFSET + index * RECORD_SIZE + MAX_INDEX_NAME_LEN;
                self.data[offset..offset + 4].copy_from_slice(&root_id.as_u32().to_le_bytes());
                true
            }
            None => false,
        }
    }

    /// Removes the record for `name`, shifting later records down.
    pub fn delete_record(&mut self, name: &str) -> bool {
        match self.find_record(name) {
            Some(index) => {
                let count = self.record_count();
                let start = RECORDS_OFFSET + (index + 1) * RECORD_SIZE;
                let end = RECORDS_OFFSET + count * RECORD_SIZE;
                self.data
                    .copy_within(start..end, RECORDS_OFFSET + index * RECORD_SIZE);
                self.set_record_count(count - 1);
                true
            }
            None => false,
        }
    }

    fn find_record(&self, name: &str) -> Option<usize> {
        HeaderPageRef::new(self.data).find_record(name)
    }

    fn set_record_count(&mut self, count: usize) {
        self.data[RECORD_COUNT_OFFSET..RECORD_COUNT_OFFSET + 4]
            .copy_from_slice(&(count as u32).to_le_bytes());
    }
}

/// Read-only view over the header page.
pub struct HeaderPageRef<'a> {
    data: &'a [u8],
}

impl<'a> HeaderPageRef<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn record_count(&self) -> usize {
        let bytes: [u8; 4] = self.data[RECORD_COUNT_OFFSET..RECORD_COUNT_OFFSET + 4]
            .try_into()
            .unwrap();
        u32::from_le_bytes(bytes) as usize
    }

    pub fn get_root_id(&self, name: &str) -> Option<PageId> {
        let index = self.find_record(name)?;
        let offset = RECORDS_OFFSET + index * RECORD_SIZE + MAX_INDEX_NAME_LEN;
        let bytes: [u8; 4] = self.data[offset..offset + 4].try_into().unwrap();
        Some(PageId::new(u32::from_le_bytes(bytes)))
    }

    fn find_record(&self, name: &str) -> Option<usize> {
        if name.is_empty() || name.len() > MAX_INDEX_NAME_LEN {
            return None;
        }
        let count = self.record_count();
        for i in 0..count {
            let offset = RECORDS_OFFSET + i * RECORD_SIZE;
            let stored = &self.data[offset..offset + MAX_INDEX_NAME_LEN];
            let len = stored.iter().position(|&b| b == 0).unwrap_or(MAX_INDEX_NAME_LEN);
            if &stored[..len] == name.as_bytes() {
                return Some(i);
            }
        }
        None
    }
}
