use byteorder::{ByteOrder, LittleEndian};

use crate::error::{DbError, DbResult};
use crate::storage::page::{
    get_key_count, get_link, get_parent, set_is_leaf, set_key_count, set_link, set_parent, Page,
    HEADER_SIZE, LEAF_MAX_KEYS, LEAF_RECORD_SIZE, VALUE_SIZE,
};

/// Pack `value` into the fixed-width, NUL-padded slot stored on disk.
pub fn encode_value(value: &str) -> DbResult<[u8; VALUE_SIZE]> {
    let bytes = value.as_bytes();
    if bytes.len() > VALUE_SIZE {
        return Err(DbError::ValueTooLong { len: bytes.len() });
    }
    if bytes.contains(&0) {
        return Err(DbError::InvalidValue("value contains a NUL byte"));
    }
    let mut slot = [0u8; VALUE_SIZE];
    slot[..bytes.len()].copy_from_slice(bytes);
    Ok(slot)
}

/// Inverse of [`encode_value`]; reads up to the first NUL.
pub fn decode_value(slot: &[u8; VALUE_SIZE]) -> String {
    let end = slot.iter().position(|&b| b == 0).unwrap_or(VALUE_SIZE);
    String::from_utf8_lossy(&slot[..end]).into_owned()
}

/// A single (key, value) record stored in a leaf.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub key: i64,
    pub value: [u8; VALUE_SIZE],
}

impl Record {
    pub fn new(key: i64, value: &str) -> DbResult<Self> {
        Ok(Record { key, value: encode_value(value)? })
    }

    pub fn value_string(&self) -> String {
        decode_value(&self.value)
    }
}

/// Decoded leaf page.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LeafNode {
    pub parent: u64,
    /// 0 for the rightmost leaf.
    pub right_sibling: u64,
    /// Sorted ascending by key, no duplicates.
    pub records: Vec<Record>,
}

impl LeafNode {
    pub fn new(parent: u64) -> Self {
        LeafNode { parent, ..Default::default() }
    }

    pub fn decode(page: &Page) -> DbResult<Self> {
        let count = get_key_count(&page.data);
        if count > LEAF_MAX_KEYS {
            return Err(DbError::Corrupt(format!(
                "leaf page {} claims {} records",
                page.offset, count
            )));
        }

        let mut records = Vec::with_capacity(count);
        for i in 0..count {
            let start = HEADER_SIZE + i * LEAF_RECORD_SIZE;
            let key = LittleEndian::read_i64(&page.data[start..start + 8]);
            let mut value = [0u8; VALUE_SIZE];
            value.copy_from_slice(&page.data[start + 8..start + LEAF_RECORD_SIZE]);
            records.push(Record { key, value });
        }

        Ok(LeafNode {
            parent: get_parent(&page.data),
            right_sibling: get_link(&page.data),
            records,
        })
    }

    pub fn encode(&self, offset: u64) -> Page {
        debug_assert!(self.records.len() <= LEAF_MAX_KEYS);
        let mut page = Page::new(offset);
        set_parent(&mut page.data, self.parent);
        set_is_leaf(&mut page.data, true);
        set_key_count(&mut page.data, self.records.len());
        set_link(&mut page.data, self.right_sibling);

        for (i, record) in self.records.iter().enumerate() {
            let start = HEADER_SIZE + i * LEAF_RECORD_SIZE;
            LittleEndian::write_i64(&mut page.data[start..start + 8], record.key);
            page.data[start + 8..start + LEAF_RECORD_SIZE].copy_from_slice(&record.value);
        }
        page
    }

    /// Index of the first record whose key is `>= key`.
    pub fn lower_bound(&self, key: i64) -> usize {
        self.records.partition_point(|r| r.key < key)
    }

    /// Index of the record holding exactly `key`.
    pub fn find(&self, key: i64) -> Option<usize> {
        let idx = self.lower_bound(key);
        match self.records.get(idx) {
            Some(record) if record.key == key => Some(idx),
            _ => None,
        }
    }

    pub fn is_full(&self) -> bool {
        self.records.len() >= LEAF_MAX_KEYS
    }

    pub fn first_key(&self) -> Option<i64> {
        self.records.first().map(|r| r.key)
    }
}
