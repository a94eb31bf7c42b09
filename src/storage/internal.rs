use byteorder::{ByteOrder, LittleEndian};

use crate::error::{DbError, DbResult};
use crate::storage::page::{
    get_key_count, get_link, get_parent, set_is_leaf, set_key_count, set_link, set_parent, Page,
    HEADER_SIZE, INTERNAL_MAX_KEYS, INTERNAL_PAIR_SIZE,
};

/// A separator key and the child holding keys `>= key` (up to the next separator).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Separator {
    pub key: i64,
    pub child: u64,
}

/// Decoded internal page.
///
/// `leftmost_child` holds every key below `separators[0].key`; `separators[i].child`
/// holds `[separators[i].key, separators[i + 1].key)`. The page therefore has
/// `separators.len() + 1` children.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InternalNode {
    pub parent: u64,
    pub leftmost_child: u64,
    pub separators: Vec<Separator>,
}

impl InternalNode {
    pub fn new(parent: u64, leftmost_child: u64) -> Self {
        InternalNode { parent, leftmost_child, separators: Vec::new() }
    }

    pub fn decode(page: &Page) -> DbResult<Self> {
        let count = get_key_count(&page.data);
        if count > INTERNAL_MAX_KEYS {
            return Err(DbError::Corrupt(format!(
                "internal page {} claims {} keys",
                page.offset, count
            )));
        }

        let separators = (0..count)
            .map(|i| {
                let start = HEADER_SIZE + i * INTERNAL_PAIR_SIZE;
                Separator {
                    key: LittleEndian::read_i64(&page.data[start..start + 8]),
                    child: LittleEndian::read_u64(&page.data[start + 8..start + 16]),
                }
            })
            .collect();

        Ok(InternalNode {
            parent: get_parent(&page.data),
            leftmost_child: get_link(&page.data),
            separators,
        })
    }

    pub fn encode(&self, offset: u64) -> Page {
        debug_assert!(self.separators.len() <= INTERNAL_MAX_KEYS);
        let mut page = Page::new(offset);
        set_parent(&mut page.data, self.parent);
        set_is_leaf(&mut page.data, false);
        set_key_count(&mut page.data, self.separators.len());
        set_link(&mut page.data, self.leftmost_child);

        for (i, sep) in self.separators.iter().enumerate() {
            let start = HEADER_SIZE + i * INTERNAL_PAIR_SIZE;
            LittleEndian::write_i64(&mut page.data[start..start + 8], sep.key);
            LittleEndian::write_u64(&mut page.data[start + 8..start + 16], sep.child);
        }
        page
    }

    /// Index of the first separator strictly greater than `key`.
    pub fn upper_bound(&self, key: i64) -> usize {
        self.separators.partition_point(|s| s.key <= key)
    }

    /// Child whose subtree covers `key`.
    pub fn child_for(&self, key: i64) -> u64 {
        self.child_at(self.upper_bound(key))
    }

    pub fn child_count(&self) -> usize {
        self.separators.len() + 1
    }

    /// Child `0` is the leftmost child, child `i` is `separators[i - 1].child`.
    pub fn child_at(&self, idx: usize) -> u64 {
        match idx {
            0 => self.leftmost_child,
            _ => self.separators[idx - 1].child,
        }
    }

    /// Position of `child` among this page's children.
    pub fn position_of(&self, child: u64) -> Option<usize> {
        if self.leftmost_child == child {
            return Some(0);
        }
        self.separators
            .iter()
            .position(|s| s.child == child)
            .map(|i| i + 1)
    }

    pub fn children(&self) -> impl Iterator<Item = u64> + '_ {
        std::iter::once(self.leftmost_child).chain(self.separators.iter().map(|s| s.child))
    }

    pub fn is_full(&self) -> bool {
        self.separators.len() >= INTERNAL_MAX_KEYS
    }
}
