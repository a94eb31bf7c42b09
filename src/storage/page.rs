// ┌───────────────────────────────────────────────────────────────────────────┐
// │ Header page (offset 0)                                                     │
// │────────┬────────┬──────────────────────────────────────────────────────────│
// │   0    │   8    │ FREE_PAGE_OFFSET (u64): head of the free list, 0 if none │
// │   8    │   8    │ ROOT_PAGE_OFFSET (u64): root of the tree, 0 if empty     │
// │  16    │   8    │ PAGE_COUNT (u64): pages in the file, header included     │
// │  24    │   8    │ MAGIC                                                    │
// └───────────────────────────────────────────────────────────────────────────┘
//
// ┌───────────────────────────────────────────────────────────────────────────┐
// │ Tree page header (leaf and internal)                                       │
// │────────┬────────┬──────────────────────────────────────────────────────────│
// │   0    │   8    │ PARENT_PAGE (u64): offset of the parent, 0 for the root  │
// │   8    │   4    │ IS_LEAF (u32): 1 = leaf, 0 = internal                    │
// │  12    │   4    │ KEY_COUNT (u32)                                          │
// │  16    │ 104    │ reserved                                                 │
// │ 120    │   8    │ LINK (u64): right sibling (leaf) / leftmost child        │
// │────────┼────────┼──────────────────────────────────────────────────────────│
// │ 128    │ 3968   │ leaf: [key i64][value 120B] × 31                         │
// │        │        │ internal: [key i64][child u64] × 248                     │
// └───────────────────────────────────────────────────────────────────────────┘

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{DbError, DbResult};
use crate::storage::internal::InternalNode;
use crate::storage::leaf::LeafNode;

pub const PAGE_SIZE: usize = 4096;
pub const VALUE_SIZE: usize = 120;

pub const PARENT_PAGE_OFFSET: usize = 0; // 8 bytes (u64)
pub const IS_LEAF_OFFSET: usize     = 8; // 4 bytes (u32)
pub const KEY_COUNT_OFFSET: usize   = 12; // 4 bytes (u32)
pub const LINK_OFFSET: usize        = 120; // 8 bytes (u64)
pub const HEADER_SIZE: usize        = 128; // total header length

pub const LEAF_RECORD_SIZE: usize = 8 + VALUE_SIZE;
pub const INTERNAL_PAIR_SIZE: usize = 16;

/// Records a leaf can hold before it has to split.
pub const LEAF_MAX_KEYS: usize = (PAGE_SIZE - HEADER_SIZE) / LEAF_RECORD_SIZE;
/// Fewest records a non-root leaf may hold.
pub const LEAF_MIN_KEYS: usize = LEAF_MAX_KEYS.div_ceil(2) - 1;
/// Separator keys an internal page can hold (one less than its fan-out).
pub const INTERNAL_MAX_KEYS: usize = (PAGE_SIZE - HEADER_SIZE) / INTERNAL_PAIR_SIZE;
/// Fewest separator keys a non-root internal page may hold.
pub const INTERNAL_MIN_KEYS: usize = (INTERNAL_MAX_KEYS + 1).div_ceil(2) - 1;

const _: () = assert!(HEADER_SIZE + LEAF_MAX_KEYS * LEAF_RECORD_SIZE <= PAGE_SIZE);
const _: () = assert!(HEADER_SIZE + INTERNAL_MAX_KEYS * INTERNAL_PAIR_SIZE <= PAGE_SIZE);
const _: () = assert!(2 * LEAF_MIN_KEYS - 1 <= LEAF_MAX_KEYS);
const _: () = assert!(2 * INTERNAL_MIN_KEYS <= INTERNAL_MAX_KEYS);

/// Whether `offset` sits on a page boundary.
pub fn is_aligned(offset: u64) -> bool {
    offset % PAGE_SIZE as u64 == 0
}

/// A single 4 KiB page together with the file offset it was read from or is destined for.
pub struct Page {
    pub offset: u64,
    pub data: Box<[u8; PAGE_SIZE]>,
}

impl Page {
    pub fn new(offset: u64) -> Self {
        Page { offset, data: Box::new([0; PAGE_SIZE]) }
    }
}

/// Read the parent page offset.
pub fn get_parent(page: &[u8; PAGE_SIZE]) -> u64 {
    LittleEndian::read_u64(&page[PARENT_PAGE_OFFSET..PARENT_PAGE_OFFSET + 8])
}

/// Set the parent page offset.
pub fn set_parent(page: &mut [u8; PAGE_SIZE], parent: u64) {
    LittleEndian::write_u64(&mut page[PARENT_PAGE_OFFSET..PARENT_PAGE_OFFSET + 8], parent);
}

pub fn is_leaf(page: &[u8; PAGE_SIZE]) -> bool {
    LittleEndian::read_u32(&page[IS_LEAF_OFFSET..IS_LEAF_OFFSET + 4]) != 0
}

pub fn set_is_leaf(page: &mut [u8; PAGE_SIZE], leaf: bool) {
    LittleEndian::write_u32(&mut page[IS_LEAF_OFFSET..IS_LEAF_OFFSET + 4], u32::from(leaf));
}

pub fn get_key_count(page: &[u8; PAGE_SIZE]) -> usize {
    LittleEndian::read_u32(&page[KEY_COUNT_OFFSET..KEY_COUNT_OFFSET + 4]) as usize
}

pub fn set_key_count(page: &mut [u8; PAGE_SIZE], count: usize) {
    LittleEndian::write_u32(&mut page[KEY_COUNT_OFFSET..KEY_COUNT_OFFSET + 4], count as u32);
}

/// Read the link field: right sibling of a leaf, leftmost child of an internal page.
pub fn get_link(page: &[u8; PAGE_SIZE]) -> u64 {
    LittleEndian::read_u64(&page[LINK_OFFSET..LINK_OFFSET + 8])
}

pub fn set_link(page: &mut [u8; PAGE_SIZE], link: u64) {
    LittleEndian::write_u64(&mut page[LINK_OFFSET..LINK_OFFSET + 8], link);
}

/// The resident copy of page 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeaderPage {
    pub free_page_offset: u64,
    pub root_page_offset: u64,
    pub page_count: u64,
}

impl Default for HeaderPage {
    fn default() -> Self {
        HeaderPage {
            free_page_offset: 0,
            root_page_offset: 0,
            page_count: 1,
        }
    }
}

impl HeaderPage {
    pub const MAGIC: [u8; 8] = *b"BPTDB\0\0\x01";
    const MAGIC_OFFSET: usize = 24;

    /// First byte past the last allocated page.
    pub fn file_end(&self) -> u64 {
        self.page_count.saturating_mul(PAGE_SIZE as u64)
    }

    pub fn encode(&self) -> Page {
        let mut page = Page::new(0);
        LittleEndian::write_u64(&mut page.data[0..8], self.free_page_offset);
        LittleEndian::write_u64(&mut page.data[8..16], self.root_page_offset);
        LittleEndian::write_u64(&mut page.data[16..24], self.page_count);
        page.data[Self::MAGIC_OFFSET..Self::MAGIC_OFFSET + 8].copy_from_slice(&Self::MAGIC);
        page
    }

    /// Decode and sanity-check page 0.
    pub fn decode(page: &Page) -> DbResult<Self> {
        if page.data[Self::MAGIC_OFFSET..Self::MAGIC_OFFSET + 8] != Self::MAGIC {
            return Err(DbError::Corrupt("invalid magic number in header page".into()));
        }
        let header = HeaderPage {
            free_page_offset: LittleEndian::read_u64(&page.data[0..8]),
            root_page_offset: LittleEndian::read_u64(&page.data[8..16]),
            page_count: LittleEndian::read_u64(&page.data[16..24]),
        };
        if header.page_count == 0 {
            return Err(DbError::Corrupt("header page reports zero pages".into()));
        }
        for (name, offset) in [
            ("free list head", header.free_page_offset),
            ("root page", header.root_page_offset),
        ] {
            if !is_aligned(offset) || offset >= header.file_end() {
                return Err(DbError::Corrupt(format!(
                    "{name} offset {offset} is invalid for {} pages",
                    header.page_count
                )));
            }
        }
        Ok(header)
    }
}

/// A page sitting on the free list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FreePage {
    pub next_free_page_offset: u64,
}

impl FreePage {
    pub fn encode(&self, offset: u64) -> Page {
        let mut page = Page::new(offset);
        LittleEndian::write_u64(&mut page.data[0..8], self.next_free_page_offset);
        page
    }

    pub fn decode(page: &Page) -> Self {
        FreePage {
            next_free_page_offset: LittleEndian::read_u64(&page.data[0..8]),
        }
    }
}

/// A tree page decoded according to its `IS_LEAF` flag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    Leaf(LeafNode),
    Internal(InternalNode),
}

impl Node {
    pub fn decode(page: &Page) -> DbResult<Node> {
        if is_leaf(&page.data) {
            Ok(Node::Leaf(LeafNode::decode(page)?))
        } else {
            Ok(Node::Internal(InternalNode::decode(page)?))
        }
    }

    pub fn encode(&self, offset: u64) -> Page {
        match self {
            Node::Leaf(leaf) => leaf.encode(offset),
            Node::Internal(internal) => internal.encode(offset),
        }
    }

    pub fn parent(&self) -> u64 {
        match self {
            Node::Leaf(leaf) => leaf.parent,
            Node::Internal(internal) => internal.parent,
        }
    }
}
