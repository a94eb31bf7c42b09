use log::{debug, trace};

use crate::error::{DbError, DbResult};
use crate::storage::internal::InternalNode;
use crate::storage::leaf::LeafNode;
use crate::storage::page::{set_parent, Node};
use crate::storage::pager::Pager;

mod delete;
mod insert;
mod verify;

pub use verify::TreeStats;

/// Deeper than any tree this page size can produce; hitting it means a cycle.
const MAX_HEIGHT: usize = 64;

/// A B+Tree of `i64` keys stored in the pages of one [`Pager`].
///
/// The root offset lives in the pager's header page. Leaves hold the records
/// and are chained left to right through `right_sibling`; internal pages hold
/// separator keys and child offsets. Every tree page records its parent, and
/// that back-pointer is rewritten whenever a split or merge moves a child.
///
///—————————————————————————————————————————————————————————————————————————————————————————————
/// On insert:
///   1. Descend from the root to the leaf covering the key.
///   2. If the leaf has room, insert in sorted position and write it.
///   3. Otherwise split it: allocate a right sibling, move the upper half
///      over, relink the sibling chain and push the right half's first key
///      into the parent via `insert_into_parent`.
///   4. `insert_into_parent` adds (separator, new child) to the parent,
///      splitting it around its median key when full and recursing upward.
///      Splitting the root allocates a new root one level higher.
///
/// On delete:
///   1. Remove the record from its leaf.
///   2. If a non-root leaf drops below the minimum, borrow a boundary record
///      from a sibling with spare records, fixing the separator in the parent.
///   3. Otherwise merge the right page of the sibling pair into the left one,
///      drop their separator from the parent, free the right page, and repeat
///      the check on the parent.
///   4. A root left with a single child is replaced by that child; a root leaf
///      left empty empties the tree.
///—————————————————————————————————————————————————————————————————————————————————————————————
pub struct BTree<'a> {
    pager: &'a mut Pager,
}

impl<'a> BTree<'a> {
    pub fn new(pager: &'a mut Pager) -> BTree<'a> {
        BTree { pager }
    }

    /// Offset of the root page, 0 while the tree is empty.
    pub fn root_page(&self) -> u64 {
        self.pager.root_offset()
    }

    /// Value stored under `key`, if any.
    pub fn find(&mut self, key: i64) -> DbResult<Option<String>> {
        debug!("find() → starting at root page {} for key={}", self.root_page(), key);

        let Some((offset, leaf)) = self.find_leaf(key)? else {
            return Ok(None);
        };
        match leaf.find(key) {
            Some(idx) => {
                debug!("  → Found key={} in leaf {}", key, offset);
                Ok(Some(leaf.records[idx].value_string()))
            }
            None => {
                debug!("  → Key={} not found in leaf {}", key, offset);
                Ok(None)
            }
        }
    }

    /// Descend to the leaf whose key range covers `key`. `None` for an empty tree.
    pub(crate) fn find_leaf(&mut self, key: i64) -> DbResult<Option<(u64, LeafNode)>> {
        let mut offset = self.root_page();
        if offset == 0 {
            return Ok(None);
        }

        for _ in 0..MAX_HEIGHT {
            match self.pager.read_node(offset)? {
                Node::Leaf(leaf) => return Ok(Some((offset, leaf))),
                Node::Internal(node) => {
                    let next = node.child_for(key);
                    trace!("  → Descending from internal {} to child {}", offset, next);
                    offset = next;
                }
            }
        }
        Err(DbError::Corrupt(format!(
            "no leaf reached for key {key} within {MAX_HEIGHT} levels"
        )))
    }

    fn read_leaf(&mut self, offset: u64) -> DbResult<LeafNode> {
        match self.pager.read_node(offset)? {
            Node::Leaf(leaf) => Ok(leaf),
            Node::Internal(_) => Err(DbError::Corrupt(format!(
                "page {offset} should be a leaf"
            ))),
        }
    }

    fn read_internal(&mut self, offset: u64) -> DbResult<InternalNode> {
        match self.pager.read_node(offset)? {
            Node::Internal(node) => Ok(node),
            Node::Leaf(_) => Err(DbError::Corrupt(format!(
                "page {offset} should be an internal page"
            ))),
        }
    }

    fn write_leaf(&mut self, offset: u64, leaf: &LeafNode) -> DbResult<()> {
        self.pager.write_page(&leaf.encode(offset))
    }

    fn write_internal(&mut self, offset: u64, node: &InternalNode) -> DbResult<()> {
        self.pager.write_page(&node.encode(offset))
    }

    /// Rewrite the parent pointer of `child` without decoding the rest of the page.
    fn reparent(&mut self, child: u64, parent: u64) -> DbResult<()> {
        let mut page = self.pager.read_page(child)?;
        set_parent(&mut page.data, parent);
        self.pager.write_page(&page)
    }

    /// Index of `child` among the children of `parent` (stored at `parent_offset`).
    fn child_position(parent: &InternalNode, parent_offset: u64, child: u64) -> DbResult<usize> {
        parent.position_of(child).ok_or_else(|| {
            DbError::Corrupt(format!(
                "page {child} names {parent_offset} as parent but is not one of its children"
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DbOptions, Synchronous};
    use crate::storage::page::{LEAF_MAX_KEYS, LEAF_MIN_KEYS};

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn open_pager(dir: &tempfile::TempDir) -> Pager {
        let options = DbOptions::default().synchronous(Synchronous::Off);
        Pager::open(dir.path().join("tree.db"), options).unwrap()
    }

    fn root_node(tree: &mut BTree<'_>) -> Node {
        let root = tree.root_page();
        tree.pager.read_node(root).unwrap()
    }

    #[test]
    fn empty_tree_finds_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut pager = open_pager(&dir);
        let mut tree = BTree::new(&mut pager);

        assert_eq!(tree.root_page(), 0);
        assert_eq!(tree.find(1).unwrap(), None);
        assert!(tree.find_leaf(1).unwrap().is_none());
    }

    #[test]
    fn leaf_multiple_inserts_and_find() {
        init_logger();
        let dir = tempfile::tempdir().unwrap();
        let mut pager = open_pager(&dir);
        let mut tree = BTree::new(&mut pager);

        assert!(tree.find(10).unwrap().is_none());
        tree.insert(10, "Ten").unwrap();
        tree.insert(5, "Five").unwrap();
        tree.insert(20, "Twenty").unwrap();

        assert_eq!(tree.find(5).unwrap().as_deref(), Some("Five"));
        assert_eq!(tree.find(20).unwrap().as_deref(), Some("Twenty"));
        assert_eq!(tree.find(15).unwrap(), None);
        match root_node(&mut tree) {
            Node::Leaf(leaf) => {
                let keys: Vec<i64> = leaf.records.iter().map(|r| r.key).collect();
                assert_eq!(keys, vec![5, 10, 20]);
            }
            Node::Internal(_) => panic!("three records should fit in the root leaf"),
        }
    }

    #[test]
    fn leaf_split_creates_internal_root() {
        init_logger();
        let dir = tempfile::tempdir().unwrap();
        let mut pager = open_pager(&dir);
        let mut tree = BTree::new(&mut pager);

        for key in 1..=LEAF_MAX_KEYS as i64 {
            tree.insert(key, "v").unwrap();
        }
        assert!(matches!(root_node(&mut tree), Node::Leaf(_)));

        tree.insert(LEAF_MAX_KEYS as i64 + 1, "v").unwrap();
        let Node::Internal(root) = root_node(&mut tree) else {
            panic!("root should be internal after the split");
        };
        assert_eq!(root.child_count(), 2);
        assert_eq!(root.separators[0].key, 17);

        let left = tree.read_leaf(root.leftmost_child).unwrap();
        let right = tree.read_leaf(root.separators[0].child).unwrap();
        assert_eq!(left.records.len(), 16);
        assert_eq!(right.records.len(), 16);
        assert_eq!(left.right_sibling, root.separators[0].child);
        assert_eq!(right.right_sibling, 0);
        assert_eq!(left.parent, tree.root_page());
        assert_eq!(right.parent, tree.root_page());
        assert!(left.records.len() >= LEAF_MIN_KEYS);
    }

    #[test]
    fn duplicate_insert_is_rejected_without_changes() {
        let dir = tempfile::tempdir().unwrap();
        let mut pager = open_pager(&dir);
        let mut tree = BTree::new(&mut pager);

        tree.insert(7, "a").unwrap();
        let before = tree.pager.read_page(tree.root_page()).unwrap();

        assert!(matches!(tree.insert(7, "b"), Err(DbError::DuplicateKey(7))));
        let after = tree.pager.read_page(tree.root_page()).unwrap();
        assert_eq!(before.data, after.data);
        assert_eq!(tree.find(7).unwrap().as_deref(), Some("a"));
    }

    #[test]
    fn negative_and_extreme_keys_are_ordered() {
        let dir = tempfile::tempdir().unwrap();
        let mut pager = open_pager(&dir);
        let mut tree = BTree::new(&mut pager);

        let keys = [i64::MAX, -1, 0, i64::MIN, 1, -100, 100];
        for key in keys {
            tree.insert(key, &key.to_string()).unwrap();
        }
        for key in keys {
            assert_eq!(tree.find(key).unwrap(), Some(key.to_string()));
        }
        let stats = tree.verify().unwrap();
        assert_eq!(stats.records, keys.len());
    }
}
