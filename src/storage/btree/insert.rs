use log::debug;

use super::BTree;
use crate::error::{DbError, DbResult};
use crate::storage::internal::{InternalNode, Separator};
use crate::storage::leaf::{LeafNode, Record};
use crate::storage::page::INTERNAL_MAX_KEYS;

impl BTree<'_> {
    /// Insert `(key, value)`. Existing keys are never overwritten.
    pub fn insert(&mut self, key: i64, value: &str) -> DbResult<()> {
        let record = Record::new(key, value)?;
        debug!("insert() → starting at root {} for key={}", self.root_page(), key);

        let Some((leaf_offset, mut leaf)) = self.find_leaf(key)? else {
            return self.start_new_tree(record);
        };

        let idx = leaf.lower_bound(key);
        if leaf.records.get(idx).is_some_and(|r| r.key == key) {
            return Err(DbError::DuplicateKey(key));
        }

        if !leaf.is_full() {
            leaf.records.insert(idx, record);
            debug!(
                "  → Inserted key={} into leaf {} ({} records).",
                key,
                leaf_offset,
                leaf.records.len()
            );
            return self.write_leaf(leaf_offset, &leaf);
        }

        debug!("  → Leaf {} is full. Splitting...", leaf_offset);
        self.split_leaf(leaf_offset, leaf, idx, record)
    }

    /// First record of an empty tree: a lone root leaf.
    fn start_new_tree(&mut self, record: Record) -> DbResult<()> {
        let root = self.pager.allocate_page()?;
        let mut leaf = LeafNode::new(0);
        leaf.records.push(record);
        self.write_leaf(root, &leaf)?;
        self.pager.set_root(root)?;

        debug!("start_new_tree: root leaf at page {}.", root);
        Ok(())
    }

    /// Split a full leaf while inserting `record` at `idx`.
    ///
    /// The lower half stays in place, the upper half moves to a new right
    /// sibling which inherits the old sibling link and parent. The first key
    /// of the new leaf becomes the separator pushed into the parent.
    fn split_leaf(
        &mut self,
        leaf_offset: u64,
        mut leaf: LeafNode,
        idx: usize,
        record: Record,
    ) -> DbResult<()> {
        let new_offset = self.pager.allocate_page()?;

        leaf.records.insert(idx, record);
        let split_index = leaf.records.len() / 2;
        let right = LeafNode {
            parent: leaf.parent,
            right_sibling: leaf.right_sibling,
            records: leaf.records.split_off(split_index),
        };
        leaf.right_sibling = new_offset;
        let separator_key = right.records[0].key;

        debug!(
            "split_leaf: leaf {} keeps {} records, new leaf {} takes {}; separator {}.",
            leaf_offset,
            leaf.records.len(),
            new_offset,
            right.records.len(),
            separator_key
        );

        self.write_leaf(new_offset, &right)?;
        self.write_leaf(leaf_offset, &leaf)?;

        self.insert_into_parent(leaf_offset, leaf.parent, separator_key, new_offset)
    }

    /// Insert `(separator_key, right)` into `parent`, directly after `left`.
    ///
    /// `parent == 0` means `left` was the root, so a new root is grown above it.
    fn insert_into_parent(
        &mut self,
        left: u64,
        parent: u64,
        separator_key: i64,
        right: u64,
    ) -> DbResult<()> {
        if parent == 0 {
            return self.insert_into_new_root(left, separator_key, right);
        }

        let mut node = self.read_internal(parent)?;
        let idx = node.upper_bound(separator_key);
        node.separators.insert(idx, Separator { key: separator_key, child: right });

        if node.separators.len() <= INTERNAL_MAX_KEYS {
            debug!(
                "insert_into_parent: separator {} added to internal {} ({} keys).",
                separator_key,
                parent,
                node.separators.len()
            );
            return self.write_internal(parent, &node);
        }

        debug!("  → Internal {} overflowed. Splitting...", parent);
        self.split_internal(parent, node)
    }

    fn insert_into_new_root(&mut self, left: u64, separator_key: i64, right: u64) -> DbResult<()> {
        let root = self.pager.allocate_page()?;
        let mut node = InternalNode::new(0, left);
        node.separators.push(Separator { key: separator_key, child: right });
        self.write_internal(root, &node)?;

        self.reparent(left, root)?;
        self.reparent(right, root)?;
        self.pager.set_root(root)?;

        debug!(
            "insert_into_new_root: new root {} over {} and {} (separator {}).",
            root, left, right, separator_key
        );
        Ok(())
    }

    /// Split an overfull internal page around its median separator.
    ///
    /// The median key moves up to the parent and its child becomes the
    /// leftmost child of the new right page; it is kept in neither half.
    fn split_internal(&mut self, offset: u64, mut node: InternalNode) -> DbResult<()> {
        let new_offset = self.pager.allocate_page()?;

        let mid = node.separators.len() / 2;
        let mut upper = node.separators.split_off(mid);
        let promoted = upper.remove(0);
        let right = InternalNode {
            parent: node.parent,
            leftmost_child: promoted.child,
            separators: upper,
        };

        debug!(
            "split_internal: internal {} keeps {} keys, new internal {} takes {}; promoting {}.",
            offset,
            node.separators.len(),
            new_offset,
            right.separators.len(),
            promoted.key
        );

        self.write_internal(offset, &node)?;
        self.write_internal(new_offset, &right)?;
        for child in right.children() {
            self.reparent(child, new_offset)?;
        }

        self.insert_into_parent(offset, node.parent, promoted.key, new_offset)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{DbOptions, Synchronous};
    use crate::storage::btree::BTree;
    use crate::storage::page::{Node, INTERNAL_MAX_KEYS, INTERNAL_MIN_KEYS};
    use crate::storage::pager::Pager;

    #[test]
    fn reverse_order_inserts_split_to_the_left() {
        let dir = tempfile::tempdir().unwrap();
        let options = DbOptions::default().synchronous(Synchronous::Off);
        let mut pager = Pager::open(dir.path().join("reverse.db"), options).unwrap();
        let mut tree = BTree::new(&mut pager);

        for key in (1..=200).rev() {
            tree.insert(key, &format!("value-{key}")).unwrap();
        }
        for key in 1..=200 {
            assert_eq!(tree.find(key).unwrap(), Some(format!("value-{key}")));
        }
        let stats = tree.verify().unwrap();
        assert_eq!(stats.records, 200);
        assert_eq!(stats.height, 2);
    }

    #[test]
    fn internal_split_grows_height_by_one() {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = tempfile::tempdir().unwrap();
        let options = DbOptions::default()
            .synchronous(Synchronous::Off)
            .free_page_batch(64);
        let mut pager = Pager::open(dir.path().join("grow.db"), options).unwrap();
        let mut tree = BTree::new(&mut pager);

        // Ascending inserts split the rightmost leaf every 16 keys, so the root
        // gains its 249th separator (one too many) with leaf number 250.
        let leaves_to_overflow_root = INTERNAL_MAX_KEYS as i64 + 2;
        let last_key = 16 * leaves_to_overflow_root;
        for key in 1..last_key {
            tree.insert(key, "x").unwrap();
        }
        assert_eq!(tree.verify().unwrap().height, 2);

        tree.insert(last_key, "x").unwrap();

        let Node::Internal(root) = tree.pager.read_node(tree.root_page()).unwrap() else {
            panic!("root should be internal");
        };
        assert_eq!(root.child_count(), 2);
        for child in root.children() {
            let Node::Internal(child) = tree.pager.read_node(child).unwrap() else {
                panic!("second level should be internal");
            };
            assert!(child.separators.len() >= INTERNAL_MIN_KEYS);
            assert_eq!(child.parent, tree.root_page());
        }
        let stats = tree.verify().unwrap();
        assert_eq!(stats.height, 3);
        assert_eq!(stats.records, last_key as usize);
        assert_eq!(stats.leaf_pages, leaves_to_overflow_root as usize);
    }
}
