use log::debug;

use super::BTree;
use crate::error::{DbError, DbResult};
use crate::storage::internal::{InternalNode, Separator};
use crate::storage::leaf::LeafNode;
use crate::storage::page::{INTERNAL_MIN_KEYS, LEAF_MIN_KEYS};

impl BTree<'_> {
    /// Remove `key` and its value, rebalancing underfull pages on the way up.
    pub fn delete(&mut self, key: i64) -> DbResult<()> {
        debug!("delete() → starting at root {} for key={}", self.root_page(), key);

        let Some((offset, mut leaf)) = self.find_leaf(key)? else {
            return Err(DbError::NotFound(key));
        };
        let idx = leaf.find(key).ok_or(DbError::NotFound(key))?;
        leaf.records.remove(idx);

        if leaf.parent == 0 {
            if leaf.records.is_empty() {
                self.pager.set_root(0)?;
                self.pager.release_page(offset)?;
                debug!("  → Root leaf {} emptied; tree is now empty.", offset);
                return Ok(());
            }
            return self.write_leaf(offset, &leaf);
        }

        if leaf.records.len() >= LEAF_MIN_KEYS {
            return self.write_leaf(offset, &leaf);
        }

        debug!(
            "  → Leaf {} underflowed with {} records.",
            offset,
            leaf.records.len()
        );
        self.rebalance_leaf(offset, leaf)
    }

    /// Fix an underfull non-root leaf by borrowing from a sibling or merging with one.
    fn rebalance_leaf(&mut self, offset: u64, mut leaf: LeafNode) -> DbResult<()> {
        let parent_offset = leaf.parent;
        let mut parent = self.read_internal(parent_offset)?;
        let pos = Self::child_position(&parent, parent_offset, offset)?;

        let mut left = None;
        if pos > 0 {
            let left_offset = parent.child_at(pos - 1);
            left = Some((left_offset, self.read_leaf(left_offset)?));
        }
        if let Some((left_offset, left_leaf)) = left.as_mut() {
            if left_leaf.records.len() > LEAF_MIN_KEYS {
                if let Some(record) = left_leaf.records.pop() {
                    parent.separators[pos - 1].key = record.key;
                    leaf.records.insert(0, record);
                }
                debug!(
                    "rebalance_leaf: leaf {} borrowed from left sibling {}.",
                    offset, left_offset
                );
                self.write_leaf(*left_offset, left_leaf)?;
                self.write_leaf(offset, &leaf)?;
                return self.write_internal(parent_offset, &parent);
            }
        }

        let mut right = None;
        if pos < parent.separators.len() {
            let right_offset = parent.child_at(pos + 1);
            right = Some((right_offset, self.read_leaf(right_offset)?));
        }
        if let Some((right_offset, right_leaf)) = right.as_mut() {
            if right_leaf.records.len() > LEAF_MIN_KEYS {
                let record = right_leaf.records.remove(0);
                leaf.records.push(record);
                if let Some(first) = right_leaf.first_key() {
                    parent.separators[pos].key = first;
                }
                debug!(
                    "rebalance_leaf: leaf {} borrowed from right sibling {}.",
                    offset, right_offset
                );
                self.write_leaf(*right_offset, right_leaf)?;
                self.write_leaf(offset, &leaf)?;
                return self.write_internal(parent_offset, &parent);
            }
        }

        // Neither sibling can spare a record: fold the right page of the pair into the left.
        let (left_offset, mut left_leaf, right_offset, right_leaf, separator_idx) = match (left, right) {
            (Some((left_offset, left_leaf)), _) => (left_offset, left_leaf, offset, leaf, pos - 1),
            (None, Some((right_offset, right_leaf))) => (offset, leaf, right_offset, right_leaf, pos),
            (None, None) => {
                return Err(DbError::Corrupt(format!(
                    "non-root leaf {offset} has no siblings"
                )));
            }
        };

        left_leaf.records.extend(right_leaf.records);
        left_leaf.right_sibling = right_leaf.right_sibling;
        debug!(
            "rebalance_leaf: merged leaf {} into {} ({} records).",
            right_offset,
            left_offset,
            left_leaf.records.len()
        );
        self.write_leaf(left_offset, &left_leaf)?;

        // The right page goes back to the free list only once no parent points at it.
        parent.separators.remove(separator_idx);
        self.rebalance_internal(parent_offset, parent)?;
        self.pager.release_page(right_offset)
    }

    /// Persist an internal page that just lost a separator, rebalancing it if it underflowed.
    fn rebalance_internal(&mut self, offset: u64, mut node: InternalNode) -> DbResult<()> {
        if node.parent == 0 {
            if node.separators.is_empty() {
                let child = node.leftmost_child;
                self.reparent(child, 0)?;
                self.pager.set_root(child)?;
                self.pager.release_page(offset)?;
                debug!("rebalance_internal: root {} collapsed into child {}.", offset, child);
                return Ok(());
            }
            return self.write_internal(offset, &node);
        }

        if node.separators.len() >= INTERNAL_MIN_KEYS {
            return self.write_internal(offset, &node);
        }

        let parent_offset = node.parent;
        let mut parent = self.read_internal(parent_offset)?;
        let pos = Self::child_position(&parent, parent_offset, offset)?;

        let mut left = None;
        if pos > 0 {
            let left_offset = parent.child_at(pos - 1);
            left = Some((left_offset, self.read_internal(left_offset)?));
        }
        if let Some((left_offset, left_node)) = left.as_mut() {
            if left_node.separators.len() > INTERNAL_MIN_KEYS {
                // Rotate through the parent: its separator comes down in front
                // of our old leftmost child, the left sibling's last key goes up.
                if let Some(last) = left_node.separators.pop() {
                    let separator = &mut parent.separators[pos - 1];
                    node.separators.insert(0, Separator { key: separator.key, child: node.leftmost_child });
                    node.leftmost_child = last.child;
                    separator.key = last.key;
                    self.reparent(last.child, offset)?;
                }
                debug!(
                    "rebalance_internal: internal {} borrowed from left sibling {}.",
                    offset, left_offset
                );
                self.write_internal(*left_offset, left_node)?;
                self.write_internal(offset, &node)?;
                return self.write_internal(parent_offset, &parent);
            }
        }

        let mut right = None;
        if pos < parent.separators.len() {
            let right_offset = parent.child_at(pos + 1);
            right = Some((right_offset, self.read_internal(right_offset)?));
        }
        if let Some((right_offset, right_node)) = right.as_mut() {
            if right_node.separators.len() > INTERNAL_MIN_KEYS {
                let first = right_node.separators.remove(0);
                let separator = &mut parent.separators[pos];
                node.separators.push(Separator { key: separator.key, child: right_node.leftmost_child });
                self.reparent(right_node.leftmost_child, offset)?;
                right_node.leftmost_child = first.child;
                separator.key = first.key;
                debug!(
                    "rebalance_internal: internal {} borrowed from right sibling {}.",
                    offset, right_offset
                );
                self.write_internal(*right_offset, right_node)?;
                self.write_internal(offset, &node)?;
                return self.write_internal(parent_offset, &parent);
            }
        }

        let (left_offset, mut left_node, right_offset, right_node, separator_idx) = match (left, right) {
            (Some((left_offset, left_node)), _) => (left_offset, left_node, offset, node, pos - 1),
            (None, Some((right_offset, right_node))) => (offset, node, right_offset, right_node, pos),
            (None, None) => {
                return Err(DbError::Corrupt(format!(
                    "non-root internal page {offset} has no siblings"
                )));
            }
        };

        // The separator between the pair comes down to head the right page's children.
        let separator = parent.separators.remove(separator_idx);
        left_node.separators.push(Separator { key: separator.key, child: right_node.leftmost_child });
        left_node.separators.extend(right_node.separators.iter().copied());
        for child in right_node.children() {
            self.reparent(child, left_offset)?;
        }
        debug!(
            "rebalance_internal: merged internal {} into {} ({} keys).",
            right_offset,
            left_offset,
            left_node.separators.len()
        );
        self.write_internal(left_offset, &left_node)?;

        self.rebalance_internal(parent_offset, parent)?;
        self.pager.release_page(right_offset)
    }
}
