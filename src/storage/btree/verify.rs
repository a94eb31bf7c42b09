use log::debug;

use super::{BTree, MAX_HEIGHT};
use crate::error::{DbError, DbResult};
use crate::storage::page::{Node, INTERNAL_MIN_KEYS, LEAF_MIN_KEYS};

/// Shape of a tree that passed [`BTree::verify`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TreeStats {
    /// Levels from the root down to the leaves; 0 for an empty tree.
    pub height: usize,
    pub leaf_pages: usize,
    pub internal_pages: usize,
    pub records: usize,
}

/// Key range a subtree must stay within: `lower <= key < upper`.
#[derive(Clone, Copy)]
struct Bounds {
    lower: Option<i64>,
    upper: Option<i64>,
}

impl Bounds {
    fn contains(&self, key: i64) -> bool {
        self.lower.is_none_or(|lower| key >= lower) && self.upper.is_none_or(|upper| key < upper)
    }
}

#[derive(Default)]
struct Walk {
    stats: TreeStats,
    leaf_depth: Option<usize>,
    leaves: Vec<u64>,
}

fn corrupt(message: String) -> DbError {
    DbError::Corrupt(message)
}

impl BTree<'_> {
    /// Check every structural invariant of the tree.
    ///
    /// Keys are strictly ascending and inside the range their separators allow,
    /// every page names its real parent, all leaves sit at the same depth,
    /// non-root pages are at least half full, and the leaf sibling chain visits
    /// exactly the leaves in key order. The first violation is reported as
    /// [`DbError::Corrupt`].
    pub fn verify(&mut self) -> DbResult<TreeStats> {
        let root = self.root_page();
        if root == 0 {
            return Ok(TreeStats::default());
        }

        let mut walk = Walk::default();
        let everything = Bounds { lower: None, upper: None };
        self.verify_page(root, 0, everything, 1, &mut walk)?;
        walk.stats.height = walk.leaf_depth.unwrap_or(0);

        for (i, &offset) in walk.leaves.iter().enumerate() {
            let expected = walk.leaves.get(i + 1).copied().unwrap_or(0);
            let leaf = self.read_leaf(offset)?;
            if leaf.right_sibling != expected {
                return Err(corrupt(format!(
                    "leaf {offset} links to {} instead of {expected}",
                    leaf.right_sibling
                )));
            }
        }

        debug!("verify: {:?}", walk.stats);
        Ok(walk.stats)
    }

    fn verify_page(
        &mut self,
        offset: u64,
        expected_parent: u64,
        bounds: Bounds,
        depth: usize,
        walk: &mut Walk,
    ) -> DbResult<()> {
        if depth > MAX_HEIGHT {
            return Err(corrupt(format!("tree deeper than {MAX_HEIGHT} levels at page {offset}")));
        }

        let node = self.pager.read_node(offset)?;
        if node.parent() != expected_parent {
            return Err(corrupt(format!(
                "page {offset} names {} as parent instead of {expected_parent}",
                node.parent()
            )));
        }
        let is_root = expected_parent == 0;

        match node {
            Node::Leaf(leaf) => {
                let count = leaf.records.len();
                if (is_root && count == 0) || (!is_root && count < LEAF_MIN_KEYS) {
                    return Err(corrupt(format!("leaf {offset} holds only {count} records")));
                }
                let keys: Vec<i64> = leaf.records.iter().map(|r| r.key).collect();
                check_keys(offset, &keys, bounds)?;

                match walk.leaf_depth {
                    None => walk.leaf_depth = Some(depth),
                    Some(d) if d != depth => {
                        return Err(corrupt(format!(
                            "leaf {offset} is at depth {depth}, others at {d}"
                        )));
                    }
                    Some(_) => {}
                }
                walk.leaves.push(offset);
                walk.stats.leaf_pages += 1;
                walk.stats.records += count;
            }
            Node::Internal(internal) => {
                let count = internal.separators.len();
                if (is_root && count == 0) || (!is_root && count < INTERNAL_MIN_KEYS) {
                    return Err(corrupt(format!("internal {offset} holds only {count} keys")));
                }
                let keys: Vec<i64> = internal.separators.iter().map(|s| s.key).collect();
                check_keys(offset, &keys, bounds)?;
                walk.stats.internal_pages += 1;

                for (i, child) in internal.children().enumerate() {
                    let child_bounds = Bounds {
                        lower: if i == 0 { bounds.lower } else { Some(keys[i - 1]) },
                        upper: keys.get(i).copied().or(bounds.upper),
                    };
                    self.verify_page(child, offset, child_bounds, depth + 1, walk)?;
                }
            }
        }
        Ok(())
    }
}

fn check_keys(offset: u64, keys: &[i64], bounds: Bounds) -> DbResult<()> {
    if let Some(pair) = keys.windows(2).find(|pair| pair[0] >= pair[1]) {
        return Err(corrupt(format!(
            "page {offset} keys out of order: {} before {}",
            pair[0], pair[1]
        )));
    }
    if let Some(key) = keys.iter().find(|&&key| !bounds.contains(key)) {
        return Err(corrupt(format!(
            "page {offset} holds key {key} outside its separator range"
        )));
    }
    Ok(())
}
