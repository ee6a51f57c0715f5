//! Lookups and ordered traversal.

use std::cmp::Ordering;

use crate::{
    error::Result,
    store::NodeStore,
    tree::node::{child_view, Node, Side},
};

impl Node {
    /// Whether `key` is present in this subtree. Separator keys are real
    /// keys (the smallest of their right subtree), so an exact match on an
    /// inner node answers without descending further.
    pub fn has(&self, store: &dyn NodeStore, key: &[u8]) -> Result<bool> {
        if self.key() == key {
            return Ok(true);
        }
        if self.is_leaf() {
            return Ok(false);
        }
        let side = if key < self.key() {
            Side::Left
        } else {
            Side::Right
        };
        let child = child_view(self, side, store)?;
        child.node().has(store, key)
    }

    /// Looks `key` up, returning its in-order rank among the leaves and its
    /// value. For an absent key the rank is its insertion point and the
    /// value is `None`.
    pub fn get(&self, store: &dyn NodeStore, key: &[u8]) -> Result<(u64, Option<Vec<u8>>)> {
        if self.is_leaf() {
            return Ok(match self.key().cmp(key) {
                Ordering::Less => (1, None),
                Ordering::Greater => (0, None),
                Ordering::Equal => (0, self.value().map(<[u8]>::to_vec)),
            });
        }

        if key < self.key() {
            let child = child_view(self, Side::Left, store)?;
            child.node().get(store, key)
        } else {
            let child = child_view(self, Side::Right, store)?;
            let right = child.node();
            let (index, value) = right.get(store, key)?;
            // Everything left of the right subtree ranks below the key.
            Ok((index + self.size() - right.size(), value))
        }
    }

    /// The `index`-th leaf in key order. Asking for an index outside
    /// `0..size` is a programming fault.
    pub fn get_by_index(&self, store: &dyn NodeStore, index: u64) -> Result<(Vec<u8>, Vec<u8>)> {
        if self.is_leaf() {
            if index == 0 {
                let value = self.value().expect("leaf holds a value").to_vec();
                return Ok((self.key().to_vec(), value));
            }
            panic!("get_by_index asked for index {} past the leaves", index);
        }

        let left = child_view(self, Side::Left, store)?;
        let left_size = left.node().size();
        if index < left_size {
            left.node().get_by_index(store, index)
        } else {
            let right = child_view(self, Side::Right, store)?;
            right.node().get_by_index(store, index - left_size)
        }
    }

    /// Visits the whole subtree in key order (or reverse). The callback
    /// sees inner nodes as well as leaves; returning `true` stops the walk.
    pub fn traverse<F>(&self, store: &dyn NodeStore, ascending: bool, cb: &mut F) -> Result<bool>
    where
        F: FnMut(&Node) -> bool,
    {
        self.traverse_range(store, None, None, ascending, false, cb)
    }

    /// Visits the nodes whose keys fall in `start..end` (half-open, or
    /// closed on `end` when `inclusive`), ascending or descending. Subtrees
    /// that cannot contain in-range keys are pruned; returning `true` from
    /// the callback stops the walk early.
    pub fn traverse_range<F>(
        &self,
        store: &dyn NodeStore,
        start: Option<&[u8]>,
        end: Option<&[u8]>,
        ascending: bool,
        inclusive: bool,
        cb: &mut F,
    ) -> Result<bool>
    where
        F: FnMut(&Node) -> bool,
    {
        let after_start = start.map_or(true, |start| start <= self.key());
        let before_end = match end {
            None => true,
            Some(end) if inclusive => self.key() <= end,
            Some(end) => self.key() < end,
        };

        if after_start && before_end && cb(self) {
            return Ok(true);
        }
        if self.is_leaf() {
            return Ok(false);
        }

        let (first, first_in_range, second, second_in_range) = if ascending {
            (Side::Left, after_start, Side::Right, before_end)
        } else {
            (Side::Right, before_end, Side::Left, after_start)
        };

        if first_in_range {
            let child = child_view(self, first, store)?;
            if child
                .node()
                .traverse_range(store, start, end, ascending, inclusive, cb)?
            {
                return Ok(true);
            }
        }
        if second_in_range {
            let child = child_view(self, second, store)?;
            if child
                .node()
                .traverse_range(store, start, end, ascending, inclusive, cb)?
            {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
