use std::fmt;
use std::mem;

use log::debug;

use crate::common::{Result, TabulaError, MIN_INDEX_ORDER};

use super::iterator::{Iter, Range};
use super::node::{Entry, NodeArena, NodeId, NodeKind, TreeNode};

/// The root keeps this arena slot for the whole life of the tree.
pub(super) const ROOT: NodeId = NodeId(0);

/// An in-memory B+Tree of order `m`.
///
/// Values live in the leaves, which are chained in key order. A node splits
/// once it holds `m` keys, and a node other than the root must keep at least
/// `ceil(m / 2) - 1` keys (an internal one at least `ceil(m / 2)` children).
/// Deletions borrow from a sibling when one can spare an entry and merge
/// otherwise.
///
/// Nodes are stored in an arena and refer to their parent, children and
/// next leaf by arena id.
pub struct BPlusTree<K, V> {
    order: usize,
    pub(super) nodes: NodeArena<K, V>,
    pub(super) len: usize,
}

impl<K, V> BPlusTree<K, V> {
    pub fn order(&self) -> usize {
        self.order
    }

    /// Number of keys in the tree.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of levels, 1 for a tree whose root is a leaf.
    pub fn height(&self) -> usize {
        let mut height = 1;
        let mut id = ROOT;
        while let Some(&child) = self.nodes[id].children().first() {
            id = child;
            height += 1;
        }
        height
    }

    fn min_keys(&self) -> usize {
        self.order.div_ceil(2) - 1
    }

    fn min_children(&self) -> usize {
        self.order.div_ceil(2)
    }

    pub(super) fn first_leaf(&self) -> NodeId {
        let mut id = ROOT;
        while let Some(&child) = self.nodes[id].children().first() {
            id = child;
        }
        id
    }

    /// Returns the entry with the largest key.
    pub fn last(&self) -> Option<(&K, &V)> {
        let mut id = ROOT;
        while let Some(&child) = self.nodes[id].children().last() {
            id = child;
        }
        let node = &self.nodes[id];
        node.keys.last().zip(node.values().last())
    }

    /// Iterates over every entry in key order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter::new(self, Some(self.first_leaf()), 0)
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        let mut nodes = NodeArena::new();
        nodes.alloc(TreeNode::leaf(Vec::new(), Vec::new(), None));
        self.nodes = nodes;
        self.len = 0;
    }

    /// Calls `f` on every entry in key order, allowing values to be rewritten.
    pub fn for_each_value_mut<F>(&mut self, mut f: F)
    where
        F: FnMut(&K, &mut V),
    {
        let mut current = Some(self.first_leaf());
        while let Some(id) = current {
            let node = &mut self.nodes[id];
            current = node.next();
            if let NodeKind::Leaf { values, .. } = &mut node.kind {
                for (key, value) in node.keys.iter().zip(values.iter_mut()) {
                    f(key, value);
                }
            }
        }
    }

    fn adopt_children(&mut self, id: NodeId) {
        let children = self.nodes[id].children().to_vec();
        for child in children {
            self.nodes[child].parent = Some(id);
        }
    }

    fn position_in_parent(&self, id: NodeId, parent: NodeId) -> usize {
        match self.nodes[parent].child_index(id) {
            Some(index) => index,
            None => panic!("{} is not a child of {}", id, parent),
        }
    }
}

impl<K: Ord + Clone + fmt::Display, V> BPlusTree<K, V> {
    /// Creates an empty tree. The order must be at least 3.
    pub fn new(order: usize) -> Result<Self> {
        if order < MIN_INDEX_ORDER {
            return Err(TabulaError::InvalidConfig(format!(
                "B+Tree order must be at least {}, got {}",
                MIN_INDEX_ORDER, order
            )));
        }

        let mut nodes = NodeArena::new();
        let root = nodes.alloc(TreeNode::leaf(Vec::new(), Vec::new(), None));
        debug_assert_eq!(root, ROOT);

        Ok(Self {
            order,
            nodes,
            len: 0,
        })
    }

    /// Descends to the leaf that owns `key`.
    fn find_leaf(&self, key: &K) -> NodeId {
        let mut id = ROOT;
        loop {
            let node = &self.nodes[id];
            match &node.kind {
                NodeKind::Leaf { .. } => return id,
                NodeKind::Internal { children } => {
                    // First child whose separator is above the key, else the last
                    let index = node.keys.partition_point(|separator| separator <= key);
                    id = children[index];
                }
            }
        }
    }

    /// Returns the value stored under `key`.
    pub fn search(&self, key: &K) -> Option<&V> {
        let node = &self.nodes[self.find_leaf(key)];
        node.keys
            .binary_search(key)
            .ok()
            .map(|index| &node.values()[index])
    }

    pub fn contains(&self, key: &K) -> bool {
        self.search(key).is_some()
    }

    /// Returns the entry with the smallest key at or above `key`.
    pub fn ceiling(&self, key: &K) -> Option<(&K, &V)> {
        self.range_from(key).next()
    }

    /// Iterates over the entries with keys in `start..=end`.
    pub fn range(&self, start: &K, end: &K) -> Range<'_, K, V> {
        Range::new(self.range_from(start), end.clone())
    }

    fn range_from(&self, start: &K) -> Iter<'_, K, V> {
        let leaf = self.find_leaf(start);
        let pos = self.nodes[leaf].keys.partition_point(|k| k < start);
        Iter::new(self, Some(leaf), pos)
    }

    /// Inserts a new entry. Fails with `DuplicateKey`, leaving the tree
    /// unchanged, if the key is already present.
    pub fn insert(&mut self, key: K, value: V) -> Result<()> {
        let leaf = self.find_leaf(&key);
        let node = &mut self.nodes[leaf];
        let pos = match node.keys.binary_search(&key) {
            Ok(_) => return Err(TabulaError::DuplicateKey(key.to_string())),
            Err(pos) => pos,
        };

        node.keys.insert(pos, key);
        if let NodeKind::Leaf { values, .. } = &mut node.kind {
            values.insert(pos, value);
        }
        self.len += 1;

        let mut id = leaf;
        while self.nodes[id].keys.len() >= self.order {
            match self.nodes[id].parent {
                Some(parent) => {
                    self.split_child(id, parent);
                    id = parent;
                }
                None => {
                    self.split_root();
                    break;
                }
            }
        }
        Ok(())
    }

    /// Splits a full non-root node, adding the new right sibling to `parent`.
    fn split_child(&mut self, id: NodeId, parent: NodeId) {
        let node = &mut self.nodes[id];
        let n = node.keys.len();

        let (separator, right) = match &mut node.kind {
            NodeKind::Leaf { values, next } => {
                // The right sibling takes the upper ceil(n/2) entries
                let at = n - n.div_ceil(2);
                let keys = node.keys.split_off(at);
                let mut right = TreeNode::leaf(keys, values.split_off(at), Some(parent));
                right.set_next(*next);
                (right.keys[0].clone(), right)
            }
            NodeKind::Internal { children } => {
                // keys[mid] moves up and is not kept in either half
                let mid = n / 2;
                let mut keys = node.keys.split_off(mid);
                let separator = keys.remove(0);
                let right = TreeNode::internal(keys, children.split_off(mid + 1), Some(parent));
                (separator, right)
            }
        };

        let right_id = self.nodes.alloc(right);
        self.nodes[id].set_next(Some(right_id));
        self.adopt_children(right_id);

        let pos = self.position_in_parent(id, parent);
        let parent_node = &mut self.nodes[parent];
        parent_node.keys.insert(pos, separator);
        if let NodeKind::Internal { children } = &mut parent_node.kind {
            children.insert(pos + 1, right_id);
        }
    }

    /// Splits a full root. Its content moves into two new children and the
    /// root becomes an internal node with a single separator.
    fn split_root(&mut self) {
        let root = &mut self.nodes[ROOT];
        let split = root.keys.len().div_ceil(2) - 1;
        let mut left_keys = mem::take(&mut root.keys);
        let kind = mem::replace(
            &mut root.kind,
            NodeKind::Internal {
                children: Vec::new(),
            },
        );

        let (separator, left, right) = match kind {
            NodeKind::Leaf { mut values, .. } => {
                let right_keys = left_keys.split_off(split);
                let right_values = values.split_off(split);
                (
                    right_keys[0].clone(),
                    TreeNode::leaf(left_keys, values, Some(ROOT)),
                    TreeNode::leaf(right_keys, right_values, Some(ROOT)),
                )
            }
            NodeKind::Internal { mut children } => {
                let mut right_keys = left_keys.split_off(split);
                let separator = right_keys.remove(0);
                let right_children = children.split_off(split + 1);
                (
                    separator,
                    TreeNode::internal(left_keys, children, Some(ROOT)),
                    TreeNode::internal(right_keys, right_children, Some(ROOT)),
                )
            }
        };

        let left_id = self.nodes.alloc(left);
        let right_id = self.nodes.alloc(right);
        self.nodes[left_id].set_next(Some(right_id));
        self.adopt_children(left_id);
        self.adopt_children(right_id);

        let root = &mut self.nodes[ROOT];
        root.keys = vec![separator];
        root.kind = NodeKind::Internal {
            children: vec![left_id, right_id],
        };
        debug!("split B+Tree root, height now {}", self.height());
    }

    /// Removes `key` and returns its value. Fails with `KeyNotFound` if the
    /// key is absent.
    pub fn delete(&mut self, key: &K) -> Result<V> {
        let leaf = self.find_leaf(key);
        let node = &mut self.nodes[leaf];
        let pos = node
            .keys
            .binary_search(key)
            .map_err(|_| TabulaError::KeyNotFound(key.to_string()))?;

        node.keys.remove(pos);
        let value = match &mut node.kind {
            NodeKind::Leaf { values, .. } => values.remove(pos),
            NodeKind::Internal { .. } => unreachable!("descent ended on an internal node"),
        };
        self.len -= 1;

        self.rebalance(leaf);
        // Only a leaf's first key can also be a separator
        if pos == 0 {
            self.replace_separator(key);
        }
        Ok(value)
    }

    /// Replaces every separator equal to the deleted `key` with the smallest
    /// key of the subtree it routes to. Such separators all lie on `key`'s
    /// search path, including ones pulled down by a merge.
    fn replace_separator(&mut self, key: &K) {
        let mut id = ROOT;
        while !self.nodes[id].is_leaf() {
            let node = &self.nodes[id];
            let index = node.keys.partition_point(|separator| separator <= key);
            let child = node.children()[index];
            if index > 0 && node.keys[index - 1] == *key {
                if let Some(first) = self.first_key_under(child) {
                    self.nodes[id].keys[index - 1] = first;
                }
            }
            id = child;
        }
    }

    fn first_key_under(&self, mut id: NodeId) -> Option<K> {
        while let Some(&child) = self.nodes[id].children().first() {
            id = child;
        }
        self.nodes[id].keys.first().cloned()
    }

    fn is_underfull(&self, id: NodeId) -> bool {
        let node = &self.nodes[id];
        node.keys.len() < self.min_keys()
            || (!node.is_leaf() && node.children().len() < self.min_children())
    }

    /// Restores minimum occupancy from `start` up to the root.
    fn rebalance(&mut self, start: NodeId) {
        let mut id = start;
        while let Some(parent) = self.nodes[id].parent {
            if !self.is_underfull(id) {
                return;
            }

            let index = self.position_in_parent(id, parent);
            let siblings = self.nodes[parent].children();
            let left = index.checked_sub(1).map(|i| siblings[i]);
            let right = siblings.get(index + 1).copied();

            if let Some(left) = left.filter(|&l| self.nodes[l].keys.len() > self.min_keys()) {
                self.borrow_from_left(id, left, parent, index - 1);
                return;
            }
            if let Some(right) = right.filter(|&r| self.nodes[r].keys.len() > self.min_keys()) {
                self.borrow_from_right(id, right, parent, index);
                return;
            }

            match (left, right) {
                (Some(left), _) => self.merge(left, id, parent, index - 1),
                (None, Some(right)) => self.merge(id, right, parent, index),
                (None, None) => panic!("{} has no siblings under {}", id, parent),
            }
            id = parent;
        }

        self.collapse_root();
    }

    /// Moves the last entry of `left` to the front of `id`.
    fn borrow_from_left(&mut self, id: NodeId, left: NodeId, parent: NodeId, separator: usize) {
        let (key, entry) = self.nodes[left].pop_last();
        if self.nodes[id].is_leaf() {
            self.nodes[parent].keys[separator] = key.clone();
            self.nodes[id].push_first(key, entry);
        } else {
            let down = mem::replace(&mut self.nodes[parent].keys[separator], key);
            self.adopt_entry(&entry, id);
            self.nodes[id].push_first(down, entry);
        }
    }

    /// Moves the first entry of `right` to the back of `id`.
    fn borrow_from_right(&mut self, id: NodeId, right: NodeId, parent: NodeId, separator: usize) {
        let (key, entry) = self.nodes[right].pop_first();
        if self.nodes[id].is_leaf() {
            self.nodes[id].push_last(key, entry);
            let first = self.nodes[right].keys[0].clone();
            self.nodes[parent].keys[separator] = first;
        } else {
            let down = mem::replace(&mut self.nodes[parent].keys[separator], key);
            self.adopt_entry(&entry, id);
            self.nodes[id].push_last(down, entry);
        }
    }

    fn adopt_entry(&mut self, entry: &Entry<V>, id: NodeId) {
        if let Entry::Child(child) = entry {
            self.nodes[*child].parent = Some(id);
        }
    }

    /// Merges `dead`, the right neighbour of `survivor`, into `survivor` and
    /// drops the separator between them from `parent`.
    fn merge(&mut self, survivor: NodeId, dead: NodeId, parent: NodeId, separator: usize) {
        let parent_node = &mut self.nodes[parent];
        let down = parent_node.keys.remove(separator);
        if let NodeKind::Internal { children } = &mut parent_node.kind {
            children.remove(separator + 1);
        }

        let TreeNode { keys, kind, .. } = self.nodes.release(dead);
        let node = &mut self.nodes[survivor];
        match (&mut node.kind, kind) {
            (
                NodeKind::Leaf { values, next },
                NodeKind::Leaf {
                    values: dead_values,
                    next: dead_next,
                },
            ) => {
                node.keys.extend(keys);
                values.extend(dead_values);
                *next = dead_next;
            }
            (
                NodeKind::Internal { children },
                NodeKind::Internal {
                    children: dead_children,
                },
            ) => {
                node.keys.push(down);
                node.keys.extend(keys);
                children.extend(dead_children);
            }
            _ => unreachable!("merge of a leaf with an internal node"),
        }
        self.adopt_children(survivor);
    }

    /// An internal root left without separators adopts its only child.
    fn collapse_root(&mut self) {
        let root = &self.nodes[ROOT];
        if !root.keys.is_empty() || root.children().len() != 1 {
            return;
        }

        let child = root.children()[0];
        let TreeNode { keys, kind, .. } = self.nodes.release(child);
        let root = &mut self.nodes[ROOT];
        root.keys = keys;
        root.kind = kind;
        self.adopt_children(ROOT);
        debug!("collapsed B+Tree root, height now {}", self.height());
    }

    /// Checks every structural invariant of the tree.
    pub(super) fn validate(&self) -> std::result::Result<(), String> {
        if self.nodes[ROOT].parent.is_some() {
            return Err("root has a parent".to_string());
        }

        let mut leaves = Vec::new();
        let mut leaf_depth = None;
        let count = self.validate_node(ROOT, None, None, 0, &mut leaf_depth, &mut leaves)?;
        if count != self.len {
            return Err(format!("tree holds {} keys but len is {}", count, self.len));
        }

        for pair in leaves.windows(2) {
            if self.nodes[pair[0]].next() != Some(pair[1]) {
                return Err(format!("leaf chain broken after {}", pair[0]));
            }
        }
        if let Some(&last) = leaves.last() {
            if self.nodes[last].next().is_some() {
                return Err(format!("last leaf {} has a successor", last));
            }
        }
        Ok(())
    }

    fn validate_node<'a>(
        &'a self,
        id: NodeId,
        lower: Option<&'a K>,
        upper: Option<&'a K>,
        depth: usize,
        leaf_depth: &mut Option<usize>,
        leaves: &mut Vec<NodeId>,
    ) -> std::result::Result<usize, String> {
        let node = &self.nodes[id];
        let keys = &node.keys;

        if keys.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(format!("keys of {} are not strictly ascending", id));
        }
        if keys
            .iter()
            .any(|k| lower.is_some_and(|l| k < l) || upper.is_some_and(|u| k >= u))
        {
            return Err(format!("keys of {} escape their separators", id));
        }
        if keys.len() >= self.order {
            return Err(format!("{} holds {} keys at order {}", id, keys.len(), self.order));
        }
        if id != ROOT && keys.len() < self.min_keys() {
            return Err(format!("{} holds only {} keys", id, keys.len()));
        }

        match &node.kind {
            NodeKind::Leaf { values, .. } => {
                if values.len() != keys.len() {
                    return Err(format!("{} has {} keys but {} values", id, keys.len(), values.len()));
                }
                match *leaf_depth {
                    Some(expected) if expected != depth => {
                        return Err(format!("leaf {} at depth {}, expected {}", id, depth, expected));
                    }
                    _ => *leaf_depth = Some(depth),
                }
                leaves.push(id);
                Ok(keys.len())
            }
            NodeKind::Internal { children } => {
                if children.len() != keys.len() + 1 {
                    return Err(format!(
                        "{} has {} keys but {} children",
                        id,
                        keys.len(),
                        children.len()
                    ));
                }
                if id == ROOT && keys.is_empty() {
                    return Err("internal root has no separator".to_string());
                }
                if id != ROOT && children.len() < self.min_children() {
                    return Err(format!("{} has only {} children", id, children.len()));
                }

                let mut count = 0;
                for (i, &child) in children.iter().enumerate() {
                    if self.nodes[child].parent != Some(id) {
                        return Err(format!("{} does not point back to parent {}", child, id));
                    }
                    let child_lower = if i == 0 { lower } else { Some(&keys[i - 1]) };
                    let child_upper = keys.get(i).or(upper);
                    count += self.validate_node(
                        child,
                        child_lower,
                        child_upper,
                        depth + 1,
                        leaf_depth,
                        leaves,
                    )?;
                }
                Ok(count)
            }
        }
    }

    /// Panics if a structural invariant of the tree is violated.
    pub fn check_invariants(&self) {
        if let Err(violation) = self.validate() {
            panic!("B+Tree invariant violated: {}", violation);
        }
    }
}

impl<'a, K, V> IntoIterator for &'a BPlusTree<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Iter<'a, K, V> {
        self.iter()
    }
}
