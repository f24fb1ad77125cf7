use super::btree::BPlusTree;
use super::node::NodeId;

/// Iterator over the entries of a [`BPlusTree`] in key order, following the
/// leaf chain.
pub struct Iter<'a, K, V> {
    tree: &'a BPlusTree<K, V>,
    leaf: Option<NodeId>,
    pos: usize,
}

impl<'a, K, V> Iter<'a, K, V> {
    pub(super) fn new(tree: &'a BPlusTree<K, V>, leaf: Option<NodeId>, pos: usize) -> Self {
        Self { tree, leaf, pos }
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let tree = self.tree;
        while let Some(id) = self.leaf {
            let node = &tree.nodes[id];
            if self.pos < node.keys.len() {
                let item = (&node.keys[self.pos], &node.values()[self.pos]);
                self.pos += 1;
                return Some(item);
            }

            // Move on to the next leaf
            self.leaf = node.next();
            self.pos = 0;
        }
        None
    }
}

/// Iterator over the entries of a [`BPlusTree`] with keys up to an
/// inclusive bound.
pub struct Range<'a, K, V> {
    iter: Iter<'a, K, V>,
    end: K,
    done: bool,
}

impl<'a, K, V> Range<'a, K, V> {
    pub(super) fn new(iter: Iter<'a, K, V>, end: K) -> Self {
        Self {
            iter,
            end,
            done: false,
        }
    }
}

impl<'a, K: Ord, V> Iterator for Range<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.iter.next() {
            Some((key, value)) if *key <= self.end => Some((key, value)),
            _ => {
                self.done = true;
                None
            }
        }
    }
}
