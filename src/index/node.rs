use std::fmt;
use std::ops::{Index, IndexMut};

/// Position of a node in the tree's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(super) usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

#[derive(Debug, Clone)]
pub(super) enum NodeKind<V> {
    Leaf {
        values: Vec<V>,
        /// Next leaf in key order
        next: Option<NodeId>,
    },
    Internal {
        /// `keys.len() + 1` children
        children: Vec<NodeId>,
    },
}

/// A B+Tree node.
///
/// Child `i` of an internal node holds keys below `keys[i]`; the last child
/// holds keys at or above the last separator.
#[derive(Debug, Clone)]
pub(super) struct TreeNode<K, V> {
    pub(super) keys: Vec<K>,
    pub(super) kind: NodeKind<V>,
    pub(super) parent: Option<NodeId>,
}

impl<K, V> TreeNode<K, V> {
    pub(super) fn leaf(keys: Vec<K>, values: Vec<V>, parent: Option<NodeId>) -> Self {
        Self {
            keys,
            kind: NodeKind::Leaf { values, next: None },
            parent,
        }
    }

    pub(super) fn internal(keys: Vec<K>, children: Vec<NodeId>, parent: Option<NodeId>) -> Self {
        Self {
            keys,
            kind: NodeKind::Internal { children },
            parent,
        }
    }

    pub(super) fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }

    /// Children of an internal node; empty for a leaf.
    pub(super) fn children(&self) -> &[NodeId] {
        match &self.kind {
            NodeKind::Internal { children } => children,
            NodeKind::Leaf { .. } => &[],
        }
    }

    /// Values of a leaf; empty for an internal node.
    pub(super) fn values(&self) -> &[V] {
        match &self.kind {
            NodeKind::Leaf { values, .. } => values,
            NodeKind::Internal { .. } => &[],
        }
    }

    pub(super) fn next(&self) -> Option<NodeId> {
        match &self.kind {
            NodeKind::Leaf { next, .. } => *next,
            NodeKind::Internal { .. } => None,
        }
    }

    pub(super) fn set_next(&mut self, leaf: Option<NodeId>) {
        if let NodeKind::Leaf { next, .. } = &mut self.kind {
            *next = leaf;
        }
    }

    /// Position of `child` among this node's children.
    pub(super) fn child_index(&self, child: NodeId) -> Option<usize> {
        self.children().iter().position(|&c| c == child)
    }
}

/// A value or child moved between sibling nodes together with its key.
pub(super) enum Entry<V> {
    Value(V),
    Child(NodeId),
}

impl<K, V> TreeNode<K, V> {
    /// Removes the last key with the last value, or the last child.
    pub(super) fn pop_last(&mut self) -> (K, Entry<V>) {
        let at = self.keys.len() - 1;
        let key = self.keys.remove(at);
        let entry = match &mut self.kind {
            NodeKind::Leaf { values, .. } => Entry::Value(values.remove(at)),
            NodeKind::Internal { children } => Entry::Child(children.remove(at + 1)),
        };
        (key, entry)
    }

    /// Removes the first key with the first value, or the first child.
    pub(super) fn pop_first(&mut self) -> (K, Entry<V>) {
        let key = self.keys.remove(0);
        let entry = match &mut self.kind {
            NodeKind::Leaf { values, .. } => Entry::Value(values.remove(0)),
            NodeKind::Internal { children } => Entry::Child(children.remove(0)),
        };
        (key, entry)
    }

    pub(super) fn push_first(&mut self, key: K, entry: Entry<V>) {
        self.keys.insert(0, key);
        match (&mut self.kind, entry) {
            (NodeKind::Leaf { values, .. }, Entry::Value(value)) => values.insert(0, value),
            (NodeKind::Internal { children }, Entry::Child(child)) => children.insert(0, child),
            _ => unreachable!("entry moved between a leaf and an internal node"),
        }
    }

    pub(super) fn push_last(&mut self, key: K, entry: Entry<V>) {
        self.keys.push(key);
        match (&mut self.kind, entry) {
            (NodeKind::Leaf { values, .. }, Entry::Value(value)) => values.push(value),
            (NodeKind::Internal { children }, Entry::Child(child)) => children.push(child),
            _ => unreachable!("entry moved between a leaf and an internal node"),
        }
    }
}

/// Owner of every node of a tree. Freed slots are reused by later
/// allocations.
#[derive(Debug)]
pub(super) struct NodeArena<K, V> {
    nodes: Vec<Option<TreeNode<K, V>>>,
    free: Vec<NodeId>,
}

impl<K, V> NodeArena<K, V> {
    pub(super) fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
        }
    }

    pub(super) fn alloc(&mut self, node: TreeNode<K, V>) -> NodeId {
        match self.free.pop() {
            Some(id) => {
                self.nodes[id.0] = Some(node);
                id
            }
            None => {
                self.nodes.push(Some(node));
                NodeId(self.nodes.len() - 1)
            }
        }
    }

    /// Removes a node from the arena and returns it.
    pub(super) fn release(&mut self, id: NodeId) -> TreeNode<K, V> {
        match self.nodes.get_mut(id.0).and_then(Option::take) {
            Some(node) => {
                self.free.push(id);
                node
            }
            None => panic!("release of dangling {}", id),
        }
    }

    /// Number of live nodes.
    pub(super) fn live(&self) -> usize {
        self.nodes.len() - self.free.len()
    }
}

impl<K, V> Index<NodeId> for NodeArena<K, V> {
    type Output = TreeNode<K, V>;

    fn index(&self, id: NodeId) -> &TreeNode<K, V> {
        match self.nodes.get(id.0) {
            Some(Some(node)) => node,
            _ => panic!("dangling {}", id),
        }
    }
}

impl<K, V> IndexMut<NodeId> for NodeArena<K, V> {
    fn index_mut(&mut self, id: NodeId) -> &mut TreeNode<K, V> {
        match self.nodes.get_mut(id.0) {
            Some(Some(node)) => node,
            _ => panic!("dangling {}", id),
        }
    }
}
