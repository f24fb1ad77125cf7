use std::fmt;
use std::fs;
use std::path::Path;

use bytes::{Buf, BufMut};
use log::debug;

use crate::common::codec::{get_i32, get_i64, get_u32, get_u64, get_u8};
use crate::common::{PageId, Result, TabulaError};
use crate::record::{PrimaryKey, Value};

use super::btree::{BPlusTree, ROOT};
use super::node::{NodeId, NodeKind, TreeNode};

const INDEX_MAGIC: &[u8; 4] = b"TIDX";

const NODE_LEAF: u8 = 0;
const NODE_INTERNAL: u8 = 1;

/// Deepest tree accepted when loading; far above any real height.
const MAX_DEPTH: usize = 64;

/// Binary encoding of index keys and values.
pub trait IndexCodec: Sized {
    fn encode(&self, buf: &mut impl BufMut);

    /// Returns None if the buffer does not hold a valid encoding.
    fn decode(buf: &mut impl Buf) -> Option<Self>;
}

impl IndexCodec for PrimaryKey {
    fn encode(&self, buf: &mut impl BufMut) {
        self.value().encode_tagged(buf);
    }

    fn decode(buf: &mut impl Buf) -> Option<Self> {
        Value::decode_tagged(buf).and_then(|value| PrimaryKey::new(value).ok())
    }
}

impl IndexCodec for PageId {
    fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u32_le(self.as_u32());
    }

    fn decode(buf: &mut impl Buf) -> Option<Self> {
        get_u32(buf).map(PageId::new)
    }
}

impl IndexCodec for i32 {
    fn encode(&self, buf: &mut impl BufMut) {
        buf.put_i32_le(*self);
    }

    fn decode(buf: &mut impl Buf) -> Option<Self> {
        get_i32(buf)
    }
}

impl IndexCodec for u32 {
    fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u32_le(*self);
    }

    fn decode(buf: &mut impl Buf) -> Option<Self> {
        get_u32(buf)
    }
}

impl IndexCodec for i64 {
    fn encode(&self, buf: &mut impl BufMut) {
        buf.put_i64_le(*self);
    }

    fn decode(buf: &mut impl Buf) -> Option<Self> {
        get_i64(buf)
    }
}

fn corrupted(msg: impl Into<String>) -> TabulaError {
    TabulaError::IndexCorrupted(msg.into())
}

/// ## Index File Format
///
/// ```text
/// | magic "TIDX" | order: u32 | len: u64 | root node |
///
/// node := | type: u8 (0 leaf, 1 internal) | key count: u32 | keys... |
///         leaf:     values...
///         internal: (key count + 1) child nodes, in order
/// ```
///
/// Parent links and the leaf chain are rebuilt on load.
impl<K, V> BPlusTree<K, V>
where
    K: IndexCodec + Ord + Clone + fmt::Display,
    V: IndexCodec,
{
    /// Serializes the whole tree.
    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_slice(INDEX_MAGIC);
        buf.put_u32_le(self.order() as u32);
        buf.put_u64_le(self.len() as u64);
        self.encode_node(ROOT, buf);
    }

    fn encode_node(&self, id: NodeId, buf: &mut impl BufMut) {
        let node = &self.nodes[id];
        let tag = if node.is_leaf() { NODE_LEAF } else { NODE_INTERNAL };
        buf.put_u8(tag);
        buf.put_u32_le(node.keys.len() as u32);
        for key in &node.keys {
            key.encode(buf);
        }

        match &node.kind {
            NodeKind::Leaf { values, .. } => {
                for value in values {
                    value.encode(buf);
                }
            }
            NodeKind::Internal { children } => {
                for &child in children {
                    self.encode_node(child, buf);
                }
            }
        }
    }

    /// Deserializes a tree written by [`BPlusTree::encode`], checking every
    /// structural invariant.
    pub fn decode(buf: &mut impl Buf) -> Result<Self> {
        if buf.remaining() < INDEX_MAGIC.len() {
            return Err(corrupted("file too short"));
        }
        let mut magic = [0u8; 4];
        buf.copy_to_slice(&mut magic);
        if &magic != INDEX_MAGIC {
            return Err(corrupted("bad magic"));
        }

        let order = get_u32(buf).ok_or_else(|| corrupted("missing order"))? as usize;
        let len = get_u64(buf).ok_or_else(|| corrupted("missing length"))? as usize;
        let mut tree = BPlusTree::new(order).map_err(|e| corrupted(e.to_string()))?;

        let mut leaves = Vec::new();
        tree.decode_node(buf, ROOT, None, 0, &mut leaves)?;
        for pair in leaves.windows(2) {
            tree.nodes[pair[0]].set_next(Some(pair[1]));
        }
        tree.len = len;

        if buf.has_remaining() {
            return Err(corrupted(format!("{} trailing bytes", buf.remaining())));
        }
        tree.validate().map_err(corrupted)?;
        Ok(tree)
    }

    fn decode_node(
        &mut self,
        buf: &mut impl Buf,
        id: NodeId,
        parent: Option<NodeId>,
        depth: usize,
        leaves: &mut Vec<NodeId>,
    ) -> Result<()> {
        if depth > MAX_DEPTH {
            return Err(corrupted("tree too deep"));
        }

        let tag = get_u8(buf).ok_or_else(|| corrupted("missing node type"))?;
        let count = get_u32(buf).ok_or_else(|| corrupted("missing key count"))? as usize;
        if count >= self.order() {
            return Err(corrupted(format!("node with {} keys", count)));
        }
        let keys = (0..count)
            .map(|_| K::decode(buf))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| corrupted("truncated keys"))?;

        match tag {
            NODE_LEAF => {
                let values = (0..count)
                    .map(|_| V::decode(buf))
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| corrupted("truncated values"))?;
                self.nodes[id] = TreeNode::leaf(keys, values, parent);
                leaves.push(id);
            }
            NODE_INTERNAL => {
                let mut children = Vec::with_capacity(count + 1);
                for _ in 0..=count {
                    let child = self
                        .nodes
                        .alloc(TreeNode::leaf(Vec::new(), Vec::new(), Some(id)));
                    self.decode_node(buf, child, Some(id), depth + 1, leaves)?;
                    children.push(child);
                }
                self.nodes[id] = TreeNode::internal(keys, children, parent);
            }
            other => return Err(corrupted(format!("unknown node type {}", other))),
        }
        Ok(())
    }

    /// Writes the tree to `path`, replacing the previous file atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut buf = Vec::new();
        self.encode(&mut buf);

        let tmp = path.with_extension("tmp");
        fs::write(&tmp, &buf)?;
        fs::rename(&tmp, path)?;
        debug!("saved index {} with {} key(s)", path.display(), self.len());
        Ok(())
    }

    /// Reads a tree written by [`BPlusTree::save`].
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read(path)?;
        let tree = Self::decode(&mut data.as_slice())?;
        debug!("loaded index {} with {} key(s)", path.display(), tree.len());
        Ok(tree)
    }
}
