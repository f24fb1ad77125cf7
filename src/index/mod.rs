mod btree;
mod codec;
mod iterator;
mod node;

pub use btree::BPlusTree;
pub use codec::IndexCodec;
pub use iterator::{Iter, Range};

use crate::common::PageId;
use crate::record::PrimaryKey;

/// Primary index of a table: maps each key to the page holding its record.
pub type TableIndex = BPlusTree<PrimaryKey, PageId>;
