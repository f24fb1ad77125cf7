use std::fmt;

/// Table identifier - assigned by the catalog when a table is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(pub u32);

impl TableId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TableId({})", self.0)
    }
}

/// Page identifier within one table. Page ids of a table are dense and
/// ordered: page `i` holds keys below every key of page `i + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(pub u32);

impl PageId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }

    pub fn as_usize(&self) -> usize {
        self.0 as usize
    }

    /// Returns the id of the page directly after this one.
    pub fn next(&self) -> PageId {
        PageId(self.0 + 1)
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PageId({})", self.0)
    }
}

/// Timestamp type for LRU tracking
pub type Timestamp = u64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_id_next_and_order() {
        let page_id = PageId::new(3);
        assert_eq!(page_id.next(), PageId::new(4));
        assert!(page_id < page_id.next());
        assert_eq!(page_id.as_usize(), 3);
    }

    #[test]
    fn test_display() {
        assert_eq!(TableId::new(7).to_string(), "TableId(7)");
        assert_eq!(PageId::new(2).to_string(), "PageId(2)");
    }
}
