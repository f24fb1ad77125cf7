//! Integration tests for LRU replacement in the buffer pool

use std::cell::RefCell;
use std::collections::HashMap;

use proptest::prelude::*;

use tabula::buffer::{BufferPool, LruReplacer, PageStore};
use tabula::common::{PageId, Result, TableId};
use tabula::storage::Page;

const TABLE: TableId = TableId(0);

/// Page store that keeps written pages in memory and counts writes.
#[derive(Default)]
struct MemoryStore {
    pages: RefCell<HashMap<PageId, Page>>,
    writes: RefCell<Vec<PageId>>,
}

impl PageStore for MemoryStore {
    fn read_page(&self, table_id: TableId, page_id: PageId) -> Result<Page> {
        Ok(self
            .pages
            .borrow()
            .get(&page_id)
            .cloned()
            .unwrap_or_else(|| Page::new(table_id, page_id, 64)))
    }

    fn write_page(&self, page: &Page) -> Result<()> {
        self.writes.borrow_mut().push(page.page_id());
        self.pages.borrow_mut().insert(page.page_id(), page.clone());
        Ok(())
    }
}

/// The `capacity` most recently accessed distinct pages.
fn most_recent(accesses: &[u32], capacity: usize) -> Vec<u32> {
    let mut recent = Vec::new();
    for &page in accesses.iter().rev() {
        if !recent.contains(&page) {
            recent.push(page);
        }
        if recent.len() == capacity {
            break;
        }
    }
    recent.sort();
    recent
}

#[test]
fn test_replacer_evicts_in_access_order() {
    let mut replacer = LruReplacer::new(3);
    for slot in [2, 0, 1] {
        replacer.record_access(slot);
    }
    assert_eq!(replacer.victim(), Some(2));
    replacer.remove(2);
    assert_eq!(replacer.victim(), Some(0));
    replacer.record_access(0);
    assert_eq!(replacer.victim(), Some(1));
}

#[test]
fn test_every_eviction_writes_back() {
    let store = MemoryStore::default();
    let mut pool = BufferPool::new(2);

    // Clean pages are written back too
    for page in [0, 1, 2, 3] {
        pool.get_page(&store, TABLE, PageId::new(page)).unwrap();
    }
    assert_eq!(*store.writes.borrow(), vec![PageId::new(0), PageId::new(1)]);
}

proptest! {
    #[test]
    fn prop_resident_set_is_most_recent(
        capacity in 1usize..6,
        accesses in prop::collection::vec(0u32..10, 1..200),
    ) {
        let store = MemoryStore::default();
        let mut pool = BufferPool::new(capacity);

        for &page in &accesses {
            pool.get_page(&store, TABLE, PageId::new(page)).unwrap();
        }

        let resident: Vec<u32> = pool
            .resident_pages()
            .into_iter()
            .map(|(_, page)| page.as_u32())
            .collect();
        prop_assert_eq!(resident, most_recent(&accesses, capacity));
        prop_assert!(pool.len() <= capacity);
    }
}
