use std::collections::HashMap;

use log::debug;

use crate::common::{PageId, Result, TableId, TabulaError};
use crate::record::Record;
use crate::storage::Page;

use super::LruReplacer;

/// Persistent page storage behind the buffer pool.
///
/// Evicted pages are written back through this trait, and pages missing
/// from the pool are loaded through it.
pub trait PageStore {
    /// Reads a page of a table from its persistent store.
    fn read_page(&self, table_id: TableId, page_id: PageId) -> Result<Page>;

    /// Writes a page back to its table's persistent store.
    fn write_page(&self, page: &Page) -> Result<()>;
}

/// A resident page
#[derive(Debug)]
struct Frame {
    page: Page,
    /// Whether the page changed since it was loaded
    dirty: bool,
}

/// BufferPool keeps a bounded number of pages, of any table, in memory.
///
/// When the pool is full the least recently touched page is evicted. Eviction
/// always writes the victim back to its store first, whether it is dirty or
/// not, so a page dropped from the pool is never lost.
pub struct BufferPool {
    /// Maximum number of resident pages
    capacity: usize,
    /// Buffer slots
    frames: Vec<Option<Frame>>,
    /// Page table: maps (table, page) to slots
    page_table: HashMap<(TableId, PageId), usize>,
    /// LRU replacer for eviction decisions
    replacer: LruReplacer,
}

impl BufferPool {
    /// Creates an empty pool holding at most `capacity` pages.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "buffer pool needs at least one slot");
        Self {
            capacity,
            frames: (0..capacity).map(|_| None).collect(),
            page_table: HashMap::with_capacity(capacity),
            replacer: LruReplacer::new(capacity),
        }
    }

    /// Returns a page, loading it from `store` when it is not resident.
    pub fn get_page(
        &mut self,
        store: &dyn PageStore,
        table_id: TableId,
        page_id: PageId,
    ) -> Result<&Page> {
        let slot = self.fetch(store, table_id, page_id)?;
        Ok(&self.touch(slot)?.page)
    }

    /// Returns a page for modification and marks it dirty.
    pub fn get_page_mut(
        &mut self,
        store: &dyn PageStore,
        table_id: TableId,
        page_id: PageId,
    ) -> Result<&mut Page> {
        let slot = self.fetch(store, table_id, page_id)?;
        let frame = self.touch(slot)?;
        frame.dirty = true;
        Ok(&mut frame.page)
    }

    /// Caches a page that was just created, evicting first if the pool is full.
    pub fn add_to_buffer(&mut self, store: &dyn PageStore, page: Page) -> Result<()> {
        let key = (page.table_id(), page.page_id());
        if let Some(&slot) = self.page_table.get(&key) {
            self.frames[slot] = Some(Frame { page, dirty: true });
            self.touch(slot)?;
            return Ok(());
        }

        let slot = self.make_room(store)?;
        self.install(slot, page, true)
    }

    /// Inserts a record into a page at `index`. A `PageOverfull` error from
    /// the page is returned unchanged and leaves the page as it was.
    pub fn insert_record(
        &mut self,
        store: &dyn PageStore,
        table_id: TableId,
        page_id: PageId,
        record: Record,
        index: usize,
    ) -> Result<()> {
        self.modify(store, table_id, page_id, |page| page.insert(record, index))
    }

    /// Replaces the record at `index` of a page.
    pub fn update_record(
        &mut self,
        store: &dyn PageStore,
        table_id: TableId,
        page_id: PageId,
        index: usize,
        record: Record,
    ) -> Result<()> {
        self.modify(store, table_id, page_id, |page| page.update(index, record))
    }

    /// Removes the record at `index` of a page and returns it.
    pub fn delete_record(
        &mut self,
        store: &dyn PageStore,
        table_id: TableId,
        page_id: PageId,
        index: usize,
    ) -> Result<Record> {
        self.modify(store, table_id, page_id, |page| page.delete(index))
    }

    /// Writes every resident page back to its store and empties the pool.
    pub fn flush(&mut self, store: &dyn PageStore) -> Result<()> {
        let mut keys: Vec<_> = self.page_table.iter().map(|(&k, &s)| (k, s)).collect();
        keys.sort();

        for (_, slot) in &keys {
            if let Some(frame) = &self.frames[*slot] {
                store.write_page(&frame.page)?;
            }
        }

        debug!("flushed {} page(s) from the buffer pool", keys.len());
        self.frames.iter_mut().for_each(|frame| *frame = None);
        self.page_table.clear();
        self.replacer.clear();
        Ok(())
    }

    /// Shifts the id of every resident page of `table_id` above `after` up
    /// by one, following a page split that inserted page `after + 1`.
    pub fn renumber_pages(&mut self, table_id: TableId, after: PageId) {
        let moved: Vec<_> = self
            .page_table
            .iter()
            .filter(|((tid, pid), _)| *tid == table_id && *pid > after)
            .map(|(&key, &slot)| (key, slot))
            .collect();

        for (key, _) in &moved {
            self.page_table.remove(key);
        }
        for ((tid, pid), slot) in moved {
            let renumbered = pid.next();
            if let Some(frame) = self.frames[slot].as_mut() {
                frame.page.set_page_id(renumbered);
            }
            self.page_table.insert((tid, renumbered), slot);
        }
    }

    /// Drops every resident page of a table without writing it back.
    pub fn discard_table(&mut self, table_id: TableId) {
        let slots: Vec<_> = self
            .page_table
            .iter()
            .filter(|((tid, _), _)| *tid == table_id)
            .map(|(&key, &slot)| (key, slot))
            .collect();

        for (key, slot) in slots {
            self.page_table.remove(&key);
            self.frames[slot] = None;
            self.replacer.remove(slot);
        }
    }

    pub fn is_resident(&self, table_id: TableId, page_id: PageId) -> bool {
        self.page_table.contains_key(&(table_id, page_id))
    }

    /// Returns whether a resident page changed since it was loaded.
    pub fn is_dirty(&self, table_id: TableId, page_id: PageId) -> Option<bool> {
        self.page_table
            .get(&(table_id, page_id))
            .and_then(|&slot| self.frames[slot].as_ref())
            .map(|frame| frame.dirty)
    }

    /// Returns the resident pages in (table, page) order.
    pub fn resident_pages(&self) -> Vec<(TableId, PageId)> {
        let mut pages: Vec<_> = self.page_table.keys().copied().collect();
        pages.sort();
        pages
    }

    pub fn len(&self) -> usize {
        self.page_table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.page_table.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn modify<R>(
        &mut self,
        store: &dyn PageStore,
        table_id: TableId,
        page_id: PageId,
        f: impl FnOnce(&mut Page) -> Result<R>,
    ) -> Result<R> {
        let slot = self.fetch(store, table_id, page_id)?;
        let frame = self.touch(slot)?;
        let result = f(&mut frame.page)?;
        frame.dirty = true;
        Ok(result)
    }

    /// Returns the slot holding a page, loading it first if necessary.
    fn fetch(&mut self, store: &dyn PageStore, table_id: TableId, page_id: PageId) -> Result<usize> {
        if let Some(&slot) = self.page_table.get(&(table_id, page_id)) {
            return Ok(slot);
        }

        let page = store.read_page(table_id, page_id)?;
        debug!("loaded page {} of table {} into the buffer pool", page_id, table_id);
        let slot = self.make_room(store)?;
        self.install(slot, page, false)?;
        Ok(slot)
    }

    /// Returns a free slot, evicting the least recently touched page when
    /// the pool is full.
    fn make_room(&mut self, store: &dyn PageStore) -> Result<usize> {
        if let Some(slot) = self.frames.iter().position(Option::is_none) {
            return Ok(slot);
        }

        let slot = self
            .replacer
            .victim()
            .ok_or_else(|| TabulaError::PageCorrupted("buffer pool has no victim".to_string()))?;

        if let Some(frame) = &self.frames[slot] {
            // Write-through: the victim is persisted even when clean
            store.write_page(&frame.page)?;
            debug!(
                "evicted page {} of table {} (dirty: {})",
                frame.page.page_id(),
                frame.page.table_id(),
                frame.dirty
            );
            self.page_table
                .remove(&(frame.page.table_id(), frame.page.page_id()));
        }

        self.frames[slot] = None;
        self.replacer.remove(slot);
        Ok(slot)
    }

    fn install(&mut self, slot: usize, page: Page, dirty: bool) -> Result<()> {
        self.page_table
            .insert((page.table_id(), page.page_id()), slot);
        self.frames[slot] = Some(Frame { page, dirty });
        self.touch(slot)?;
        Ok(())
    }

    /// Stamps a slot as the most recently used one.
    fn touch(&mut self, slot: usize) -> Result<&mut Frame> {
        let timestamp = self.replacer.record_access(slot);
        let frame = self.frames[slot]
            .as_mut()
            .ok_or_else(|| TabulaError::PageCorrupted(format!("buffer slot {} is empty", slot)))?;
        frame.page.touch(timestamp);
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::catalog::TableSchema;
    use crate::record::{DataType, Value};

    /// In-memory store that records every write-back.
    #[derive(Default)]
    struct MemoryStore {
        pages: Mutex<HashMap<(TableId, PageId), Page>>,
        writes: Mutex<Vec<(TableId, PageId)>>,
    }

    impl MemoryStore {
        fn with_pages(table_id: TableId, count: u32) -> Self {
            let store = Self::default();
            for id in 0..count {
                let page = Page::new(table_id, PageId::new(id), 256);
                store.pages.lock().insert((table_id, page.page_id()), page);
            }
            store
        }

        fn writes(&self) -> Vec<(TableId, PageId)> {
            self.writes.lock().clone()
        }
    }

    impl PageStore for MemoryStore {
        fn read_page(&self, table_id: TableId, page_id: PageId) -> Result<Page> {
            self.pages
                .lock()
                .get(&(table_id, page_id))
                .cloned()
                .ok_or_else(|| TabulaError::no_table(table_id))
        }

        fn write_page(&self, page: &Page) -> Result<()> {
            let key = (page.table_id(), page.page_id());
            self.writes.lock().push(key);
            self.pages.lock().insert(key, page.clone());
            Ok(())
        }
    }

    fn schema() -> Arc<TableSchema> {
        TableSchema::builder("t")
            .primary_key("id", DataType::Integer)
            .build_arc()
            .unwrap()
    }

    const T: TableId = TableId(0);

    #[test]
    fn test_capacity_two_evicts_oldest() {
        let store = MemoryStore::with_pages(T, 3);
        let mut pool = BufferPool::new(2);

        pool.get_page(&store, T, PageId::new(0)).unwrap();
        pool.get_page(&store, T, PageId::new(1)).unwrap();
        assert!(store.writes().is_empty());

        pool.get_page(&store, T, PageId::new(2)).unwrap();

        // Page 0 was clean but is still written back
        assert_eq!(store.writes(), vec![(T, PageId::new(0))]);
        assert_eq!(
            pool.resident_pages(),
            vec![(T, PageId::new(1)), (T, PageId::new(2))]
        );
    }

    #[test]
    fn test_touch_refreshes_recency() {
        let store = MemoryStore::with_pages(T, 3);
        let mut pool = BufferPool::new(2);

        pool.get_page(&store, T, PageId::new(0)).unwrap();
        pool.get_page(&store, T, PageId::new(1)).unwrap();
        let touched = pool.get_page(&store, T, PageId::new(0)).unwrap().touched_at();
        assert!(touched > 0);

        pool.get_page(&store, T, PageId::new(2)).unwrap();
        assert!(pool.is_resident(T, PageId::new(0)));
        assert!(!pool.is_resident(T, PageId::new(1)));
    }

    #[test]
    fn test_missing_page_does_not_evict() {
        let store = MemoryStore::with_pages(T, 1);
        let mut pool = BufferPool::new(1);

        pool.get_page(&store, T, PageId::new(0)).unwrap();
        assert!(matches!(
            pool.get_page(&store, TableId::new(9), PageId::new(0)),
            Err(TabulaError::NoTable(_))
        ));
        assert!(pool.is_resident(T, PageId::new(0)));
        assert!(store.writes().is_empty());
    }

    #[test]
    fn test_record_operations_mark_dirty() {
        let schema = schema();
        let store = MemoryStore::with_pages(schema.table_id(), 1);
        let mut pool = BufferPool::new(4);
        let pid = PageId::new(0);
        let record = Record::new(Arc::clone(&schema), vec![Value::Integer(1)]).unwrap();

        pool.get_page(&store, T, pid).unwrap();
        assert_eq!(pool.is_dirty(T, pid), Some(false));

        pool.insert_record(&store, T, pid, record.clone(), 0).unwrap();
        assert_eq!(pool.is_dirty(T, pid), Some(true));
        assert_eq!(pool.get_page(&store, T, pid).unwrap().len(), 1);

        let removed = pool.delete_record(&store, T, pid, 0).unwrap();
        assert_eq!(removed, record);
        assert!(pool.delete_record(&store, T, pid, 0).is_err());
    }

    #[test]
    fn test_insert_record_surfaces_overfull() {
        let schema = schema();
        let store = MemoryStore::default();
        let mut pool = BufferPool::new(2);
        let pid = PageId::new(0);

        // A page with room for nothing
        pool.add_to_buffer(&store, Page::new(T, pid, 8)).unwrap();
        let record = Record::new(Arc::clone(&schema), vec![Value::Integer(1)]).unwrap();
        let err = pool.insert_record(&store, T, pid, record, 0).unwrap_err();
        assert!(matches!(err, TabulaError::PageOverfull { .. }));
        assert!(pool.get_page(&store, T, pid).unwrap().is_empty());
    }

    #[test]
    fn test_flush_writes_everything() {
        let store = MemoryStore::with_pages(T, 3);
        let mut pool = BufferPool::new(3);
        for id in 0..3 {
            pool.get_page(&store, T, PageId::new(id)).unwrap();
        }

        pool.flush(&store).unwrap();
        assert!(pool.is_empty());
        assert_eq!(store.writes().len(), 3);
    }

    #[test]
    fn test_renumber_and_discard() {
        let other = TableId::new(1);
        let store = MemoryStore::with_pages(T, 3);
        let mut pool = BufferPool::new(4);
        pool.get_page(&store, T, PageId::new(0)).unwrap();
        pool.get_page(&store, T, PageId::new(2)).unwrap();
        pool.add_to_buffer(&store, Page::new(other, PageId::new(2), 64))
            .unwrap();

        pool.renumber_pages(T, PageId::new(0));
        assert_eq!(
            pool.resident_pages(),
            vec![
                (T, PageId::new(0)),
                (T, PageId::new(3)),
                (other, PageId::new(2)),
            ]
        );
        assert_eq!(
            pool.get_page(&store, T, PageId::new(3)).unwrap().page_id(),
            PageId::new(3)
        );

        pool.discard_table(T);
        assert_eq!(pool.resident_pages(), vec![(other, PageId::new(2))]);
        assert!(store.writes().is_empty());
    }
}
