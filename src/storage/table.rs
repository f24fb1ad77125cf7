use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use log::debug;
use parking_lot::{Mutex, RwLock};

use crate::buffer::{BufferPool, PageStore};
use crate::catalog::TableSchema;
use crate::common::{PageId, Result, TableId, TabulaError};
use crate::record::Record;

use super::Page;

/// Table is the persistent page store of one table.
///
/// It owns a single data file of fixed-size pages, page `i` living at byte
/// offset `i * page_size`. Page ids are dense: a table with `n` pages holds
/// pages `0..n`.
pub struct Table {
    schema: Arc<TableSchema>,
    /// The data file
    file: Mutex<File>,
    /// Path to the data file
    path: PathBuf,
    page_size: usize,
    /// Number of pages currently allocated
    num_pages: AtomicU32,
}

impl Table {
    /// Opens the data file of a table, creating it if it doesn't exist.
    pub fn open<P: AsRef<Path>>(schema: Arc<TableSchema>, path: P, page_size: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.as_ref())?;

        let file_size = file.metadata()?.len();
        let num_pages = (file_size / page_size as u64) as u32;
        debug!(
            "opened data file {} for table {} with {} page(s)",
            path.as_ref().display(),
            schema.name(),
            num_pages
        );

        Ok(Self {
            schema,
            file: Mutex::new(file),
            path: path.as_ref().to_path_buf(),
            page_size,
            num_pages: AtomicU32::new(num_pages),
        })
    }

    pub fn schema(&self) -> &Arc<TableSchema> {
        &self.schema
    }

    pub fn table_id(&self) -> TableId {
        self.schema.table_id()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Returns the number of pages of the table. Zero means empty.
    pub fn num_pages(&self) -> u32 {
        self.num_pages.load(Ordering::SeqCst)
    }

    /// Appends a new empty page and writes it to disk immediately.
    pub fn create_page(&self) -> Result<Page> {
        let page_id = PageId::new(self.num_pages.fetch_add(1, Ordering::SeqCst));
        let page = Page::new(self.table_id(), page_id, self.page_size);
        self.write_raw(page_id, &page.to_bytes())?;
        debug!("created page {} of table {}", page_id, self.schema.name());
        Ok(page)
    }

    /// Reads a page from disk.
    pub fn read_page(&self, page_id: PageId) -> Result<Page> {
        self.check_range(page_id)?;
        let data = self.read_raw(page_id)?;
        Page::from_bytes(&self.schema, page_id, &data)
    }

    /// Writes a page to disk at its page id.
    pub fn write_page(&self, page: &Page) -> Result<()> {
        if page.table_id() != self.table_id() {
            return Err(TabulaError::no_table(page.table_id()));
        }
        self.check_range(page.page_id())?;
        self.write_raw(page.page_id(), &page.to_bytes())
    }

    /// Makes room for a new page at `page_id` by moving pages
    /// `page_id..num_pages` up by one on disk. The slot at `page_id` is left
    /// holding an empty page.
    pub fn insert_page_at(&self, page_id: PageId) -> Result<()> {
        let num_pages = self.num_pages();
        if page_id.as_u32() > num_pages {
            return Err(TabulaError::PageOutOfRange {
                table_id: self.table_id(),
                page_id,
            });
        }

        let mut file = self.file.lock();
        for id in (page_id.as_u32()..num_pages).rev() {
            let data = Self::read_at(&mut file, id, self.page_size)?;
            Self::write_at(&mut file, id + 1, &data)?;
        }
        let empty = Page::new(self.table_id(), page_id, self.page_size);
        Self::write_at(&mut file, page_id.as_u32(), &empty.to_bytes())?;
        drop(file);

        self.num_pages.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Splits page `page_id` while inserting `record` at `index`.
    ///
    /// The lower half stays on `page_id` and the upper half becomes page
    /// `page_id + 1`; every later page moves up by one, on disk and in the
    /// buffer pool. Both halves are written through to disk. Returns the
    /// page the record landed on. References to page ids held outside the
    /// pool must be refreshed by the caller.
    pub fn split_page(
        &self,
        pool: &mut BufferPool,
        store: &dyn PageStore,
        page_id: PageId,
        record: Record,
        index: usize,
    ) -> Result<PageId> {
        let new_page_id = page_id.next();
        let key = record.primary_key();

        let right = pool
            .get_page_mut(store, self.table_id(), page_id)?
            .split_insert(record, index, new_page_id)?;

        self.insert_page_at(new_page_id)?;
        pool.renumber_pages(self.table_id(), page_id);

        // The file must never hold a key on two pages
        let left = pool.get_page(store, self.table_id(), page_id)?;
        self.write_page(left)?;
        self.write_page(&right)?;

        let landed = match right.first_key() {
            Some(first) if key >= first => new_page_id,
            _ => page_id,
        };
        pool.add_to_buffer(store, right)?;

        debug!(
            "split page {} of table {}, {} page(s) now",
            page_id,
            self.schema.name(),
            self.num_pages()
        );
        Ok(landed)
    }

    fn check_range(&self, page_id: PageId) -> Result<()> {
        if page_id.as_u32() >= self.num_pages() {
            return Err(TabulaError::PageOutOfRange {
                table_id: self.table_id(),
                page_id,
            });
        }
        Ok(())
    }

    fn read_raw(&self, page_id: PageId) -> Result<Vec<u8>> {
        let mut file = self.file.lock();
        Self::read_at(&mut file, page_id.as_u32(), self.page_size)
    }

    fn write_raw(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        let mut file = self.file.lock();
        Self::write_at(&mut file, page_id.as_u32(), data)
    }

    fn read_at(file: &mut File, page: u32, page_size: usize) -> Result<Vec<u8>> {
        let mut data = vec![0u8; page_size];
        file.seek(SeekFrom::Start(page as u64 * page_size as u64))?;

        // If we're reading beyond the file, the rest stays zeroed
        let mut filled = 0;
        while filled < page_size {
            match file.read(&mut data[filled..])? {
                0 => break,
                n => filled += n,
            }
        }
        Ok(data)
    }

    fn write_at(file: &mut File, page: u32, data: &[u8]) -> Result<()> {
        file.seek(SeekFrom::Start(page as u64 * data.len() as u64))?;
        file.write_all(data)?;
        file.flush()?;
        Ok(())
    }
}

impl PageStore for Table {
    fn read_page(&self, table_id: TableId, page_id: PageId) -> Result<Page> {
        if table_id != self.table_id() {
            return Err(TabulaError::no_table(table_id));
        }
        Table::read_page(self, page_id)
    }

    fn write_page(&self, page: &Page) -> Result<()> {
        Table::write_page(self, page)
    }
}

/// The open tables of a database, by id.
///
/// The registry is the buffer pool's page store: pages of any table are
/// loaded and written back through it.
#[derive(Default)]
pub struct TableRegistry {
    tables: RwLock<BTreeMap<TableId, Arc<Table>>>,
}

impl TableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, table: Arc<Table>) {
        self.tables.write().insert(table.table_id(), table);
    }

    pub fn remove(&self, table_id: TableId) -> Option<Arc<Table>> {
        self.tables.write().remove(&table_id)
    }

    /// Returns an open table.
    pub fn get(&self, table_id: TableId) -> Result<Arc<Table>> {
        self.tables
            .read()
            .get(&table_id)
            .cloned()
            .ok_or_else(|| TabulaError::no_table(table_id))
    }

    /// Returns every open table in ascending id order.
    pub fn tables(&self) -> Vec<Arc<Table>> {
        self.tables.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tables.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.read().is_empty()
    }
}

impl PageStore for TableRegistry {
    fn read_page(&self, table_id: TableId, page_id: PageId) -> Result<Page> {
        self.get(table_id)?.read_page(page_id)
    }

    fn write_page(&self, page: &Page) -> Result<()> {
        self.get(page.table_id())?.write_page(page)
    }
}
