use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};

use crate::buffer::BufferPool;
use crate::catalog::{Catalog, TableSchema, TableSchemaBuilder};
use crate::common::{PageId, Result, StorageConfig, TableId, TabulaError, SLOT_SIZE};
use crate::index::TableIndex;
use crate::record::{PrimaryKey, Record};
use crate::storage::{Page, Table, TableRegistry};

/// In-memory index of a table and whether its file still matches it.
struct IndexState {
    tree: TableIndex,
    /// The index file on disk reflects `tree`
    saved: bool,
}

impl IndexState {
    fn new(tree: TableIndex, saved: bool) -> Self {
        Self { tree, saved }
    }
}

/// Database ties the catalog, the open tables, the buffer pool and the
/// primary indexes of one data directory together.
///
/// Every record operation holds its table's index lock for its whole
/// duration, so operations on one table are atomic to each other. Locks are
/// taken in a fixed order: table indexes (ascending id), the buffer pool,
/// the table registry, then a table's data file.
///
/// Changes reach disk when pages are evicted and on [`Database::flush`].
pub struct Database {
    config: StorageConfig,
    catalog: Mutex<Catalog>,
    /// Open tables; also the page store behind the pool
    tables: TableRegistry,
    pool: Mutex<BufferPool>,
    indexes: RwLock<BTreeMap<TableId, Arc<Mutex<IndexState>>>>,
}

impl Database {
    /// Opens the database in `config.data_dir`, creating the directory if
    /// needed.
    ///
    /// Each table's index is loaded from its index file. A missing, stale or
    /// unreadable index file is replaced by an index rebuilt from the data
    /// pages.
    pub fn open(config: StorageConfig) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;

        let catalog = Catalog::load(&config.catalog_path())?;
        let tables = TableRegistry::new();
        let mut indexes = BTreeMap::new();

        for schema in catalog.tables() {
            let table_id = schema.table_id();
            let table = Arc::new(Table::open(
                Arc::clone(schema),
                config.data_path(table_id.as_u32()),
                config.page_size,
            )?);
            let state = Self::open_index(&config, &table, catalog.page_count(table_id))?;
            tables.register(table);
            indexes.insert(table_id, Arc::new(Mutex::new(state)));
        }

        info!(
            "opened database at {} with {} table(s)",
            config.data_dir.display(),
            tables.len()
        );
        Ok(Self {
            pool: Mutex::new(BufferPool::new(config.buffer_pool_pages)),
            catalog: Mutex::new(catalog),
            tables,
            indexes: RwLock::new(indexes),
            config,
        })
    }

    fn open_index(
        config: &StorageConfig,
        table: &Table,
        recorded_pages: Option<u32>,
    ) -> Result<IndexState> {
        let path = config.index_path(table.table_id().as_u32());
        let name = table.schema().name();

        if table.num_pages() == 0 {
            return Ok(IndexState::new(
                TableIndex::new(table.schema().index_order())?,
                false,
            ));
        }
        if recorded_pages != Some(table.num_pages()) {
            warn!(
                "table {} has {} page(s) but the catalog recorded {:?}, rebuilding its index",
                name,
                table.num_pages(),
                recorded_pages
            );
            return Self::rebuild_index(table).map(|tree| IndexState::new(tree, false));
        }
        if !path.exists() {
            warn!("index file of table {} is missing, rebuilding it", name);
            return Self::rebuild_index(table).map(|tree| IndexState::new(tree, false));
        }

        match TableIndex::load(&path) {
            Ok(tree) if tree.order() == table.schema().index_order() => {
                Ok(IndexState::new(tree, true))
            }
            Ok(tree) => {
                warn!(
                    "index of table {} has order {}, expected {}, rebuilding it",
                    name,
                    tree.order(),
                    table.schema().index_order()
                );
                Self::rebuild_index(table).map(|tree| IndexState::new(tree, false))
            }
            Err(TabulaError::IndexCorrupted(msg)) => {
                warn!("index of table {} is corrupted ({}), rebuilding it", name, msg);
                Self::rebuild_index(table).map(|tree| IndexState::new(tree, false))
            }
            Err(e) => Err(e),
        }
    }

    /// Builds a table's index by scanning its data pages.
    fn rebuild_index(table: &Table) -> Result<TableIndex> {
        let mut tree = TableIndex::new(table.schema().index_order())?;
        for id in 0..table.num_pages() {
            let page = table.read_page(PageId::new(id))?;
            for record in page.records() {
                tree.insert(record.primary_key(), page.page_id())?;
            }
        }
        debug!(
            "rebuilt index of table {} with {} key(s)",
            table.schema().name(),
            tree.len()
        );
        Ok(tree)
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Creates a table and returns its schema, with the id the catalog
    /// assigned to it.
    pub fn create_table(&self, builder: TableSchemaBuilder) -> Result<Arc<TableSchema>> {
        let mut catalog = self.catalog.lock();
        let schema = catalog.create_table(builder, self.config.index_order)?;
        let table_id = schema.table_id();

        let opened = Table::open(
            Arc::clone(&schema),
            self.config.data_path(table_id.as_u32()),
            self.config.page_size,
        )
        .and_then(|table| {
            let tree = TableIndex::new(schema.index_order())?;
            Ok((table, tree))
        });
        let (table, tree) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                catalog.drop_table(table_id)?;
                return Err(e);
            }
        };
        catalog.save(&self.config.catalog_path())?;

        self.tables.register(Arc::new(table));
        self.indexes
            .write()
            .insert(table_id, Arc::new(Mutex::new(IndexState::new(tree, false))));

        info!("created table {} with id {}", schema.name(), table_id);
        Ok(schema)
    }

    /// Drops a table, deleting its data and index files.
    pub fn drop_table(&self, table_id: TableId) -> Result<()> {
        let index = self.index(table_id)?;
        let _guard = index.lock();
        // A concurrent drop may have won the race for the lock
        let table = self.tables.get(table_id)?;

        self.pool.lock().discard_table(table_id);
        self.tables.remove(table_id);
        self.indexes.write().remove(&table_id);

        let schema = {
            let mut catalog = self.catalog.lock();
            let schema = catalog.drop_table(table_id)?;
            catalog.save(&self.config.catalog_path())?;
            schema
        };

        let data_path = table.path().to_path_buf();
        drop(table);
        remove_if_exists(&data_path)?;
        remove_if_exists(&self.config.index_path(table_id.as_u32()))?;

        info!("dropped table {}", schema.name());
        Ok(())
    }

    /// Resolves a table name to its id.
    pub fn table_id(&self, name: &str) -> Result<TableId> {
        self.catalog.lock().table_id(name)
    }

    pub fn schema(&self, table_id: TableId) -> Result<Arc<TableSchema>> {
        self.catalog.lock().schema(table_id)
    }

    /// Returns the schema of every table in ascending id order.
    pub fn tables(&self) -> Vec<Arc<TableSchema>> {
        self.catalog.lock().tables().cloned().collect()
    }

    /// Returns the number of pages of a table.
    pub fn page_count(&self, table_id: TableId) -> Result<u32> {
        Ok(self.tables.get(table_id)?.num_pages())
    }

    /// Inserts a record into its table.
    ///
    /// The record goes to the page holding the smallest key above its own,
    /// or to the last page. A full page is split in two first.
    pub fn insert(&self, table_id: TableId, record: Record) -> Result<()> {
        let index = self.index(table_id)?;
        let mut state = index.lock();
        let table = self.tables.get(table_id)?;
        check_schema(&table, &record)?;

        let key = record.primary_key();
        if state.tree.contains(&key) {
            return Err(TabulaError::DuplicateKey(key.to_string()));
        }
        let empty = Page::new(table_id, PageId::new(0), table.page_size());
        if !empty.can_insert(&record) {
            return Err(TabulaError::PageOverfull {
                record_size: record.size(),
                available: empty.free_bytes().saturating_sub(SLOT_SIZE),
            });
        }
        self.mark_unsaved(table_id, &mut state)?;

        let mut pool = self.pool.lock();
        let page_id = match state.tree.ceiling(&key) {
            Some((_, &page_id)) => page_id,
            None if table.num_pages() > 0 => PageId::new(table.num_pages() - 1),
            None => {
                let page = table.create_page()?;
                let page_id = page.page_id();
                pool.add_to_buffer(&self.tables, page)?;
                page_id
            }
        };

        let page = pool.get_page(&self.tables, table_id, page_id)?;
        let slot = page.insertion_index(&key);
        let landed = if page.can_insert(&record) {
            pool.insert_record(&self.tables, table_id, page_id, record, slot)?;
            page_id
        } else {
            let landed = table.split_page(&mut pool, &self.tables, page_id, record, slot)?;
            let split_key = pool
                .get_page(&self.tables, table_id, page_id.next())?
                .first_key();
            renumber_after_split(&mut state.tree, page_id, split_key);
            debug!(
                "insert of {} into table {} split page {}",
                key,
                table.schema().name(),
                page_id
            );
            landed
        };
        drop(pool);

        state.tree.insert(key, landed)
    }

    /// Deletes the record with the given key and returns it.
    pub fn delete(&self, table_id: TableId, key: &PrimaryKey) -> Result<Record> {
        let index = self.index(table_id)?;
        let mut state = index.lock();
        let table = self.tables.get(table_id)?;
        let key = &stored_key(&table, key);

        let page_id = lookup(&state.tree, key)?;
        self.mark_unsaved(table_id, &mut state)?;

        let mut pool = self.pool.lock();
        let slot = locate(&mut pool, &self.tables, table_id, page_id, key)?;
        let record = pool.delete_record(&self.tables, table_id, page_id, slot)?;
        drop(pool);

        state.tree.delete(key)?;
        Ok(record)
    }

    /// Replaces the record that has the same key as `record`.
    pub fn update(&self, table_id: TableId, record: Record) -> Result<()> {
        let index = self.index(table_id)?;
        let mut state = index.lock();
        let table = self.tables.get(table_id)?;
        check_schema(&table, &record)?;

        let key = record.primary_key();
        let page_id = lookup(&state.tree, &key)?;
        self.mark_unsaved(table_id, &mut state)?;

        let mut pool = self.pool.lock();
        let slot = locate(&mut pool, &self.tables, table_id, page_id, &key)?;
        pool.update_record(&self.tables, table_id, page_id, slot, record)
    }

    /// Returns the record with the given key, if any.
    pub fn get_by_primary_key(&self, table_id: TableId, key: &PrimaryKey) -> Result<Option<Record>> {
        let index = self.index(table_id)?;
        let state = index.lock();
        let table = self.tables.get(table_id)?;
        let key = &stored_key(&table, key);

        let Some(&page_id) = state.tree.search(key) else {
            return Ok(None);
        };
        let mut pool = self.pool.lock();
        let slot = locate(&mut pool, &self.tables, table_id, page_id, key)?;
        let page = pool.get_page(&self.tables, table_id, page_id)?;
        Ok(page.record(slot).cloned())
    }

    /// Returns every record of a table in key order.
    pub fn get_all_records(&self, table_id: TableId) -> Result<Vec<Record>> {
        let index = self.index(table_id)?;
        let _state = index.lock();
        let table = self.tables.get(table_id)?;

        let mut pool = self.pool.lock();
        let mut records = Vec::new();
        for id in 0..table.num_pages() {
            let page = pool.get_page(&self.tables, table_id, PageId::new(id))?;
            records.extend(page.records().iter().cloned());
        }
        Ok(records)
    }

    /// Returns the records with keys in `start..=end`, in key order.
    pub fn get_range(
        &self,
        table_id: TableId,
        start: &PrimaryKey,
        end: &PrimaryKey,
    ) -> Result<Vec<Record>> {
        let index = self.index(table_id)?;
        let state = index.lock();
        let table = self.tables.get(table_id)?;
        let (start, end) = (stored_key(&table, start), stored_key(&table, end));

        let mut pool = self.pool.lock();
        let mut records = Vec::new();
        for (key, &page_id) in state.tree.range(&start, &end) {
            let slot = locate(&mut pool, &self.tables, table_id, page_id, key)?;
            let page = pool.get_page(&self.tables, table_id, page_id)?;
            records.extend(page.record(slot).cloned());
        }
        Ok(records)
    }

    /// Writes every resident page, every index and the catalog to disk.
    pub fn flush(&self) -> Result<()> {
        let indexes: Vec<_> = self
            .indexes
            .read()
            .iter()
            .map(|(&table_id, index)| (table_id, Arc::clone(index)))
            .collect();
        let mut states: Vec<_> = indexes
            .iter()
            .map(|(table_id, index)| (*table_id, index.lock()))
            .collect();

        self.pool.lock().flush(&self.tables)?;

        let mut catalog = self.catalog.lock();
        for (table_id, state) in states.iter_mut() {
            // Dropped while we waited for its lock
            let Ok(table) = self.tables.get(*table_id) else {
                continue;
            };
            state.tree.save(&self.config.index_path(table_id.as_u32()))?;
            state.saved = true;
            catalog.set_page_count(*table_id, table.num_pages())?;
        }
        catalog.save(&self.config.catalog_path())?;

        info!("flushed {} table(s)", states.len());
        Ok(())
    }

    fn index(&self, table_id: TableId) -> Result<Arc<Mutex<IndexState>>> {
        self.indexes
            .read()
            .get(&table_id)
            .cloned()
            .ok_or_else(|| TabulaError::no_table(table_id))
    }

    /// Removes a table's index file before its first change since the last
    /// flush, so a reopen never trusts an outdated index.
    fn mark_unsaved(&self, table_id: TableId, state: &mut IndexState) -> Result<()> {
        if state.saved {
            remove_if_exists(&self.config.index_path(table_id.as_u32()))?;
            state.saved = false;
        }
        Ok(())
    }
}

fn check_schema(table: &Table, record: &Record) -> Result<()> {
    if record.schema() != table.schema() {
        return Err(TabulaError::InvalidSchema(format!(
            "record of table {} given to table {}",
            record.schema().name(),
            table.schema().name()
        )));
    }
    Ok(())
}

/// A caller's key in the form it is stored in.
fn stored_key(table: &Table, key: &PrimaryKey) -> PrimaryKey {
    key.stored_as(table.schema().primary_key_attribute().data_type())
}

fn lookup(tree: &TableIndex, key: &PrimaryKey) -> Result<PageId> {
    tree.search(key)
        .copied()
        .ok_or_else(|| TabulaError::KeyNotFound(key.to_string()))
}

/// Finds the slot of an indexed key on its page.
fn locate(
    pool: &mut BufferPool,
    tables: &TableRegistry,
    table_id: TableId,
    page_id: PageId,
    key: &PrimaryKey,
) -> Result<usize> {
    pool.get_page(tables, table_id, page_id)?
        .find_by_key(key)
        .ok_or_else(|| {
            TabulaError::IndexCorrupted(format!(
                "key {} is indexed on page {} of table {} but not stored there",
                key, page_id, table_id
            ))
        })
}

/// Rewrites page references after page `split` was split into `split` and
/// `split + 1`: later pages moved up by one, and keys at or past the new
/// page's first key moved to it.
fn renumber_after_split(tree: &mut TableIndex, split: PageId, split_key: Option<PrimaryKey>) {
    tree.for_each_value_mut(|key, page_id| {
        if *page_id > split {
            *page_id = page_id.next();
        } else if *page_id == split && split_key.as_ref().is_some_and(|first| key >= first) {
            *page_id = split.next();
        }
    });
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
