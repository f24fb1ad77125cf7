use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use bytes::{Buf, BufMut};
use log::{debug, info};

use crate::common::codec::get_u32;
use crate::common::{Result, TableId, TabulaError};

use super::{TableSchema, TableSchemaBuilder};

const CATALOG_MAGIC: &[u8; 4] = b"TCAT";

/// A table known to the catalog together with its persisted page count.
#[derive(Debug, Clone)]
struct CatalogEntry {
    schema: Arc<TableSchema>,
    page_count: u32,
}

/// The set of table schemas of one database.
///
/// Loaded once when the database opens, before any table is touched, and
/// written back on every flush.
///
/// ## Catalog File Format
///
/// ```text
/// | magic "TCAT" | next_table_id: u32 | table_count: u32 | [schema, page_count: u32]... |
/// ```
#[derive(Debug, Default)]
pub struct Catalog {
    next_table_id: u32,
    tables: BTreeMap<TableId, CatalogEntry>,
    names: HashMap<String, TableId>,
}

impl Catalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the catalog file at `path`, or returns an empty catalog if the
    /// file does not exist yet.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("no catalog at {}, starting empty", path.display());
            return Ok(Self::new());
        }

        let data = fs::read(path)?;
        let catalog = Self::decode(&mut data.as_slice())?;
        info!(
            "loaded catalog from {} with {} table(s)",
            path.display(),
            catalog.len()
        );
        Ok(catalog)
    }

    /// Writes the catalog to `path`, replacing the previous file atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut buf = Vec::new();
        self.encode(&mut buf);

        let tmp = path.with_extension("tmp");
        fs::write(&tmp, &buf)?;
        fs::rename(&tmp, path)?;
        debug!("saved catalog with {} table(s)", self.len());
        Ok(())
    }

    /// Registers a new table, assigning it the next table id.
    pub fn create_table(
        &mut self,
        builder: TableSchemaBuilder,
        default_order: usize,
    ) -> Result<Arc<TableSchema>> {
        if self.names.contains_key(builder.name()) {
            return Err(TabulaError::TableAlreadyExists(builder.name().to_string()));
        }

        let table_id = TableId::new(self.next_table_id);
        let schema = Arc::new(builder.build_for(table_id, default_order)?);
        self.next_table_id += 1;
        self.insert_entry(Arc::clone(&schema), 0);
        Ok(schema)
    }

    /// Removes a table from the catalog.
    pub fn drop_table(&mut self, table_id: TableId) -> Result<Arc<TableSchema>> {
        let entry = self
            .tables
            .remove(&table_id)
            .ok_or_else(|| TabulaError::no_table(table_id))?;
        self.names.remove(entry.schema.name());
        Ok(entry.schema)
    }

    /// Returns the schema of a table.
    pub fn schema(&self, table_id: TableId) -> Result<Arc<TableSchema>> {
        self.tables
            .get(&table_id)
            .map(|entry| Arc::clone(&entry.schema))
            .ok_or_else(|| TabulaError::no_table(table_id))
    }

    /// Resolves a table name to its id.
    pub fn table_id(&self, name: &str) -> Result<TableId> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| TabulaError::NoTable(name.to_string()))
    }

    /// Returns the number of pages recorded for a table at the last save.
    pub fn page_count(&self, table_id: TableId) -> Option<u32> {
        self.tables.get(&table_id).map(|entry| entry.page_count)
    }

    pub fn set_page_count(&mut self, table_id: TableId, page_count: u32) -> Result<()> {
        let entry = self
            .tables
            .get_mut(&table_id)
            .ok_or_else(|| TabulaError::no_table(table_id))?;
        entry.page_count = page_count;
        Ok(())
    }

    /// Returns every schema in ascending table id order.
    pub fn tables(&self) -> impl Iterator<Item = &Arc<TableSchema>> {
        self.tables.values().map(|entry| &entry.schema)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    fn insert_entry(&mut self, schema: Arc<TableSchema>, page_count: u32) {
        self.names
            .insert(schema.name().to_string(), schema.table_id());
        self.tables
            .insert(schema.table_id(), CatalogEntry { schema, page_count });
    }

    fn encode(&self, buf: &mut impl BufMut) {
        buf.put_slice(CATALOG_MAGIC);
        buf.put_u32_le(self.next_table_id);
        buf.put_u32_le(self.tables.len() as u32);
        for entry in self.tables.values() {
            entry.schema.encode(buf);
            buf.put_u32_le(entry.page_count);
        }
    }

    fn decode(buf: &mut impl Buf) -> Result<Self> {
        let corrupted = |msg: &str| TabulaError::CatalogCorrupted(msg.to_string());

        if buf.remaining() < CATALOG_MAGIC.len() {
            return Err(corrupted("file too short"));
        }
        let mut magic = [0u8; 4];
        buf.copy_to_slice(&mut magic);
        if &magic != CATALOG_MAGIC {
            return Err(corrupted("bad magic"));
        }

        let next_table_id = get_u32(buf).ok_or_else(|| corrupted("missing table id counter"))?;
        let count = get_u32(buf).ok_or_else(|| corrupted("missing table count"))?;

        let mut catalog = Self {
            next_table_id,
            ..Self::default()
        };
        for _ in 0..count {
            let schema = TableSchema::decode(buf)?;
            let page_count = get_u32(buf).ok_or_else(|| corrupted("missing page count"))?;
            if schema.table_id().as_u32() >= next_table_id {
                return Err(corrupted("table id beyond counter"));
            }
            catalog.insert_entry(Arc::new(schema), page_count);
        }

        Ok(catalog)
    }
}
