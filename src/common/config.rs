use std::path::{Path, PathBuf};

use super::error::{Result, TabulaError};

/// Default size of a page in bytes (4 KB)
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Largest page size addressable by the u16 slot offsets
pub const MAX_PAGE_SIZE: usize = u16::MAX as usize;

/// Bytes at the start of every page holding the entry count
pub const PAGE_HEADER_SIZE: usize = 4;

/// Per-record pointer overhead: u16 offset + u16 length
pub const SLOT_SIZE: usize = 4;

/// Default buffer pool size (number of resident pages)
pub const DEFAULT_BUFFER_POOL_SIZE: usize = 10;

/// Default B+ tree order (a node splits when it reaches this many keys)
pub const DEFAULT_INDEX_ORDER: usize = 64;

/// Smallest order for which the occupancy rules are meaningful
pub const MIN_INDEX_ORDER: usize = 3;

/// Name of the catalog file inside the data directory
pub const CATALOG_FILE_NAME: &str = "catalog.tbl";

/// Storage configuration for a database instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    /// Directory holding the catalog, data files and index files.
    pub data_dir: PathBuf,
    /// Page size in bytes.
    pub page_size: usize,
    /// Buffer pool size in number of pages.
    pub buffer_pool_pages: usize,
    /// B+ tree order used for tables that do not pick their own.
    pub index_order: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            page_size: DEFAULT_PAGE_SIZE,
            buffer_pool_pages: DEFAULT_BUFFER_POOL_SIZE,
            index_order: DEFAULT_INDEX_ORDER,
        }
    }
}

impl StorageConfig {
    /// Creates a configuration rooted at `data_dir` with default sizes.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_buffer_pool_pages(mut self, pages: usize) -> Self {
        self.buffer_pool_pages = pages;
        self
    }

    pub fn with_index_order(mut self, order: usize) -> Self {
        self.index_order = order;
        self
    }

    /// Checks that every size is usable by the page layout and the tree.
    pub fn validate(&self) -> Result<()> {
        if self.page_size <= PAGE_HEADER_SIZE + SLOT_SIZE || self.page_size > MAX_PAGE_SIZE {
            return Err(TabulaError::InvalidConfig(format!(
                "page size {} must be in ({}, {}]",
                self.page_size,
                PAGE_HEADER_SIZE + SLOT_SIZE,
                MAX_PAGE_SIZE
            )));
        }
        if self.buffer_pool_pages == 0 {
            return Err(TabulaError::InvalidConfig(
                "buffer pool must hold at least one page".to_string(),
            ));
        }
        if self.index_order < MIN_INDEX_ORDER {
            return Err(TabulaError::InvalidConfig(format!(
                "index order {} is below the minimum of {}",
                self.index_order, MIN_INDEX_ORDER
            )));
        }
        Ok(())
    }

    /// Path of the catalog file.
    pub fn catalog_path(&self) -> PathBuf {
        self.data_dir.join(CATALOG_FILE_NAME)
    }

    /// Path of a table's data file.
    pub fn data_path(&self, table_id: u32) -> PathBuf {
        table_file(&self.data_dir, table_id, "data")
    }

    /// Path of a table's index file.
    pub fn index_path(&self, table_id: u32) -> PathBuf {
        table_file(&self.data_dir, table_id, "idx")
    }
}

fn table_file(dir: &Path, table_id: u32, extension: &str) -> PathBuf {
    dir.join(format!("{}.{}", table_id, extension))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = StorageConfig::default();
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.buffer_pool_pages, DEFAULT_BUFFER_POOL_SIZE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_sizes() {
        let config = StorageConfig::new("/tmp/x").with_page_size(4);
        assert!(matches!(config.validate(), Err(TabulaError::InvalidConfig(_))));

        let config = StorageConfig::new("/tmp/x").with_page_size(MAX_PAGE_SIZE + 1);
        assert!(config.validate().is_err());

        let config = StorageConfig::new("/tmp/x").with_buffer_pool_pages(0);
        assert!(config.validate().is_err());

        let config = StorageConfig::new("/tmp/x").with_index_order(2);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_file_paths() {
        let config = StorageConfig::new("/var/db");
        assert_eq!(config.catalog_path(), PathBuf::from("/var/db/catalog.tbl"));
        assert_eq!(config.data_path(3), PathBuf::from("/var/db/3.data"));
        assert_eq!(config.index_path(3), PathBuf::from("/var/db/3.idx"));
    }
}
