use thiserror::Error;

use super::types::{PageId, TableId};

/// Database error types
#[derive(Error, Debug)]
pub enum TabulaError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Table {0} not found")]
    NoTable(String),

    #[error("Table {0} already exists")]
    TableAlreadyExists(String),

    #[error("Page overfull: record size {record_size} exceeds available space {available}")]
    PageOverfull { record_size: usize, available: usize },

    #[error("Page {page_id} of table {table_id} is out of range")]
    PageOutOfRange { table_id: TableId, page_id: PageId },

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Invalid type: {0}")]
    InvalidType(String),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Page corrupted: {0}")]
    PageCorrupted(String),

    #[error("Index corrupted: {0}")]
    IndexCorrupted(String),

    #[error("Catalog corrupted: {0}")]
    CatalogCorrupted(String),
}

impl TabulaError {
    /// Builds a `NoTable` error for a table id.
    pub fn no_table(table_id: TableId) -> Self {
        TabulaError::NoTable(table_id.as_u32().to_string())
    }
}

pub type Result<T> = std::result::Result<T, TabulaError>;
