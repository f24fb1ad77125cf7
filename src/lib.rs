//! Tabula - a page-oriented record store in Rust
//!
//! This crate provides the storage core of a small relational database:
//! typed records laid out in fixed-size pages, an LRU buffer pool in front
//! of the table files, and a B+Tree primary index that maps every key to
//! the page holding its record.
//!
//! # Architecture
//!
//! The system is organized into several layers:
//!
//! - **Records** (`record`): Typed values, attributes and records
//!   - `DataType`/`Value`: Column types and their fixed-width encoding
//!   - `Record`: A validated row, encoded to exactly its schema's record size
//!   - `PrimaryKey`: The totally ordered key of a record
//!
//! - **Catalog** (`catalog`): Table schemas and their persisted page counts
//!
//! - **Storage Layer** (`storage`): Pages and table files
//!   - `Page`: Key-ordered records with slotted on-disk layout
//!   - `Table`: One data file of fixed-size pages, with page splits
//!   - `TableRegistry`: The open tables, used as the buffer pool's page store
//!
//! - **Buffer Pool** (`buffer`): Memory management for pages
//!   - `BufferPool`: Caches pages of every table, writing back on eviction
//!   - `LruReplacer`: Least recently used victim selection
//!
//! - **Index** (`index`): A generic B+Tree and its file format
//!
//! - **Database** (`database`): Ties the layers together behind per-table
//!   record operations
//!
//! # Example
//!
//! ```rust,no_run
//! use tabula::catalog::TableSchema;
//! use tabula::record::{DataType, PrimaryKey, Record, Value};
//! use tabula::{Database, StorageConfig};
//!
//! let db = Database::open(StorageConfig::new("./data")).unwrap();
//! let schema = db
//!     .create_table(
//!         TableSchema::builder("users")
//!             .primary_key("id", DataType::Integer)
//!             .column("name", DataType::VarChar(32)),
//!     )
//!     .unwrap();
//!
//! let record = Record::new(schema.clone(), vec![Value::Integer(1), Value::from("ada")]).unwrap();
//! db.insert(schema.table_id(), record).unwrap();
//!
//! let found = db.get_by_primary_key(schema.table_id(), &PrimaryKey::from(1)).unwrap();
//! assert!(found.is_some());
//!
//! // Write pages, indexes and the catalog to disk
//! db.flush().unwrap();
//! ```

pub mod buffer;
pub mod catalog;
pub mod common;
pub mod database;
pub mod index;
pub mod record;
pub mod storage;

// Re-export commonly used types at the crate root
pub use common::{PageId, Result, StorageConfig, TableId, TabulaError};
pub use database::Database;
