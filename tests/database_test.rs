//! Integration tests for the database context

use std::sync::Arc;
use std::thread;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use tabula::catalog::{TableSchema, TableSchemaBuilder};
use tabula::common::{StorageConfig, TableId, TabulaError};
use tabula::record::{DataType, PrimaryKey, Record, Value};
use tabula::Database;
use tempfile::TempDir;

const PAGE_SIZE: usize = 128;

fn config(dir: &TempDir) -> StorageConfig {
    StorageConfig::new(dir.path())
        .with_page_size(PAGE_SIZE)
        .with_buffer_pool_pages(4)
        .with_index_order(4)
}

fn accounts() -> TableSchemaBuilder {
    TableSchema::builder("accounts")
        .primary_key("id", DataType::Integer)
        .column("owner", DataType::Char(12))
}

fn account(schema: &Arc<TableSchema>, id: i32) -> Record {
    Record::new(
        Arc::clone(schema),
        vec![Value::Integer(id), Value::from(format!("owner-{}", id))],
    )
    .unwrap()
}

fn ids(records: &[Record]) -> Vec<i32> {
    records
        .iter()
        .map(|r| match r.primary_key().value() {
            Value::Integer(id) => *id,
            other => panic!("unexpected key {}", other),
        })
        .collect()
}

#[test]
fn test_open_rejects_bad_config() {
    let dir = TempDir::new().unwrap();
    let bad = StorageConfig::new(dir.path()).with_buffer_pool_pages(0);
    assert!(matches!(Database::open(bad), Err(TabulaError::InvalidConfig(_))));

    let bad = StorageConfig::new(dir.path()).with_index_order(2);
    assert!(matches!(Database::open(bad), Err(TabulaError::InvalidConfig(_))));
}

#[test]
fn test_ddl() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(config(&dir)).unwrap();

    let first = db.create_table(accounts()).unwrap();
    let second = db
        .create_table(
            TableSchema::builder("tags")
                .primary_key("tag", DataType::VarChar(8))
                .index_order(3),
        )
        .unwrap();
    assert_ne!(first.table_id(), second.table_id());
    assert_eq!(first.index_order(), 4);
    assert_eq!(second.index_order(), 3);

    assert!(matches!(
        db.create_table(accounts()),
        Err(TabulaError::TableAlreadyExists(_))
    ));
    assert_eq!(db.table_id("tags").unwrap(), second.table_id());
    assert_eq!(db.schema(first.table_id()).unwrap(), first);

    db.drop_table(first.table_id()).unwrap();
    assert!(matches!(db.table_id("accounts"), Err(TabulaError::NoTable(_))));
    assert!(matches!(
        db.insert(first.table_id(), account(&first, 1)),
        Err(TabulaError::NoTable(_))
    ));
    assert!(!dir.path().join(format!("{}.data", first.table_id().as_u32())).exists());
    assert_eq!(db.tables().len(), 1);

    // A new table gets a fresh id
    let again = db.create_table(accounts()).unwrap();
    assert!(again.table_id() > second.table_id());
}

#[test]
fn test_oversized_record_rejected() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(config(&dir)).unwrap();
    let schema = db
        .create_table(
            TableSchema::builder("blobs")
                .primary_key("id", DataType::Integer)
                .column("body", DataType::Char(200)),
        )
        .unwrap();

    let record = Record::new(
        Arc::clone(&schema),
        vec![Value::Integer(1), Value::from("x")],
    )
    .unwrap();
    let result = db.insert(schema.table_id(), record);
    assert!(matches!(
        result,
        Err(TabulaError::PageOverfull { record_size: 205, .. })
    ));
    assert_eq!(db.page_count(schema.table_id()).unwrap(), 0);
}

#[test]
fn test_many_inserts_split_pages() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(config(&dir)).unwrap();
    let schema = db.create_table(accounts()).unwrap();
    let table_id = schema.table_id();

    let mut keys: Vec<i32> = (0..200).collect();
    keys.shuffle(&mut StdRng::seed_from_u64(3));
    for &id in &keys {
        db.insert(table_id, account(&schema, id)).unwrap();
    }

    // 5 records fit a page, so at least 40 pages
    assert!(db.page_count(table_id).unwrap() >= 40);
    let all = db.get_all_records(table_id).unwrap();
    assert_eq!(ids(&all), (0..200).collect::<Vec<_>>());

    for id in [0, 57, 133, 199] {
        let found = db
            .get_by_primary_key(table_id, &PrimaryKey::from(id))
            .unwrap();
        assert_eq!(found, Some(account(&schema, id)));
    }
    let range = db
        .get_range(table_id, &PrimaryKey::from(95), &PrimaryKey::from(104))
        .unwrap();
    assert_eq!(ids(&range), (95..=104).collect::<Vec<_>>());
}

#[test]
fn test_delete_update_cycle() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(config(&dir)).unwrap();
    let schema = db.create_table(accounts()).unwrap();
    let table_id = schema.table_id();

    for id in 0..60 {
        db.insert(table_id, account(&schema, id)).unwrap();
    }
    for id in (0..60).filter(|id| id % 2 == 1) {
        db.delete(table_id, &PrimaryKey::from(id)).unwrap();
    }
    for id in (0..60).step_by(10) {
        let renamed = account(&schema, id).with_value("owner", "renamed").unwrap();
        db.update(table_id, renamed).unwrap();
    }

    let all = db.get_all_records(table_id).unwrap();
    assert_eq!(ids(&all), (0..60).step_by(2).collect::<Vec<_>>());
    let owner = |id: i32| {
        db.get_by_primary_key(table_id, &PrimaryKey::from(id))
            .unwrap()
            .and_then(|r| r.value_by_name("owner").cloned())
    };
    assert_eq!(owner(20), Some(Value::from("renamed")));
    assert_eq!(owner(22), Some(Value::from("owner-22")));
    assert_eq!(owner(21), None);

    // Deleted keys can be inserted again
    db.insert(table_id, account(&schema, 21)).unwrap();
    assert_eq!(owner(21), Some(Value::from("owner-21")));
}

#[test]
fn test_flush_and_reopen() {
    let dir = TempDir::new().unwrap();
    let table_id;
    {
        let db = Database::open(config(&dir)).unwrap();
        let schema = db.create_table(accounts()).unwrap();
        table_id = schema.table_id();
        for id in (0..100).rev() {
            db.insert(table_id, account(&schema, id)).unwrap();
        }
        db.delete(table_id, &PrimaryKey::from(50)).unwrap();
        db.flush().unwrap();
    }
    assert!(dir.path().join("catalog.tbl").exists());
    assert!(dir.path().join(format!("{}.idx", table_id.as_u32())).exists());

    let db = Database::open(config(&dir)).unwrap();
    assert_eq!(db.table_id("accounts").unwrap(), table_id);
    let all = db.get_all_records(table_id).unwrap();
    let expected: Vec<i32> = (0..100).filter(|&id| id != 50).collect();
    assert_eq!(ids(&all), expected);
    assert_eq!(
        db.get_by_primary_key(table_id, &PrimaryKey::from(99))
            .unwrap()
            .map(|r| r.primary_key()),
        Some(PrimaryKey::from(99))
    );
}

#[test]
fn test_unflushed_changes_rebuild_the_index() {
    let dir = TempDir::new().unwrap();
    let table_id;
    {
        let db = Database::open(config(&dir)).unwrap();
        let schema = db.create_table(accounts()).unwrap();
        table_id = schema.table_id();
        for id in 0..30 {
            db.insert(table_id, account(&schema, id)).unwrap();
        }
        db.flush().unwrap();

        // Changes after the flush reach disk only through evictions
        db.insert(table_id, account(&schema, 30)).unwrap();
        db.delete(table_id, &PrimaryKey::from(0)).unwrap();
    }
    assert!(!dir.path().join(format!("{}.idx", table_id.as_u32())).exists());

    let db = Database::open(config(&dir)).unwrap();
    let schema = db.schema(table_id).unwrap();
    let all = db.get_all_records(table_id).unwrap();
    let stored = ids(&all);

    // Whatever reached disk is indexed consistently
    for &id in &stored {
        assert!(db
            .get_by_primary_key(table_id, &PrimaryKey::from(id))
            .unwrap()
            .is_some());
    }
    assert!(matches!(
        db.insert(table_id, account(&schema, 15)),
        Err(TabulaError::DuplicateKey(_))
    ));
}

#[test]
fn test_missing_index_file_is_rebuilt() {
    let dir = TempDir::new().unwrap();
    let table_id;
    {
        let db = Database::open(config(&dir)).unwrap();
        let schema = db.create_table(accounts()).unwrap();
        table_id = schema.table_id();
        for id in 0..25 {
            db.insert(table_id, account(&schema, id * 2)).unwrap();
        }
        db.flush().unwrap();
    }
    std::fs::remove_file(dir.path().join(format!("{}.idx", table_id.as_u32()))).unwrap();

    let db = Database::open(config(&dir)).unwrap();
    let schema = db.schema(table_id).unwrap();
    assert!(db
        .get_by_primary_key(table_id, &PrimaryKey::from(48))
        .unwrap()
        .is_some());
    db.insert(table_id, account(&schema, 13)).unwrap();
    let range = db
        .get_range(table_id, &PrimaryKey::from(10), &PrimaryKey::from(16))
        .unwrap();
    assert_eq!(ids(&range), vec![10, 12, 13, 14, 16]);
}

#[test]
fn test_corrupted_index_file_is_rebuilt() {
    let dir = TempDir::new().unwrap();
    let table_id;
    {
        let db = Database::open(config(&dir)).unwrap();
        let schema = db.create_table(accounts()).unwrap();
        table_id = schema.table_id();
        for id in 0..12 {
            db.insert(table_id, account(&schema, id)).unwrap();
        }
        db.flush().unwrap();
    }
    std::fs::write(dir.path().join(format!("{}.idx", table_id.as_u32())), b"garbage").unwrap();

    let db = Database::open(config(&dir)).unwrap();
    assert_eq!(db.get_all_records(table_id).unwrap().len(), 12);
    assert!(db
        .get_by_primary_key(table_id, &PrimaryKey::from(11))
        .unwrap()
        .is_some());
}

#[test]
fn test_string_keys() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(config(&dir)).unwrap();
    let schema = db
        .create_table(
            TableSchema::builder("words")
                .primary_key("word", DataType::VarChar(10))
                .nullable_column("count", DataType::Integer),
        )
        .unwrap();
    let table_id = schema.table_id();

    let words = ["pear", "apple", "fig", "plum", "kiwi", "lime", "date", "grape", "melon"];
    for word in words {
        let record = Record::builder(Arc::clone(&schema)).value(word).build().unwrap();
        db.insert(table_id, record).unwrap();
    }

    let all = db.get_all_records(table_id).unwrap();
    let stored: Vec<_> = all.iter().map(Record::primary_key).collect();
    let mut expected: Vec<_> = words.iter().map(|&w| PrimaryKey::from(w)).collect();
    expected.sort();
    assert_eq!(stored, expected);
}

#[test]
fn test_char_key_padding_survives_flush() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir).with_buffer_pool_pages(2);
    let db = Database::open(config.clone()).unwrap();
    let schema = db
        .create_table(
            TableSchema::builder("codes")
                .primary_key("code", DataType::Char(4))
                .column("label", DataType::Char(8)),
        )
        .unwrap();
    let table_id = schema.table_id();
    let code = |key: &str, label: &str| {
        Record::new(Arc::clone(&schema), vec![Value::from(key), Value::from(label)]).unwrap()
    };

    db.insert(table_id, code("a ", "x  ")).unwrap();
    db.flush().unwrap();

    for key in ["a ", "a"] {
        let found = db.get_by_primary_key(table_id, &PrimaryKey::from(key)).unwrap();
        assert_eq!(found.unwrap().value_by_name("label"), Some(&Value::from("x")));
    }
    assert!(matches!(
        db.insert(table_id, code("a", "y")),
        Err(TabulaError::DuplicateKey(_))
    ));

    db.insert(table_id, code("b", "z")).unwrap();
    db.flush().unwrap();
    assert_eq!(db.get_all_records(table_id).unwrap().len(), 2);
    drop(db);

    let db = Database::open(config).unwrap();
    let removed = db.delete(table_id, &PrimaryKey::from("a  ")).unwrap();
    assert_eq!(removed.primary_key(), PrimaryKey::from("a"));
    assert_eq!(db.get_all_records(table_id).unwrap().len(), 1);
}

#[test]
fn test_concurrent_tables() {
    let dir = TempDir::new().unwrap();
    let db = Arc::new(Database::open(config(&dir)).unwrap());
    let schemas: Vec<_> = (0..3)
        .map(|n| {
            db.create_table(
                TableSchema::builder(format!("t{}", n))
                    .primary_key("id", DataType::Integer)
                    .column("owner", DataType::Char(12)),
            )
            .unwrap()
        })
        .collect();

    let handles: Vec<_> = schemas
        .iter()
        .cloned()
        .map(|schema| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                for id in 0..80 {
                    db.insert(schema.table_id(), account(&schema, id)).unwrap();
                }
                for id in (0..80).step_by(4) {
                    db.delete(schema.table_id(), &PrimaryKey::from(id)).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    db.flush().unwrap();

    let expected: Vec<i32> = (0..80).filter(|id| id % 4 != 0).collect();
    for schema in &schemas {
        let all = db.get_all_records(schema.table_id()).unwrap();
        assert_eq!(ids(&all), expected);
    }
}

#[test]
fn test_unknown_table_id() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(config(&dir)).unwrap();
    let missing = TableId::new(77);

    assert!(matches!(
        db.get_by_primary_key(missing, &PrimaryKey::from(1)),
        Err(TabulaError::NoTable(_))
    ));
    assert!(matches!(db.schema(missing), Err(TabulaError::NoTable(_))));
    assert!(matches!(db.flush(), Ok(())));
}
