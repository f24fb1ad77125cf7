use log::info;

use tabula::catalog::TableSchema;
use tabula::record::{DataType, PrimaryKey, Record, Value};
use tabula::{Database, StorageConfig};

fn main() -> tabula::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("Tabula - a page-oriented record store in Rust");
    println!("=============================================\n");

    let data_dir = std::env::temp_dir().join(format!("tabula-demo-{}", std::process::id()));
    let config = StorageConfig::new(&data_dir)
        .with_page_size(256)
        .with_buffer_pool_pages(4)
        .with_index_order(4);

    {
        let db = Database::open(config.clone())?;
        let schema = db.create_table(
            TableSchema::builder("planets")
                .primary_key("id", DataType::Integer)
                .column("name", DataType::Char(12))
                .nullable_column("moons", DataType::Integer),
        )?;
        let table_id = schema.table_id();
        println!("Created table {} ({})", schema.name(), table_id);

        let planets = [
            (3, "earth", Some(1)),
            (1, "mercury", None),
            (5, "jupiter", Some(95)),
            (2, "venus", None),
            (4, "mars", Some(2)),
            (8, "neptune", Some(16)),
            (6, "saturn", Some(146)),
            (7, "uranus", Some(28)),
        ];
        for (id, name, moons) in planets {
            let record = Record::new(
                schema.clone(),
                vec![Value::Integer(id), Value::from(name), Value::from(moons)],
            )?;
            db.insert(table_id, record)?;
        }
        println!(
            "Inserted {} records across {} page(s)",
            planets.len(),
            db.page_count(table_id)?
        );

        let removed = db.delete(table_id, &PrimaryKey::from(4))?;
        println!("Deleted {:?}", removed.value_by_name("name"));

        db.flush()?;
        info!("flushed demo database");
    }

    // Reopen and read everything back from disk
    let db = Database::open(config)?;
    let table_id = db.table_id("planets")?;
    println!("\nRecords after reopening:");
    for record in db.get_all_records(table_id)? {
        let values: Vec<String> = record
            .attributes()
            .iter()
            .map(|attribute| attribute.value().to_string())
            .collect();
        println!("  - {}", values.join(", "));
    }

    println!("\nInner planets:");
    for record in db.get_range(table_id, &PrimaryKey::from(1), &PrimaryKey::from(4))? {
        println!("  - {}", record.primary_key());
    }

    std::fs::remove_dir_all(&data_dir)?;
    println!("\nDemo completed successfully!");
    Ok(())
}
