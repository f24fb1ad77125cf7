//! Integration tests for records and schemas

use std::sync::Arc;

use tabula::catalog::{AttributeSchema, TableSchema};
use tabula::common::TabulaError;
use tabula::record::{DataType, PrimaryKey, Record, Value};

fn employees() -> Arc<TableSchema> {
    TableSchema::builder("employees")
        .primary_key("code", DataType::Char(6))
        .column("name", DataType::VarChar(20))
        .column("salary", DataType::Double)
        .attribute(AttributeSchema::new("active", DataType::Boolean).with_default(true))
        .nullable_column("manager", DataType::Char(6))
        .build_arc()
        .unwrap()
}

#[test]
fn test_type_names_parse() {
    let parsed: Vec<DataType> = ["INT", "double", "Bool", "char(6)", "VARCHAR( 20 )"]
        .iter()
        .map(|name| name.parse().unwrap())
        .collect();
    assert_eq!(
        parsed,
        vec![
            DataType::Integer,
            DataType::Double,
            DataType::Boolean,
            DataType::Char(6),
            DataType::VarChar(20)
        ]
    );

    for bad in ["text", "char", "char(0)", "varchar(x)", "char(70000)"] {
        assert!(
            matches!(bad.parse::<DataType>(), Err(TabulaError::InvalidType(_))),
            "{} should not parse",
            bad
        );
    }
}

#[test]
fn test_record_size_is_fixed_per_schema() {
    let schema = employees();
    // bitmap 1 + char 6 + varchar 22 + double 8 + bool 1 + char 6
    assert_eq!(schema.record_size(), 44);

    let short = Record::builder(schema.clone())
        .set("code", "A1")
        .set("name", "Al")
        .set("salary", 10)
        .build()
        .unwrap();
    let long = Record::builder(schema.clone())
        .set("code", "ZZ9999")
        .set("name", "Bartholomew Jenkins")
        .set("salary", 99_000.5)
        .set("manager", "A1")
        .build()
        .unwrap();

    assert_eq!(short.size(), 44);
    assert_eq!(long.size(), 44);
    assert_eq!(short.to_bytes().len(), long.to_bytes().len());
}

#[test]
fn test_bytes_preserve_values() {
    let schema = employees();
    let record = Record::builder(schema.clone())
        .set("code", "B2")
        .set("name", "Bea ")
        .set("salary", 52_000.25)
        .set("active", false)
        .build()
        .unwrap();

    let decoded = Record::from_bytes(schema, &record.to_bytes()).unwrap();
    assert_eq!(decoded.value_by_name("code"), Some(&Value::from("B2")));
    // VarChar keeps trailing spaces, Char does not
    assert_eq!(decoded.value_by_name("name"), Some(&Value::from("Bea ")));
    assert_eq!(decoded.value_by_name("salary"), Some(&Value::Double(52_000.25)));
    assert_eq!(decoded.value_by_name("active"), Some(&Value::Boolean(false)));
    assert_eq!(decoded.value_by_name("manager"), Some(&Value::Null));
    assert_eq!(decoded.primary_key(), PrimaryKey::from("B2"));
}

#[test]
fn test_constraints() {
    let schema = employees();

    let missing_name = Record::builder(schema.clone())
        .set("code", "C3")
        .set("salary", 1.0)
        .build();
    assert!(matches!(missing_name, Err(TabulaError::InvalidType(_))));

    let long_code = Record::builder(schema.clone())
        .set("code", "TOOLONG")
        .set("name", "x")
        .set("salary", 1.0)
        .build();
    assert!(matches!(long_code, Err(TabulaError::InvalidType(_))));

    let bad_salary = Record::new(
        schema,
        vec![
            Value::from("D4"),
            Value::from("x"),
            Value::from("lots"),
            Value::Boolean(true),
            Value::Null,
        ],
    );
    assert!(matches!(bad_salary, Err(TabulaError::InvalidType(_))));
}

#[test]
fn test_schema_rules() {
    let no_key = TableSchema::builder("t")
        .column("a", DataType::Integer)
        .build();
    assert!(matches!(no_key, Err(TabulaError::InvalidSchema(_))));

    let two_keys = TableSchema::builder("t")
        .primary_key("a", DataType::Integer)
        .primary_key("b", DataType::Integer)
        .build();
    assert!(matches!(two_keys, Err(TabulaError::InvalidSchema(_))));
}

#[test]
fn test_primary_key_order_is_total() {
    let mut keys = vec![
        PrimaryKey::from("b"),
        PrimaryKey::from(3),
        PrimaryKey::new(Value::Double(-0.5)).unwrap(),
        PrimaryKey::from("a"),
        PrimaryKey::from(-7),
    ];
    keys.sort();

    let sorted_again = {
        let mut copy = keys.clone();
        copy.sort();
        copy
    };
    assert_eq!(keys, sorted_again);
    assert!(PrimaryKey::from(-7) < PrimaryKey::from(3));
    assert!(PrimaryKey::from("a") < PrimaryKey::from("b"));
    assert!(PrimaryKey::new(Value::Null).is_err());
}
