use std::collections::HashMap;
use std::sync::Arc;

use bytes::{Buf, BufMut};

use crate::common::codec::{get_str, get_u16, get_u32, get_u8, put_str};
use crate::common::{Result, TableId, TabulaError, DEFAULT_INDEX_ORDER, MIN_INDEX_ORDER};
use crate::record::{DataType, Value};

const FLAG_PRIMARY_KEY: u8 = 0b001;
const FLAG_UNIQUE: u8 = 0b010;
const FLAG_NULLABLE: u8 = 0b100;

/// Represents a single attribute in a table schema.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeSchema {
    /// Attribute name
    name: String,

    /// Attribute data type
    data_type: DataType,

    /// Whether this attribute is the table's primary key
    primary_key: bool,

    /// Whether values must be unique across the table
    unique: bool,

    /// Whether the attribute allows NULL values
    nullable: bool,

    /// Value used when a record leaves the attribute unset
    default: Option<Value>,
}

impl AttributeSchema {
    /// Creates a nullable, non-key attribute definition.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            primary_key: false,
            unique: false,
            nullable: true,
            default: None,
        }
    }

    /// Marks the attribute as the primary key (implies unique, not null).
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.unique = true;
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// Declared size of a value of this attribute in bytes.
    pub fn size(&self) -> usize {
        self.data_type.size()
    }

    /// Type-checks and size-checks a value against this attribute,
    /// returning the value converted to the attribute's type.
    pub fn check(&self, value: Value) -> Result<Value> {
        if value.is_null() {
            if !self.nullable {
                return Err(TabulaError::InvalidType(format!(
                    "attribute {} cannot be null",
                    self.name
                )));
            }
            return Ok(Value::Null);
        }
        value.cast(&self.data_type).ok_or_else(|| {
            TabulaError::InvalidType(format!(
                "{} value {} does not fit attribute {} of type {}",
                value.kind(),
                value,
                self.name,
                self.data_type
            ))
        })
    }

    /// Format: name + data_type + flags (1 byte) + has_default (1 byte)
    /// + optional tagged default value
    fn encode(&self, buf: &mut impl BufMut) {
        put_str(buf, &self.name);
        self.data_type.encode(buf);

        let mut flags = 0;
        if self.primary_key {
            flags |= FLAG_PRIMARY_KEY;
        }
        if self.unique {
            flags |= FLAG_UNIQUE;
        }
        if self.nullable {
            flags |= FLAG_NULLABLE;
        }
        buf.put_u8(flags);

        match &self.default {
            Some(value) => {
                buf.put_u8(1);
                value.encode_tagged(buf);
            }
            None => buf.put_u8(0),
        }
    }

    fn decode(buf: &mut impl Buf) -> Option<Self> {
        let name = get_str(buf)?;
        let data_type = DataType::decode(buf)?;
        let flags = get_u8(buf)?;
        let default = match get_u8(buf)? {
            0 => None,
            _ => Some(Value::decode_tagged(buf)?),
        };

        Some(Self {
            name,
            data_type,
            primary_key: flags & FLAG_PRIMARY_KEY != 0,
            unique: flags & FLAG_UNIQUE != 0,
            nullable: flags & FLAG_NULLABLE != 0,
            default,
        })
    }
}

/// Represents the schema of a table: its attributes, primary key and the
/// order of its B+ tree index.
#[derive(Debug, Clone)]
pub struct TableSchema {
    table_id: TableId,

    name: String,

    /// Ordered list of attributes
    attributes: Vec<Arc<AttributeSchema>>,

    /// Map from attribute name to attribute index for fast lookup
    name_to_index: HashMap<String, usize>,

    primary_key_index: usize,

    /// B+ tree order chosen when the table was created
    index_order: usize,

    /// Size of the null bitmap in bytes (ceiling of attribute_count / 8)
    null_bitmap_size: usize,

    /// Bytes occupied by every record of this table
    record_size: usize,
}

impl TableSchema {
    /// Creates a schema builder for fluent construction.
    pub fn builder(name: impl Into<String>) -> TableSchemaBuilder {
        TableSchemaBuilder::new(name)
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index_order(&self) -> usize {
        self.index_order
    }

    /// Returns the number of attributes in the schema.
    pub fn attribute_count(&self) -> usize {
        self.attributes.len()
    }

    /// Returns the attribute at the given index.
    pub fn attribute(&self, index: usize) -> Option<&Arc<AttributeSchema>> {
        self.attributes.get(index)
    }

    /// Returns the attribute with the given name.
    pub fn attribute_by_name(&self, name: &str) -> Option<&Arc<AttributeSchema>> {
        self.name_to_index
            .get(name)
            .and_then(|&i| self.attributes.get(i))
    }

    /// Returns the index of the attribute with the given name.
    pub fn attribute_index(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    /// Returns an iterator over all attributes.
    pub fn attributes(&self) -> impl Iterator<Item = &Arc<AttributeSchema>> {
        self.attributes.iter()
    }

    pub fn primary_key_index(&self) -> usize {
        self.primary_key_index
    }

    pub fn primary_key_attribute(&self) -> &Arc<AttributeSchema> {
        &self.attributes[self.primary_key_index]
    }

    /// Returns the size of the null bitmap in bytes.
    pub fn null_bitmap_size(&self) -> usize {
        self.null_bitmap_size
    }

    /// Size in bytes of every record of this table: null bitmap plus the
    /// declared size of each attribute.
    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Format: table_id (4) + name + index_order (4) + attribute_count (2)
    /// + [attribute...]
    pub(crate) fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u32_le(self.table_id.as_u32());
        put_str(buf, &self.name);
        buf.put_u32_le(self.index_order as u32);
        buf.put_u16_le(self.attributes.len() as u16);
        for attribute in &self.attributes {
            attribute.encode(buf);
        }
    }

    pub(crate) fn decode(buf: &mut impl Buf) -> Result<Self> {
        let corrupted = || TabulaError::CatalogCorrupted("truncated table schema".to_string());

        let table_id = TableId::new(get_u32(buf).ok_or_else(corrupted)?);
        let name = get_str(buf).ok_or_else(corrupted)?;
        let index_order = get_u32(buf).ok_or_else(corrupted)? as usize;
        let count = get_u16(buf).ok_or_else(corrupted)? as usize;

        let mut builder = TableSchemaBuilder::new(name).index_order(index_order);
        for _ in 0..count {
            builder = builder.attribute(AttributeSchema::decode(buf).ok_or_else(corrupted)?);
        }

        builder
            .build_for(table_id, index_order)
            .map_err(|e| TabulaError::CatalogCorrupted(e.to_string()))
    }
}

impl PartialEq for TableSchema {
    fn eq(&self, other: &Self) -> bool {
        self.table_id == other.table_id
            && self.name == other.name
            && self.index_order == other.index_order
            && self.attributes == other.attributes
    }
}

/// Builder for constructing schemas fluently.
pub struct TableSchemaBuilder {
    name: String,
    attributes: Vec<AttributeSchema>,
    index_order: Option<usize>,
}

impl TableSchemaBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            index_order: None,
        }
    }

    pub fn attribute(mut self, attribute: AttributeSchema) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Adds the primary key attribute.
    pub fn primary_key(self, name: impl Into<String>, data_type: DataType) -> Self {
        self.attribute(AttributeSchema::new(name, data_type).primary_key())
    }

    /// Adds a non-nullable attribute.
    pub fn column(self, name: impl Into<String>, data_type: DataType) -> Self {
        self.attribute(AttributeSchema::new(name, data_type).not_null())
    }

    /// Adds a nullable attribute.
    pub fn nullable_column(self, name: impl Into<String>, data_type: DataType) -> Self {
        self.attribute(AttributeSchema::new(name, data_type))
    }

    /// Fixes the B+ tree order for this table.
    pub fn index_order(mut self, order: usize) -> Self {
        self.index_order = Some(order);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Builds a detached schema (table id 0), as used before the catalog
    /// assigns an id.
    pub fn build(self) -> Result<TableSchema> {
        self.build_for(TableId::new(0), DEFAULT_INDEX_ORDER)
    }

    /// Builds the schema wrapped in an Arc for shared ownership.
    pub fn build_arc(self) -> Result<Arc<TableSchema>> {
        self.build().map(Arc::new)
    }

    /// Validates the attributes and builds the schema for `table_id`,
    /// using `default_order` unless an order was set explicitly.
    pub(crate) fn build_for(self, table_id: TableId, default_order: usize) -> Result<TableSchema> {
        let invalid = |msg: String| TabulaError::InvalidSchema(format!("{}: {}", self.name, msg));

        if self.name.is_empty() {
            return Err(TabulaError::InvalidSchema("table name is empty".to_string()));
        }
        if self.attributes.is_empty() {
            return Err(invalid("no attributes".to_string()));
        }

        let index_order = self.index_order.unwrap_or(default_order);
        if index_order < MIN_INDEX_ORDER {
            return Err(invalid(format!(
                "index order {} is below the minimum of {}",
                index_order, MIN_INDEX_ORDER
            )));
        }

        let mut name_to_index = HashMap::new();
        let mut primary_keys = Vec::new();
        for (i, attribute) in self.attributes.iter().enumerate() {
            if name_to_index.insert(attribute.name.clone(), i).is_some() {
                return Err(invalid(format!("duplicate attribute {}", attribute.name)));
            }
            if attribute.primary_key {
                primary_keys.push(i);
            }
            if let DataType::Char(0) | DataType::VarChar(0) = attribute.data_type {
                return Err(invalid(format!("attribute {} has zero length", attribute.name)));
            }
            if let Some(default) = &attribute.default {
                attribute.check(default.clone())?;
            }
        }

        let primary_key_index = match primary_keys.as_slice() {
            [index] => *index,
            [] => return Err(invalid("no primary key".to_string())),
            _ => return Err(invalid("more than one primary key".to_string())),
        };

        // Null bitmap: 1 bit per attribute, rounded up to bytes
        let null_bitmap_size = (self.attributes.len() + 7) / 8;
        let record_size =
            null_bitmap_size + self.attributes.iter().map(|a| a.size()).sum::<usize>();

        Ok(TableSchema {
            table_id,
            name: self.name,
            attributes: self.attributes.into_iter().map(Arc::new).collect(),
            name_to_index,
            primary_key_index,
            index_order,
            null_bitmap_size,
            record_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_schema() -> TableSchema {
        TableSchema::builder("students")
            .primary_key("id", DataType::Integer)
            .column("name", DataType::VarChar(20))
            .nullable_column("gpa", DataType::Double)
            .attribute(AttributeSchema::new("active", DataType::Boolean).with_default(true))
            .build()
            .unwrap()
    }

    #[test]
    fn test_schema_creation() {
        let schema = create_test_schema();

        assert_eq!(schema.attribute_count(), 4);
        assert_eq!(schema.attribute(0).unwrap().name(), "id");
        assert_eq!(schema.primary_key_index(), 0);
        assert!(schema.primary_key_attribute().is_unique());
        assert!(!schema.primary_key_attribute().is_nullable());
        assert_eq!(schema.attribute_index("gpa"), Some(2));
        assert_eq!(schema.attribute_index("missing"), None);
        assert_eq!(schema.index_order(), DEFAULT_INDEX_ORDER);
    }

    #[test]
    fn test_record_size() {
        let schema = create_test_schema();
        // bitmap (1) + id (4) + name (2 + 20) + gpa (8) + active (1)
        assert_eq!(schema.null_bitmap_size(), 1);
        assert_eq!(schema.record_size(), 36);
    }

    #[test]
    fn test_primary_key_rules() {
        let none = TableSchema::builder("t")
            .column("a", DataType::Integer)
            .build();
        assert!(matches!(none, Err(TabulaError::InvalidSchema(_))));

        let two = TableSchema::builder("t")
            .primary_key("a", DataType::Integer)
            .primary_key("b", DataType::Integer)
            .build();
        assert!(matches!(two, Err(TabulaError::InvalidSchema(_))));
    }

    #[test]
    fn test_duplicate_attribute_rejected() {
        let result = TableSchema::builder("t")
            .primary_key("a", DataType::Integer)
            .column("a", DataType::Double)
            .build();
        assert!(matches!(result, Err(TabulaError::InvalidSchema(_))));
    }

    #[test]
    fn test_bad_default_rejected() {
        let result = TableSchema::builder("t")
            .primary_key("a", DataType::Integer)
            .attribute(AttributeSchema::new("b", DataType::Boolean).with_default(3))
            .build();
        assert!(matches!(result, Err(TabulaError::InvalidType(_))));
    }

    #[test]
    fn test_small_order_rejected() {
        let result = TableSchema::builder("t")
            .primary_key("a", DataType::Integer)
            .index_order(2)
            .build();
        assert!(matches!(result, Err(TabulaError::InvalidSchema(_))));
    }

    #[test]
    fn test_check_value() {
        let schema = create_test_schema();
        let id = schema.attribute(0).unwrap();
        assert!(id.check(Value::Null).is_err());
        assert_eq!(id.check(Value::Integer(3)).unwrap(), Value::Integer(3));

        let gpa = schema.attribute(2).unwrap();
        assert_eq!(gpa.check(Value::Integer(3)).unwrap(), Value::Double(3.0));
        assert_eq!(gpa.check(Value::Null).unwrap(), Value::Null);

        let name = schema.attribute(1).unwrap();
        assert!(matches!(
            name.check(Value::from("x".repeat(21))),
            Err(TabulaError::InvalidType(_))
        ));
    }

    #[test]
    fn test_encoding_roundtrip() {
        let schema = TableSchema::builder("students")
            .primary_key("id", DataType::Integer)
            .column("name", DataType::Char(12))
            .attribute(AttributeSchema::new("gpa", DataType::Double).with_default(0.0))
            .index_order(7)
            .build_for(TableId::new(3), DEFAULT_INDEX_ORDER)
            .unwrap();

        let mut buf = Vec::new();
        schema.encode(&mut buf);
        let recovered = TableSchema::decode(&mut buf.as_slice()).unwrap();

        assert_eq!(schema, recovered);
        assert_eq!(recovered.table_id(), TableId::new(3));
        assert_eq!(recovered.index_order(), 7);
        assert_eq!(recovered.record_size(), schema.record_size());
    }

    #[test]
    fn test_decode_truncated() {
        let schema = create_test_schema();
        let mut buf = Vec::new();
        schema.encode(&mut buf);
        buf.truncate(buf.len() - 3);
        assert!(matches!(
            TableSchema::decode(&mut buf.as_slice()),
            Err(TabulaError::CatalogCorrupted(_))
        ));
    }
}
