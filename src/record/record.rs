use std::sync::Arc;

use crate::catalog::TableSchema;
use crate::common::{Result, TableId, TabulaError};

use super::{Attribute, PrimaryKey, Value};

/// Represents a single row of a table.
///
/// A record holds one attribute per schema attribute, in schema order, and
/// is validated against the schema when built. Records are immutable values:
/// layers exchange them by copy.
///
/// ## Record Binary Format
///
/// ```text
/// +----------------+------------------------------------------+
/// | Null Bitmap    | Attribute slots, in schema order         |
/// | (N bytes)      | (each exactly its declared size)         |
/// +----------------+------------------------------------------+
/// ```
///
/// - **Null Bitmap**: ceil(attribute_count / 8) bytes, 1 bit per attribute (1 = NULL)
/// - **Slots**: Char is space-padded, VarChar is a u16 length followed by
///   its declared number of bytes, NULL slots are zeroed
///
/// Every record of a table therefore encodes to exactly
/// [`TableSchema::record_size`] bytes.
#[derive(Debug, Clone)]
pub struct Record {
    /// The schema defining the structure of this record
    schema: Arc<TableSchema>,

    /// The attributes, in schema order
    attributes: Vec<Attribute>,
}

impl Record {
    /// Creates a record from values given in schema order, checking arity,
    /// types, declared lengths and null constraints.
    pub fn new(schema: Arc<TableSchema>, values: Vec<Value>) -> Result<Self> {
        if values.len() != schema.attribute_count() {
            return Err(TabulaError::InvalidType(format!(
                "table {} expects {} attributes, got {}",
                schema.name(),
                schema.attribute_count(),
                values.len()
            )));
        }

        let attributes = schema
            .attributes()
            .zip(values)
            .map(|(attribute, value)| {
                let value = attribute.check(value)?;
                Ok(Attribute::new(Arc::clone(attribute), value))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { schema, attributes })
    }

    /// Creates a record builder for the given schema.
    pub fn builder(schema: Arc<TableSchema>) -> RecordBuilder {
        RecordBuilder::new(schema)
    }

    /// Decodes a record from bytes written by [`Record::to_bytes`].
    pub fn from_bytes(schema: Arc<TableSchema>, data: &[u8]) -> Result<Self> {
        if data.len() != schema.record_size() {
            return Err(TabulaError::PageCorrupted(format!(
                "record of table {} is {} bytes, expected {}",
                schema.name(),
                data.len(),
                schema.record_size()
            )));
        }

        let null_bitmap = &data[..schema.null_bitmap_size()];
        let mut offset = schema.null_bitmap_size();
        let mut attributes = Vec::with_capacity(schema.attribute_count());

        for (i, attribute) in schema.attributes().enumerate() {
            let size = attribute.size();
            let value = if null_bitmap[i / 8] & (1 << (i % 8)) != 0 {
                Value::Null
            } else {
                Value::read_slot(&data[offset..offset + size], attribute.data_type()).ok_or_else(
                    || {
                        TabulaError::PageCorrupted(format!(
                            "unreadable value for attribute {}",
                            attribute.name()
                        ))
                    },
                )?
            };
            offset += size;
            attributes.push(Attribute::new(Arc::clone(attribute), value));
        }

        Ok(Self { schema, attributes })
    }

    /// Returns the schema of this record.
    pub fn schema(&self) -> &Arc<TableSchema> {
        &self.schema
    }

    pub fn table_id(&self) -> TableId {
        self.schema.table_id()
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Returns the value at the given attribute index.
    pub fn value(&self, index: usize) -> Option<&Value> {
        self.attributes.get(index).map(Attribute::value)
    }

    /// Returns the value for the given attribute name.
    pub fn value_by_name(&self, name: &str) -> Option<&Value> {
        self.schema
            .attribute_index(name)
            .and_then(|i| self.value(i))
    }

    /// Returns the primary key of this record.
    pub fn primary_key(&self) -> PrimaryKey {
        // Validation guarantees the key attribute is present and non-null.
        PrimaryKey::from_validated(self.attributes[self.schema.primary_key_index()].value().clone())
    }

    /// Size in bytes of this record's encoding.
    pub fn size(&self) -> usize {
        self.schema.record_size()
    }

    /// Returns a copy of this record with one attribute replaced.
    pub fn with_value(&self, name: &str, value: impl Into<Value>) -> Result<Record> {
        let index = self.schema.attribute_index(name).ok_or_else(|| {
            TabulaError::InvalidType(format!(
                "table {} has no attribute {}",
                self.schema.name(),
                name
            ))
        })?;

        let mut values: Vec<Value> = self.attributes.iter().map(|a| a.value().clone()).collect();
        values[index] = value.into();
        Record::new(Arc::clone(&self.schema), values)
    }

    /// Serializes the record to exactly [`Record::size`] bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.size());

        // Step 1: Write null bitmap
        let mut bitmap = vec![0u8; self.schema.null_bitmap_size()];
        for (i, attribute) in self.attributes.iter().enumerate() {
            if attribute.value().is_null() {
                bitmap[i / 8] |= 1 << (i % 8);
            }
        }
        bytes.extend_from_slice(&bitmap);

        // Step 2: Write every attribute slot in order
        for attribute in &self.attributes {
            attribute
                .value()
                .write_slot(attribute.data_type(), &mut bytes);
        }

        bytes
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.schema.table_id() == other.schema.table_id() && self.attributes == other.attributes
    }
}

/// Builder for constructing records fluently.
///
/// Attributes left unset take their declared default, or NULL.
pub struct RecordBuilder {
    schema: Arc<TableSchema>,
    values: Vec<Option<Value>>,
    current_index: usize,
}

impl RecordBuilder {
    /// Creates a new record builder for the given schema.
    pub fn new(schema: Arc<TableSchema>) -> Self {
        let count = schema.attribute_count();
        Self {
            schema,
            values: vec![None; count],
            current_index: 0,
        }
    }

    /// Sets the value at the current position and advances.
    pub fn value(mut self, value: impl Into<Value>) -> Self {
        if self.current_index < self.values.len() {
            self.values[self.current_index] = Some(value.into());
            self.current_index += 1;
        }
        self
    }

    /// Sets a null value at the current position and advances.
    pub fn null(self) -> Self {
        self.value(Value::Null)
    }

    /// Sets the value for a specific attribute by name.
    pub fn set(mut self, name: &str, value: impl Into<Value>) -> Self {
        if let Some(index) = self.schema.attribute_index(name) {
            self.values[index] = Some(value.into());
        }
        self
    }

    /// Builds and validates the record.
    pub fn build(self) -> Result<Record> {
        let values = self
            .schema
            .attributes()
            .zip(self.values)
            .map(|(attribute, value)| {
                value.unwrap_or_else(|| attribute.default_value().cloned().unwrap_or(Value::Null))
            })
            .collect();
        Record::new(self.schema, values)
    }
}
