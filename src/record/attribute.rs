use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::catalog::AttributeSchema;
use crate::common::{Result, TabulaError};

use super::value::unpad;
use super::{DataType, Value};

/// A single attribute of a record: the schema it was validated against
/// plus its value.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    schema: Arc<AttributeSchema>,
    value: Value,
}

impl Attribute {
    pub(crate) fn new(schema: Arc<AttributeSchema>, value: Value) -> Self {
        Self { schema, value }
    }

    pub fn schema(&self) -> &Arc<AttributeSchema> {
        &self.schema
    }

    pub fn name(&self) -> &str {
        self.schema.name()
    }

    pub fn data_type(&self) -> &DataType {
        self.schema.data_type()
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Declared size of this attribute in bytes.
    pub fn size(&self) -> usize {
        self.schema.size()
    }

    pub fn is_primary_key(&self) -> bool {
        self.schema.is_primary_key()
    }
}

/// A non-null value used as an index key.
///
/// Values of the same kind compare naturally (doubles by total order);
/// values of different kinds order by kind so the ordering stays total.
#[derive(Debug, Clone)]
pub struct PrimaryKey(Value);

impl PrimaryKey {
    /// Wraps a value, rejecting nulls.
    pub fn new(value: Value) -> Result<Self> {
        if value.is_null() {
            return Err(TabulaError::InvalidType(
                "primary key value cannot be null".to_string(),
            ));
        }
        Ok(Self(value))
    }

    pub(crate) fn from_validated(value: Value) -> Self {
        debug_assert!(!value.is_null());
        Self(value)
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// The key as it is stored under an attribute of `data_type`.
    pub(crate) fn stored_as(&self, data_type: &DataType) -> PrimaryKey {
        match (&self.0, data_type) {
            (Value::String(s), DataType::Char(_)) => PrimaryKey(Value::from(unpad(s))),
            _ => self.clone(),
        }
    }
}

impl Ord for PrimaryKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (&self.0, &other.0) {
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Double(a), Value::Double(b)) => a.total_cmp(b),
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (a, b) => a.type_rank().cmp(&b.type_rank()),
        }
    }
}

impl PartialOrd for PrimaryKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for PrimaryKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PrimaryKey {}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for PrimaryKey {
    fn from(v: i32) -> Self {
        PrimaryKey(Value::Integer(v))
    }
}

impl From<&str> for PrimaryKey {
    fn from(v: &str) -> Self {
        PrimaryKey(Value::from(v))
    }
}

impl TryFrom<Value> for PrimaryKey {
    type Error = TabulaError;

    fn try_from(value: Value) -> Result<Self> {
        PrimaryKey::new(value)
    }
}
