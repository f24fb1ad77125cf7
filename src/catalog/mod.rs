mod catalog;
mod schema;

pub use catalog::Catalog;
pub use schema::{AttributeSchema, TableSchema, TableSchemaBuilder};
