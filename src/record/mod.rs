mod attribute;
mod data_type;
mod record;
mod value;

pub use attribute::{Attribute, PrimaryKey};
pub use data_type::DataType;
pub use record::{Record, RecordBuilder};
pub use value::Value;
