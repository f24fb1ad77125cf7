mod page;
mod table;

pub use page::*;
pub use table::*;
