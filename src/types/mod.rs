//! Data types produced by the import pipeline.

mod cell;
mod progress;
mod record;
mod table;
mod validation;

pub use cell::*;
pub use progress::*;
pub use record::*;
pub use table::ColumnarTable;
pub(crate) use table::TableBuilder;
pub use validation::*;
