pub mod value;

pub use value::{Record, RecordExt, Value};
