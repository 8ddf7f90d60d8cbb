pub mod data_logger;
pub mod sinks;

pub use data_logger::{to_jsonl, DataLogger, LogRow};
pub use sinks::{ConsoleSink, CsvSink, JsonlSink, LogSink};
