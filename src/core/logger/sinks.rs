use crate::core::config::LogTarget;
use crate::core::logger::data_logger::LogRow;
use crate::core::values::Value;
use log::{log, Level};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Destination for sampled rows
pub trait LogSink {
    /// Called once with the column names before the first row
    fn begin(&mut self, _columns: &[String]) -> io::Result<()> {
        Ok(())
    }

    fn write_row(&mut self, row: &LogRow) -> io::Result<()>;

    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Open the sink for a configured target; `memory` needs none since rows are always kept
pub fn open_sink(target: &LogTarget, level: Level) -> io::Result<Option<Box<dyn LogSink>>> {
    Ok(match target {
        LogTarget::Memory => None,
        LogTarget::Console => Some(Box::new(ConsoleSink { level })),
        LogTarget::Csv { path } => Some(Box::new(CsvSink::create(path)?)),
        LogTarget::Jsonl { path } => Some(Box::new(JsonlSink::create(path)?)),
    })
}

/// Echo rows through the `log` facade
pub struct ConsoleSink {
    level: Level,
}

impl ConsoleSink {
    pub fn new(level: Level) -> Self {
        Self { level }
    }
}

impl LogSink for ConsoleSink {
    fn write_row(&mut self, row: &LogRow) -> io::Result<()> {
        let values: Vec<String> = row.values.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        log!(target: "hydrosim::data", self.level, "t={} {}", row.t, values.join(" "));
        Ok(())
    }
}

/// Comma-separated file with a header row
pub struct CsvSink<W: Write = BufWriter<File>> {
    writer: W,
    columns: Vec<String>,
}

impl CsvSink {
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> CsvSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            columns: Vec::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

fn csv_cell(value: &Value) -> String {
    let text = match value {
        Value::Null => return String::new(),
        Value::Number(n) => return n.to_string(),
        Value::Bool(b) => return b.to_string(),
        Value::Text(s) => s.clone(),
        other => other.to_string(),
    };
    if text.contains(&[',', '"', '\n'][..]) {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text
    }
}

impl<W: Write> LogSink for CsvSink<W> {
    fn begin(&mut self, columns: &[String]) -> io::Result<()> {
        self.columns = columns.to_vec();
        let header: Vec<String> = std::iter::once("t".to_string())
            .chain(columns.iter().map(|c| csv_cell(&Value::Text(c.clone()))))
            .collect();
        writeln!(self.writer, "{}", header.join(","))
    }

    fn write_row(&mut self, row: &LogRow) -> io::Result<()> {
        let mut cells = vec![row.t.to_string()];
        for column in &self.columns {
            cells.push(row.values.get(column).map(csv_cell).unwrap_or_default());
        }
        writeln!(self.writer, "{}", cells.join(","))
    }

    fn finish(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// One JSON object per line
pub struct JsonlSink<W: Write = BufWriter<File>> {
    writer: W,
}

impl JsonlSink {
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> JsonlSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> LogSink for JsonlSink<W> {
    fn write_row(&mut self, row: &LogRow) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, row)?;
        self.writer.write_all(b"\n")
    }

    fn finish(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}
