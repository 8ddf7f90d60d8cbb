use crate::core::components::ComponentHandle;
use crate::core::config::{parse_level, LoggerConfig};
use crate::core::connections::{ConnectionValidator, SignalPath};
use crate::core::logger::sinks::{open_sink, LogSink};
use crate::core::types::ComponentId;
use crate::core::values::Value;
use log::{debug, Level};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io;

/// Signals sampled at the end of one tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRow {
    pub t: f64,
    #[serde(flatten)]
    pub values: BTreeMap<String, Value>,
}

impl LogRow {
    pub fn get(&self, signal: &str) -> Option<&Value> {
        self.values.get(signal)
    }

    pub fn get_f64(&self, signal: &str) -> Option<f64> {
        self.values.get(signal).and_then(Value::as_f64)
    }
}

/// Serialize rows as JSON lines; identical runs give identical bytes
pub fn to_jsonl(rows: &[LogRow]) -> Result<String, serde_json::Error> {
    let mut out = String::new();
    for row in rows {
        out.push_str(&serde_json::to_string(row)?);
        out.push('\n');
    }
    Ok(out)
}

/// Read-only observer that samples configured signals after every tick
///
/// Rows are always kept in memory and returned with the run; configured targets receive
/// a copy of each row as it is produced. A signal that cannot be read yet is logged as null.
pub struct DataLogger {
    level: Level,
    signals: Vec<(String, SignalPath)>,
    sinks: Vec<Box<dyn LogSink>>,
    rows: Vec<LogRow>,
    started: bool,
}

impl DataLogger {
    pub fn new(level: Level) -> Self {
        Self {
            level,
            signals: Vec::new(),
            sinks: Vec::new(),
            rows: Vec::new(),
            started: false,
        }
    }

    /// Compile `signals_to_log`; unresolved paths go to `validator`
    pub fn compile(
        config: &LoggerConfig,
        index: &HashMap<ComponentId, usize>,
        validator: &mut ConnectionValidator,
    ) -> Self {
        let mut logger = Self::new(parse_level(&config.level).unwrap_or(Level::Info));
        for signal in &config.signals_to_log {
            let name = signal.path();
            match SignalPath::compile(&name, index) {
                Ok(path) => logger.add_signal(name, path),
                Err(e) => validator.path_error("logger_config.signals_to_log", e),
            }
        }
        logger
    }

    pub fn add_signal(&mut self, name: String, path: SignalPath) {
        if !self.signals.iter().any(|(existing, _)| *existing == name) {
            self.signals.push((name, path));
        }
    }

    /// Open every configured target
    pub fn open_targets(&mut self, config: &LoggerConfig) -> io::Result<()> {
        for target in &config.targets {
            let target = target
                .resolve()
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
            if let Some(sink) = open_sink(&target, self.level)? {
                self.sinks.push(sink);
            }
        }
        Ok(())
    }

    pub fn add_sink(&mut self, sink: Box<dyn LogSink>) {
        self.sinks.push(sink);
    }

    pub fn columns(&self) -> Vec<String> {
        self.signals.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn sample(&mut self, t: f64, dt: f64, components: &[ComponentHandle]) -> io::Result<()> {
        if !self.started {
            let columns = self.columns();
            for sink in &mut self.sinks {
                sink.begin(&columns)?;
            }
            self.started = true;
        }

        let values: BTreeMap<String, Value> = self
            .signals
            .iter()
            .map(|(name, path)| (name.clone(), path.read(t, dt, components).unwrap_or_default()))
            .collect();
        let row = LogRow { t, values };
        for sink in &mut self.sinks {
            sink.write_row(&row)?;
        }
        self.rows.push(row);
        Ok(())
    }

    /// Flush targets; called once after the last tick
    pub fn finish(&mut self) -> io::Result<()> {
        debug!("data logger finishing with {} row(s)", self.rows.len());
        for sink in &mut self.sinks {
            sink.finish()?;
        }
        Ok(())
    }

    pub fn rows(&self) -> &[LogRow] {
        &self.rows
    }

    pub fn take_rows(&mut self) -> Vec<LogRow> {
        std::mem::take(&mut self.rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_signals_sampled() {
        let mut logger = DataLogger::new(Level::Info);
        logger.add_signal("simulation.t".to_string(), SignalPath::SimTime);
        logger.sample(0.0, 0.5, &[]).unwrap();
        logger.sample(0.5, 0.5, &[]).unwrap();
        let rows = logger.take_rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get_f64("simulation.t"), Some(0.5));
    }

    #[test]
    fn test_to_jsonl_sorted_keys() {
        let mut values = BTreeMap::new();
        values.insert("z.x".to_string(), Value::from(1.0));
        values.insert("a.y".to_string(), Value::Null);
        let text = to_jsonl(&[LogRow { t: 0.0, values }]).unwrap();
        assert_eq!(text, "{\"t\":0.0,\"a.y\":null,\"z.x\":1.0}\n");
    }
}
