//! Configuration document consumed by the simulation manager.
//!
//! The document has exactly six top-level keys: `simulation_params`, `components`,
//! `connections`, `execution_order`, `logger_config` and `events`. Only the first two are
//! required; the rest default to empty. `metadata` fields are carried along for external
//! tooling and never interpreted here.

use crate::core::error::{SimError, SimResult};
use crate::core::types::{ComponentId, PortRef};
use crate::core::values::{Record, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Default cap on nested publish depth
pub const DEFAULT_MAX_BUS_DEPTH: usize = 16;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    pub simulation_params: SimulationParams,
    pub components: Vec<ComponentConfig>,
    #[serde(default)]
    pub connections: Vec<ConnectionConfig>,
    #[serde(default)]
    pub execution_order: Vec<StageConfig>,
    #[serde(default)]
    pub logger_config: LoggerConfig,
    #[serde(default)]
    pub events: Vec<EventConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationParams {
    pub duration: f64,
    pub time_step: f64,
    #[serde(default)]
    pub mode: SimulationMode,
    #[serde(default)]
    pub start_time: f64,
    /// Treat connections inside one execution stage as errors instead of warnings
    #[serde(default)]
    pub strict_stages: bool,
    #[serde(default = "default_max_bus_depth")]
    pub max_bus_depth: usize,
}

fn default_max_bus_depth() -> usize {
    DEFAULT_MAX_BUS_DEPTH
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SimulationMode {
    #[default]
    Simulation,
    /// Requires at least one hardware bridge attached to the manager
    HardwareInLoop,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentConfig {
    pub id: ComponentId,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub params: Record,
    #[serde(default)]
    pub metadata: Value,
    /// Input port sources resolved before each execute. Text values are paths
    /// (`simulation.t`, `simulation.dt`, `component.field`); anything else is a literal.
    #[serde(default)]
    pub inputs: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    pub source: PortRef,
    pub target: PortRef,
    #[serde(default)]
    pub metadata: Value,
}

/// One execution stage; a bare id is a stage of one
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StageConfig {
    Single(ComponentId),
    Group(Vec<ComponentId>),
}

impl StageConfig {
    pub fn ids(&self) -> Vec<ComponentId> {
        match self {
            StageConfig::Single(id) => vec![id.clone()],
            StageConfig::Group(ids) => ids.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub targets: Vec<LogTargetConfig>,
    #[serde(default)]
    pub signals_to_log: Vec<SignalConfig>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            targets: Vec::new(),
            signals_to_log: Vec::new(),
        }
    }
}

/// Logger output target, either a bare name (`"console"`) or a tagged object
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LogTargetConfig {
    Named(String),
    Detailed(LogTarget),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogTarget {
    Memory,
    Console,
    Csv { path: String },
    Jsonl { path: String },
}

impl LogTargetConfig {
    pub fn resolve(&self) -> Result<LogTarget, String> {
        match self {
            LogTargetConfig::Detailed(target) => Ok(target.clone()),
            LogTargetConfig::Named(name) => match name.as_str() {
                "memory" => Ok(LogTarget::Memory),
                "console" => Ok(LogTarget::Console),
                other => Err(format!(
                    "log target '{}' needs an object form with a path",
                    other
                )),
            },
        }
    }
}

/// Signal to sample each tick, as `"comp.field"` or `{component_id, port}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalConfig {
    Dotted(String),
    Port(PortRef),
}

impl SignalConfig {
    pub fn path(&self) -> String {
        match self {
            SignalConfig::Dotted(path) => path.clone(),
            SignalConfig::Port(port) => port.dotted(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventConfig {
    pub id: String,
    pub trigger: TriggerConfig,
    pub action: ActionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    #[serde(rename = "type")]
    pub kind: TriggerKind,
    pub value: Value,
    #[serde(default)]
    pub mode: TriggerMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Time,
    Condition,
}

/// Firing policy for condition triggers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TriggerMode {
    /// Fire on the false to true transition only
    #[default]
    Edge,
    /// Fire on every tick the condition holds
    Level,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionConfig {
    pub target: String,
    pub operation: ActionOperation,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionOperation {
    Set,
    SwitchModel,
    Publish,
}

/// Stage of a component's data pipeline, as found under `params.pipeline`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStageConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: Record,
}

impl ScenarioConfig {
    /// Parse a JSON document
    pub fn from_json_str(json: &str) -> SimResult<Self> {
        serde_json::from_str(json).map_err(|e| SimError::config(e.to_string()))
    }

    /// Parse a value already in memory, e.g. a document assembled by a UI
    pub fn from_value(value: serde_json::Value) -> SimResult<Self> {
        serde_json::from_value(value).map_err(|e| SimError::config(e.to_string()))
    }

    pub fn from_path(path: impl AsRef<Path>) -> SimResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// Number of ticks the run will execute
    pub fn tick_count(&self) -> u64 {
        let params = &self.simulation_params;
        (params.duration / params.time_step).round().max(0.0) as u64
    }

    /// Structural checks that do not need the registry; all problems are returned together
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let params = &self.simulation_params;

        if !(params.duration.is_finite() && params.duration > 0.0) {
            problems.push(format!("simulation_params.duration must be positive, got {}", params.duration));
        }
        if !(params.time_step.is_finite() && params.time_step > 0.0) {
            problems.push(format!("simulation_params.time_step must be positive, got {}", params.time_step));
        } else if params.time_step > params.duration {
            problems.push(format!(
                "simulation_params.time_step {} exceeds duration {}",
                params.time_step, params.duration
            ));
        }
        if !params.start_time.is_finite() {
            problems.push("simulation_params.start_time must be finite".to_string());
        }
        if params.max_bus_depth == 0 {
            problems.push("simulation_params.max_bus_depth must be at least 1".to_string());
        }

        let mut seen = HashSet::new();
        for component in &self.components {
            if component.id.as_str().is_empty() {
                problems.push("component with empty id".to_string());
            } else if component.id.as_str() == "simulation" || component.id.as_str().contains('.') {
                problems.push(format!("component id '{}' is reserved or contains '.'", component.id));
            }
            if !seen.insert(component.id.clone()) {
                problems.push(format!("duplicate component id '{}'", component.id));
            }
        }

        let mut connection_ids = HashSet::new();
        for connection in &self.connections {
            if !connection_ids.insert(connection.id.as_str()) {
                problems.push(format!("duplicate connection id '{}'", connection.id));
            }
        }

        let mut event_ids = HashSet::new();
        for event in &self.events {
            if !event_ids.insert(event.id.as_str()) {
                problems.push(format!("duplicate event id '{}'", event.id));
            }
        }

        for target in &self.logger_config.targets {
            if let Err(e) = target.resolve() {
                problems.push(e);
            }
        }
        if parse_level(&self.logger_config.level).is_none() {
            problems.push(format!("logger_config.level '{}' is not a log level", self.logger_config.level));
        }

        problems
    }
}

/// Parse a logger level name
pub fn parse_level(level: &str) -> Option<log::Level> {
    level.parse::<log::Level>().ok()
}
