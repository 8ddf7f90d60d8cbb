//! Error taxonomy for building and running a simulation.

use crate::core::types::ComponentId;
use thiserror::Error;

/// Machine-readable error kind attached to every fatal error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Config,
    UnknownType,
    UnresolvedReference,
    Pipeline,
    EventAction,
    ComponentExecution,
    Bus,
    Io,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Config => "config_error",
            ErrorKind::UnknownType => "unknown_type_error",
            ErrorKind::UnresolvedReference => "unresolved_reference_error",
            ErrorKind::Pipeline => "pipeline_error",
            ErrorKind::EventAction => "event_action_error",
            ErrorKind::ComponentExecution => "component_execution_error",
            ErrorKind::Bus => "bus_error",
            ErrorKind::Io => "io_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reference in the configuration that does not resolve to a component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedReference {
    /// Where the reference was found, e.g. `connection 'c1' source`
    pub location: String,
    /// The component id that was referenced
    pub component_id: String,
}

impl std::fmt::Display for UnresolvedReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} references unknown component '{}'", self.location, self.component_id)
    }
}

/// A component whose type is not registered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownComponentType {
    pub type_name: String,
    pub component_id: String,
}

impl std::fmt::Display for UnknownComponentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown component type '{}' for component '{}'", self.type_name, self.component_id)
    }
}

/// A pipeline stage could not process its payload
#[derive(Debug, Clone, Error, PartialEq)]
#[error("pipeline stage '{stage}' failed on key '{key}': {reason}")]
pub struct PipelineError {
    pub stage: String,
    pub key: String,
    pub reason: String,
}

impl PipelineError {
    pub fn new(stage: impl Into<String>, key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// An event fired but its action could not be applied
#[derive(Debug, Clone, Error, PartialEq)]
#[error("event '{event_id}' action on '{target}' failed: {reason}")]
pub struct EventActionError {
    pub event_id: String,
    pub target: String,
    pub reason: String,
}

/// Message bus failures
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BusError {
    #[error("publish depth limit {limit} exceeded while publishing to '{topic}'")]
    DepthExceeded { topic: String, limit: usize },

    #[error("invalid topic pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("subscriber '{subscriber}' failed handling '{topic}': {reason}")]
    Handler {
        subscriber: String,
        topic: String,
        reason: String,
    },
}

/// Errors raised by component code
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ComponentError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("missing input '{0}'")]
    MissingInput(String),

    #[error("unknown field '{0}'")]
    UnknownField(String),

    #[error("unknown model '{0}'")]
    UnknownModel(String),

    #[error("component has no model bank")]
    NoModelBank,

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error("{0}")]
    Failed(String),
}

impl From<String> for ComponentError {
    fn from(msg: String) -> Self {
        ComponentError::Failed(msg)
    }
}

/// Top-level error returned by the build and run phases
#[derive(Debug, Error)]
pub enum SimError {
    #[error("configuration error: {}", .0.join("; "))]
    Config(Vec<String>),

    #[error("{}", join_display(.0))]
    UnknownType(Vec<UnknownComponentType>),

    #[error("{} unresolved reference(s): {}", .0.len(), join_display(.0))]
    UnresolvedReferences(Vec<UnresolvedReference>),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    EventAction(#[from] EventActionError),

    #[error("component '{component_id}' failed at t={t}: {source}")]
    ComponentExecution {
        component_id: ComponentId,
        t: f64,
        #[source]
        source: ComponentError,
    },

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn join_display<T: std::fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl SimError {
    /// Single-message configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        SimError::Config(vec![msg.into()])
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SimError::Config(_) => ErrorKind::Config,
            SimError::UnknownType(_) => ErrorKind::UnknownType,
            SimError::UnresolvedReferences(_) => ErrorKind::UnresolvedReference,
            SimError::Pipeline(_) => ErrorKind::Pipeline,
            SimError::EventAction(_) => ErrorKind::EventAction,
            SimError::ComponentExecution { .. } => ErrorKind::ComponentExecution,
            SimError::Bus(_) => ErrorKind::Bus,
            SimError::Io(_) => ErrorKind::Io,
        }
    }

    /// Component ids named by this error
    pub fn offending_ids(&self) -> Vec<String> {
        match self {
            SimError::UnknownType(unknown) => unknown.iter().map(|u| u.component_id.clone()).collect(),
            SimError::UnresolvedReferences(refs) => {
                refs.iter().map(|r| r.component_id.clone()).collect()
            }
            SimError::ComponentExecution { component_id, .. } => {
                vec![component_id.to_string()]
            }
            SimError::EventAction(err) => vec![err.event_id.clone()],
            _ => Vec::new(),
        }
    }
}

pub type SimResult<T> = Result<T, SimError>;
