use crate::core::components::ComponentHandle;
use crate::core::types::ComponentId;
use crate::core::values::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Reserved first segment for clock values
pub const SIMULATION_ROOT: &str = "simulation";

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PathError {
    #[error("malformed path '{0}'")]
    Malformed(String),

    #[error("unknown simulation field in '{0}', expected simulation.t or simulation.dt")]
    UnknownClockField(String),

    #[error("path '{path}' references unknown component '{component_id}'")]
    UnknownComponent { path: String, component_id: String },
}

/// Dotted path compiled against the component index
///
/// `simulation.t` and `simulation.dt` read the clock; `comp.field[.sub...]` reads a field of
/// a component through [`crate::core::components::Component::read`].
#[derive(Debug, Clone, PartialEq)]
pub enum SignalPath {
    SimTime,
    SimDt,
    Component {
        index: usize,
        id: ComponentId,
        field: Vec<String>,
    },
}

impl SignalPath {
    pub fn compile(path: &str, index: &HashMap<ComponentId, usize>) -> Result<Self, PathError> {
        let segments = split_path(path)?;
        let (head, field) = segments
            .split_first()
            .ok_or_else(|| PathError::Malformed(path.to_string()))?;

        if head == SIMULATION_ROOT {
            return match field {
                [f] if f == "t" => Ok(SignalPath::SimTime),
                [f] if f == "dt" => Ok(SignalPath::SimDt),
                _ => Err(PathError::UnknownClockField(path.to_string())),
            };
        }
        if field.is_empty() {
            return Err(PathError::Malformed(path.to_string()));
        }

        let id = ComponentId::new(head.as_str());
        let component = *index.get(&id).ok_or_else(|| PathError::UnknownComponent {
            path: path.to_string(),
            component_id: head.clone(),
        })?;
        Ok(SignalPath::Component {
            index: component,
            id,
            field: field.to_vec(),
        })
    }

    /// Current value, or `None` when the field does not exist (yet)
    pub fn read(&self, t: f64, dt: f64, components: &[ComponentHandle]) -> Option<Value> {
        match self {
            SignalPath::SimTime => Some(Value::Number(t)),
            SignalPath::SimDt => Some(Value::Number(dt)),
            SignalPath::Component { index, field, .. } => {
                let component = components.get(*index)?.try_borrow().ok()?;
                component.read(field)
            }
        }
    }

    pub fn component_index(&self) -> Option<usize> {
        match self {
            SignalPath::Component { index, .. } => Some(*index),
            _ => None,
        }
    }

    pub fn dotted(&self) -> String {
        match self {
            SignalPath::SimTime => format!("{}.t", SIMULATION_ROOT),
            SignalPath::SimDt => format!("{}.dt", SIMULATION_ROOT),
            SignalPath::Component { id, field, .. } => format!("{}.{}", id, field.join(".")),
        }
    }
}

impl std::fmt::Display for SignalPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.dotted())
    }
}

/// Split a dotted path, rejecting empty segments
pub fn split_path(path: &str) -> Result<Vec<String>, PathError> {
    let segments: Vec<String> = path.split('.').map(str::to_string).collect();
    if path.is_empty() || segments.iter().any(|s| s.trim().is_empty()) {
        return Err(PathError::Malformed(path.to_string()));
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> HashMap<ComponentId, usize> {
        let mut index = HashMap::new();
        index.insert(ComponentId::new("tank1"), 0);
        index.insert(ComponentId::new("pump"), 1);
        index
    }

    #[test]
    fn test_compile_clock_and_component_paths() {
        assert_eq!(SignalPath::compile("simulation.t", &index()).unwrap(), SignalPath::SimTime);
        assert_eq!(SignalPath::compile("simulation.dt", &index()).unwrap(), SignalPath::SimDt);

        let path = SignalPath::compile("pump.state.running", &index()).unwrap();
        assert_eq!(path.component_index(), Some(1));
        assert_eq!(path.dotted(), "pump.state.running");
    }

    #[test]
    fn test_compile_errors() {
        assert!(matches!(
            SignalPath::compile("ghost.level", &index()),
            Err(PathError::UnknownComponent { component_id, .. }) if component_id == "ghost"
        ));
        assert!(matches!(
            SignalPath::compile("simulation.clock", &index()),
            Err(PathError::UnknownClockField(_))
        ));
        assert!(matches!(SignalPath::compile("tank1", &index()), Err(PathError::Malformed(_))));
        assert!(matches!(SignalPath::compile("tank1..level", &index()), Err(PathError::Malformed(_))));
    }

    #[test]
    fn test_clock_read_needs_no_components() {
        let path = SignalPath::SimDt;
        assert_eq!(path.read(3.0, 0.5, &[]), Some(Value::Number(0.5)));
    }
}
