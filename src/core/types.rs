use serde::{Deserialize, Serialize};

/// Unique identifier of a component within one simulation run
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentId(String);

impl ComponentId {
    /// Create a new component ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the raw ID string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Create a port handle on this component
    pub fn port(&self, port: &str) -> PortRef {
        PortRef {
            component_id: self.clone(),
            port: port.to_string(),
        }
    }
}

impl std::fmt::Display for ComponentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ComponentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ComponentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Handle for a named port on a component
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortRef {
    pub component_id: ComponentId,
    pub port: String,
}

impl PortRef {
    pub fn new(component_id: impl Into<ComponentId>, port: impl Into<String>) -> Self {
        Self {
            component_id: component_id.into(),
            port: port.into(),
        }
    }

    pub fn component_id(&self) -> &ComponentId {
        &self.component_id
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    /// Dotted form used for log columns and path resolution, e.g. `tank1.level`
    pub fn dotted(&self) -> String {
        format!("{}.{}", self.component_id, self.port)
    }
}

impl std::fmt::Display for PortRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.component_id, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_ref_dotted() {
        let port = ComponentId::new("tank1").port("level");
        assert_eq!(port.dotted(), "tank1.level");
        assert_eq!(port.to_string(), "tank1.level");
    }

    #[test]
    fn test_component_id_ordering_is_lexicographic() {
        let mut ids = vec![ComponentId::new("b"), ComponentId::new("a")];
        ids.sort();
        assert_eq!(ids[0].as_str(), "a");
    }
}
