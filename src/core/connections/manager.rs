use crate::core::components::ComponentHandle;
use crate::core::connections::path::split_path;
use crate::core::types::{ComponentId, PortRef};
use crate::core::values::Value;
use log::trace;
use std::collections::HashMap;

/// Connection resolved to component indices
#[derive(Debug, Clone)]
pub struct ResolvedConnection {
    pub id: String,
    pub source: usize,
    pub source_port: PortRef,
    source_field: Vec<String>,
    pub target: usize,
    pub target_port: PortRef,
}

/// Owns the wiring between component ports
///
/// Connections are push-style: right after the source component executes, the value of its
/// source port is written into the target component's input port.
#[derive(Debug, Default)]
pub struct ConnectionManager {
    /// Connections keyed by source component index, in declaration order
    outgoing: HashMap<usize, Vec<ResolvedConnection>>,
    /// Port graph: (source_id, source_port) -> Vec<(target_id, target_port)>
    graph: HashMap<(ComponentId, String), Vec<(ComponentId, String)>>,
    count: usize,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection between two resolved components
    pub fn add_connection(
        &mut self,
        id: &str,
        source: (usize, &PortRef),
        target: (usize, &PortRef),
    ) -> Result<(), String> {
        let (source_index, source_port) = source;
        let (target_index, target_port) = target;

        if source_port == target_port {
            return Err(format!(
                "connection '{}' loops port '{}' back onto itself",
                id, source_port
            ));
        }
        Self::check_input_port_collision(&self.graph, target_port.component_id(), target_port.port())
            .map_err(|e| format!("connection '{}': {}", id, e))?;
        let source_field = split_path(source_port.port()).map_err(|e| format!("connection '{}': {}", id, e))?;

        self.graph
            .entry((source_port.component_id().clone(), source_port.port().to_string()))
            .or_default()
            .push((target_port.component_id().clone(), target_port.port().to_string()));
        self.outgoing.entry(source_index).or_default().push(ResolvedConnection {
            id: id.to_string(),
            source: source_index,
            source_port: source_port.clone(),
            source_field,
            target: target_index,
            target_port: target_port.clone(),
        });
        self.count += 1;
        Ok(())
    }

    /// Err when `target_port` already has a driving connection
    pub fn check_input_port_collision(
        graph: &HashMap<(ComponentId, String), Vec<(ComponentId, String)>>,
        target_id: &ComponentId,
        target_port: &str,
    ) -> Result<(), String> {
        for targets in graph.values() {
            if targets.iter().any(|(id, port)| id == target_id && port == target_port) {
                return Err(format!(
                    "input port '{}' on component '{}' already has a driver",
                    target_port, target_id
                ));
            }
        }
        Ok(())
    }

    pub fn is_driven(&self, target_id: &ComponentId, target_port: &str) -> bool {
        Self::check_input_port_collision(&self.graph, target_id, target_port).is_err()
    }

    /// Port graph for execution-order derivation
    pub fn graph(&self) -> &HashMap<(ComponentId, String), Vec<(ComponentId, String)>> {
        &self.graph
    }

    pub fn outgoing(&self, source: usize) -> &[ResolvedConnection] {
        self.outgoing.get(&source).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every connection, grouped by source index
    pub fn iter(&self) -> impl Iterator<Item = &ResolvedConnection> {
        self.outgoing.values().flatten()
    }

    /// Write the outputs of `source` into its connected targets; returns how many were written
    pub fn propagate(&self, source: usize, components: &[ComponentHandle]) -> Result<usize, String> {
        let connections = self.outgoing(source);
        if connections.is_empty() {
            return Ok(0);
        }
        let Some(source_handle) = components.get(source) else {
            return Err(format!("no component at index {}", source));
        };

        let values: Vec<(usize, &ResolvedConnection, Option<Value>)> = {
            let component = source_handle
                .try_borrow()
                .map_err(|_| format!("component at index {} is busy", source))?;
            connections
                .iter()
                .map(|c| (c.target, c, component.read(&c.source_field)))
                .collect()
        };

        let mut written = 0;
        for (target, connection, value) in values {
            let Some(value) = value else {
                trace!("connection '{}': source port has no value yet", connection.id);
                continue;
            };
            let Some(target_handle) = components.get(target) else {
                return Err(format!("no component at index {}", target));
            };
            target_handle
                .try_borrow_mut()
                .map_err(|_| format!("target of connection '{}' is busy", connection.id))?
                .set_input(connection.target_port.port(), value)
                .map_err(|e| format!("connection '{}': {}", connection.id, e))?;
            written += 1;
        }
        Ok(written)
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Source ports and fan-out totals
    pub fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            source_ports: self.graph.len(),
            total_targets: self.graph.values().map(|v| v.len()).sum(),
        }
    }
}

/// Wiring summary used in build logs and tests
#[derive(Debug)]
pub struct ConnectionStats {
    pub source_ports: usize,
    pub total_targets: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_driver_rejected() {
        let mut manager = ConnectionManager::new();
        manager
            .add_connection("c1", (0, &PortRef::new("a", "out")), (2, &PortRef::new("c", "in")))
            .unwrap();
        let err = manager
            .add_connection("c2", (1, &PortRef::new("b", "out")), (2, &PortRef::new("c", "in")))
            .unwrap_err();
        assert!(err.contains("already has a driver"));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_self_loop_on_same_port_rejected() {
        let mut manager = ConnectionManager::new();
        let port = PortRef::new("a", "x");
        assert!(manager.add_connection("loop", (0, &port), (0, &port)).is_err());
        // Different ports on one component are allowed
        manager
            .add_connection("ok", (0, &PortRef::new("a", "out")), (0, &PortRef::new("a", "in")))
            .unwrap();
    }

    #[test]
    fn test_fan_out_graph() {
        let mut manager = ConnectionManager::new();
        let source = PortRef::new("a", "out");
        manager.add_connection("c1", (0, &source), (1, &PortRef::new("b", "in"))).unwrap();
        manager.add_connection("c2", (0, &source), (2, &PortRef::new("c", "in"))).unwrap();
        let stats = manager.stats();
        assert_eq!(stats.source_ports, 1);
        assert_eq!(stats.total_targets, 2);
        assert_eq!(manager.outgoing(0).len(), 2);
        assert!(manager.is_driven(&ComponentId::new("c"), "in"));
    }
}
