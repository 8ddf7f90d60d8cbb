use crate::core::config::ScenarioConfig;
use crate::core::connections::path::PathError;
use crate::core::error::UnresolvedReference;
use crate::core::types::ComponentId;
use std::collections::HashMap;

/// Build-phase checks that every id the configuration names resolves to a component
///
/// Problems are collected rather than returned on the first hit so one pass reports all of
/// them.
#[derive(Debug, Default)]
pub struct ConnectionValidator {
    unresolved: Vec<UnresolvedReference>,
    problems: Vec<String>,
}

impl ConnectionValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check connection endpoints and execution-order ids
    pub fn check_config(&mut self, config: &ScenarioConfig, index: &HashMap<ComponentId, usize>) {
        for connection in &config.connections {
            self.check_id(
                format!("connection '{}' source", connection.id),
                connection.source.component_id(),
                index,
            );
            self.check_id(
                format!("connection '{}' target", connection.id),
                connection.target.component_id(),
                index,
            );
        }
        for (stage_index, stage) in config.execution_order.iter().enumerate() {
            for id in stage.ids() {
                self.check_id(format!("execution_order stage {}", stage_index), &id, index);
            }
        }
    }

    pub fn check_id(&mut self, location: String, id: &ComponentId, index: &HashMap<ComponentId, usize>) {
        if !index.contains_key(id) {
            self.unresolved.push(UnresolvedReference {
                location,
                component_id: id.to_string(),
            });
        }
    }

    /// Record a failed path compilation under the right category
    pub fn path_error(&mut self, location: &str, error: PathError) {
        match error {
            PathError::UnknownComponent { component_id, .. } => self.unresolved.push(UnresolvedReference {
                location: location.to_string(),
                component_id,
            }),
            other => self.problems.push(format!("{}: {}", location, other)),
        }
    }

    pub fn problem(&mut self, message: impl Into<String>) {
        self.problems.push(message.into());
    }

    pub fn unresolved(&self) -> &[UnresolvedReference] {
        &self.unresolved
    }

    pub fn take_unresolved(&mut self) -> Vec<UnresolvedReference> {
        std::mem::take(&mut self.unresolved)
    }

    pub fn take_problems(&mut self) -> Vec<String> {
        std::mem::take(&mut self.problems)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collects_every_unresolved_reference() {
        let config = ScenarioConfig::from_json_str(
            r#"{
                "simulation_params": {"duration": 1.0, "time_step": 0.1},
                "components": [{"id": "a", "type": "constant_source"}],
                "connections": [
                    {"id": "c1", "source": {"component_id": "a", "port": "output"},
                     "target": {"component_id": "ghost", "port": "in"}},
                    {"id": "c2", "source": {"component_id": "phantom", "port": "output"},
                     "target": {"component_id": "a", "port": "in"}}
                ],
                "execution_order": [["a", "missing"]]
            }"#,
        )
        .unwrap();
        let mut index = HashMap::new();
        index.insert(ComponentId::new("a"), 0);

        let mut validator = ConnectionValidator::new();
        validator.check_config(&config, &index);
        let ids: Vec<&str> = validator.unresolved().iter().map(|r| r.component_id.as_str()).collect();
        assert_eq!(ids, vec!["ghost", "phantom", "missing"]);
    }

    #[test]
    fn test_path_errors_are_split_by_kind() {
        let mut validator = ConnectionValidator::new();
        validator.path_error(
            "event 'e1' condition",
            PathError::UnknownComponent {
                path: "x.level".to_string(),
                component_id: "x".to_string(),
            },
        );
        validator.path_error("signals_to_log", PathError::Malformed("a..b".to_string()));
        assert_eq!(validator.take_unresolved().len(), 1);
        assert_eq!(validator.take_problems().len(), 1);
    }
}
