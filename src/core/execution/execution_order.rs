use crate::core::types::ComponentId;
use std::collections::{HashMap, HashSet};

/// Port graph: (source_id, source_port) -> Vec<(target_id, target_port)>
pub type PortGraph = HashMap<(ComponentId, String), Vec<(ComponentId, String)>>;

/// Outcome of checking a declared execution order
#[derive(Debug, Default, Clone, PartialEq)]
pub struct StageReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Manages topological sorting and validation of execution stages
pub struct ExecutionOrderBuilder;

impl ExecutionOrderBuilder {
    /// Analyzes the connection graph to build a topologically sorted execution order
    /// organized into stages.
    /// Uses modified Kahn's algorithm to detect cycles and ensure deterministic execution.
    pub fn build_execution_order_stages(
        component_ids: &[ComponentId],
        connections: &PortGraph,
    ) -> Result<Vec<Vec<ComponentId>>, String> {
        let mut adj_list: HashMap<ComponentId, Vec<ComponentId>> = HashMap::new();
        let mut in_degree: HashMap<ComponentId, usize> = HashMap::new();

        // Initialize graph data structures for all components
        for comp_id in component_ids {
            in_degree.insert(comp_id.clone(), 0);
            adj_list.insert(comp_id.clone(), Vec::new());
        }

        // Build adjacency list and in-degrees from connections
        for ((source_id, _source_port), targets) in connections {
            for (target_id, _target_port) in targets {
                // Only consider connections between components we're tracking
                if source_id == target_id || !in_degree.contains_key(target_id) {
                    continue;
                }
                let Some(neighbors) = adj_list.get_mut(source_id) else {
                    continue;
                };
                neighbors.push(target_id.clone());
                if let Some(degree) = in_degree.get_mut(target_id) {
                    *degree += 1;
                }
            }
        }

        // Modified Kahn's algorithm for stage-based topological sort
        let mut stages = Vec::new();
        let mut processed_count = 0;

        while processed_count < component_ids.len() {
            // Find all components with zero in-degree (current stage)
            let mut current_stage: Vec<ComponentId> = in_degree
                .iter()
                .filter(|(_, &degree)| degree == 0)
                .map(|(id, _)| id.clone())
                .collect();

            if current_stage.is_empty() {
                let mut remaining: Vec<&str> = in_degree.keys().map(ComponentId::as_str).collect();
                remaining.sort_unstable();
                return Err(format!(
                    "Cycle detected in component dependencies among [{}]; declare execution_order explicitly",
                    remaining.join(", ")
                ));
            }

            // Sort stage for deterministic results
            current_stage.sort();

            for comp_id in &current_stage {
                in_degree.remove(comp_id);
                processed_count += 1;

                if let Some(neighbors) = adj_list.get(comp_id) {
                    for neighbor in neighbors {
                        if let Some(degree) = in_degree.get_mut(neighbor) {
                            *degree -= 1;
                        }
                    }
                }
            }

            stages.push(current_stage);
        }

        Ok(stages)
    }

    /// Check a declared order against the component set and the connection graph
    ///
    /// Errors: an id scheduled twice, a component in no stage. Connections with both ends in
    /// one stage are warnings, or errors when `strict` is set. Unknown ids are reported by
    /// reference validation and skipped here.
    pub fn validate_stages(
        stages: &[Vec<ComponentId>],
        component_ids: &[ComponentId],
        connections: &PortGraph,
        strict: bool,
    ) -> StageReport {
        let mut report = StageReport::default();
        let known: HashSet<&ComponentId> = component_ids.iter().collect();
        let mut stage_of: HashMap<&ComponentId, usize> = HashMap::new();

        for (stage_index, stage) in stages.iter().enumerate() {
            if stage.is_empty() {
                report.warnings.push(format!("execution_order stage {} is empty", stage_index));
            }
            for id in stage {
                if !known.contains(id) {
                    continue;
                }
                if let Some(first) = stage_of.insert(id, stage_index) {
                    report.errors.push(format!(
                        "component '{}' is scheduled more than once (stages {} and {})",
                        id, first, stage_index
                    ));
                }
            }
        }

        for id in component_ids {
            if !stage_of.contains_key(id) {
                report
                    .errors
                    .push(format!("component '{}' does not appear in any execution_order stage", id));
            }
        }

        let mut edges: Vec<(&ComponentId, &String, &ComponentId, &String)> = connections
            .iter()
            .flat_map(|((source, source_port), targets)| {
                targets.iter().map(move |(target, target_port)| (source, source_port, target, target_port))
            })
            .collect();
        edges.sort();
        for (source, source_port, target, target_port) in edges {
            if source == target {
                continue;
            }
            match (stage_of.get(source), stage_of.get(target)) {
                (Some(a), Some(b)) if a == b => {
                    let message = format!(
                        "connection {}.{} -> {}.{} has both ends in stage {}",
                        source, source_port, target, target_port, a
                    );
                    if strict {
                        report.errors.push(message);
                    } else {
                        report.warnings.push(message);
                    }
                }
                _ => {}
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> ComponentId {
        ComponentId::new(name)
    }

    fn graph(edges: &[(&str, &str)]) -> PortGraph {
        let mut connections: PortGraph = HashMap::new();
        for (source, target) in edges {
            connections
                .entry((id(source), "out".to_string()))
                .or_default()
                .push((id(target), "in".to_string()));
        }
        connections
    }

    #[test]
    fn test_build_execution_order_stages_simple() {
        // A -> B -> C
        let components = vec![id("A"), id("B"), id("C")];
        let stages =
            ExecutionOrderBuilder::build_execution_order_stages(&components, &graph(&[("A", "B"), ("B", "C")]))
                .expect("Should build execution order");

        assert_eq!(stages, vec![vec![id("A")], vec![id("B")], vec![id("C")]]);
    }

    #[test]
    fn test_build_execution_order_stages_parallel() {
        // A -> B, A -> C, B -> D, C -> D
        let components = vec![id("D"), id("C"), id("B"), id("A")];
        let stages = ExecutionOrderBuilder::build_execution_order_stages(
            &components,
            &graph(&[("A", "B"), ("A", "C"), ("B", "D"), ("C", "D")]),
        )
        .expect("Should build execution order");

        assert_eq!(stages, vec![vec![id("A")], vec![id("B"), id("C")], vec![id("D")]]);
    }

    #[test]
    fn test_build_execution_order_stages_cycle_detection() {
        let components = vec![id("A"), id("B"), id("C")];
        let result =
            ExecutionOrderBuilder::build_execution_order_stages(&components, &graph(&[("A", "B"), ("B", "A")]));
        let err = result.unwrap_err();
        assert!(err.contains("Cycle detected"));
        assert!(err.contains("A, B"));
    }

    #[test]
    fn test_validate_duplicates_and_unscheduled() {
        let components = vec![id("a"), id("b"), id("c")];
        let stages = vec![vec![id("a")], vec![id("a"), id("b")]];
        let report = ExecutionOrderBuilder::validate_stages(&stages, &components, &HashMap::new(), false);
        assert_eq!(report.errors.len(), 2, "{:?}", report.errors);
        assert!(report.errors[0].contains("more than once"));
        assert!(report.errors[1].contains("'c'"));
    }

    #[test]
    fn test_same_stage_connection_warning_or_error() {
        let components = vec![id("a"), id("b")];
        let stages = vec![vec![id("a"), id("b")]];
        let connections = graph(&[("a", "b")]);

        let lenient = ExecutionOrderBuilder::validate_stages(&stages, &components, &connections, false);
        assert!(lenient.errors.is_empty());
        assert_eq!(lenient.warnings.len(), 1);

        let strict = ExecutionOrderBuilder::validate_stages(&stages, &components, &connections, true);
        assert_eq!(strict.errors.len(), 1);
    }

    #[test]
    fn test_feedback_across_stages_is_fine() {
        let components = vec![id("tank"), id("pid")];
        let stages = vec![vec![id("tank")], vec![id("pid")]];
        let connections = graph(&[("tank", "pid"), ("pid", "tank")]);
        let report = ExecutionOrderBuilder::validate_stages(&stages, &components, &connections, true);
        assert_eq!(report, StageReport::default());
    }
}
