use crate::core::bus::{BridgeSubscriber, HardwareBridge, MessageBus, SubscriberHandle};
use crate::core::components::{ComponentHandle, ComponentRegistry};
use crate::core::config::{ScenarioConfig, SimulationMode, SimulationParams};
use crate::core::connections::{ConnectionManager, ConnectionValidator, SignalPath};
use crate::core::error::{SimError, SimResult};
use crate::core::events::EventEngine;
use crate::core::execution::execution_order::ExecutionOrderBuilder;
use crate::core::logger::DataLogger;
use crate::core::types::ComponentId;
use crate::core::values::Value;
use log::{debug, info, warn};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use uuid::Uuid;

/// Where an input port gets its value before each execute
#[derive(Debug, Clone, PartialEq)]
pub enum InputSource {
    Path(SignalPath),
    Literal(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputBinding {
    pub port: String,
    pub source: InputSource,
}

/// Everything one run owns, produced by [`SimulationBuilder::build`]
pub struct SimulationContext {
    pub run_id: Uuid,
    pub params: SimulationParams,
    pub tick_count: u64,
    /// Components in declaration order; indices are stable for the run
    pub components: Vec<ComponentHandle>,
    pub index: HashMap<ComponentId, usize>,
    /// Execution stages as component indices
    pub stages: Vec<Vec<usize>>,
    /// Pull-style input bindings per component index
    pub inputs: Vec<Vec<InputBinding>>,
    pub connections: ConnectionManager,
    pub events: EventEngine,
    pub logger: DataLogger,
    pub bus: MessageBus,
    pub bridges: Vec<Rc<RefCell<BridgeSubscriber>>>,
    pub warnings: Vec<String>,
}

impl SimulationContext {
    pub fn component(&self, id: &str) -> Option<&ComponentHandle> {
        self.index
            .get(&ComponentId::new(id))
            .and_then(|&i| self.components.get(i))
    }

    pub fn component_ids(&self) -> Vec<ComponentId> {
        self.components.iter().map(|c| c.borrow().id().clone()).collect()
    }
}

/// Build phase: configuration plus registry in, runnable context out
///
/// Checks run in groups and each group reports every problem it finds: configuration shape,
/// component types, references, then wiring and schedule. Files for log targets are only
/// created once everything else has passed.
pub struct SimulationBuilder<'a> {
    registry: &'a ComponentRegistry,
    bridges: Vec<Box<dyn HardwareBridge>>,
}

impl<'a> SimulationBuilder<'a> {
    pub fn new(registry: &'a ComponentRegistry) -> Self {
        Self {
            registry,
            bridges: Vec::new(),
        }
    }

    pub fn with_bridges(mut self, bridges: Vec<Box<dyn HardwareBridge>>) -> Self {
        self.bridges = bridges;
        self
    }

    pub fn build(self, config: &ScenarioConfig) -> SimResult<SimulationContext> {
        let mut problems = config.validate();
        if config.simulation_params.mode == SimulationMode::HardwareInLoop && self.bridges.is_empty() {
            problems.push("simulation_params.mode hardware_in_loop requires a hardware bridge".to_string());
        }
        if !problems.is_empty() {
            return Err(SimError::Config(problems));
        }

        // Components
        let mut components: Vec<ComponentHandle> = Vec::with_capacity(config.components.len());
        let mut index: HashMap<ComponentId, usize> = HashMap::new();
        let mut unknown_types = Vec::new();
        for component in &config.components {
            match self
                .registry
                .instantiate(&component.type_name, &component.id, &component.params)
            {
                Ok(instance) => {
                    index.insert(component.id.clone(), components.len());
                    components.push(Rc::new(RefCell::new(instance)));
                }
                Err(SimError::UnknownType(mut unknown)) => unknown_types.append(&mut unknown),
                Err(SimError::Config(mut messages)) => problems.append(&mut messages),
                Err(other) => problems.push(other.to_string()),
            }
        }
        if !unknown_types.is_empty() {
            return Err(SimError::UnknownType(unknown_types));
        }
        if !problems.is_empty() {
            return Err(SimError::Config(problems));
        }
        debug!("instantiated {} component(s)", components.len());

        // References
        let mut validator = ConnectionValidator::new();
        validator.check_config(config, &index);

        let mut inputs: Vec<Vec<InputBinding>> = vec![Vec::new(); components.len()];
        for component in &config.components {
            let Some(&i) = index.get(&component.id) else {
                continue;
            };
            for (port, source) in &component.inputs {
                let location = format!("component '{}' input '{}'", component.id, port);
                let source = match source {
                    Value::Text(path) => match SignalPath::compile(path, &index) {
                        Ok(path) => InputSource::Path(path),
                        Err(e) => {
                            validator.path_error(&location, e);
                            continue;
                        }
                    },
                    literal => InputSource::Literal(literal.clone()),
                };
                inputs[i].push(InputBinding {
                    port: port.clone(),
                    source,
                });
            }
        }

        let events = EventEngine::compile(&config.events, &index, &mut validator);
        let mut logger = DataLogger::compile(&config.logger_config, &index, &mut validator);

        let unresolved = validator.take_unresolved();
        if !unresolved.is_empty() {
            return Err(SimError::UnresolvedReferences(unresolved));
        }
        problems.extend(validator.take_problems());

        // Wiring
        let mut connections = ConnectionManager::new();
        for connection in &config.connections {
            let (Some(&source), Some(&target)) = (
                index.get(connection.source.component_id()),
                index.get(connection.target.component_id()),
            ) else {
                continue;
            };
            if let Err(e) =
                connections.add_connection(&connection.id, (source, &connection.source), (target, &connection.target))
            {
                problems.push(e);
            }
        }
        let wiring = connections.stats();
        debug!(
            "wired {} source port(s) to {} target(s)",
            wiring.source_ports, wiring.total_targets
        );
        for component in &config.components {
            for port in component.inputs.keys() {
                if connections.is_driven(&component.id, port) {
                    problems.push(format!(
                        "input port '{}' on component '{}' is driven by both a connection and an inputs entry",
                        port, component.id
                    ));
                }
            }
        }

        // Schedule
        let component_ids: Vec<ComponentId> = config.components.iter().map(|c| c.id.clone()).collect();
        let mut warnings = Vec::new();
        let stage_ids: Vec<Vec<ComponentId>> = if config.execution_order.is_empty() {
            match ExecutionOrderBuilder::build_execution_order_stages(&component_ids, connections.graph()) {
                Ok(stages) => {
                    debug!("derived {} execution stage(s) from connections", stages.len());
                    stages
                }
                Err(e) => {
                    problems.push(e);
                    Vec::new()
                }
            }
        } else {
            let declared: Vec<Vec<ComponentId>> = config.execution_order.iter().map(|s| s.ids()).collect();
            let report = ExecutionOrderBuilder::validate_stages(
                &declared,
                &component_ids,
                connections.graph(),
                config.simulation_params.strict_stages,
            );
            problems.extend(report.errors);
            warnings.extend(report.warnings);
            declared
        };

        // Bus and bridges
        let bus = MessageBus::new(config.simulation_params.max_bus_depth);
        let mut bridges = Vec::new();
        for bridge in self.bridges {
            let topics = bridge.outbound_topics();
            let name = bridge.name().to_string();
            let subscriber = Rc::new(RefCell::new(BridgeSubscriber::new(bridge)));
            let handle: SubscriberHandle = subscriber.clone();
            for topic in topics {
                if let Err(e) = bus.subscribe(handle.clone(), &topic) {
                    problems.push(format!("bridge '{}': {}", name, e));
                }
            }
            bridges.push(subscriber);
        }

        if !problems.is_empty() {
            return Err(SimError::Config(problems));
        }
        for warning in &warnings {
            warn!("{}", warning);
        }

        let stages: Vec<Vec<usize>> = stage_ids
            .iter()
            .map(|stage| stage.iter().filter_map(|id| index.get(id).copied()).collect())
            .collect();

        logger.open_targets(&config.logger_config)?;

        let run_id = Uuid::new_v4();
        info!(
            "built run {}: {} component(s), {} connection(s), {} stage(s), {} event(s)",
            run_id,
            components.len(),
            connections.len(),
            stages.len(),
            events.len()
        );

        Ok(SimulationContext {
            run_id,
            params: config.simulation_params.clone(),
            tick_count: config.tick_count(),
            components,
            index,
            stages,
            inputs,
            connections,
            events,
            logger,
            bus,
            bridges,
            warnings,
        })
    }
}
