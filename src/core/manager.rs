//! Public entry points: build a scenario, run it, collect what it produced.

use crate::core::builder::SimulationBuilder;
use crate::core::bus::{BusStats, HardwareBridge};
use crate::core::components::ComponentRegistry;
use crate::core::config::ScenarioConfig;
use crate::core::error::{EventActionError, SimResult};
use crate::core::events::FiredEvent;
use crate::core::execution::{AbortHandle, CycleEngine, RunStatus, SimulationEngine};
use crate::core::logger::{to_jsonl, LogRow};

/// Everything a finished run reports back
#[derive(Debug, Clone)]
pub struct SimulationReport {
    pub run_id: String,
    pub status: RunStatus,
    pub ticks: u64,
    pub rows: Vec<LogRow>,
    pub fired_events: Vec<FiredEvent>,
    pub action_errors: Vec<EventActionError>,
    pub bus_stats: BusStats,
    pub warnings: Vec<String>,
}

impl SimulationReport {
    /// Logged rows as JSON lines, one per tick
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        to_jsonl(&self.rows)
    }
}

/// Builds and runs one scenario against a registry
pub struct SimulationManager<'r> {
    registry: &'r ComponentRegistry,
    bridges: Vec<Box<dyn HardwareBridge>>,
    abort: AbortHandle,
}

impl<'r> SimulationManager<'r> {
    pub fn new(registry: &'r ComponentRegistry) -> Self {
        Self {
            registry,
            bridges: Vec::new(),
            abort: AbortHandle::new(),
        }
    }

    pub fn with_bridge(mut self, bridge: Box<dyn HardwareBridge>) -> Self {
        self.bridges.push(bridge);
        self
    }

    pub fn with_abort(mut self, abort: AbortHandle) -> Self {
        self.abort = abort;
        self
    }

    /// Handle that stops the run before its next tick
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn run(self, config: &ScenarioConfig) -> SimResult<SimulationReport> {
        let context = SimulationBuilder::new(self.registry)
            .with_bridges(self.bridges)
            .build(config)?;
        let run_id = context.run_id.to_string();
        let warnings = context.warnings.clone();

        let mut engine = SimulationEngine::new(CycleEngine::new(context)).with_abort(self.abort);
        let status = engine.run()?;

        let cycle_engine = engine.cycle_engine_mut();
        let ticks = cycle_engine.current_cycle();
        let context = cycle_engine.context_mut();
        let (fired_events, action_errors) = context.events.take_results();
        Ok(SimulationReport {
            run_id,
            status,
            ticks,
            rows: context.logger.take_rows(),
            fired_events,
            action_errors,
            bus_stats: context.bus.stats(),
            warnings,
        })
    }
}

/// Build and run `config`, returning the logged rows
pub fn run(registry: &ComponentRegistry, config: &ScenarioConfig) -> SimResult<Vec<LogRow>> {
    SimulationManager::new(registry).run(config).map(|report| report.rows)
}
