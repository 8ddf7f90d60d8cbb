use crate::core::components::ComponentRegistry;
use crate::core::config::ScenarioConfig;
use crate::core::error::SimResult;
use crate::core::execution::config::{ConcurrencyMode, ExecutionConfig};
use crate::core::manager::{SimulationManager, SimulationReport};
use log::{info, warn};
use rayon::prelude::*;

/// Runs independent scenarios, for example a parameter sweep
///
/// Each scenario builds its own context on the worker that runs it; only the registry is
/// shared. Results come back in input order whatever the concurrency mode.
pub struct BatchRunner<'r> {
    registry: &'r ComponentRegistry,
    config: ExecutionConfig,
}

impl<'r> BatchRunner<'r> {
    pub fn new(registry: &'r ComponentRegistry, config: ExecutionConfig) -> Self {
        Self { registry, config }
    }

    pub fn run_all(&self, scenarios: &[ScenarioConfig]) -> Vec<SimResult<SimulationReport>> {
        info!(
            "batch of {} scenario(s), {:?} mode",
            scenarios.len(),
            self.config.concurrency_mode
        );
        match self.config.concurrency_mode {
            ConcurrencyMode::Sequential => scenarios.iter().map(|s| self.run_one(s)).collect(),
            ConcurrencyMode::Rayon => {
                let mut builder = rayon::ThreadPoolBuilder::new();
                if let Some(size) = self.config.thread_pool_size {
                    builder = builder.num_threads(size);
                }
                match builder.build() {
                    Ok(pool) => pool.install(|| scenarios.par_iter().map(|s| self.run_one(s)).collect()),
                    Err(e) => {
                        warn!("could not build thread pool ({}), using the global pool", e);
                        scenarios.par_iter().map(|s| self.run_one(s)).collect()
                    }
                }
            }
        }
    }

    fn run_one(&self, scenario: &ScenarioConfig) -> SimResult<SimulationReport> {
        SimulationManager::new(self.registry).run(scenario)
    }
}
