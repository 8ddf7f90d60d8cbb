use crate::core::bus::{BusContext, SubscriberHandle};
use crate::core::components::Lifecycle;
use crate::core::error::{SimError, SimResult};
use crate::core::execution::cycle_engine::CycleEngine;
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative stop signal checked between ticks
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Aborted,
}

/// Drives a [`CycleEngine`] through setup, the tick loop and shutdown
pub struct SimulationEngine {
    cycle_engine: CycleEngine,
    max_cycles: u64,
    abort: AbortHandle,
    set_up: bool,
    shut_down: bool,
}

impl SimulationEngine {
    pub fn new(cycle_engine: CycleEngine) -> Self {
        let max_cycles = cycle_engine.context().tick_count;
        Self {
            cycle_engine,
            max_cycles,
            abort: AbortHandle::new(),
            set_up: false,
            shut_down: false,
        }
    }

    pub fn with_abort(mut self, abort: AbortHandle) -> Self {
        self.abort = abort;
        self
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn cycle_engine(&self) -> &CycleEngine {
        &self.cycle_engine
    }

    pub fn cycle_engine_mut(&mut self) -> &mut CycleEngine {
        &mut self.cycle_engine
    }

    pub fn current_cycle(&self) -> u64 {
        self.cycle_engine.current_cycle()
    }

    /// Run every component's setup in declaration order
    pub fn setup(&mut self) -> SimResult<()> {
        if self.set_up {
            return Ok(());
        }
        let start_time = self.cycle_engine.context().params.start_time;
        let failure = {
            let context = self.cycle_engine.context();
            context.bus.set_time(start_time);
            let mut failure = None;
            for handle in &context.components {
                let subscriber: SubscriberHandle = handle.clone();
                let mut component = handle.borrow_mut();
                let mut ctx = BusContext::new(&context.bus, &subscriber);
                if let Err(source) = component.setup(&mut ctx) {
                    failure = Some((component.id().clone(), source));
                    break;
                }
            }
            failure
        };
        if let Some((component_id, source)) = failure {
            self.shutdown();
            return Err(SimError::ComponentExecution {
                component_id,
                t: start_time,
                source,
            });
        }
        self.set_up = true;
        Ok(())
    }

    /// Execute one tick
    pub fn step(&mut self) -> SimResult<()> {
        self.setup()?;
        self.cycle_engine.cycle()
    }

    /// Setup, tick until done or aborted, then shut down
    ///
    /// Shutdown runs exactly once for each component that completed setup, whether the loop
    /// finished, was aborted or failed.
    pub fn run(&mut self) -> SimResult<RunStatus> {
        self.setup()?;
        info!(
            "run {} starting: {} tick(s) of dt={}",
            self.cycle_engine.context().run_id,
            self.max_cycles,
            self.cycle_engine.context().params.time_step
        );

        let mut status = RunStatus::Completed;
        while self.current_cycle() < self.max_cycles {
            if self.abort.is_aborted() {
                warn!("run aborted after {} tick(s)", self.current_cycle());
                status = RunStatus::Aborted;
                break;
            }
            if let Err(e) = self.cycle_engine.cycle() {
                self.shutdown();
                return Err(e);
            }
        }

        self.shutdown();
        self.cycle_engine.context_mut().logger.finish()?;
        info!(
            "run {} {:?} after {} tick(s)",
            self.cycle_engine.context().run_id,
            status,
            self.current_cycle()
        );
        Ok(status)
    }

    /// Shut down every initialized component and close bridges; later calls do nothing
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        let context = self.cycle_engine.context();
        for handle in &context.components {
            let Ok(mut component) = handle.try_borrow_mut() else {
                warn!("component busy during shutdown");
                continue;
            };
            if component.lifecycle() != Lifecycle::Uninitialized {
                component.shutdown();
            }
        }
        for bridge in &context.bridges {
            if let Ok(mut subscriber) = bridge.try_borrow_mut() {
                subscriber.bridge_mut().close();
            }
        }
        // Subscriptions hold component handles
        context.bus.clear();
        debug!("shutdown complete");
    }
}

impl Drop for SimulationEngine {
    fn drop(&mut self) {
        if self.set_up {
            self.shutdown();
        }
    }
}
