use crate::core::builder::{InputSource, SimulationContext};
use crate::core::bus::{BusContext, SubscriberHandle};
use crate::core::components::StepContext;
use crate::core::error::{BusError, ComponentError, SimError, SimResult};
use crate::core::logger::LogRow;
use crate::core::values::Value;
use log::{debug, trace};

/// Executes one tick at a time against a built [`SimulationContext`]
///
/// Order within a tick:
/// 1. poll hardware bridges and publish their readings, then evaluate events;
/// 2. for each stage, for each component: resolve inputs, execute, flush deferred bus
///    deliveries, push outgoing connections;
/// 3. commit pending model switches;
/// 4. drop undelivered bus messages and sample the logged signals.
pub struct CycleEngine {
    context: SimulationContext,
    current_cycle: u64,
    /// Executions per component index, for stage accounting
    executions: Vec<u64>,
}

impl CycleEngine {
    pub fn new(context: SimulationContext) -> Self {
        let executions = vec![0; context.components.len()];
        Self {
            context,
            current_cycle: 0,
            executions,
        }
    }

    pub fn context(&self) -> &SimulationContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut SimulationContext {
        &mut self.context
    }

    pub fn into_context(self) -> SimulationContext {
        self.context
    }

    /// Number of ticks completed
    pub fn current_cycle(&self) -> u64 {
        self.current_cycle
    }

    /// How many times each component has executed, by component index
    pub fn executions(&self) -> &[u64] {
        &self.executions
    }

    /// Time of tick `k`
    pub fn time_at(&self, k: u64) -> f64 {
        self.context.params.start_time + k as f64 * self.context.params.time_step
    }

    /// Execute the next tick
    pub fn cycle(&mut self) -> SimResult<()> {
        let k = self.current_cycle;
        let t = self.time_at(k);
        let dt = self.context.params.time_step;
        trace!("tick {} at t={}", k, t);

        self.context.bus.set_time(t);
        self.poll_bridges(t)?;
        self.context
            .events
            .evaluate(t, dt, &self.context.components, &self.context.bus);

        for stage_index in 0..self.context.stages.len() {
            for position in 0..self.context.stages[stage_index].len() {
                let component = self.context.stages[stage_index][position];
                self.execute_component(component, t, dt)?;
            }
        }

        for handle in &self.context.components {
            let mut component = handle.borrow_mut();
            if let Some((from, to)) = component.commit_model_switch() {
                debug!("component '{}' switched model '{}' -> '{}' after t={}", component.id(), from, to, t);
            }
        }

        self.context.bus.end_tick();
        self.context.logger.sample(t, dt, &self.context.components)?;
        self.current_cycle += 1;
        Ok(())
    }

    /// Rows sampled so far
    pub fn rows(&self) -> &[LogRow] {
        self.context.logger.rows()
    }

    fn poll_bridges(&mut self, t: f64) -> SimResult<()> {
        for bridge in &self.context.bridges {
            let (name, readings) = {
                let mut subscriber = bridge.borrow_mut();
                let name = subscriber.bridge().name().to_string();
                let readings = subscriber.bridge_mut().poll(t).map_err(|e| {
                    SimError::Bus(BusError::Handler {
                        subscriber: name.clone(),
                        topic: "<poll>".to_string(),
                        reason: e.to_string(),
                    })
                })?;
                (name, readings)
            };
            if !readings.is_empty() {
                trace!("bridge '{}' delivered {} reading(s)", name, readings.len());
            }
            for (topic, payload) in readings {
                self.context.bus.publish(&topic, payload)?;
            }
        }
        Ok(())
    }

    fn execute_component(&mut self, index: usize, t: f64, dt: f64) -> SimResult<()> {
        let context = &self.context;
        let handle = &context.components[index];

        // Pull inputs before taking the mutable borrow; a binding may read this component
        let values: Vec<(String, Option<Value>)> = context.inputs[index]
            .iter()
            .map(|binding| {
                let value = match &binding.source {
                    InputSource::Literal(value) => Some(value.clone()),
                    InputSource::Path(path) => path.read(t, dt, &context.components),
                };
                (binding.port.clone(), value)
            })
            .collect();

        let failure = |source: ComponentError| SimError::ComponentExecution {
            component_id: handle.borrow().id().clone(),
            t,
            source,
        };

        {
            let subscriber: SubscriberHandle = handle.clone();
            let mut component = handle.borrow_mut();
            for (port, value) in values {
                if let Some(value) = value {
                    component.set_input(&port, value).map_err(|e| {
                        SimError::ComponentExecution {
                            component_id: component.id().clone(),
                            t,
                            source: e,
                        }
                    })?;
                }
            }
            let mut ctx = StepContext::new(t, dt, BusContext::new(&context.bus, &subscriber));
            if let Err(e) = component.execute(&mut ctx) {
                let component_id = component.id().clone();
                return Err(SimError::ComponentExecution {
                    component_id,
                    t,
                    source: e,
                });
            }
        }
        self.executions[index] += 1;

        context.bus.flush_deferred().map_err(|e| failure(e.into()))?;
        context
            .connections
            .propagate(index, &context.components)
            .map_err(|e| failure(ComponentError::Failed(e)))?;
        Ok(())
    }
}
