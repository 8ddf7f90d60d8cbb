use crate::component_core;
use crate::core::builder::{SimulationBuilder, SimulationContext};
use crate::core::bus::{BusContext, Message};
use crate::core::components::{Component, ComponentCore, ComponentRegistry, ComponentSpec, StepContext};
use crate::core::config::ScenarioConfig;
use crate::core::error::ComponentError;
use crate::core::values::RecordExt;
use std::sync::{Arc, Mutex};

/// Shared record of lifecycle calls, e.g. `exec:a@2`
pub type Trace = Arc<Mutex<Vec<String>>>;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Test component that records every hook it sees
///
/// Params: `subscribe` (topic pattern), `publish` (topic written each step with `t`),
/// `fail_at` (time whose step fails), `fail_setup` (bool). Outputs `value = input + 1` and
/// `count` (executions so far).
pub struct Probe {
    core: ComponentCore,
    trace: Trace,
    executions: u64,
}

impl Probe {
    fn record(&self, entry: String) {
        if let Ok(mut trace) = self.trace.lock() {
            trace.push(entry);
        }
    }
}

impl Component for Probe {
    component_core!();

    fn on_setup(&mut self, ctx: &mut BusContext<'_>) -> Result<(), ComponentError> {
        if self.core.params.get_bool_or("fail_setup", false) {
            return Err(ComponentError::Failed("setup refused".to_string()));
        }
        if let Some(pattern) = self.core.params.get_str("subscribe").map(str::to_string) {
            ctx.subscribe(&pattern)?;
        }
        self.record(format!("setup:{}", self.core.id()));
        Ok(())
    }

    fn on_message(&mut self, message: &Message, _ctx: &mut BusContext<'_>) -> Result<(), ComponentError> {
        let received = self.core.state_f64("received").unwrap_or(0.0) + 1.0;
        self.core.set_state("received", received);
        self.record(format!("msg:{}:{}", self.core.id(), message.topic));
        Ok(())
    }

    fn step(&mut self, ctx: &mut StepContext<'_>) -> Result<(), ComponentError> {
        if self.core.params.get_f64("fail_at") == Some(ctx.t) {
            return Err(ComponentError::Failed("probe failure".to_string()));
        }
        self.executions += 1;
        self.record(format!("exec:{}@{}", self.core.id(), ctx.t));

        let value = self.core.input_f64_or("input", 0.0) + 1.0;
        self.core.set_output("value", value);
        self.core.set_output("count", self.executions as f64);
        if let Some(topic) = self.core.params.get_str("publish").map(str::to_string) {
            ctx.publish(&topic, ctx.t)?;
        }
        Ok(())
    }

    fn on_shutdown(&mut self) {
        self.record(format!("shutdown:{}", self.core.id()));
    }
}

/// Built-in registry plus the `probe` type writing to `trace`
pub fn registry(trace: &Trace) -> ComponentRegistry {
    let mut registry = ComponentRegistry::with_builtins();
    let trace = trace.clone();
    registry
        .register("probe", move |spec: &ComponentSpec<'_>| {
            Ok(Box::new(Probe {
                core: spec.core()?,
                trace: trace.clone(),
                executions: 0,
            }) as Box<dyn Component>)
        })
        .unwrap();
    registry
}

pub fn config(json: &str) -> ScenarioConfig {
    ScenarioConfig::from_json_str(json).unwrap()
}

pub fn build(registry: &ComponentRegistry, json: &str) -> SimulationContext {
    SimulationBuilder::new(registry).build(&config(json)).unwrap()
}

pub fn entries(trace: &Trace, prefix: &str) -> Vec<String> {
    trace
        .lock()
        .unwrap()
        .iter()
        .filter(|entry| entry.starts_with(prefix))
        .cloned()
        .collect()
}
