use crate::component_core;
use crate::core::bus::{BusContext, Message};
use crate::core::components::{Component, ComponentCore, ComponentSpec, StepContext};
use crate::core::error::ComponentError;
use crate::core::values::{Record, RecordExt, Value};
use crate::library::{invalid, param};
use log::{debug, warn};

/// Interpret a command payload as on/off
///
/// Accepts booleans, numbers (non-zero is on), the words `on|start|off|stop`, or a map
/// carrying one of those under `running` or `command`.
fn command_state(payload: &Value) -> Option<bool> {
    match payload {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => Some(*n != 0.0),
        Value::Text(word) => match word.to_ascii_lowercase().as_str() {
            "on" | "start" => Some(true),
            "off" | "stop" => Some(false),
            _ => None,
        },
        Value::Map(map) => map
            .get("running")
            .or_else(|| map.get("command"))
            .and_then(command_state),
        _ => None,
    }
}

fn flow_rate(params: &Record) -> Result<f64, ComponentError> {
    let flow_rate = param(params, "flow_rate")?;
    if flow_rate < 0.0 {
        return Err(invalid("flow_rate must not be negative"));
    }
    Ok(flow_rate)
}

/// Fixed-rate pump switched on and off by bus commands
///
/// Listens on `command_topic` (default `commands.<id>`) and outputs `flow` and `running`.
/// With `status_topic` set, each change of state is published there during the next step.
/// `flow_rate` is read from params on every step.
pub struct Pump {
    core: ComponentCore,
    command_topic: String,
    status_topic: Option<String>,
    reported: Option<bool>,
}

impl Pump {
    pub const TYPE: &'static str = "pump";

    pub fn from_spec(spec: &ComponentSpec<'_>) -> Result<Self, ComponentError> {
        let mut core = spec.core()?;
        let flow_rate = flow_rate(spec.params)?;
        let running = spec.params.get_bool_or("initially_running", false);
        let command_topic = spec
            .params
            .get_str("command_topic")
            .map(str::to_string)
            .unwrap_or_else(|| format!("commands.{}", spec.id));
        core.set_state("running", running);
        core.set_output("running", running);
        core.set_output("flow", if running { flow_rate } else { 0.0 });
        Ok(Self {
            core,
            command_topic,
            status_topic: spec.params.get_str("status_topic").map(str::to_string),
            reported: None,
        })
    }

    /// On/off lives in `state.running` so events can set it too
    pub fn is_running(&self) -> bool {
        self.core.state.get_bool_or("running", false)
    }
}

impl Component for Pump {
    component_core!();

    fn on_setup(&mut self, ctx: &mut BusContext<'_>) -> Result<(), ComponentError> {
        ctx.subscribe(&self.command_topic)?;
        Ok(())
    }

    fn on_message(&mut self, message: &Message, _ctx: &mut BusContext<'_>) -> Result<(), ComponentError> {
        match command_state(&message.payload) {
            Some(running) => {
                if running != self.is_running() {
                    debug!(
                        "pump '{}' {} at t={}",
                        self.core.id(),
                        if running { "on" } else { "off" },
                        message.timestamp
                    );
                }
                self.core.set_state("running", running);
            }
            None => warn!(
                "pump '{}' ignored command {} on '{}'",
                self.core.id(),
                message.payload,
                message.topic
            ),
        }
        Ok(())
    }

    fn step(&mut self, ctx: &mut StepContext<'_>) -> Result<(), ComponentError> {
        let running = self.is_running();
        let flow = if running { flow_rate(&self.core.params)? } else { 0.0 };
        self.core.set_output("running", running);
        self.core.set_output("flow", flow);

        if self.reported != Some(running) {
            if let Some(topic) = &self.status_topic {
                ctx.publish(topic, running)?;
            }
            self.reported = Some(running);
        }
        Ok(())
    }
}
