use crate::component_core;
use crate::core::components::{Component, ComponentCore, ComponentSpec, Model, ModelIo, StepContext};
use crate::core::error::ComponentError;
use crate::core::values::{Record, RecordExt, Value};
use crate::library::{invalid, param};

const GRAVITY: f64 = 9.81;

/// Opening in `[0, 1]`: the `opening` input when wired, else `params.opening`, else fully open
fn opening(io: &ModelIo<'_>) -> f64 {
    io.inputs
        .get_f64("opening")
        .or_else(|| io.params.get_f64("opening"))
        .unwrap_or(1.0)
        .clamp(0.0, 1.0)
}

/// Upstream minus downstream level
fn head(io: &ModelIo<'_>) -> f64 {
    io.inputs.get_f64_or("upstream_level", 0.0) - io.inputs.get_f64_or("downstream_level", 0.0)
}

fn publish_flow(io: &mut ModelIo<'_>, flow: f64, opening: f64) {
    io.outputs.insert("flow".to_string(), Value::from(flow));
    io.outputs.insert("opening".to_string(), Value::from(opening));
}

/// Submerged orifice: `Q = cd * a * opening * sqrt(2 g |dh|)`, signed by the head
///
/// Coefficients are taken from params each step.
pub struct Orifice {
    discharge_coefficient: f64,
    area: f64,
}

impl Orifice {
    pub const TYPE: &'static str = "orifice";

    pub fn from_params(params: &Record) -> Result<Self, ComponentError> {
        let area = param(params, "area")?;
        let discharge_coefficient = params.get_f64_or("discharge_coefficient", 0.6);
        if area <= 0.0 || discharge_coefficient <= 0.0 {
            return Err(invalid("orifice needs area > 0 and discharge_coefficient > 0"));
        }
        Ok(Self {
            discharge_coefficient,
            area,
        })
    }
}

impl Model for Orifice {
    fn model_type(&self) -> &str {
        Self::TYPE
    }

    fn step(&mut self, io: &mut ModelIo<'_>, _t: f64, _dt: f64) -> Result<(), ComponentError> {
        *self = Self::from_params(io.params)?;
        let opening = opening(io);
        let dh = head(io);
        let flow = dh.signum() * self.discharge_coefficient * self.area * opening * (2.0 * GRAVITY * dh.abs()).sqrt();
        publish_flow(io, flow, opening);
        Ok(())
    }
}

/// Linearised gate: `Q = conductance * opening * dh`
pub struct LinearGate {
    conductance: f64,
}

impl LinearGate {
    pub const TYPE: &'static str = "linear";

    pub fn from_params(params: &Record) -> Result<Self, ComponentError> {
        let conductance = param(params, "conductance")?;
        if conductance < 0.0 {
            return Err(invalid("conductance must not be negative"));
        }
        Ok(Self { conductance })
    }
}

impl Model for LinearGate {
    fn model_type(&self) -> &str {
        Self::TYPE
    }

    fn step(&mut self, io: &mut ModelIo<'_>, _t: f64, _dt: f64) -> Result<(), ComponentError> {
        *self = Self::from_params(io.params)?;
        let opening = opening(io);
        let flow = self.conductance * opening * head(io);
        publish_flow(io, flow, opening);
        Ok(())
    }
}

/// Flow control structure between two water levels; output `flow`
pub struct Gate {
    core: ComponentCore,
}

impl Gate {
    pub const TYPE: &'static str = "gate";

    pub fn from_spec(spec: &ComponentSpec<'_>) -> Result<Self, ComponentError> {
        let mut core = spec.core_with_default_model(Orifice::TYPE)?;
        core.set_output("flow", 0.0);
        Ok(Self { core })
    }
}

impl Component for Gate {
    component_core!();

    fn step(&mut self, ctx: &mut StepContext<'_>) -> Result<(), ComponentError> {
        self.core.step_active_model(ctx.t, ctx.dt)
    }
}
