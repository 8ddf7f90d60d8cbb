use crate::component_core;
use crate::core::components::{Component, ComponentCore, ComponentSpec, StepContext};
use crate::core::error::ComponentError;
use crate::core::values::{Record, RecordExt};
use crate::library::invalid;

/// Sign convention of the control error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Output rises when the process variable rises above the setpoint
    Direct,
    /// Output rises when the process variable falls below the setpoint
    Reverse,
}

impl Direction {
    fn parse(name: &str) -> Result<Self, ComponentError> {
        match name {
            "direct" => Ok(Direction::Direct),
            "reverse" => Ok(Direction::Reverse),
            other => Err(invalid(format!("direction must be direct or reverse, got '{}'", other))),
        }
    }

    fn error(self, setpoint: f64, measured: f64) -> f64 {
        match self {
            Direction::Direct => measured - setpoint,
            Direction::Reverse => setpoint - measured,
        }
    }
}

/// Discrete PID with output limits and conditional-integration anti-windup
///
/// Reads `process_variable` (required) and `setpoint` (input, falling back to
/// `params.setpoint`); writes `output` and the current `error`. Gains are read from params on
/// every step so events can retune a running controller. `Kp`, `Ki`, `Kd` and `set_point`
/// are accepted in place of `kp`, `ki`, `kd` and `setpoint`; the lowercase names win when
/// both are given.
pub struct PidController {
    core: ComponentCore,
    direction: Direction,
    integral: f64,
    previous_error: Option<f64>,
}

impl PidController {
    pub const TYPE: &'static str = "pid_controller";

    pub fn from_spec(spec: &ComponentSpec<'_>) -> Result<Self, ComponentError> {
        let mut core = spec.core()?;
        let direction = Direction::parse(spec.params.get_str("direction").unwrap_or("reverse"))?;
        let (min, max) = limits(spec.params.get_f64("output_min"), spec.params.get_f64("output_max"))?;
        let initial = spec.params.get_f64_or("initial_output", 0.0).clamp(min, max);
        core.set_output("output", initial);
        Ok(Self {
            core,
            direction,
            integral: 0.0,
            previous_error: None,
        })
    }

    fn gains(&self) -> (f64, f64, f64) {
        let params = &self.core.params;
        (
            either(params, "kp", "Kp").unwrap_or(1.0),
            either(params, "ki", "Ki").unwrap_or(0.0),
            either(params, "kd", "Kd").unwrap_or(0.0),
        )
    }
}

/// Numeric entry under `name`, else under its `alias`
fn either(record: &Record, name: &str, alias: &str) -> Option<f64> {
    record.get_f64(name).or_else(|| record.get_f64(alias))
}

fn limits(min: Option<f64>, max: Option<f64>) -> Result<(f64, f64), ComponentError> {
    let min = min.unwrap_or(f64::NEG_INFINITY);
    let max = max.unwrap_or(f64::INFINITY);
    if min > max {
        return Err(invalid(format!("output_min {} is above output_max {}", min, max)));
    }
    Ok((min, max))
}

impl Component for PidController {
    component_core!();

    fn step(&mut self, ctx: &mut StepContext<'_>) -> Result<(), ComponentError> {
        let measured = self.core.input_f64("process_variable")?;
        let setpoint = either(&self.core.inputs, "setpoint", "set_point")
            .or_else(|| either(&self.core.params, "setpoint", "set_point"))
            .ok_or_else(|| invalid("setpoint is neither an input nor a parameter"))?;
        let (kp, ki, kd) = self.gains();
        let (min, max) = limits(self.core.params.get_f64("output_min"), self.core.params.get_f64("output_max"))?;

        let error = self.direction.error(setpoint, measured);
        let derivative = match self.previous_error {
            Some(previous) if ctx.dt > 0.0 => (error - previous) / ctx.dt,
            _ => 0.0,
        };

        // Integrate only while that does not drive a saturated output further out
        let candidate = self.integral + error * ctx.dt;
        let unsaturated = kp * error + ki * candidate + kd * derivative;
        let winding_up = (unsaturated > max && ki * error > 0.0) || (unsaturated < min && ki * error < 0.0);
        if !winding_up {
            self.integral = candidate;
        }

        let output = (kp * error + ki * self.integral + kd * derivative).clamp(min, max);
        self.previous_error = Some(error);

        self.core.set_state("integral", self.integral);
        self.core.set_output("error", error);
        self.core.set_output("output", output);
        Ok(())
    }
}
