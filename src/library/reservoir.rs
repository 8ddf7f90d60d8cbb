//! Storage with a water balance: level and volume from inflow and outflow.

use crate::component_core;
use crate::core::components::{Component, ComponentCore, ComponentSpec, Model, ModelIo, StepContext};
use crate::core::error::ComponentError;
use crate::core::values::{Record, RecordExt, Value};
use crate::library::{invalid, param};

/// Level-volume relation of a storage
///
/// Geometry models re-read their dimensions from params on every step.
trait Geometry {
    /// Plan area at level `h`
    fn area_at(&self, h: f64) -> f64;
    fn volume_at(&self, h: f64) -> f64;
}

/// Explicit Euler step of the balance, clamped to `[min_level, max_level]`
///
/// Volume that would push the level past `max_level` leaves as `spill` (a rate).
fn integrate(geometry: &impl Geometry, io: &mut ModelIo<'_>, dt: f64) -> Result<(), ComponentError> {
    let initial = io.params.get_f64_or("initial_level", 0.0);
    let level = io.state.get_f64_or("level", initial);
    let min_level = io.params.get_f64_or("min_level", 0.0);
    let max_level = io.params.get_f64("max_level");

    let inflow = io.inputs.get_f64_or("inflow", 0.0);
    let outflow = io.inputs.get_f64_or("outflow", 0.0);
    let area = geometry.area_at(level);
    if area <= 0.0 {
        return Err(ComponentError::Failed(format!("non-positive area {} at level {}", area, level)));
    }

    let mut next = level + (inflow - outflow) * dt / area;
    let mut spill = 0.0;
    if let Some(max_level) = max_level {
        if next > max_level {
            spill = (geometry.volume_at(next) - geometry.volume_at(max_level)) / dt;
            next = max_level;
        }
    }
    next = next.max(min_level);

    let volume = geometry.volume_at(next);
    io.state.insert("level".to_string(), Value::from(next));
    io.state.insert("volume".to_string(), Value::from(volume));
    io.outputs.insert("level".to_string(), Value::from(next));
    io.outputs.insert("volume".to_string(), Value::from(volume));
    io.outputs.insert("spill".to_string(), Value::from(spill));
    Ok(())
}

/// Vertical walls: constant `area`
pub struct Prismatic {
    area: f64,
}

impl Prismatic {
    pub const TYPE: &'static str = "prismatic";

    pub fn from_params(params: &Record) -> Result<Self, ComponentError> {
        let area = param(params, "area")?;
        if area <= 0.0 {
            return Err(invalid(format!("area must be positive, got {}", area)));
        }
        Ok(Self { area })
    }
}

impl Geometry for Prismatic {
    fn area_at(&self, _h: f64) -> f64 {
        self.area
    }

    fn volume_at(&self, h: f64) -> f64 {
        self.area * h
    }
}

impl Model for Prismatic {
    fn model_type(&self) -> &str {
        Self::TYPE
    }

    fn step(&mut self, io: &mut ModelIo<'_>, _t: f64, dt: f64) -> Result<(), ComponentError> {
        *self = Self::from_params(io.params)?;
        integrate(&*self, io, dt)
    }
}

/// Sloped walls: area grows linearly with level, `A(h) = bottom_area + side_slope * h`
pub struct Tapered {
    bottom_area: f64,
    side_slope: f64,
}

impl Tapered {
    pub const TYPE: &'static str = "tapered";

    pub fn from_params(params: &Record) -> Result<Self, ComponentError> {
        let bottom_area = match params.get_f64("bottom_area") {
            Some(value) => value,
            None => param(params, "area")?,
        };
        let side_slope = params.get_f64_or("side_slope", 0.0);
        if bottom_area <= 0.0 || side_slope < 0.0 {
            return Err(invalid(format!(
                "tapered geometry needs bottom_area > 0 and side_slope >= 0, got {} and {}",
                bottom_area, side_slope
            )));
        }
        Ok(Self {
            bottom_area,
            side_slope,
        })
    }
}

impl Geometry for Tapered {
    fn area_at(&self, h: f64) -> f64 {
        self.bottom_area + self.side_slope * h
    }

    fn volume_at(&self, h: f64) -> f64 {
        self.bottom_area * h + 0.5 * self.side_slope * h * h
    }
}

impl Model for Tapered {
    fn model_type(&self) -> &str {
        Self::TYPE
    }

    fn step(&mut self, io: &mut ModelIo<'_>, _t: f64, dt: f64) -> Result<(), ComponentError> {
        *self = Self::from_params(io.params)?;
        integrate(&*self, io, dt)
    }
}

/// Reservoir or tank; inputs `inflow` and `outflow`, outputs `level`, `volume`, `spill`
pub struct Reservoir {
    core: ComponentCore,
}

impl Reservoir {
    pub const TYPE: &'static str = "reservoir";

    pub fn from_spec(spec: &ComponentSpec<'_>) -> Result<Self, ComponentError> {
        let mut core = spec.core_with_default_model(Prismatic::TYPE)?;
        let level = spec.params.get_f64_or("initial_level", 0.0);
        if let Some(max_level) = spec.params.get_f64("max_level") {
            if level > max_level {
                return Err(invalid(format!(
                    "initial_level {} is above max_level {}",
                    level, max_level
                )));
            }
        }
        core.set_state("level", level);
        core.set_output("level", level);
        Ok(Self { core })
    }
}

impl Component for Reservoir {
    component_core!();

    fn step(&mut self, ctx: &mut StepContext<'_>) -> Result<(), ComponentError> {
        self.core.step_active_model(ctx.t, ctx.dt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn run(model: &mut dyn Model, params: &Record, state: &mut Record, inflow: f64, outflow: f64) -> Record {
        let mut inputs = Record::new();
        inputs.insert("inflow".to_string(), Value::from(inflow));
        inputs.insert("outflow".to_string(), Value::from(outflow));
        let mut outputs = Record::new();
        let mut io = ModelIo {
            params,
            inputs: &inputs,
            state,
            outputs: &mut outputs,
        };
        model.step(&mut io, 0.0, 1.0).unwrap();
        outputs
    }

    fn params(json: &str) -> Record {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_prismatic_balance() {
        let params = params(r#"{"area": 100.0, "initial_level": 2.0}"#);
        let mut model = Prismatic::from_params(&params).unwrap();
        let mut state = Record::new();
        let outputs = run(&mut model, &params, &mut state, 5.0, 1.0);
        assert_relative_eq!(outputs.get_f64("level").unwrap(), 2.04, epsilon = 1e-9);
        assert_relative_eq!(outputs.get_f64("volume").unwrap(), 204.0, epsilon = 1e-9);
        assert_eq!(state.get_f64("level"), outputs.get_f64("level"));
    }

    #[test]
    fn test_level_never_negative() {
        let params = params(r#"{"area": 10.0, "initial_level": 0.1}"#);
        let mut model = Prismatic::from_params(&params).unwrap();
        let mut state = Record::new();
        let outputs = run(&mut model, &params, &mut state, 0.0, 50.0);
        assert_eq!(outputs.get_f64("level"), Some(0.0));
    }

    #[test]
    fn test_spill_above_max_level() {
        let params = params(r#"{"area": 10.0, "initial_level": 4.9, "max_level": 5.0}"#);
        let mut model = Prismatic::from_params(&params).unwrap();
        let mut state = Record::new();
        let outputs = run(&mut model, &params, &mut state, 11.0, 0.0);
        assert_eq!(outputs.get_f64("level"), Some(5.0));
        assert_relative_eq!(outputs.get_f64("spill").unwrap(), 10.0, epsilon = 1e-9);
    }

    #[test]
    fn test_tapered_rises_slower_when_wider() {
        let params = params(r#"{"bottom_area": 10.0, "side_slope": 10.0, "initial_level": 1.0}"#);
        let mut model = Tapered::from_params(&params).unwrap();
        let mut state = Record::new();
        // area at h=1 is 20
        let outputs = run(&mut model, &params, &mut state, 20.0, 0.0);
        assert_relative_eq!(outputs.get_f64("level").unwrap(), 2.0, epsilon = 1e-9);
        assert_relative_eq!(outputs.get_f64("volume").unwrap(), 10.0 * 2.0 + 0.5 * 10.0 * 4.0, epsilon = 1e-9);
    }

    #[test]
    fn test_area_change_applies_next_step() {
        let mut params = params(r#"{"area": 10.0, "initial_level": 1.0}"#);
        let mut model = Prismatic::from_params(&params).unwrap();
        let mut state = Record::new();
        run(&mut model, &params, &mut state, 10.0, 0.0);
        params.insert("area".to_string(), Value::from(100.0));
        let outputs = run(&mut model, &params, &mut state, 10.0, 0.0);
        assert_relative_eq!(outputs.get_f64("level").unwrap(), 2.1, epsilon = 1e-9);
    }

    #[test]
    fn test_rejects_bad_area() {
        assert!(Prismatic::from_params(&params(r#"{"area": 0.0}"#)).is_err());
        assert!(Prismatic::from_params(&params(r#"{}"#)).is_err());
    }
}
