use crate::component_core;
use crate::core::components::{Component, ComponentCore, ComponentSpec, StepContext};
use crate::core::error::ComponentError;
use crate::core::values::{Record, Value};
use crate::library::invalid;

/// Emits `params.value` on `output` every tick
///
/// An optional `profile` of `[t, value]` pairs, sorted by time, makes the output a step
/// function: the last entry with `t <= now` wins, and `value` applies before the first one.
/// Changing `params.value` through an event takes effect on the next execute.
pub struct ConstantSource {
    core: ComponentCore,
    profile: Vec<(f64, Value)>,
}

impl ConstantSource {
    pub const TYPE: &'static str = "constant_source";

    pub fn from_spec(spec: &ComponentSpec<'_>) -> Result<Self, ComponentError> {
        let mut core = spec.core()?;
        let profile = parse_profile(spec.params)?;
        let value = spec.params.get("value").cloned().unwrap_or(Value::Number(0.0));
        core.set_output("output", value);
        Ok(Self { core, profile })
    }

    fn value_at(&self, t: f64) -> Value {
        self.profile
            .iter()
            .rev()
            .find(|(at, _)| *at <= t)
            .map(|(_, value)| value.clone())
            .or_else(|| self.core.params.get("value").cloned())
            .unwrap_or(Value::Number(0.0))
    }
}

fn parse_profile(params: &Record) -> Result<Vec<(f64, Value)>, ComponentError> {
    let Some(entries) = params.get("profile") else {
        return Ok(Vec::new());
    };
    let entries = entries
        .as_list()
        .ok_or_else(|| invalid("profile must be a list of [t, value] pairs"))?;

    let mut profile = Vec::with_capacity(entries.len());
    for entry in entries {
        match entry.as_list() {
            Some([at, value]) => {
                let at = at
                    .as_f64()
                    .ok_or_else(|| invalid(format!("profile time must be a number, found {}", at.kind())))?;
                profile.push((at, value.clone()));
            }
            _ => return Err(invalid("profile entries must be [t, value] pairs")),
        }
    }
    if profile.windows(2).any(|pair| pair[1].0 < pair[0].0) {
        return Err(invalid("profile times must be non-decreasing"));
    }
    Ok(profile)
}

impl Component for ConstantSource {
    component_core!();

    fn step(&mut self, ctx: &mut StepContext<'_>) -> Result<(), ComponentError> {
        let value = self.value_at(ctx.t);
        self.core.set_output("output", value);
        Ok(())
    }
}
