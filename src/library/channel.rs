use crate::component_core;
use crate::core::components::{Component, ComponentCore, ComponentSpec, StepContext};
use crate::core::error::ComponentError;
use crate::core::values::{Record, RecordExt};
use crate::library::{invalid, param};

/// Open channel reach as a first-order lag from `inflow` to `outflow`
///
/// `outflow` relaxes towards `inflow` with time constant `tau`, using the exact discrete
/// factor `1 - exp(-dt / tau)` so large steps never overshoot. The water in transit is
/// reported as `storage`. `tau` is read from params on every step.
pub struct Channel {
    core: ComponentCore,
}

fn tau(params: &Record) -> Result<f64, ComponentError> {
    let tau = param(params, "tau")?;
    if tau <= 0.0 {
        return Err(invalid(format!("tau must be positive, got {}", tau)));
    }
    Ok(tau)
}

impl Channel {
    pub const TYPE: &'static str = "channel";

    pub fn from_spec(spec: &ComponentSpec<'_>) -> Result<Self, ComponentError> {
        let tau = tau(spec.params)?;
        let mut core = spec.core()?;
        let initial = spec.params.get_f64_or("initial_flow", 0.0);
        core.set_state("outflow", initial);
        core.set_output("outflow", initial);
        core.set_output("storage", initial * tau);
        Ok(Self { core })
    }
}

impl Component for Channel {
    component_core!();

    fn step(&mut self, ctx: &mut StepContext<'_>) -> Result<(), ComponentError> {
        let tau = tau(&self.core.params)?;
        let inflow = self.core.input_f64_or("inflow", 0.0);
        let previous = self.core.state_f64("outflow").unwrap_or(0.0);
        let alpha = 1.0 - (-ctx.dt / tau).exp();
        let outflow = previous + alpha * (inflow - previous);

        self.core.set_state("outflow", outflow);
        self.core.set_output("outflow", outflow);
        // Linear reservoir: storage = tau * outflow
        self.core.set_output("storage", tau * outflow);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bus::{BusContext, MessageBus, SubscriberHandle};
    use crate::core::components::{ComponentHandle, ComponentRegistry};
    use crate::core::types::ComponentId;
    use crate::core::values::Value;
    use approx::assert_relative_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn channel(params: &str, bus: &MessageBus) -> ComponentHandle {
        let params: Record = serde_json::from_str(params).unwrap();
        let component = ComponentRegistry::with_builtins()
            .instantiate(Channel::TYPE, &ComponentId::new("reach"), &params)
            .unwrap();
        let handle: ComponentHandle = Rc::new(RefCell::new(component));
        let subscriber: SubscriberHandle = handle.clone();
        handle
            .borrow_mut()
            .setup(&mut BusContext::new(bus, &subscriber))
            .unwrap();
        handle
    }

    fn step(handle: &ComponentHandle, bus: &MessageBus, t: f64, inflow: f64) -> f64 {
        let subscriber: SubscriberHandle = handle.clone();
        let mut component = handle.borrow_mut();
        component.set_input("inflow", Value::from(inflow)).unwrap();
        let mut ctx = StepContext::new(t, 1.0, BusContext::new(bus, &subscriber));
        component.execute(&mut ctx).unwrap();
        component.output("outflow").and_then(|v| v.as_f64()).unwrap()
    }

    #[test]
    fn test_outflow_relaxes_with_exact_factor() {
        let bus = MessageBus::default();
        let reach = channel(r#"{"tau": 2.0}"#, &bus);
        let first = step(&reach, &bus, 0.0, 4.0);
        assert_relative_eq!(first, 4.0 * (1.0 - (-0.5_f64).exp()), epsilon = 1e-12);
    }

    #[test]
    fn test_tau_change_applies_next_step() {
        let bus = MessageBus::default();
        let reach = channel(r#"{"tau": 1.0e9}"#, &bus);
        assert!(step(&reach, &bus, 0.0, 4.0) < 1e-6);
        reach
            .borrow_mut()
            .write(&["params".to_string(), "tau".to_string()], Value::from(1.0e-3))
            .unwrap();
        assert_relative_eq!(step(&reach, &bus, 1.0, 4.0), 4.0, epsilon = 1e-9);
        assert_relative_eq!(
            reach.borrow().output("storage").and_then(|v| v.as_f64()).unwrap(),
            4.0e-3,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_rejects_non_positive_tau() {
        let params: Record = serde_json::from_str(r#"{"tau": 0.0}"#).unwrap();
        assert!(ComponentRegistry::with_builtins()
            .instantiate(Channel::TYPE, &ComponentId::new("reach"), &params)
            .is_err());
    }
}
