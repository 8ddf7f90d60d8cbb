use crate::component_core;
use crate::core::bus::{BusContext, Message};
use crate::core::components::{Component, ComponentCore, ComponentSpec, StepContext};
use crate::core::error::ComponentError;
use crate::core::values::{Record, RecordExt, Value};
use crate::library::invalid;
use log::trace;

/// Process and measurement noise `(q, r)`
fn noise(params: &Record) -> Result<(f64, f64), ComponentError> {
    let q = params.get_f64_or("q", 1e-4);
    let r = params.get_f64_or("r", 1e-2);
    if q < 0.0 || r <= 0.0 {
        return Err(invalid(format!("kalman_filter needs q >= 0 and r > 0, got {} and {}", q, r)));
    }
    Ok((q, r))
}

/// Scalar random-walk Kalman filter
///
/// Measurements come from the `measurement` input or, with `topic` set, from the latest bus
/// message (a number, or a map read at `field`, default `value`). A tick without a new
/// measurement only runs the predict step. Outputs `estimate`, `variance` and `gain`.
/// The noise levels `q` and `r` are read from params on every step.
pub struct KalmanFilter {
    core: ComponentCore,
    estimate: f64,
    variance: f64,
    topic: Option<String>,
    field: String,
    pending: Option<f64>,
}

impl KalmanFilter {
    pub const TYPE: &'static str = "kalman_filter";

    pub fn from_spec(spec: &ComponentSpec<'_>) -> Result<Self, ComponentError> {
        let params = spec.params;
        noise(params)?;
        let estimate = params.get_f64_or("x0", 0.0);
        let variance = params.get_f64_or("p0", 1.0);
        if variance < 0.0 {
            return Err(invalid("kalman_filter needs p0 >= 0"));
        }

        let mut core = spec.core()?;
        core.set_output("estimate", estimate);
        core.set_output("variance", variance);
        Ok(Self {
            core,
            estimate,
            variance,
            topic: params.get_str("topic").map(str::to_string),
            field: params.get_str("field").unwrap_or("value").to_string(),
            pending: None,
        })
    }

    fn predict(&mut self, process_noise: f64) {
        self.variance += process_noise;
    }

    /// Returns the Kalman gain used
    fn update(&mut self, measurement: f64, measurement_noise: f64) -> f64 {
        let gain = self.variance / (self.variance + measurement_noise);
        self.estimate += gain * (measurement - self.estimate);
        self.variance *= 1.0 - gain;
        gain
    }

    /// Take the measurement for this tick; a wired input is consumed so it counts once
    fn next_measurement(&mut self) -> Option<f64> {
        let wired = self.core.inputs.remove("measurement").and_then(|v| v.as_f64());
        wired.or_else(|| self.pending.take())
    }
}

impl Component for KalmanFilter {
    component_core!();

    fn on_setup(&mut self, ctx: &mut BusContext<'_>) -> Result<(), ComponentError> {
        if let Some(topic) = &self.topic {
            ctx.subscribe(topic)?;
        }
        Ok(())
    }

    fn on_message(&mut self, message: &Message, _ctx: &mut BusContext<'_>) -> Result<(), ComponentError> {
        let reading = match &message.payload {
            Value::Map(map) => map.get_f64(&self.field),
            other => other.as_f64(),
        };
        match reading {
            Some(value) => self.pending = Some(value),
            None => trace!("kalman filter '{}' skipped non-numeric message on '{}'", self.core.id(), message.topic),
        }
        Ok(())
    }

    fn step(&mut self, _ctx: &mut StepContext<'_>) -> Result<(), ComponentError> {
        let (q, r) = noise(&self.core.params)?;
        self.predict(q);
        let gain = match self.next_measurement() {
            Some(z) => self.update(z, r),
            None => 0.0,
        };
        self.core.set_state("estimate", self.estimate);
        self.core.set_state("variance", self.variance);
        self.core.set_output("estimate", self.estimate);
        self.core.set_output("variance", self.variance);
        self.core.set_output("gain", gain);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bus::{MessageBus, SubscriberHandle};
    use crate::core::components::{ComponentHandle, ComponentRegistry};
    use crate::core::types::ComponentId;
    use approx::assert_relative_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn filter(params: &str) -> KalmanFilter {
        let registry = ComponentRegistry::new();
        let params: Record = serde_json::from_str(params).unwrap();
        let id = ComponentId::new("kf");
        let spec = ComponentSpec {
            id: &id,
            type_name: KalmanFilter::TYPE,
            params: &params,
            registry: &registry,
        };
        KalmanFilter::from_spec(&spec).unwrap()
    }

    #[test]
    fn test_first_update_gain() {
        let mut kf = filter(r#"{"q": 0.0, "r": 1.0, "x0": 0.0, "p0": 1.0}"#);
        kf.predict(0.0);
        let gain = kf.update(10.0, 1.0);
        assert_relative_eq!(gain, 0.5);
        assert_relative_eq!(kf.estimate, 5.0);
        assert_relative_eq!(kf.variance, 0.5);
    }

    #[test]
    fn test_converges_on_constant_signal() {
        let mut kf = filter(r#"{"q": 1e-5, "r": 0.5, "x0": 0.0, "p0": 10.0}"#);
        for _ in 0..200 {
            kf.predict(1e-5);
            kf.update(3.0, 0.5);
        }
        assert_relative_eq!(kf.estimate, 3.0, epsilon = 1e-3);
        assert!(kf.variance < 0.05);
    }

    #[test]
    fn test_predict_only_grows_variance() {
        let mut kf = filter(r#"{"q": 0.1, "p0": 1.0}"#);
        kf.core.set_input("measurement", Value::from(1.0));
        assert_eq!(kf.next_measurement(), Some(1.0));
        assert_eq!(kf.next_measurement(), None);
        kf.predict(0.1);
        assert_relative_eq!(kf.variance, 1.1);
    }

    fn step(handle: &ComponentHandle, bus: &MessageBus, t: f64, measured: f64) -> Result<f64, ComponentError> {
        let subscriber: SubscriberHandle = handle.clone();
        let mut component = handle.borrow_mut();
        component.set_input("measurement", Value::from(measured))?;
        let mut ctx = StepContext::new(t, 1.0, BusContext::new(bus, &subscriber));
        component.execute(&mut ctx)?;
        Ok(component.output("gain").and_then(|v| v.as_f64()).unwrap())
    }

    #[test]
    fn test_noise_change_applies_next_step() {
        let bus = MessageBus::default();
        let params: Record = serde_json::from_str(r#"{"q": 0.0, "r": 1.0, "x0": 0.0, "p0": 1.0}"#).unwrap();
        let component = ComponentRegistry::with_builtins()
            .instantiate(KalmanFilter::TYPE, &ComponentId::new("kf"), &params)
            .unwrap();
        let handle: ComponentHandle = Rc::new(RefCell::new(component));
        let subscriber: SubscriberHandle = handle.clone();
        handle
            .borrow_mut()
            .setup(&mut BusContext::new(&bus, &subscriber))
            .unwrap();

        assert_relative_eq!(step(&handle, &bus, 0.0, 10.0).unwrap(), 0.5);
        // Variance is now 0.5; with r still 1.0 the next gain would be 1/3
        handle
            .borrow_mut()
            .write(&["params".to_string(), "r".to_string()], Value::from(0.5))
            .unwrap();
        assert_relative_eq!(step(&handle, &bus, 1.0, 10.0).unwrap(), 0.5);
        assert_relative_eq!(handle.borrow().output("estimate").and_then(|v| v.as_f64()).unwrap(), 7.5);

        handle
            .borrow_mut()
            .write(&["params".to_string(), "r".to_string()], Value::from(0.0))
            .unwrap();
        assert!(step(&handle, &bus, 2.0, 10.0).is_err());
    }

    #[test]
    fn test_rejects_non_positive_r() {
        let registry = ComponentRegistry::new();
        let params: Record = serde_json::from_str(r#"{"r": 0.0}"#).unwrap();
        let id = ComponentId::new("kf");
        let spec = ComponentSpec {
            id: &id,
            type_name: KalmanFilter::TYPE,
            params: &params,
            registry: &registry,
        };
        assert!(KalmanFilter::from_spec(&spec).is_err());
    }
}
