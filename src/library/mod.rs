//! Built-in water-system components and the physical models behind them.
//!
//! Everything here is registered through [`register_builtins`] with the same factory
//! interface third-party types use.

pub mod channel;
pub mod constant_source;
pub mod gate;
pub mod kalman_filter;
pub mod pid_controller;
pub mod pump;
pub mod reservoir;
pub mod rule_dispatcher;
pub mod sensor;

pub use channel::Channel;
pub use constant_source::ConstantSource;
pub use gate::{Gate, LinearGate, Orifice};
pub use kalman_filter::KalmanFilter;
pub use pid_controller::{Direction, PidController};
pub use pump::Pump;
pub use reservoir::{Prismatic, Reservoir, Tapered};
pub use rule_dispatcher::RuleDispatcher;
pub use sensor::{OnPipelineError, Sensor};

use crate::boxed;
use crate::core::components::{Component, ComponentRegistry, Model};
use crate::core::error::ComponentError;
use crate::core::pipeline::StageRegistry;
use crate::core::values::{Record, RecordExt};

/// Add every built-in component and model type, overwriting same-named entries
pub fn register_builtins(registry: &mut ComponentRegistry) {
    register_builtins_with_stages(registry, StageRegistry::with_builtins());
}

/// Like [`register_builtins`], with sensors building their pipelines from `stages`
pub fn register_builtins_with_stages(registry: &mut ComponentRegistry, stages: StageRegistry) {
    registry.replace_model(Prismatic::TYPE, |p| boxed!(Prismatic::from_params(p) => Model));
    registry.replace_model(Tapered::TYPE, |p| boxed!(Tapered::from_params(p) => Model));
    registry.replace_model(Orifice::TYPE, |p| boxed!(Orifice::from_params(p) => Model));
    registry.replace_model(LinearGate::TYPE, |p| boxed!(LinearGate::from_params(p) => Model));

    registry.replace(ConstantSource::TYPE, |spec| boxed!(ConstantSource::from_spec(spec) => Component));
    registry.replace(Reservoir::TYPE, |spec| boxed!(Reservoir::from_spec(spec) => Component));
    registry.replace(Gate::TYPE, |spec| boxed!(Gate::from_spec(spec) => Component));
    registry.replace(Pump::TYPE, |spec| boxed!(Pump::from_spec(spec) => Component));
    registry.replace(Channel::TYPE, |spec| boxed!(Channel::from_spec(spec) => Component));
    registry.replace(PidController::TYPE, |spec| boxed!(PidController::from_spec(spec) => Component));
    registry.replace(KalmanFilter::TYPE, |spec| boxed!(KalmanFilter::from_spec(spec) => Component));
    registry.replace(RuleDispatcher::TYPE, |spec| boxed!(RuleDispatcher::from_spec(spec) => Component));
    registry.replace(Sensor::TYPE, move |spec| boxed!(Sensor::from_spec(spec, &stages) => Component));
}

pub(crate) fn invalid(message: impl Into<String>) -> ComponentError {
    ComponentError::InvalidParameter(message.into())
}

/// Required numeric parameter
pub(crate) fn param(params: &Record, key: &str) -> Result<f64, ComponentError> {
    params.require_f64(key).map_err(ComponentError::InvalidParameter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_registered() {
        let registry = ComponentRegistry::with_builtins();
        assert_eq!(
            registry.type_names(),
            vec![
                "channel",
                "constant_source",
                "gate",
                "kalman_filter",
                "pid_controller",
                "pump",
                "reservoir",
                "rule_dispatcher",
                "sensor"
            ]
        );
        assert_eq!(
            registry.model_type_names(),
            vec!["linear", "orifice", "prismatic", "tapered"]
        );
    }

    #[test]
    fn test_third_party_type_beside_builtins() {
        let mut registry = ComponentRegistry::with_builtins();
        assert!(registry
            .register(Reservoir::TYPE, |spec| boxed!(Reservoir::from_spec(spec) => Component))
            .is_err());
        registry
            .register("weir", |spec| boxed!(Channel::from_spec(spec) => Component))
            .unwrap();
        assert!(registry.has_type("weir"));
    }
}
