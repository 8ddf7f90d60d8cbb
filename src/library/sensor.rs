use crate::component_core;
use crate::core::bus::topic::validate_topic;
use crate::core::components::{Component, ComponentCore, ComponentSpec, StepContext};
use crate::core::error::ComponentError;
use crate::core::pipeline::{DataPipeline, StageRegistry};
use crate::core::values::{Record, RecordExt, Value};
use crate::library::invalid;
use log::warn;

/// What a sensor does when its pipeline rejects a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnPipelineError {
    /// Pass the raw reading through and count the failure
    Raw,
    /// Fail the tick
    Fail,
}

/// Measurement point: inputs pass through a data pipeline onto outputs of the same name
///
/// Every input port is part of the payload. With `topic` set, the processed record is also
/// published there each tick. `on_pipeline_error` is `raw` (default) or `fail`.
pub struct Sensor {
    core: ComponentCore,
    pipeline: DataPipeline,
    topic: Option<String>,
    on_error: OnPipelineError,
    failures: u64,
}

impl Sensor {
    pub const TYPE: &'static str = "sensor";

    pub fn from_spec(spec: &ComponentSpec<'_>, stages: &StageRegistry) -> Result<Self, ComponentError> {
        let core = spec.core()?;
        let pipeline = DataPipeline::from_params(spec.params, stages)?;
        let topic = spec.params.get_str("topic").map(str::to_string);
        if let Some(topic) = &topic {
            validate_topic(topic)?;
        }
        let on_error = match spec.params.get_str("on_pipeline_error").unwrap_or("raw") {
            "raw" => OnPipelineError::Raw,
            "fail" => OnPipelineError::Fail,
            other => {
                return Err(invalid(format!(
                    "on_pipeline_error must be raw or fail, got '{}'",
                    other
                )))
            }
        };
        Ok(Self {
            core,
            pipeline,
            topic,
            on_error,
            failures: 0,
        })
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }
}

impl Component for Sensor {
    component_core!();

    fn step(&mut self, ctx: &mut StepContext<'_>) -> Result<(), ComponentError> {
        let raw: Record = self.core.inputs.clone();
        let processed = match self.pipeline.process(raw.clone()) {
            Ok(processed) => processed,
            Err(e) if self.on_error == OnPipelineError::Raw => {
                self.failures += 1;
                warn!("sensor '{}' passing raw reading at t={}: {}", self.core.id(), ctx.t, e);
                raw
            }
            Err(e) => return Err(e.into()),
        };

        for (key, value) in &processed {
            self.core.set_output(key, value.clone());
        }
        self.core.set_state("pipeline_failures", self.failures as f64);
        if let Some(topic) = &self.topic {
            ctx.publish(topic, Value::Map(processed))?;
        }
        Ok(())
    }

    fn on_shutdown(&mut self) {
        self.pipeline.reset();
    }
}
