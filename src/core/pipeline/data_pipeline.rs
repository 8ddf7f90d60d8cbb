use crate::core::config::PipelineStageConfig;
use crate::core::error::PipelineError;
use crate::core::pipeline::stages::{Clean, Clip, MovingAverage, Noise, OutlierRemove, UnitConvert};
use crate::core::values::{Record, Value};
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;

/// One step of a data pipeline
///
/// Stages may keep state between calls (rolling windows, last good values, RNG); the
/// pipeline calls them in declared order, once per payload.
pub trait Transformer {
    /// Stage type name, used in error reports
    fn name(&self) -> &str;

    fn apply(&mut self, payload: Record) -> Result<Record, PipelineError>;

    /// Forget accumulated history
    fn reset(&mut self) {}
}

pub type StageFactory = Arc<dyn Fn(&Record) -> Result<Box<dyn Transformer>, PipelineError> + Send + Sync>;

/// Maps stage type names to constructors
#[derive(Clone, Default)]
pub struct StageRegistry {
    factories: HashMap<String, StageFactory>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in stage types
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Clean::NAME, |p| Ok(Box::new(Clean::from_params(p)?) as Box<dyn Transformer>));
        registry.register(UnitConvert::NAME, |p| {
            Ok(Box::new(UnitConvert::from_params(p)?) as Box<dyn Transformer>)
        });
        registry.register(OutlierRemove::NAME, |p| {
            Ok(Box::new(OutlierRemove::from_params(p)?) as Box<dyn Transformer>)
        });
        registry.register(Noise::NAME, |p| Ok(Box::new(Noise::from_params(p)?) as Box<dyn Transformer>));
        registry.register(Clip::NAME, |p| Ok(Box::new(Clip::from_params(p)?) as Box<dyn Transformer>));
        registry.register(MovingAverage::NAME, |p| {
            Ok(Box::new(MovingAverage::from_params(p)?) as Box<dyn Transformer>)
        });
        registry
    }

    /// Add or replace a stage type
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&Record) -> Result<Box<dyn Transformer>, PipelineError> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Arc::new(factory));
    }

    pub fn has_stage(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn build(&self, spec: &PipelineStageConfig) -> Result<Box<dyn Transformer>, PipelineError> {
        let factory = self
            .factories
            .get(&spec.kind)
            .ok_or_else(|| PipelineError::new(&spec.kind, "type", "unknown pipeline stage type"))?;
        factory(&spec.params)
    }
}

/// Ordered chain of transformers bound to one component
#[derive(Default)]
pub struct DataPipeline {
    stages: Vec<Box<dyn Transformer>>,
}

impl DataPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stage(mut self, stage: Box<dyn Transformer>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn push(&mut self, stage: Box<dyn Transformer>) {
        self.stages.push(stage);
    }

    pub fn from_specs(specs: &[PipelineStageConfig], registry: &StageRegistry) -> Result<Self, PipelineError> {
        let stages = specs
            .iter()
            .map(|spec| registry.build(spec))
            .collect::<Result<Vec<_>, _>>()?;
        debug!("built pipeline with {} stage(s)", stages.len());
        Ok(Self { stages })
    }

    /// Pipeline declared under `params.pipeline`, or an empty one
    pub fn from_params(params: &Record, registry: &StageRegistry) -> Result<Self, PipelineError> {
        let Some(value) = params.get("pipeline") else {
            return Ok(Self::new());
        };
        let specs = stage_specs(value)?;
        Self::from_specs(&specs, registry)
    }

    /// Run `payload` through every stage in order
    pub fn process(&mut self, payload: Record) -> Result<Record, PipelineError> {
        self.stages
            .iter_mut()
            .try_fold(payload, |payload, stage| stage.apply(payload))
    }

    pub fn reset(&mut self) {
        for stage in &mut self.stages {
            stage.reset();
        }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }
}

fn stage_specs(value: &Value) -> Result<Vec<PipelineStageConfig>, PipelineError> {
    let json = serde_json::to_value(value).map_err(|e| PipelineError::new("pipeline", "pipeline", e.to_string()))?;
    serde_json::from_value(json).map_err(|e| PipelineError::new("pipeline", "pipeline", e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::values::RecordExt;

    fn specs(json: &str) -> Vec<PipelineStageConfig> {
        serde_json::from_str(json).unwrap()
    }

    fn reading(level: Value, flow: f64) -> Record {
        let mut record = Record::new();
        record.insert("level".to_string(), level);
        record.insert("flow".to_string(), Value::from(flow));
        record.insert("station".to_string(), Value::from("north"));
        record
    }

    #[test]
    fn test_composition_equals_sequential_application() {
        let registry = StageRegistry::with_builtins();
        let chain = r#"[
            {"type": "clean", "params": {"keys": ["level"], "default": 0.0}},
            {"type": "unit_convert", "params": {"conversions": {"level": "m_to_cm", "flow": "m3s_to_ls"}}},
            {"type": "clip", "params": {"keys": ["level"], "max": 450.0}}
        ]"#;
        let mut pipeline = DataPipeline::from_specs(&specs(chain), &registry).unwrap();
        let mut separate: Vec<DataPipeline> = specs(chain)
            .iter()
            .map(|s| DataPipeline::from_specs(std::slice::from_ref(s), &registry).unwrap())
            .collect();

        let inputs = [
            reading(Value::from(3.2), 0.4),
            reading(Value::Null, 0.5),
            reading(Value::from(5.0), 0.6),
        ];
        for input in inputs {
            let composed = pipeline.process(input.clone()).unwrap();
            let stepwise = separate
                .iter_mut()
                .try_fold(input, |payload, p| p.process(payload))
                .unwrap();
            assert_eq!(composed, stepwise);
        }
    }

    #[test]
    fn test_unrecognised_keys_pass_through() {
        let registry = StageRegistry::with_builtins();
        let mut pipeline = DataPipeline::from_specs(
            &specs(r#"[{"type": "unit_convert", "params": {"keys": ["flow"], "scale": 2.0}}]"#),
            &registry,
        )
        .unwrap();
        let out = pipeline.process(reading(Value::from(1.0), 3.0)).unwrap();
        assert_eq!(out.get_f64("flow"), Some(6.0));
        assert_eq!(out.get_f64("level"), Some(1.0));
        assert_eq!(out.get_str("station"), Some("north"));
    }

    #[test]
    fn test_error_names_failing_stage() {
        let registry = StageRegistry::with_builtins();
        let mut pipeline = DataPipeline::from_specs(
            &specs(r#"[{"type": "clean", "params": {"keys": ["level"]}}, {"type": "noise", "params": {"std_dev": 0.1, "seed": 1}}]"#),
            &registry,
        )
        .unwrap();
        let err = pipeline.process(reading(Value::Null, 1.0)).unwrap_err();
        assert_eq!(err.stage, "clean");
        assert_eq!(err.key, "level");
    }

    #[test]
    fn test_unknown_stage_type() {
        let err = DataPipeline::from_specs(&specs(r#"[{"type": "fourier"}]"#), &StageRegistry::with_builtins())
            .err()
            .unwrap();
        assert_eq!(err.stage, "fourier");
    }

    #[test]
    fn test_from_params_reads_pipeline_key() {
        let params: Record =
            serde_json::from_str(r#"{"pipeline": [{"type": "moving_average", "params": {"window": 3}}]}"#).unwrap();
        let pipeline = DataPipeline::from_params(&params, &StageRegistry::with_builtins()).unwrap();
        assert_eq!(pipeline.stage_names(), vec!["moving_average"]);
        assert!(DataPipeline::from_params(&Record::new(), &StageRegistry::with_builtins())
            .unwrap()
            .is_empty());
    }
}
