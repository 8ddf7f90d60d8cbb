use crate::core::components::model::{model_params, ModelBank, ModelIo};
use crate::core::error::ComponentError;
use crate::core::types::ComponentId;
use crate::core::values::{Record, RecordExt, Value};

/// Component lifecycle
///
/// `Uninitialized → Ready` on setup, `Ready ⇄ Stepping` around each execute,
/// `ShutDown` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Ready,
    Stepping,
    ShutDown,
}

/// Record sections addressable by field paths
const SECTIONS: [&str; 4] = ["params", "state", "inputs", "outputs"];

/// Shared bookkeeping embedded in every component
///
/// Holds the four records (`params`, `state`, `inputs`, `outputs`), the lifecycle state and
/// an optional model bank. Field paths either name a section explicitly
/// (`params.opening`) or use a bare key, which is looked up in outputs, state, inputs and
/// params, in that order.
pub struct ComponentCore {
    id: ComponentId,
    type_name: String,
    pub params: Record,
    pub state: Record,
    pub inputs: Record,
    pub outputs: Record,
    lifecycle: Lifecycle,
    models: Option<ModelBank>,
}

impl ComponentCore {
    pub fn new(id: ComponentId, type_name: &str, params: Record) -> Self {
        Self {
            id,
            type_name: type_name.to_string(),
            params,
            state: Record::new(),
            inputs: Record::new(),
            outputs: Record::new(),
            lifecycle: Lifecycle::Uninitialized,
            models: None,
        }
    }

    pub fn with_models(mut self, models: ModelBank) -> Self {
        self.models = Some(models);
        self
    }

    pub fn id(&self) -> &ComponentId {
        &self.id
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn mark_ready(&mut self) {
        if self.lifecycle == Lifecycle::Uninitialized {
            self.lifecycle = Lifecycle::Ready;
        }
    }

    pub fn begin_step(&mut self) -> Result<(), ComponentError> {
        match self.lifecycle {
            Lifecycle::Ready => {
                self.lifecycle = Lifecycle::Stepping;
                Ok(())
            }
            other => Err(ComponentError::Failed(format!(
                "cannot execute component '{}' in state {:?}",
                self.id, other
            ))),
        }
    }

    pub fn end_step(&mut self) {
        if self.lifecycle == Lifecycle::Stepping {
            self.lifecycle = Lifecycle::Ready;
        }
    }

    /// Enter the terminal state; true only on the first call
    pub fn mark_shutdown(&mut self) -> bool {
        if self.lifecycle == Lifecycle::ShutDown {
            return false;
        }
        self.lifecycle = Lifecycle::ShutDown;
        true
    }

    pub fn models(&self) -> Option<&ModelBank> {
        self.models.as_ref()
    }

    pub fn models_mut(&mut self) -> Option<&mut ModelBank> {
        self.models.as_mut()
    }

    /// Run the active model against this component's records
    pub fn step_active_model(&mut self, t: f64, dt: f64) -> Result<(), ComponentError> {
        let bank = self.models.as_mut().ok_or(ComponentError::NoModelBank)?;
        let params = model_params(&self.params, bank.active_id());
        let model = bank.active_mut()?;
        let mut io = ModelIo {
            params: &params,
            inputs: &self.inputs,
            state: &mut self.state,
            outputs: &mut self.outputs,
        };
        model.step(&mut io, t, dt)
    }

    pub fn input(&self, port: &str) -> Option<&Value> {
        self.inputs.get(port)
    }

    pub fn input_f64(&self, port: &str) -> Result<f64, ComponentError> {
        self.inputs
            .get_f64(port)
            .ok_or_else(|| ComponentError::MissingInput(port.to_string()))
    }

    pub fn input_f64_or(&self, port: &str, default: f64) -> f64 {
        self.inputs.get_f64_or(port, default)
    }

    pub fn set_input(&mut self, port: &str, value: Value) {
        self.inputs.insert(port.to_string(), value);
    }

    pub fn set_output(&mut self, port: &str, value: impl Into<Value>) {
        self.outputs.insert(port.to_string(), value.into());
    }

    pub fn output(&self, port: &str) -> Option<&Value> {
        self.outputs.get(port)
    }

    pub fn state_f64(&self, key: &str) -> Option<f64> {
        self.state.get_f64(key)
    }

    pub fn set_state(&mut self, key: &str, value: impl Into<Value>) {
        self.state.insert(key.to_string(), value.into());
    }

    fn section(&self, name: &str) -> Option<&Record> {
        match name {
            "params" => Some(&self.params),
            "state" => Some(&self.state),
            "inputs" => Some(&self.inputs),
            "outputs" => Some(&self.outputs),
            _ => None,
        }
    }

    fn section_mut(&mut self, name: &str) -> Option<&mut Record> {
        match name {
            "params" => Some(&mut self.params),
            "state" => Some(&mut self.state),
            "inputs" => Some(&mut self.inputs),
            "outputs" => Some(&mut self.outputs),
            _ => None,
        }
    }

    pub fn read(&self, field: &[String]) -> Option<Value> {
        let (first, rest) = field.split_first()?;

        if first == "active_model" && rest.is_empty() {
            return self.models.as_ref().map(|m| Value::from(m.active_id()));
        }
        if let Some(section) = self.section(first) {
            if rest.is_empty() {
                return Some(Value::Map(section.clone()));
            }
            return record_get(section, rest).cloned();
        }

        ["outputs", "state", "inputs", "params"]
            .iter()
            .filter_map(|name| self.section(name))
            .find_map(|section| record_get(section, field))
            .cloned()
    }

    pub fn write(&mut self, field: &[String], value: Value) -> Result<(), ComponentError> {
        let Some((first, rest)) = field.split_first() else {
            return Err(ComponentError::UnknownField(String::new()));
        };
        let joined = field.join(".");

        if first == "active_model" && rest.is_empty() {
            let id = value
                .as_str()
                .ok_or_else(|| ComponentError::InvalidParameter("model id must be text".to_string()))?;
            return self
                .models
                .as_mut()
                .ok_or(ComponentError::NoModelBank)?
                .request_switch(id);
        }

        if SECTIONS.contains(&first.as_str()) {
            if rest.is_empty() {
                return Err(ComponentError::UnknownField(joined));
            }
            let section = self
                .section_mut(first)
                .ok_or_else(|| ComponentError::UnknownField(joined.clone()))?;
            return record_set(section, rest, value).map_err(|e| ComponentError::InvalidParameter(format!("{}: {}", joined, e)));
        }

        // Bare keys only update an existing entry
        for name in ["state", "outputs", "inputs", "params"] {
            let exists = self
                .section(name)
                .map_or(false, |section| section.contains_key(first));
            if exists {
                let section = self
                    .section_mut(name)
                    .ok_or_else(|| ComponentError::UnknownField(joined.clone()))?;
                return record_set(section, field, value)
                    .map_err(|e| ComponentError::InvalidParameter(format!("{}: {}", joined, e)));
            }
        }
        Err(ComponentError::UnknownField(joined))
    }
}

pub(crate) fn record_get<'a>(record: &'a Record, path: &[String]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    record.get(first)?.get_path(rest)
}

pub(crate) fn record_set(record: &mut Record, path: &[String], value: Value) -> Result<(), String> {
    let Some((first, rest)) = path.split_first() else {
        return Err("empty path".to_string());
    };
    if rest.is_empty() {
        record.insert(first.clone(), value);
        return Ok(());
    }
    record
        .entry(first.clone())
        .or_insert(Value::Null)
        .set_path(rest, value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(path: &str) -> Vec<String> {
        path.split('.').map(str::to_string).collect()
    }

    fn core() -> ComponentCore {
        let mut params = Record::new();
        params.insert("area".to_string(), Value::Number(100.0));
        let mut core = ComponentCore::new(ComponentId::new("tank1"), "reservoir", params);
        core.set_state("level", 5.0);
        core.set_output("level", 5.5);
        core
    }

    #[test]
    fn test_bare_key_prefers_outputs() {
        let core = core();
        assert_eq!(core.read(&field("level")), Some(Value::Number(5.5)));
        assert_eq!(core.read(&field("state.level")), Some(Value::Number(5.0)));
        assert_eq!(core.read(&field("area")), Some(Value::Number(100.0)));
        assert_eq!(core.read(&field("missing")), None);
    }

    #[test]
    fn test_write_explicit_section_creates_key() {
        let mut core = core();
        core.write(&field("params.resistance"), Value::Number(0.2)).unwrap();
        assert_eq!(core.params.get_f64("resistance"), Some(0.2));
    }

    #[test]
    fn test_write_bare_unknown_key_fails() {
        let mut core = core();
        let err = core.write(&field("resistance"), Value::Number(0.2)).unwrap_err();
        assert_eq!(err, ComponentError::UnknownField("resistance".to_string()));
        core.write(&field("level"), Value::Number(7.0)).unwrap();
        assert_eq!(core.state_f64("level"), Some(7.0));
    }

    #[test]
    fn test_lifecycle_transitions() {
        let mut core = core();
        assert!(core.begin_step().is_err());
        core.mark_ready();
        core.begin_step().unwrap();
        assert_eq!(core.lifecycle(), Lifecycle::Stepping);
        core.end_step();
        assert!(core.mark_shutdown());
        assert!(!core.mark_shutdown());
        assert!(core.begin_step().is_err());
    }
}
