use crate::core::error::ComponentError;
use crate::core::values::{Record, Value};
use log::debug;
use std::borrow::Cow;
use std::collections::BTreeMap;

/// Records a model may read and write during one step
pub struct ModelIo<'a> {
    pub params: &'a Record,
    pub inputs: &'a Record,
    pub state: &'a mut Record,
    pub outputs: &'a mut Record,
}

/// Params a bank member sees: component params without `model_bank`, overlaid with the
/// entry's own `params`
///
/// Models read these on every step, so writes to either level take effect on the next tick.
pub fn model_params<'a>(params: &'a Record, model_id: &str) -> Cow<'a, Record> {
    let Some(Value::Map(bank)) = params.get("model_bank") else {
        return Cow::Borrowed(params);
    };
    let mut merged = params.clone();
    merged.remove("model_bank");
    if let Some(Value::Map(entry)) = bank.get(model_id) {
        if let Some(Value::Map(overrides)) = entry.get("params") {
            merged.extend(overrides.clone());
        }
    }
    Cow::Owned(merged)
}

/// Interchangeable physical computation owned by a component
pub trait Model {
    fn model_type(&self) -> &str;

    fn step(&mut self, io: &mut ModelIo<'_>, t: f64, dt: f64) -> Result<(), ComponentError>;
}

/// Named models with one active member
///
/// Switches are requested at any time and applied by [`ModelBank::commit`], which the
/// kernel calls once at the end of every tick. The tick that requested the switch still
/// runs the old model. No state is transferred between models.
pub struct ModelBank {
    models: BTreeMap<String, Box<dyn Model>>,
    active: String,
    pending: Option<String>,
}

impl ModelBank {
    pub fn new(active: &str, models: BTreeMap<String, Box<dyn Model>>) -> Result<Self, ComponentError> {
        if !models.contains_key(active) {
            return Err(ComponentError::UnknownModel(active.to_string()));
        }
        Ok(Self {
            models,
            active: active.to_string(),
            pending: None,
        })
    }

    pub fn active_id(&self) -> &str {
        &self.active
    }

    pub fn pending_id(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    pub fn model_ids(&self) -> Vec<&str> {
        self.models.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.models.contains_key(id)
    }

    pub fn request_switch(&mut self, id: &str) -> Result<(), ComponentError> {
        if !self.models.contains_key(id) {
            return Err(ComponentError::UnknownModel(id.to_string()));
        }
        self.pending = Some(id.to_string());
        Ok(())
    }

    /// Apply a pending switch; returns `(old, new)` when the active model changed
    pub fn commit(&mut self) -> Option<(String, String)> {
        let next = self.pending.take()?;
        if next == self.active {
            return None;
        }
        let previous = std::mem::replace(&mut self.active, next);
        debug!("active model '{}' -> '{}'", previous, self.active);
        Some((previous, self.active.clone()))
    }

    pub fn active_mut(&mut self) -> Result<&mut dyn Model, ComponentError> {
        match self.models.get_mut(&self.active) {
            Some(model) => Ok(model.as_mut()),
            None => Err(ComponentError::UnknownModel(self.active.clone())),
        }
    }

    pub fn active_type(&self) -> Option<&str> {
        self.models.get(&self.active).map(|m| m.model_type())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::values::{RecordExt, Value};

    struct Constant(f64);

    impl Model for Constant {
        fn model_type(&self) -> &str {
            "constant"
        }

        fn step(&mut self, io: &mut ModelIo<'_>, _t: f64, _dt: f64) -> Result<(), ComponentError> {
            io.outputs.insert("output".to_string(), Value::Number(self.0));
            Ok(())
        }
    }

    fn bank() -> ModelBank {
        let mut models: BTreeMap<String, Box<dyn Model>> = BTreeMap::new();
        models.insert("a".to_string(), Box::new(Constant(1.0)));
        models.insert("b".to_string(), Box::new(Constant(2.0)));
        ModelBank::new("a", models).unwrap()
    }

    fn run(bank: &mut ModelBank) -> f64 {
        let params = Record::new();
        let inputs = Record::new();
        let mut state = Record::new();
        let mut outputs = Record::new();
        let mut io = ModelIo {
            params: &params,
            inputs: &inputs,
            state: &mut state,
            outputs: &mut outputs,
        };
        bank.active_mut().unwrap().step(&mut io, 0.0, 1.0).unwrap();
        outputs.get_f64("output").unwrap()
    }

    #[test]
    fn test_model_params_overlay_entry_params() {
        let params: Record = serde_json::from_str(
            r#"{"area": 1.0, "opening": 0.5, "model_bank": {"wide": {"type": "orifice", "params": {"area": 4.0}}}}"#,
        )
        .unwrap();
        let wide = model_params(&params, "wide");
        assert_eq!(wide.get_f64("area"), Some(4.0));
        assert_eq!(wide.get_f64("opening"), Some(0.5));
        assert!(!wide.contains_key("model_bank"));
        assert_eq!(model_params(&params, "other").get_f64("area"), Some(1.0));

        let plain: Record = serde_json::from_str(r#"{"area": 2.0}"#).unwrap();
        assert!(matches!(model_params(&plain, "any"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_switch_applies_only_after_commit() {
        let mut bank = bank();
        bank.request_switch("b").unwrap();
        assert_eq!(run(&mut bank), 1.0);
        assert_eq!(bank.commit(), Some(("a".to_string(), "b".to_string())));
        assert_eq!(run(&mut bank), 2.0);
        assert_eq!(bank.commit(), None);
    }

    #[test]
    fn test_unknown_model_rejected() {
        let mut bank = bank();
        assert_eq!(
            bank.request_switch("c"),
            Err(ComponentError::UnknownModel("c".to_string()))
        );
        assert!(bank.pending_id().is_none());
    }
}
