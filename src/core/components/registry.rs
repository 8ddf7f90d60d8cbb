use crate::core::components::model::{model_params, Model, ModelBank};
use crate::core::components::state::ComponentCore;
use crate::core::components::traits::Component;
use crate::core::error::{ComponentError, SimError, UnknownComponentType};
use crate::core::types::ComponentId;
use crate::core::values::{Record, RecordExt};
use log::debug;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Everything a factory gets to build one component
pub struct ComponentSpec<'a> {
    pub id: &'a ComponentId,
    pub type_name: &'a str,
    pub params: &'a Record,
    pub registry: &'a ComponentRegistry,
}

impl<'a> ComponentSpec<'a> {
    /// Core with params copied in and, when `params.model_bank` is present, a model bank built
    pub fn core(&self) -> Result<ComponentCore, ComponentError> {
        let core = ComponentCore::new(self.id.clone(), self.type_name, self.params.clone());
        match self.registry.build_model_bank(self.params)? {
            Some(bank) => Ok(core.with_models(bank)),
            None => Ok(core),
        }
    }

    /// Like [`ComponentSpec::core`] but falls back to a single default model
    pub fn core_with_default_model(&self, default_model: &str) -> Result<ComponentCore, ComponentError> {
        if self.params.contains_key("model_bank") {
            return self.core();
        }
        let mut models: BTreeMap<String, Box<dyn Model>> = BTreeMap::new();
        models.insert(
            default_model.to_string(),
            self.registry.build_model(default_model, self.params)?,
        );
        let bank = ModelBank::new(default_model, models)?;
        Ok(ComponentCore::new(self.id.clone(), self.type_name, self.params.clone()).with_models(bank))
    }
}

pub type ComponentFactory =
    Arc<dyn Fn(&ComponentSpec<'_>) -> Result<Box<dyn Component>, ComponentError> + Send + Sync>;

pub type ModelFactory = Arc<dyn Fn(&Record) -> Result<Box<dyn Model>, ComponentError> + Send + Sync>;

/// Maps type names to component and model factories
///
/// The registry is a plain map filled before a run starts; third-party types are added with
/// [`ComponentRegistry::register`] exactly like the built-in ones. It is `Send + Sync` so one
/// registry can serve parallel batch runs.
#[derive(Clone, Default)]
pub struct ComponentRegistry {
    factories: HashMap<String, ComponentFactory>,
    models: HashMap<String, ModelFactory>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with the built-in library types
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::library::register_builtins(&mut registry);
        registry
    }

    /// Register a component type; fails if the name is taken
    pub fn register<F>(&mut self, type_name: &str, factory: F) -> Result<(), SimError>
    where
        F: Fn(&ComponentSpec<'_>) -> Result<Box<dyn Component>, ComponentError> + Send + Sync + 'static,
    {
        if self.factories.contains_key(type_name) {
            return Err(SimError::config(format!(
                "component type '{}' is already registered",
                type_name
            )));
        }
        self.replace(type_name, factory);
        Ok(())
    }

    /// Register or overwrite a component type
    pub fn replace<F>(&mut self, type_name: &str, factory: F)
    where
        F: Fn(&ComponentSpec<'_>) -> Result<Box<dyn Component>, ComponentError> + Send + Sync + 'static,
    {
        debug!("registering component type '{}'", type_name);
        self.factories.insert(type_name.to_string(), Arc::new(factory));
    }

    pub fn register_model<F>(&mut self, type_name: &str, factory: F) -> Result<(), SimError>
    where
        F: Fn(&Record) -> Result<Box<dyn Model>, ComponentError> + Send + Sync + 'static,
    {
        if self.models.contains_key(type_name) {
            return Err(SimError::config(format!(
                "model type '{}' is already registered",
                type_name
            )));
        }
        self.replace_model(type_name, factory);
        Ok(())
    }

    /// Register or overwrite a model type
    pub fn replace_model<F>(&mut self, type_name: &str, factory: F)
    where
        F: Fn(&Record) -> Result<Box<dyn Model>, ComponentError> + Send + Sync + 'static,
    {
        debug!("registering model type '{}'", type_name);
        self.models.insert(type_name.to_string(), Arc::new(factory));
    }

    pub fn has_type(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    pub fn has_model_type(&self, type_name: &str) -> bool {
        self.models.contains_key(type_name)
    }

    /// Registered component type names, sorted
    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn model_type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.models.keys().cloned().collect();
        names.sort();
        names
    }

    /// Build a component of `type_name`
    pub fn instantiate(
        &self,
        type_name: &str,
        id: &ComponentId,
        params: &Record,
    ) -> Result<Box<dyn Component>, SimError> {
        let factory = self.factories.get(type_name).ok_or_else(|| {
            SimError::UnknownType(vec![UnknownComponentType {
                type_name: type_name.to_string(),
                component_id: id.to_string(),
            }])
        })?;

        let spec = ComponentSpec {
            id,
            type_name,
            params,
            registry: self,
        };
        factory(&spec).map_err(|e| SimError::config(format!("component '{}' ({}): {}", id, type_name, e)))
    }

    pub fn build_model(&self, type_name: &str, params: &Record) -> Result<Box<dyn Model>, ComponentError> {
        let factory = self
            .models
            .get(type_name)
            .ok_or_else(|| ComponentError::UnknownModel(type_name.to_string()))?;
        factory(params)
    }

    /// Build the bank declared as `params.model_bank = {id: {type, params}}` with
    /// `params.active_model` selecting the initial model (default: first id in order)
    pub fn build_model_bank(&self, params: &Record) -> Result<Option<ModelBank>, ComponentError> {
        let Some(bank_value) = params.get("model_bank") else {
            return Ok(None);
        };
        let entries = bank_value.as_record().ok_or_else(|| {
            ComponentError::InvalidParameter("model_bank must be a map of id to {type, params}".to_string())
        })?;
        if entries.is_empty() {
            return Err(ComponentError::InvalidParameter("model_bank is empty".to_string()));
        }

        let mut models: BTreeMap<String, Box<dyn Model>> = BTreeMap::new();
        for (model_id, entry) in entries {
            let entry = entry.as_record().ok_or_else(|| {
                ComponentError::InvalidParameter(format!("model_bank entry '{}' must be a map", model_id))
            })?;
            let model_type = entry.get_str("type").ok_or_else(|| {
                ComponentError::InvalidParameter(format!("model_bank entry '{}' has no type", model_id))
            })?;

            // Model params inherit component params, entry params win
            let merged = model_params(params, model_id);
            models.insert(model_id.clone(), self.build_model(model_type, &merged)?);
        }

        let active = match params.get_str("active_model") {
            Some(active) => active.to_string(),
            None => entries.keys().next().cloned().unwrap_or_default(),
        };
        Ok(Some(ModelBank::new(&active, models)?))
    }
}
