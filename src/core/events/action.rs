use crate::core::bus::MessageBus;
use crate::core::components::{Component, ComponentHandle};
use crate::core::types::ComponentId;
use crate::core::values::Value;

/// Compiled event action
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Write `value` to a component field, e.g. `gate1.params.opening`
    Set {
        component: usize,
        id: ComponentId,
        field: Vec<String>,
        value: Value,
    },
    /// Request a model switch, committed at the end of the tick
    SwitchModel {
        component: usize,
        id: ComponentId,
        model: String,
    },
    /// Publish `payload` on `topic`
    Publish { topic: String, payload: Value },
}

impl Action {
    /// Target as written in the configuration
    pub fn target(&self) -> String {
        match self {
            Action::Set { id, field, .. } => format!("{}.{}", id, field.join(".")),
            Action::SwitchModel { id, .. } => id.to_string(),
            Action::Publish { topic, .. } => topic.clone(),
        }
    }

    pub fn apply(&self, components: &[ComponentHandle], bus: &MessageBus) -> Result<(), String> {
        match self {
            Action::Set {
                component,
                field,
                value,
                ..
            } => borrow(components, *component, |c| {
                c.write(field, value.clone()).map_err(|e| e.to_string())
            }),
            Action::SwitchModel { component, model, .. } => borrow(components, *component, |c| {
                c.switch_model(model).map_err(|e| e.to_string())
            }),
            Action::Publish { topic, payload } => bus
                .publish(topic, payload.clone())
                .map(|_| ())
                .map_err(|e| e.to_string()),
        }
    }
}

fn borrow(
    components: &[ComponentHandle],
    index: usize,
    f: impl FnOnce(&mut dyn Component) -> Result<(), String>,
) -> Result<(), String> {
    let handle = components
        .get(index)
        .ok_or_else(|| format!("no component at index {}", index))?;
    let mut component = handle
        .try_borrow_mut()
        .map_err(|_| "component is busy".to_string())?;
    f(&mut **component)
}
