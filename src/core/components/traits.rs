use crate::core::bus::{BusContext, Message, Subscriber};
use crate::core::components::model::ModelBank;
use crate::core::components::state::{ComponentCore, Lifecycle};
use crate::core::error::ComponentError;
use crate::core::types::ComponentId;
use crate::core::values::Value;
use std::cell::RefCell;
use std::rc::Rc;

/// Per-execute view of the clock and the bus
pub struct StepContext<'a> {
    pub t: f64,
    pub dt: f64,
    pub bus: BusContext<'a>,
}

impl<'a> StepContext<'a> {
    pub fn new(t: f64, dt: f64, bus: BusContext<'a>) -> Self {
        Self { t, dt, bus }
    }

    pub fn publish(&mut self, topic: &str, payload: impl Into<Value>) -> Result<usize, ComponentError> {
        Ok(self.bus.publish(topic, payload)?)
    }
}

/// Schedulable simulation unit
///
/// Implementors provide [`Component::core`], [`Component::core_mut`] and [`Component::step`];
/// the remaining hooks have defaults. The driver methods [`Component::setup`],
/// [`Component::execute`] and [`Component::shutdown`] maintain the lifecycle and should not
/// be overridden: customise `on_setup`, `step` and `on_shutdown` instead.
pub trait Component {
    fn core(&self) -> &ComponentCore;
    fn core_mut(&mut self) -> &mut ComponentCore;

    /// One tick of component logic
    fn step(&mut self, ctx: &mut StepContext<'_>) -> Result<(), ComponentError>;

    /// Subscribe to topics, open resources
    fn on_setup(&mut self, _ctx: &mut BusContext<'_>) -> Result<(), ComponentError> {
        Ok(())
    }

    fn on_message(&mut self, _message: &Message, _ctx: &mut BusContext<'_>) -> Result<(), ComponentError> {
        Ok(())
    }

    /// Release resources; runs at most once
    fn on_shutdown(&mut self) {}

    fn id(&self) -> &ComponentId {
        self.core().id()
    }

    fn type_name(&self) -> &str {
        self.core().type_name()
    }

    fn lifecycle(&self) -> Lifecycle {
        self.core().lifecycle()
    }

    fn setup(&mut self, ctx: &mut BusContext<'_>) -> Result<(), ComponentError> {
        if self.lifecycle() != Lifecycle::Uninitialized {
            return Ok(());
        }
        self.on_setup(ctx)?;
        self.core_mut().mark_ready();
        Ok(())
    }

    fn execute(&mut self, ctx: &mut StepContext<'_>) -> Result<(), ComponentError> {
        self.core_mut().begin_step()?;
        let result = self.step(ctx);
        self.core_mut().end_step();
        result
    }

    /// Idempotent; safe to call after a failed execute
    fn shutdown(&mut self) {
        if self.core_mut().mark_shutdown() {
            self.on_shutdown();
        }
    }

    fn set_input(&mut self, port: &str, value: Value) -> Result<(), ComponentError> {
        self.core_mut().set_input(port, value);
        Ok(())
    }

    fn output(&self, port: &str) -> Option<Value> {
        self.core().output(port).cloned()
    }

    fn read(&self, field: &[String]) -> Option<Value> {
        self.core().read(field)
    }

    fn write(&mut self, field: &[String], value: Value) -> Result<(), ComponentError> {
        self.core_mut().write(field, value)
    }

    fn model_bank(&self) -> Option<&ModelBank> {
        self.core().models()
    }

    /// Request a model switch, applied at the end of the tick
    fn switch_model(&mut self, model_id: &str) -> Result<(), ComponentError> {
        self.core_mut()
            .models_mut()
            .ok_or(ComponentError::NoModelBank)?
            .request_switch(model_id)
    }

    fn commit_model_switch(&mut self) -> Option<(String, String)> {
        self.core_mut().models_mut().and_then(ModelBank::commit)
    }
}

pub type ComponentHandle = Rc<RefCell<Box<dyn Component>>>;

impl Subscriber for Box<dyn Component> {
    fn subscriber_id(&self) -> &str {
        self.id().as_str()
    }

    fn deliver(&mut self, message: &Message, ctx: &mut BusContext<'_>) -> Result<(), ComponentError> {
        if self.lifecycle() == Lifecycle::ShutDown {
            return Ok(());
        }
        self.on_message(message, ctx)
    }
}
