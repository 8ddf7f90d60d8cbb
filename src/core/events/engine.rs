use crate::core::bus::topic::validate_topic;
use crate::core::bus::MessageBus;
use crate::core::components::ComponentHandle;
use crate::core::config::{ActionOperation, EventConfig, TriggerKind};
use crate::core::connections::path::{split_path, SIMULATION_ROOT};
use crate::core::connections::{ConnectionValidator, SignalPath};
use crate::core::error::EventActionError;
use crate::core::events::action::Action;
use crate::core::events::predicate::Predicate;
use crate::core::events::trigger::Trigger;
use crate::core::types::ComponentId;
use log::{debug, warn};
use serde::Serialize;
use std::collections::HashMap;

/// One event compiled against the component index
#[derive(Debug, Clone)]
pub struct CompiledEvent {
    pub id: String,
    pub trigger: Trigger,
    pub action: Action,
}

/// Record of an event firing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FiredEvent {
    pub event_id: String,
    pub t: f64,
}

/// Evaluates triggers at the start of each tick and applies the actions of those that fire
///
/// All triggers are polled before any action runs, so actions within one tick never change
/// whether another event fires in that same tick. Failed actions are logged and collected;
/// they never stop the run.
#[derive(Debug, Default)]
pub struct EventEngine {
    events: Vec<CompiledEvent>,
    fired: Vec<FiredEvent>,
    errors: Vec<EventActionError>,
}

impl EventEngine {
    pub fn new(events: Vec<CompiledEvent>) -> Self {
        Self {
            events,
            fired: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Compile event declarations; problems go to `validator`, failed events are skipped
    pub fn compile(
        configs: &[EventConfig],
        index: &HashMap<ComponentId, usize>,
        validator: &mut ConnectionValidator,
    ) -> Self {
        let events = configs
            .iter()
            .filter_map(|config| {
                let trigger = compile_trigger(config, index, validator);
                let action = compile_action(config, index, validator);
                Some(CompiledEvent {
                    id: config.id.clone(),
                    trigger: trigger?,
                    action: action?,
                })
            })
            .collect();
        Self::new(events)
    }

    /// Poll every trigger for tick `t` and apply the actions that fire
    pub fn evaluate(&mut self, t: f64, dt: f64, components: &[ComponentHandle], bus: &MessageBus) -> usize {
        let firing: Vec<usize> = self
            .events
            .iter_mut()
            .enumerate()
            .filter_map(|(i, event)| event.trigger.poll(t, dt, components).then_some(i))
            .collect();

        for &i in &firing {
            let event = &self.events[i];
            debug!("event '{}' fired at t={}", event.id, t);
            self.fired.push(FiredEvent {
                event_id: event.id.clone(),
                t,
            });
            if let Err(reason) = event.action.apply(components, bus) {
                let error = EventActionError {
                    event_id: event.id.clone(),
                    target: event.action.target(),
                    reason,
                };
                warn!("{} (t={})", error, t);
                self.errors.push(error);
            }
        }
        firing.len()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn fired(&self) -> &[FiredEvent] {
        &self.fired
    }

    pub fn errors(&self) -> &[EventActionError] {
        &self.errors
    }

    pub fn take_results(&mut self) -> (Vec<FiredEvent>, Vec<EventActionError>) {
        (std::mem::take(&mut self.fired), std::mem::take(&mut self.errors))
    }
}

fn compile_trigger(
    config: &EventConfig,
    index: &HashMap<ComponentId, usize>,
    validator: &mut ConnectionValidator,
) -> Option<Trigger> {
    let location = format!("event '{}' trigger", config.id);
    match config.trigger.kind {
        TriggerKind::Time => match config.trigger.value.as_f64() {
            Some(at) if at.is_finite() => Some(Trigger::at(at)),
            _ => {
                validator.problem(format!("{}: time trigger needs a numeric value", location));
                None
            }
        },
        TriggerKind::Condition => {
            let Some(expression) = config.trigger.value.as_str() else {
                validator.problem(format!("{}: condition must be an expression string", location));
                return None;
            };
            let parsed = match Predicate::parse(expression) {
                Ok(parsed) => parsed,
                Err(e) => {
                    validator.problem(format!("{}: {}", location, e));
                    return None;
                }
            };
            match parsed.compile(&mut |path: &String| SignalPath::compile(path, index)) {
                Ok(predicate) => Some(Trigger::condition(predicate, config.trigger.mode)),
                Err(errors) => {
                    for error in errors {
                        validator.path_error(&location, error);
                    }
                    None
                }
            }
        }
    }
}

fn compile_action(
    config: &EventConfig,
    index: &HashMap<ComponentId, usize>,
    validator: &mut ConnectionValidator,
) -> Option<Action> {
    let location = format!("event '{}' action", config.id);
    let action = &config.action;

    match action.operation {
        ActionOperation::Publish => match validate_topic(&action.target) {
            Ok(()) => Some(Action::Publish {
                topic: action.target.clone(),
                payload: action.value.clone(),
            }),
            Err(e) => {
                validator.problem(format!("{}: {}", location, e));
                None
            }
        },
        ActionOperation::Set => {
            let segments = match split_path(&action.target) {
                Ok(segments) if segments.len() >= 2 && segments[0] != SIMULATION_ROOT => segments,
                _ => {
                    validator.problem(format!(
                        "{}: set target '{}' must be component.field",
                        location, action.target
                    ));
                    return None;
                }
            };
            let id = ComponentId::new(segments[0].as_str());
            let Some(&component) = index.get(&id) else {
                validator.check_id(location, &id, index);
                return None;
            };
            Some(Action::Set {
                component,
                id,
                field: segments[1..].to_vec(),
                value: action.value.clone(),
            })
        }
        ActionOperation::SwitchModel => {
            let Some(model) = action.value.as_str() else {
                validator.problem(format!("{}: switch_model value must be a model id", location));
                return None;
            };
            let id = ComponentId::new(action.target.as_str());
            let Some(&component) = index.get(&id) else {
                validator.check_id(location, &id, index);
                return None;
            };
            Some(Action::SwitchModel {
                component,
                id,
                model: model.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ScenarioConfig;

    fn configs(events: &str) -> Vec<EventConfig> {
        let json = format!(
            r#"{{"simulation_params": {{"duration": 1.0, "time_step": 0.1}}, "components": [], "events": {}}}"#,
            events
        );
        ScenarioConfig::from_json_str(&json).unwrap().events
    }

    fn index() -> HashMap<ComponentId, usize> {
        let mut index = HashMap::new();
        index.insert(ComponentId::new("gate1"), 0);
        index
    }

    #[test]
    fn test_compile_reports_unresolved_and_malformed() {
        let events = configs(
            r#"[
                {"id": "e1", "trigger": {"type": "condition", "value": "ghost.level > 1"},
                 "action": {"target": "gate1.params.opening", "operation": "set", "value": 0.5}},
                {"id": "e2", "trigger": {"type": "time", "value": 2.0},
                 "action": {"target": "phantom", "operation": "switch_model", "value": "linear"}},
                {"id": "e3", "trigger": {"type": "time", "value": "soon"},
                 "action": {"target": "gate1.opening", "operation": "set", "value": 1}},
                {"id": "e4", "trigger": {"type": "condition", "value": "gate1.opening >"},
                 "action": {"target": "alarms.#", "operation": "publish"}}
            ]"#,
        );
        let mut validator = ConnectionValidator::new();
        let engine = EventEngine::compile(&events, &index(), &mut validator);
        assert!(engine.is_empty());

        let unresolved: Vec<String> = validator
            .take_unresolved()
            .into_iter()
            .map(|r| r.component_id)
            .collect();
        assert_eq!(unresolved, vec!["ghost", "phantom"]);
        // e3 bad time value, e4 parse error and wildcard publish topic
        assert_eq!(validator.take_problems().len(), 3);
    }

    #[test]
    fn test_publish_action_fires_once_at_time() {
        let events = configs(
            r#"[{"id": "fault", "trigger": {"type": "time", "value": 0.2},
                 "action": {"target": "faults.sensor1", "operation": "publish", "value": {"stuck": true}}}]"#,
        );
        let mut validator = ConnectionValidator::new();
        let mut engine = EventEngine::compile(&events, &HashMap::new(), &mut validator);
        assert_eq!(engine.len(), 1);

        let bus = MessageBus::default();
        for k in 0..5 {
            engine.evaluate(k as f64 * 0.1, 0.1, &[], &bus);
        }
        assert_eq!(engine.fired().len(), 1);
        assert_eq!(engine.fired()[0].event_id, "fault");
        assert_eq!(bus.stats().published, 1);
        assert!(engine.errors().is_empty());
    }
}
