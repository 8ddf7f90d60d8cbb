use crate::component_core;
use crate::core::bus::topic::validate_topic;
use crate::core::components::{Component, ComponentCore, ComponentSpec, StepContext};
use crate::core::error::ComponentError;
use crate::core::events::Predicate;
use crate::core::values::{RecordExt, Value};
use crate::library::invalid;
use log::debug;

/// One threshold rule
struct Rule {
    id: String,
    when: Predicate<String>,
    topic: String,
    payload: Value,
    else_payload: Option<Value>,
    active: bool,
}

impl Rule {
    fn from_value(index: usize, value: &Value) -> Result<Self, ComponentError> {
        let entry = value
            .as_record()
            .ok_or_else(|| invalid(format!("rule {} must be a map", index)))?;
        let id = entry
            .get_str("id")
            .map(str::to_string)
            .unwrap_or_else(|| format!("rule_{}", index));
        let expression = entry
            .get_str("when")
            .ok_or_else(|| invalid(format!("rule '{}' has no 'when' expression", id)))?;
        let when = Predicate::<String>::parse(expression).map_err(|e| invalid(format!("rule '{}': {}", id, e)))?;
        let topic = entry
            .get_str("topic")
            .ok_or_else(|| invalid(format!("rule '{}' has no topic", id)))?;
        validate_topic(topic).map_err(|e| invalid(format!("rule '{}': {}", id, e)))?;

        Ok(Self {
            id,
            when,
            topic: topic.to_string(),
            payload: entry.get("payload").cloned().unwrap_or(Value::Bool(true)),
            else_payload: entry.get("else_payload").cloned(),
            active: false,
        })
    }
}

/// Turns threshold conditions on its inputs into bus commands
///
/// Each rule in `params.rules` is `{id?, when, topic, payload?, else_payload?}`. `when` is
/// a condition over this component's input ports, e.g. `level > 12 && pump_on == 0`. A rule
/// publishes `payload` when its condition becomes true and `else_payload`, if given, when it
/// becomes false again. Each rule's current truth value is also an output named by its id.
pub struct RuleDispatcher {
    core: ComponentCore,
    rules: Vec<Rule>,
}

impl RuleDispatcher {
    pub const TYPE: &'static str = "rule_dispatcher";

    pub fn from_spec(spec: &ComponentSpec<'_>) -> Result<Self, ComponentError> {
        let mut core = spec.core()?;
        let rules = match spec.params.get("rules") {
            Some(Value::List(entries)) => entries
                .iter()
                .enumerate()
                .map(|(i, entry)| Rule::from_value(i, entry))
                .collect::<Result<Vec<_>, _>>()?,
            Some(other) => return Err(invalid(format!("rules must be a list, found {}", other.kind()))),
            None => Vec::new(),
        };
        for rule in &rules {
            core.set_output(&rule.id, false);
        }
        Ok(Self { core, rules })
    }
}

impl Component for RuleDispatcher {
    component_core!();

    fn step(&mut self, ctx: &mut StepContext<'_>) -> Result<(), ComponentError> {
        let mut outbox: Vec<(String, Value)> = Vec::new();
        let mut states: Vec<(String, bool)> = Vec::with_capacity(self.rules.len());

        let inputs = &self.core.inputs;
        let read = |port: &String| inputs.get(port).cloned();
        for rule in &mut self.rules {
            let now = rule.when.evaluate(&read);
            if now && !rule.active {
                debug!("rule '{}' triggered at t={}", rule.id, ctx.t);
                outbox.push((rule.topic.clone(), rule.payload.clone()));
            } else if !now && rule.active {
                if let Some(payload) = &rule.else_payload {
                    outbox.push((rule.topic.clone(), payload.clone()));
                }
            }
            rule.active = now;
            states.push((rule.id.clone(), now));
        }

        for (id, now) in states {
            self.core.set_output(&id, now);
        }
        for (topic, payload) in outbox {
            ctx.publish(&topic, payload)?;
        }
        Ok(())
    }
}
