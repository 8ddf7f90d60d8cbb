//! Boundary to live hardware.
//!
//! A bridge publishes field readings onto the same topics simulated components use and
//! receives every message on its outbound topics, so consumers cannot tell simulated and
//! physical signals apart. Real transports live outside this crate; [`LoopbackBridge`]
//! replays scripted readings and records outbound traffic.

use crate::core::bus::message_bus::{BusContext, Message, Subscriber};
use crate::core::error::ComponentError;
use crate::core::values::Value;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

pub trait HardwareBridge {
    fn name(&self) -> &str;

    /// Topic patterns whose messages are forwarded to the hardware
    fn outbound_topics(&self) -> Vec<String>;

    /// Forward one outbound message
    fn send(&mut self, message: &Message) -> Result<(), ComponentError>;

    /// Readings available at time `t`, as (topic, payload) pairs
    fn poll(&mut self, t: f64) -> Result<Vec<(String, Value)>, ComponentError>;

    fn close(&mut self) {}
}

/// Adapts a bridge to the bus subscriber interface
pub struct BridgeSubscriber {
    bridge: Box<dyn HardwareBridge>,
}

impl BridgeSubscriber {
    pub fn new(bridge: Box<dyn HardwareBridge>) -> Self {
        Self { bridge }
    }

    pub fn bridge_mut(&mut self) -> &mut dyn HardwareBridge {
        self.bridge.as_mut()
    }

    pub fn bridge(&self) -> &dyn HardwareBridge {
        self.bridge.as_ref()
    }
}

impl Subscriber for BridgeSubscriber {
    fn subscriber_id(&self) -> &str {
        self.bridge.name()
    }

    fn deliver(&mut self, message: &Message, _ctx: &mut BusContext<'_>) -> Result<(), ComponentError> {
        self.bridge.send(message)
    }
}

/// In-memory bridge for tests and dry runs
pub struct LoopbackBridge {
    name: String,
    outbound: Vec<String>,
    scheduled: VecDeque<(f64, String, Value)>,
    sent: Rc<RefCell<Vec<Message>>>,
    closed: Rc<RefCell<bool>>,
}

impl LoopbackBridge {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            outbound: Vec::new(),
            scheduled: VecDeque::new(),
            sent: Rc::new(RefCell::new(Vec::new())),
            closed: Rc::new(RefCell::new(false)),
        }
    }

    pub fn with_outbound(mut self, pattern: &str) -> Self {
        self.outbound.push(pattern.to_string());
        self
    }

    /// Queue a reading to surface once simulation time reaches `at`; call in time order
    pub fn schedule(mut self, at: f64, topic: &str, payload: impl Into<Value>) -> Self {
        self.scheduled.push_back((at, topic.to_string(), payload.into()));
        self
    }

    /// Shared view of every message forwarded to the bridge
    pub fn sent_log(&self) -> Rc<RefCell<Vec<Message>>> {
        self.sent.clone()
    }

    pub fn closed_flag(&self) -> Rc<RefCell<bool>> {
        self.closed.clone()
    }
}

impl HardwareBridge for LoopbackBridge {
    fn name(&self) -> &str {
        &self.name
    }

    fn outbound_topics(&self) -> Vec<String> {
        self.outbound.clone()
    }

    fn send(&mut self, message: &Message) -> Result<(), ComponentError> {
        self.sent.borrow_mut().push(message.clone());
        Ok(())
    }

    fn poll(&mut self, t: f64) -> Result<Vec<(String, Value)>, ComponentError> {
        let mut due = Vec::new();
        while self.scheduled.front().map_or(false, |(at, _, _)| *at <= t) {
            if let Some((_, topic, payload)) = self.scheduled.pop_front() {
                due.push((topic, payload));
            }
        }
        Ok(due)
    }

    fn close(&mut self) {
        *self.closed.borrow_mut() = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loopback_releases_readings_in_time() {
        let mut bridge = LoopbackBridge::new("plc")
            .schedule(1.0, "hardware.tank1.level", 3.0)
            .schedule(2.0, "hardware.tank1.level", 4.0);

        assert!(bridge.poll(0.5).unwrap().is_empty());
        assert_eq!(bridge.poll(1.0).unwrap().len(), 1);
        assert_eq!(
            bridge.poll(5.0).unwrap(),
            vec![("hardware.tank1.level".to_string(), Value::Number(4.0))]
        );
    }
}
