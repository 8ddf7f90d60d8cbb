use crate::core::bus::topic::{validate_topic, TopicPattern};
use crate::core::error::{BusError, ComponentError};
use crate::core::values::Value;
use log::{debug, trace};
use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

/// Message published on the bus
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub topic: String,
    pub payload: Value,
    /// Simulation time at which the message was published
    pub timestamp: f64,
    /// Publish sequence number within the run
    pub sequence: u64,
}

/// Anything that can receive bus messages
pub trait Subscriber {
    fn subscriber_id(&self) -> &str;

    /// Handle one message; the context allows publishing and subscribing from inside the handler
    fn deliver(&mut self, message: &Message, ctx: &mut BusContext<'_>) -> Result<(), ComponentError>;
}

pub type SubscriberHandle = Rc<RefCell<dyn Subscriber>>;

fn same_subscriber(a: &SubscriberHandle, b: &SubscriberHandle) -> bool {
    std::ptr::eq(Rc::as_ptr(a) as *const (), Rc::as_ptr(b) as *const ())
}

struct Subscription {
    pattern: TopicPattern,
    subscriber: SubscriberHandle,
}

/// Delivery counters for one bus
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BusStats {
    pub published: u64,
    pub delivered: u64,
    pub deferred: u64,
    pub dropped: u64,
}

/// Synchronous topic-based publish/subscribe channel
///
/// Delivery happens inside `publish`, in subscription order. A subscriber that is already
/// on the call stack (for instance the component whose `execute` is publishing) cannot be
/// entered again; its messages are deferred until the kernel calls [`MessageBus::flush_deferred`]
/// after that subscriber returns. Deferred messages never outlive the tick.
pub struct MessageBus {
    subscriptions: RefCell<Vec<Subscription>>,
    deferred: RefCell<VecDeque<(SubscriberHandle, Message)>>,
    depth: Cell<usize>,
    max_depth: usize,
    clock: Cell<f64>,
    sequence: Cell<u64>,
    stats: Cell<BusStats>,
}

impl MessageBus {
    pub fn new(max_depth: usize) -> Self {
        Self {
            subscriptions: RefCell::new(Vec::new()),
            deferred: RefCell::new(VecDeque::new()),
            depth: Cell::new(0),
            max_depth,
            clock: Cell::new(0.0),
            sequence: Cell::new(0),
            stats: Cell::new(BusStats::default()),
        }
    }

    /// Register `subscriber` for every topic matching `pattern`
    pub fn subscribe(&self, subscriber: SubscriberHandle, pattern: &str) -> Result<(), BusError> {
        let pattern = TopicPattern::parse(pattern)?;
        let mut subscriptions = self.subscriptions.borrow_mut();

        let duplicate = subscriptions
            .iter()
            .any(|s| s.pattern == pattern && same_subscriber(&s.subscriber, &subscriber));
        if !duplicate {
            trace!("subscribe '{}'", pattern);
            subscriptions.push(Subscription { pattern, subscriber });
        }
        Ok(())
    }

    /// Remove one subscription; returns whether it existed
    pub fn unsubscribe(&self, subscriber: &SubscriberHandle, pattern: &str) -> bool {
        let mut subscriptions = self.subscriptions.borrow_mut();
        let before = subscriptions.len();
        subscriptions.retain(|s| !(s.pattern.as_str() == pattern && same_subscriber(&s.subscriber, subscriber)));
        subscriptions.len() != before
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.borrow().len()
    }

    /// Publish and deliver synchronously; returns the number of immediate deliveries
    pub fn publish(&self, topic: &str, payload: Value) -> Result<usize, BusError> {
        validate_topic(topic)?;

        let depth = self.depth.get();
        if depth >= self.max_depth {
            return Err(BusError::DepthExceeded {
                topic: topic.to_string(),
                limit: self.max_depth,
            });
        }

        let sequence = self.sequence.get();
        self.sequence.set(sequence + 1);
        let message = Message {
            topic: topic.to_string(),
            payload,
            timestamp: self.clock.get(),
            sequence,
        };
        self.bump(|s| s.published += 1);

        // Snapshot targets so handlers may subscribe while we deliver
        let mut targets: Vec<SubscriberHandle> = Vec::new();
        for subscription in self.subscriptions.borrow().iter() {
            if subscription.pattern.matches(topic)
                && !targets.iter().any(|t| same_subscriber(t, &subscription.subscriber))
            {
                targets.push(subscription.subscriber.clone());
            }
        }

        self.depth.set(depth + 1);
        let result = self.dispatch(&targets, &message);
        self.depth.set(depth);
        result
    }

    fn dispatch(&self, targets: &[SubscriberHandle], message: &Message) -> Result<usize, BusError> {
        let mut delivered = 0;
        for target in targets {
            match target.try_borrow_mut() {
                Ok(mut subscriber) => {
                    let mut ctx = BusContext::new(self, target);
                    subscriber
                        .deliver(message, &mut ctx)
                        .map_err(|e| handler_error(subscriber.subscriber_id(), &message.topic, e))?;
                    delivered += 1;
                    self.bump(|s| s.delivered += 1);
                }
                Err(_) => {
                    self.deferred
                        .borrow_mut()
                        .push_back((target.clone(), message.clone()));
                    self.bump(|s| s.deferred += 1);
                }
            }
        }
        Ok(delivered)
    }

    /// Deliver deferred messages whose subscriber is no longer busy
    ///
    /// A handler error stops the flush; messages not yet attempted are counted as dropped.
    pub fn flush_deferred(&self) -> Result<usize, BusError> {
        let pending: Vec<(SubscriberHandle, Message)> = self.deferred.borrow_mut().drain(..).collect();
        let mut pending = pending.into_iter();
        let mut delivered = 0;
        while let Some((target, message)) = pending.next() {
            if target.try_borrow_mut().is_err() {
                self.deferred.borrow_mut().push_back((target, message));
                continue;
            }
            let depth = self.depth.get();
            self.depth.set(depth + 1);
            let result = self.dispatch(std::slice::from_ref(&target), &message);
            self.depth.set(depth);
            match result {
                Ok(count) => delivered += count,
                Err(err) => {
                    let lost = pending.len() as u64;
                    if lost > 0 {
                        debug!("dropping {} deferred message(s) after handler failure", lost);
                        self.bump(|s| s.dropped += lost);
                    }
                    return Err(err);
                }
            }
        }
        Ok(delivered)
    }

    /// Drop whatever could not be delivered during the tick
    pub fn end_tick(&self) {
        let dropped = self.deferred.borrow_mut().drain(..).count();
        if dropped > 0 {
            debug!("dropping {} undeliverable message(s) at end of tick", dropped);
            self.bump(|s| s.dropped += dropped as u64);
        }
    }

    pub fn pending_deferred(&self) -> usize {
        self.deferred.borrow().len()
    }

    pub fn set_time(&self, t: f64) {
        self.clock.set(t);
    }

    pub fn time(&self) -> f64 {
        self.clock.get()
    }

    pub fn stats(&self) -> BusStats {
        self.stats.get()
    }

    /// Drop every subscription, breaking reference cycles between the bus and its subscribers
    pub fn clear(&self) {
        self.subscriptions.borrow_mut().clear();
        self.deferred.borrow_mut().clear();
    }

    fn bump(&self, f: impl FnOnce(&mut BusStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new(crate::core::config::DEFAULT_MAX_BUS_DEPTH)
    }
}

fn handler_error(subscriber: &str, topic: &str, err: ComponentError) -> BusError {
    match err {
        // Keep the original kind so depth overflow surfaces as such
        ComponentError::Bus(inner) => inner,
        other => BusError::Handler {
            subscriber: subscriber.to_string(),
            topic: topic.to_string(),
            reason: other.to_string(),
        },
    }
}

/// Bus access handed to a subscriber while it runs
pub struct BusContext<'a> {
    bus: &'a MessageBus,
    subscriber: &'a SubscriberHandle,
}

impl<'a> BusContext<'a> {
    pub fn new(bus: &'a MessageBus, subscriber: &'a SubscriberHandle) -> Self {
        Self { bus, subscriber }
    }

    pub fn publish(&mut self, topic: &str, payload: impl Into<Value>) -> Result<usize, BusError> {
        self.bus.publish(topic, payload.into())
    }

    /// Subscribe the running subscriber to another pattern
    pub fn subscribe(&mut self, pattern: &str) -> Result<(), BusError> {
        self.bus.subscribe(self.subscriber.clone(), pattern)
    }

    pub fn unsubscribe(&mut self, pattern: &str) -> bool {
        self.bus.unsubscribe(self.subscriber, pattern)
    }

    pub fn time(&self) -> f64 {
        self.bus.time()
    }

    pub fn bus(&self) -> &MessageBus {
        self.bus
    }
}
