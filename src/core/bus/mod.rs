pub mod bridge;
pub mod message_bus;
pub mod topic;

pub use bridge::{BridgeSubscriber, HardwareBridge, LoopbackBridge};
pub use message_bus::{BusContext, BusStats, Message, MessageBus, Subscriber, SubscriberHandle};
pub use topic::TopicPattern;
