pub mod action;
pub mod engine;
pub mod predicate;
pub mod trigger;

pub use action::Action;
pub use engine::{CompiledEvent, EventEngine, FiredEvent};
pub use predicate::{CompareOp, Operand, ParseError, Predicate};
pub use trigger::Trigger;
