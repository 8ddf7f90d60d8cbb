//! Discrete-time multi-agent simulation kernel for water systems.
//!
//! A scenario document names components, how their ports are wired, in which stages they
//! execute, what to log and which events to fire. [`run`] builds and steps it; the
//! [`library`] provides reservoirs, gates, pumps, controllers and sensors.

#[macro_use]
pub mod macros;

pub mod core;
pub mod library;

// Re-export commonly used types
pub use crate::core::components::{Component, ComponentRegistry};
pub use crate::core::config::ScenarioConfig;
pub use crate::core::error::{SimError, SimResult};
pub use crate::core::logger::LogRow;
pub use crate::core::manager::{run, SimulationManager, SimulationReport};
pub use crate::core::types::ComponentId;
pub use crate::core::values::Value;
