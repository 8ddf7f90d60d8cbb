pub mod simulation_builder;

pub use simulation_builder::{InputBinding, InputSource, SimulationBuilder, SimulationContext};
