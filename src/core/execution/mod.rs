pub mod batch;
pub mod config;
pub mod cycle_engine;
pub mod execution_order;
pub mod simulation_engine;

// Re-export commonly used types
pub use batch::BatchRunner;
pub use config::{ConcurrencyMode, ExecutionConfig};
pub use cycle_engine::CycleEngine;
pub use execution_order::ExecutionOrderBuilder;
pub use simulation_engine::{AbortHandle, RunStatus, SimulationEngine};
