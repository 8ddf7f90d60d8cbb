pub mod model;
pub mod registry;
pub mod state;
pub mod traits;

// Re-export commonly used types
pub use model::{Model, ModelBank, ModelIo};
pub use registry::{ComponentFactory, ComponentRegistry, ComponentSpec, ModelFactory};
pub use state::{ComponentCore, Lifecycle};
pub use traits::{Component, ComponentHandle, StepContext};
