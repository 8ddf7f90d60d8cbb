pub mod connection_validator;
pub mod manager;
pub mod path;

pub use connection_validator::ConnectionValidator;
pub use manager::{ConnectionManager, ResolvedConnection};
pub use path::{PathError, SignalPath};
