pub mod builder;
pub mod bus;
pub mod components;
pub mod config;
pub mod connections;
pub mod error;
pub mod events;
pub mod execution;
pub mod logger;
pub mod manager;
pub mod pipeline;
pub mod types;
pub mod values;

#[cfg(test)]
mod tests;
