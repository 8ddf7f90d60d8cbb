//! Declarative macros that cut boilerplate out of component definitions.

pub mod component_macros;
