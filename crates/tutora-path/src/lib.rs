//! Learning path generation and per-user path tracking.

mod generator;
mod store;

pub use generator::{GeneratorConfig, PathGenerator};
pub use store::PathStore;
