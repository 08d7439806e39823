//! Core engine: the daily decision cycle and bet resolution.

pub mod cycle;
pub mod resolver;

pub use cycle::CycleOrchestrator;
pub use resolver::{ResolutionEngine, TransitionRequest};
