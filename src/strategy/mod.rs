//! Strategy engine: edge scoring, Kelly sizing, and parlay selection.

pub mod edge;
pub mod kelly;
pub mod optimizer;

pub use edge::{EdgeConfig, EdgeModel};
pub use kelly::{KellyCalculator, KellyConfig};
pub use optimizer::{OptimizerConfig, ParlayOptimizer};
