//! Detection module - model registry and the anomaly scorer

mod registry;
mod scorer;

pub use registry::{ModelRegistry, ModelRegistryBuilder};
pub use scorer::{AnomalyScorer, Handled};
