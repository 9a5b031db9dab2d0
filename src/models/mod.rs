//! Classifier pipeline: tree ensemble, artifact loading and inference

pub mod forest;
pub mod inference;
pub mod loader;
pub mod pipeline;

pub use forest::{ForestParams, RandomForest};
pub use inference::InferenceEngine;
pub use loader::ModelLoader;
pub use pipeline::{ClassifierPipeline, ModelMetadata};
