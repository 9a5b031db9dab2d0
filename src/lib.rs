//! Fraud Scoring Service Library
//!
//! Scores payment transactions with a random-forest pipeline and explains
//! individual predictions with TreeSHAP and LIME. Also ships the seeded
//! data generator and the training pipeline that produce the model artifact.

pub mod api;
pub mod config;
pub mod error;
pub mod explain;
pub mod metrics;
pub mod models;
pub mod preprocessor;
pub mod synthetic;
pub mod training;
pub mod types;

pub use config::AppConfig;
pub use error::{ArtifactError, ServiceError, TrainingError};
pub use models::inference::InferenceEngine;
pub use models::pipeline::ClassifierPipeline;
pub use types::{explanation::ExplanationItem, transaction::Transaction};
