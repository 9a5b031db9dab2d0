//! Type definitions for the fraud scoring service

pub mod explanation;
pub mod transaction;

pub use explanation::{ExplanationItem, Impact, PredictionResult};
pub use transaction::{Channel, Transaction, TransactionField, TransactionPayload};
