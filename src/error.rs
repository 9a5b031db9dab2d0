//! Error types for the fraud scoring service

use crate::types::transaction::{FieldError, ValidationErrors};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced at the HTTP boundary
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Validation failed: {}", format_fields(.0))]
    Validation(Vec<FieldError>),

    #[error("Explanation failed: {0}")]
    Explanation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn format_fields(errors: &[FieldError]) -> String {
    ValidationErrors(errors.to_vec()).to_string()
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Explanation(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Explanation(_) | Self::Internal(_) => "internal_error",
        }
    }
}

impl From<ValidationErrors> for ServiceError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors.0)
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            Self::Validation(errors) => json!({
                "code": self.error_code(),
                "message": "Request validation failed",
                "errors": errors,
            }),
            _ => json!({
                "code": self.error_code(),
                "message": self.to_string(),
            }),
        };

        (status, Json(body)).into_response()
    }
}

/// Errors loading persisted artifacts
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Incompatible artifact: {0}")]
    Incompatible(String),
}

/// Errors raised while generating data or training
#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("Training data is empty")]
    EmptyDataset,

    #[error("Training data contains a single class")]
    SingleClass,

    #[error("Invalid sampling distribution: {0}")]
    Sampling(String),

    #[error("Invalid training row {row}: {source}")]
    InvalidRow {
        row: usize,
        #[source]
        source: ValidationErrors,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            ServiceError::Validation(vec![]).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServiceError::Explanation("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_validation_message_lists_fields() {
        let err = ServiceError::Validation(vec![FieldError::new("customer_age", "must be between 18 and 120")]);
        assert_eq!(
            err.to_string(),
            "Validation failed: customer_age: must be between 18 and 120"
        );
        assert_eq!(err.error_code(), "validation_error");
    }
}
