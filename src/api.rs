//! HTTP boundary: health, prediction and explanation routes

use crate::config::ExplainConfig;
use crate::error::ServiceError;
use crate::explain::{FeatureNames, LimeExplainer, ShapExplainer};
use crate::metrics::{Endpoint, ServiceMetrics};
use crate::models::inference::InferenceEngine;
use crate::models::pipeline::ClassifierPipeline;
use crate::types::explanation::{ExplanationItem, PredictionResult};
use crate::types::transaction::{FieldError, Transaction, TransactionPayload};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Json, Query, State,
    },
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

/// Shared, read-only process state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub engine: InferenceEngine,
    pub shap: ShapExplainer,
    pub lime: Arc<LimeExplainer>,
    pub metrics: Arc<ServiceMetrics>,
    pub default_top_k: usize,
}

impl AppState {
    pub fn new(
        pipeline: Arc<ClassifierPipeline>,
        names: FeatureNames,
        reference: Option<&[Transaction]>,
        explain: &ExplainConfig,
        metrics: Arc<ServiceMetrics>,
    ) -> Self {
        Self {
            engine: InferenceEngine::new(pipeline.clone()),
            shap: ShapExplainer::new(pipeline.clone(), Arc::new(names)),
            lime: Arc::new(LimeExplainer::new(pipeline, reference, explain.lime_settings())),
            metrics,
            default_top_k: explain.default_top_k.max(1),
        }
    }

    fn validate(
        &self,
        payload: Result<Json<TransactionPayload>, JsonRejection>,
    ) -> Result<Transaction, ServiceError> {
        let result = match payload {
            Ok(Json(payload)) => Transaction::try_from(payload).map_err(ServiceError::from),
            Err(rejection) => Err(ServiceError::Validation(vec![json_rejection_error(&rejection)])),
        };
        if let Err(e) = &result {
            self.metrics.record_rejection();
            debug!(error = %e, "Request rejected");
        }
        result
    }

    fn top_k(&self, query: Result<Query<TopKQuery>, QueryRejection>) -> Result<usize, ServiceError> {
        let requested = match query {
            Ok(Query(q)) => q.top_k,
            Err(rejection) => {
                self.metrics.record_rejection();
                return Err(ServiceError::Validation(vec![FieldError::new(
                    "top_k",
                    rejection.body_text(),
                )]));
            }
        };

        match requested {
            None => Ok(self.default_top_k),
            Some(k) if k >= 1 => Ok(usize::try_from(k).unwrap_or(usize::MAX)),
            Some(_) => {
                self.metrics.record_rejection();
                Err(ServiceError::Validation(vec![FieldError::new(
                    "top_k",
                    "must be greater than or equal to 1",
                )]))
            }
        }
    }
}

/// Point a body rejection at the offending field when serde names one.
///
/// Data errors read `<prefix>: <path>: <message>`; a missing field sits at
/// the root, carries no path and names the field inside the message.
fn json_rejection_error(rejection: &JsonRejection) -> FieldError {
    let text = rejection.body_text();
    if let JsonRejection::JsonDataError(_) = rejection {
        if let Some((_, detail)) = text.split_once(": ") {
            let missing = detail
                .strip_prefix("missing field `")
                .and_then(|m| m.split_once('`'))
                .map(|(field, _)| field);
            if let Some(field) = missing {
                return FieldError::new(field, "field required");
            }
            if let Some((path, message)) = detail.split_once(": ") {
                if path != "." && !path.contains(char::is_whitespace) {
                    return FieldError::new(path, message);
                }
            }
        }
    }
    FieldError::new("body", text)
}

/// `?top_k=K` query string
#[derive(Debug, Deserialize)]
pub struct TopKQuery {
    pub top_k: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictResponse {
    pub is_fraud: u8,
    pub proba: f64,
    pub model_version: String,
}

/// `is_fraud` comes from the unrounded probability; only `proba` is rounded
/// to 6 decimals, so a score just under 0.5 may read as `0.5` with `is_fraud: 0`.
impl From<PredictionResult> for PredictResponse {
    fn from(result: PredictionResult) -> Self {
        Self {
            is_fraud: result.label,
            proba: (result.proba * 1e6).round() / 1e6,
            model_version: result.model_version,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplanationResponse {
    pub top_k: usize,
    pub items: Vec<ExplanationItem>,
}

/// Build the service router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/predict", post(predict))
        .route("/explain/shap", post(explain_shap))
        .route("/explain/lime", post(explain_lime))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "message": "Fraud scoring service. POST /predict, /explain/shap or /explain/lime"
    }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Run CPU-bound work off the async reactor.
async fn run_blocking<T, F>(metrics: &ServiceMetrics, work: F) -> Result<T, ServiceError>
where
    F: FnOnce() -> Result<T, ServiceError> + Send + 'static,
    T: Send + 'static,
{
    let outcome = match tokio::task::spawn_blocking(work).await {
        Ok(outcome) => outcome,
        Err(e) => Err(ServiceError::Internal(format!("worker task failed: {}", e))),
    };
    if let Err(e) = &outcome {
        metrics.record_failure();
        error!(error = %e, "Request failed");
    }
    outcome
}

async fn predict(
    State(state): State<AppState>,
    payload: Result<Json<TransactionPayload>, JsonRejection>,
) -> Result<Json<PredictResponse>, ServiceError> {
    let start = Instant::now();
    let tx = state.validate(payload)?;

    let engine = state.engine.clone();
    let result = run_blocking(&state.metrics, move || Ok(engine.predict(&tx))).await?;

    state.metrics.record_prediction(result.proba, result.is_fraud());
    state.metrics.record_request(Endpoint::Predict, start.elapsed());
    Ok(Json(result.into()))
}

async fn explain_shap(
    State(state): State<AppState>,
    query: Result<Query<TopKQuery>, QueryRejection>,
    payload: Result<Json<TransactionPayload>, JsonRejection>,
) -> Result<Json<ExplanationResponse>, ServiceError> {
    let start = Instant::now();
    let top_k = state.top_k(query)?;
    let tx = state.validate(payload)?;

    let shap = state.shap.clone();
    let items = run_blocking(&state.metrics, move || {
        shap.explain(&tx, top_k)
            .map_err(|e| ServiceError::Explanation(e.to_string()))
    })
    .await?;

    state.metrics.record_request(Endpoint::ExplainShap, start.elapsed());
    Ok(Json(ExplanationResponse { top_k, items }))
}

async fn explain_lime(
    State(state): State<AppState>,
    query: Result<Query<TopKQuery>, QueryRejection>,
    payload: Result<Json<TransactionPayload>, JsonRejection>,
) -> Result<Json<ExplanationResponse>, ServiceError> {
    let start = Instant::now();
    let top_k = state.top_k(query)?;
    let tx = state.validate(payload)?;

    let lime = state.lime.clone();
    let items = run_blocking(&state.metrics, move || {
        lime.explain(&tx, top_k)
            .map_err(|e| ServiceError::Explanation(e.to_string()))
    })
    .await?;

    state.metrics.record_request(Endpoint::ExplainLime, start.elapsed());
    Ok(Json(ExplanationResponse { top_k, items }))
}
