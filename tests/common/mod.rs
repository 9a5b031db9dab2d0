//! Shared fixtures: a small seeded model trained in-process

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use fraud_scoring_service::{
    api::{self, AppState},
    config::{ExplainConfig, TrainingConfig},
    explain::FeatureNames,
    metrics::ServiceMetrics,
    models::pipeline::ClassifierPipeline,
    synthetic::{self, LabeledTransaction},
    training::Trainer,
    types::transaction::Transaction,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::{Arc, OnceLock};
use tower::ServiceExt;

pub const SEED: u64 = 42;

pub fn small_training_config() -> TrainingConfig {
    TrainingConfig {
        n_rows: 6000,
        n_estimators: 30,
        seed: SEED,
        ..TrainingConfig::default()
    }
}

pub fn dataset() -> &'static [LabeledTransaction] {
    static ROWS: OnceLock<Vec<LabeledTransaction>> = OnceLock::new();
    ROWS.get_or_init(|| {
        let config = small_training_config();
        synthetic::generate(config.n_rows, config.seed).expect("dataset generation")
    })
}

pub fn pipeline() -> Arc<ClassifierPipeline> {
    static PIPELINE: OnceLock<Arc<ClassifierPipeline>> = OnceLock::new();
    PIPELINE
        .get_or_init(|| {
            let (pipeline, _, _) = Trainer::new(small_training_config(), "1.0.0")
                .fit(dataset())
                .expect("training");
            Arc::new(pipeline)
        })
        .clone()
}

pub fn reference_sample() -> Vec<Transaction> {
    dataset().iter().take(300).map(|r| r.transaction.clone()).collect()
}

pub fn explain_config() -> ExplainConfig {
    ExplainConfig {
        lime_num_samples: 1000,
        lime_random_seed: Some(SEED),
        ..ExplainConfig::default()
    }
}

pub fn app_with(reference: Option<&[Transaction]>) -> Router {
    let pipeline = pipeline();
    let names = FeatureNames::resolve(&pipeline, 64);
    let state = AppState::new(
        pipeline,
        names,
        reference,
        &explain_config(),
        Arc::new(ServiceMetrics::new()),
    );
    api::router(state)
}

pub fn app() -> Router {
    let reference = reference_sample();
    app_with(Some(reference.as_slice()))
}

pub fn high_risk_payload() -> Value {
    json!({
        "amount": 1299.9,
        "channel": "PIX",
        "hour": 1,
        "is_new_device": 1,
        "device_trust_score": 0.23,
        "days_since_last_tx": 0.5,
        "tx_velocity_1h": 7,
        "merchant_risk_score": 0.88,
        "customer_age": 28,
        "has_chargeback_history": 1,
        "country_risk_score": 0.67
    })
}

pub fn low_risk_payload() -> Value {
    json!({
        "amount": 35.5,
        "channel": "CARD",
        "hour": 14,
        "is_new_device": 0,
        "device_trust_score": 0.92,
        "days_since_last_tx": 4.2,
        "tx_velocity_1h": 0,
        "merchant_risk_score": 0.12,
        "customer_age": 46,
        "has_chargeback_history": 0,
        "country_risk_score": 0.08
    })
}

pub async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    read(app, request).await
}

pub async fn post_json(app: Router, uri: &str, body: &Value) -> (StatusCode, Value) {
    post_raw(app, uri, body.to_string()).await
}

pub async fn post_raw(app: Router, uri: &str, body: String) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap();
    read(app, request).await
}

async fn read(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}
