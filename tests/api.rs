//! HTTP boundary tests driven through the router with `oneshot`

mod common;

use axum::http::StatusCode;
use common::{app, app_with, get, high_risk_payload, low_risk_payload, post_json, post_raw};
use serde_json::{json, Value};

fn items(body: &Value) -> &Vec<Value> {
    body["items"].as_array().expect("items array")
}

fn attribution(item: &Value, key: &str) -> f64 {
    item[key].as_f64().expect("numeric attribution")
}

fn assert_sorted_by_magnitude(items: &[Value], key: &str) {
    let magnitudes: Vec<f64> = items.iter().map(|i| attribution(i, key).abs()).collect();
    assert!(
        magnitudes.windows(2).all(|w| w[0] >= w[1]),
        "not sorted by |{}|: {:?}",
        key,
        magnitudes
    );
}

fn assert_impact_matches_sign(items: &[Value], key: &str) {
    for item in items {
        let expected = if attribution(item, key) > 0.0 { "increase" } else { "decrease" };
        assert_eq!(item["impact"], expected, "item {}", item);
    }
}

#[tokio::test]
async fn test_health_and_root() {
    let (status, body) = get(app(), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));

    let (status, body) = get(app(), "/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].as_str().unwrap().contains("/predict"));
}

#[tokio::test]
async fn test_predict_high_risk_transaction() {
    let (status, body) = post_json(app(), "/predict", &high_risk_payload()).await;

    assert_eq!(status, StatusCode::OK);
    let proba = body["proba"].as_f64().unwrap();
    assert!(proba > 0.5 && proba <= 1.0, "proba {}", proba);
    assert_eq!(body["is_fraud"], 1);
    assert_eq!(body["model_version"], "1.0.0");
}

#[tokio::test]
async fn test_predict_label_follows_threshold() {
    for payload in [high_risk_payload(), low_risk_payload()] {
        let (status, body) = post_json(app(), "/predict", &payload).await;
        assert_eq!(status, StatusCode::OK);

        let proba = body["proba"].as_f64().unwrap();
        assert!((0.0..=1.0).contains(&proba));
        let expected = if proba >= 0.5 { 1 } else { 0 };
        assert_eq!(body["is_fraud"], expected);
    }
}

#[tokio::test]
async fn test_predict_is_repeatable() {
    let (_, first) = post_json(app(), "/predict", &low_risk_payload()).await;
    let (_, second) = post_json(app(), "/predict", &low_risk_payload()).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_predict_rejects_unknown_channel() {
    let mut payload = high_risk_payload();
    payload["channel"] = json!("WIRE");

    let (status, body) = post_json(app(), "/predict", &payload).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "validation_error");
    assert_eq!(body["errors"][0]["field"], "channel");
}

#[tokio::test]
async fn test_predict_rejects_underage_customer() {
    let mut payload = high_risk_payload();
    payload["customer_age"] = json!(10);

    let (status, body) = post_json(app(), "/predict", &payload).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["errors"][0]["field"], "customer_age");
}

#[tokio::test]
async fn test_predict_reports_every_invalid_field() {
    let mut payload = high_risk_payload();
    payload["hour"] = json!(24);
    payload["device_trust_score"] = json!(1.5);
    payload["amount"] = json!(-1.0);

    let (status, body) = post_json(app(), "/predict", &payload).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let fields: Vec<&str> = body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, vec!["amount", "hour", "device_trust_score"]);
}

#[tokio::test]
async fn test_predict_rejects_missing_field() {
    let mut payload = high_risk_payload();
    payload.as_object_mut().unwrap().remove("merchant_risk_score");

    let (status, body) = post_json(app(), "/predict", &payload).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "validation_error");
    assert_eq!(body["errors"][0]["field"], "merchant_risk_score");
}

#[tokio::test]
async fn test_predict_accepts_whole_float_integers() {
    let mut payload = high_risk_payload();
    payload["hour"] = json!(1.0);
    payload["customer_age"] = json!(28.0);

    let (status, body) = post_json(app(), "/predict", &payload).await;
    let (_, expected) = post_json(app(), "/predict", &high_risk_payload()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, expected);
}

#[tokio::test]
async fn test_predict_rejects_fractional_integer() {
    let mut payload = high_risk_payload();
    payload["tx_velocity_1h"] = json!(2.5);

    let (status, body) = post_json(app(), "/predict", &payload).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["errors"][0]["field"], "tx_velocity_1h");
}

#[tokio::test]
async fn test_predict_rejects_wrong_type() {
    let mut payload = high_risk_payload();
    payload["hour"] = json!("late");

    let (status, body) = post_json(app(), "/predict", &payload).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["errors"][0]["field"], "hour");
}

#[tokio::test]
async fn test_predict_rejects_malformed_json() {
    let (status, body) = post_raw(app(), "/predict", "{\"amount\": 12.0,".to_string()).await;

    assert!(status.is_client_error());
    assert_eq!(body["code"], "validation_error");
    assert_eq!(body["errors"][0]["field"], "body");
}

#[tokio::test]
async fn test_shap_top_k_items() {
    let (status, body) = post_json(app(), "/explain/shap?top_k=3", &high_risk_payload()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["top_k"], 3);
    let items = items(&body);
    assert_eq!(items.len(), 3);
    assert_sorted_by_magnitude(items, "shap_value");
    assert_impact_matches_sign(items, "shap_value");
    for item in items {
        let feature = item["feature"].as_str().unwrap();
        assert!(feature.starts_with("num__") || feature.starts_with("cat__channel_"));
        assert!(item.get("value").is_some());
    }
}

#[tokio::test]
async fn test_shap_defaults_and_caps() {
    let (_, body) = post_json(app(), "/explain/shap", &high_risk_payload()).await;
    assert_eq!(body["top_k"], 5);
    assert_eq!(items(&body).len(), 5);

    let (_, body) = post_json(app(), "/explain/shap?top_k=50", &high_risk_payload()).await;
    assert_eq!(body["top_k"], 50);
    let items = items(&body);
    assert_eq!(items.len(), 12);

    let channel: Vec<&Value> = items
        .iter()
        .filter(|i| i["feature"].as_str().unwrap().starts_with("cat__channel_"))
        .collect();
    assert_eq!(channel.len(), 2);
    assert!(channel.iter().all(|i| i["value"] == "PIX"));

    let velocity = items
        .iter()
        .find(|i| i["feature"] == "num__tx_velocity_1h")
        .unwrap();
    assert_eq!(velocity["value"], 7);
}

#[tokio::test]
async fn test_shap_rejects_non_positive_top_k() {
    let (status, body) = post_json(app(), "/explain/shap?top_k=0", &high_risk_payload()).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["errors"][0]["field"], "top_k");

    let (status, _) = post_json(app(), "/explain/shap?top_k=-2", &high_risk_payload()).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = post_json(app(), "/explain/shap?top_k=many", &high_risk_payload()).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_shap_rejects_invalid_payload() {
    let mut payload = high_risk_payload();
    payload["channel"] = json!("WIRE");

    let (status, body) = post_json(app(), "/explain/shap?top_k=3", &payload).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "validation_error");
}

#[tokio::test]
async fn test_lime_top_k_items() {
    let (status, body) = post_json(app(), "/explain/lime?top_k=4", &high_risk_payload()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["top_k"], 4);
    let items = items(&body);
    assert_eq!(items.len(), 4);
    assert_sorted_by_magnitude(items, "weight");
    assert_impact_matches_sign(items, "weight");
    assert!(items.iter().all(|i| i.get("shap_value").is_none()));
}

#[tokio::test]
async fn test_lime_caps_at_original_feature_count() {
    let (status, body) = post_json(app(), "/explain/lime?top_k=20", &high_risk_payload()).await;

    assert_eq!(status, StatusCode::OK);
    let items = items(&body);
    assert_eq!(items.len(), 11);
    assert!(items.iter().any(|i| i["feature"] == "channel=PIX"));
}

#[tokio::test]
async fn test_lime_is_repeatable_with_seed() {
    let (_, first) = post_json(app(), "/explain/lime?top_k=3", &low_risk_payload()).await;
    let (_, second) = post_json(app(), "/explain/lime?top_k=3", &low_risk_payload()).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_lime_without_reference_sample() {
    for payload in [high_risk_payload(), low_risk_payload()] {
        // forward selection, then highest weights, then capped at 11 columns
        for (top_k, expected) in [(3, 3), (8, 8), (20, 11)] {
            let uri = format!("/explain/lime?top_k={}", top_k);
            let (status, body) = post_json(app_with(None), &uri, &payload).await;

            assert_eq!(status, StatusCode::OK);
            let items = items(&body);
            assert_eq!(items.len(), expected, "top_k {}", top_k);
            assert_sorted_by_magnitude(items, "weight");
        }
    }
}
