//! Seeded synthetic transaction generator.
//!
//! Labels come from a latent risk score with a few nonlinear interactions
//! plus Gaussian noise, pushed through a shifted sigmoid so that fraud stays
//! the minority class.

use crate::error::TrainingError;
use crate::types::transaction::{FieldError, Transaction, TransactionPayload, ValidationErrors};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Beta, Distribution, Exp, Normal, Poisson};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

pub const DEFAULT_ROWS: usize = 12_000;
pub const DEFAULT_SEED: u64 = 42;

/// Probability of the PIX channel
const PIX_SHARE: f64 = 0.55;
/// Sigmoid shift applied to the latent risk
const RISK_SHIFT: f64 = 5.0;

/// A transaction with its fraud label
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledTransaction {
    pub transaction: Transaction,
    pub target: u8,
}

/// CSV row layout of the labeled dataset
#[derive(Debug, Serialize, Deserialize)]
struct DatasetRow {
    amount: f64,
    channel: String,
    hour: i64,
    is_new_device: i64,
    device_trust_score: f64,
    days_since_last_tx: f64,
    tx_velocity_1h: i64,
    merchant_risk_score: f64,
    customer_age: i64,
    has_chargeback_history: i64,
    country_risk_score: f64,
    target: u8,
}

impl From<&LabeledTransaction> for DatasetRow {
    fn from(row: &LabeledTransaction) -> Self {
        let p = TransactionPayload::from(&row.transaction);
        Self {
            amount: p.amount,
            channel: p.channel,
            hour: p.hour,
            is_new_device: p.is_new_device,
            device_trust_score: p.device_trust_score,
            days_since_last_tx: p.days_since_last_tx,
            tx_velocity_1h: p.tx_velocity_1h,
            merchant_risk_score: p.merchant_risk_score,
            customer_age: p.customer_age,
            has_chargeback_history: p.has_chargeback_history,
            country_risk_score: p.country_risk_score,
            target: row.target,
        }
    }
}

impl DatasetRow {
    fn into_labeled(self, row: usize) -> Result<LabeledTransaction, TrainingError> {
        let target = self.target;
        if target > 1 {
            return Err(TrainingError::InvalidRow {
                row,
                source: ValidationErrors(vec![FieldError::new("target", "must be 0 or 1")]),
            });
        }
        let transaction = Transaction::try_from(TransactionPayload {
            amount: self.amount,
            channel: self.channel,
            hour: self.hour,
            is_new_device: self.is_new_device,
            device_trust_score: self.device_trust_score,
            days_since_last_tx: self.days_since_last_tx,
            tx_velocity_1h: self.tx_velocity_1h,
            merchant_risk_score: self.merchant_risk_score,
            customer_age: self.customer_age,
            has_chargeback_history: self.has_chargeback_history,
            country_risk_score: self.country_risk_score,
        })
        .map_err(|source| TrainingError::InvalidRow { row, source })?;

        Ok(LabeledTransaction { transaction, target })
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn sampling_error(e: impl std::fmt::Display) -> TrainingError {
    TrainingError::Sampling(e.to_string())
}

/// Generate `n_rows` labeled transactions; the same seed always yields the
/// same dataset.
pub fn generate(n_rows: usize, seed: u64) -> Result<Vec<LabeledTransaction>, TrainingError> {
    let mut rng = StdRng::seed_from_u64(seed);

    let log_amount = Normal::<f64>::new(4.8, 0.9).map_err(sampling_error)?;
    let trust = Beta::<f64>::new(2.0, 3.0).map_err(sampling_error)?;
    let gap_days = Exp::<f64>::new(1.0 / 3.0).map_err(sampling_error)?;
    let velocity = Poisson::<f64>::new(1.5).map_err(sampling_error)?;
    let merchant = Beta::<f64>::new(2.0, 2.0).map_err(sampling_error)?;
    let age = Normal::<f64>::new(37.0, 10.0).map_err(sampling_error)?;
    let country = Beta::<f64>::new(1.6, 2.4).map_err(sampling_error)?;
    let noise = Normal::<f64>::new(0.0, 0.8).map_err(sampling_error)?;

    let mut rows = Vec::with_capacity(n_rows);
    for i in 0..n_rows {
        let amount = log_amount.sample(&mut rng).exp();
        let is_pix = rng.gen_bool(PIX_SHARE);
        let hour: i64 = rng.gen_range(0..24);
        let is_new_device: i64 = rng.gen_range(0..2);
        let device_trust_score = trust.sample(&mut rng).clamp(0.0, 1.0);
        let days_since_last_tx = gap_days.sample(&mut rng).max(0.0);
        let events: f64 = velocity.sample(&mut rng);
        let tx_velocity_1h = events as i64;
        let merchant_risk_score = merchant.sample(&mut rng).clamp(0.0, 1.0);
        let customer_age = age.sample(&mut rng).clamp(18.0, 85.0).trunc() as i64;
        let has_chargeback_history: i64 = rng.gen_range(0..2);
        let country_risk_score = country.sample(&mut rng).clamp(0.0, 1.0);

        let night = hour <= 5;
        let mut risk = 0.002 * amount
            + if is_pix { 0.7 } else { 0.0 }
            + if night { 0.25 } else { 0.0 }
            + 0.8 * is_new_device as f64
            - 1.2 * device_trust_score
            - 0.02 * days_since_last_tx
            + 0.35 * tx_velocity_1h as f64
            + 1.1 * merchant_risk_score
            - 0.01 * (customer_age - 35) as f64
            + 0.9 * has_chargeback_history as f64
            + 0.9 * country_risk_score;

        if amount > 1500.0 && night {
            risk += 0.6;
        }
        if tx_velocity_1h >= 5 && is_new_device == 1 {
            risk += 0.5;
        }
        if merchant_risk_score > 0.8 && country_risk_score > 0.7 {
            risk += 0.4;
        }
        risk += noise.sample(&mut rng);

        let prob = 1.0 / (1.0 + (-(risk - RISK_SHIFT)).exp());
        let target = u8::from(prob > rng.gen_range(0.0..1.0));

        let transaction = Transaction::try_from(TransactionPayload {
            amount: round_to(amount, 2),
            channel: if is_pix { "PIX" } else { "CARD" }.to_string(),
            hour,
            is_new_device,
            device_trust_score: round_to(device_trust_score, 3),
            days_since_last_tx: round_to(days_since_last_tx, 2),
            tx_velocity_1h,
            merchant_risk_score: round_to(merchant_risk_score, 3),
            customer_age,
            has_chargeback_history,
            country_risk_score: round_to(country_risk_score, 3),
        })
        .map_err(|source| TrainingError::InvalidRow { row: i, source })?;

        rows.push(LabeledTransaction { transaction, target });
    }

    let frauds = rows.iter().filter(|r| r.target == 1).count();
    info!(rows = n_rows, seed, frauds, "Synthetic dataset generated");

    Ok(rows)
}

/// Write the dataset as CSV with a header row, creating parent directories.
pub fn write_csv<P: AsRef<Path>>(path: P, rows: &[LabeledTransaction]) -> Result<(), TrainingError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(DatasetRow::from(row))?;
    }
    writer.flush()?;

    info!(path = %path.display(), rows = rows.len(), "Dataset written");
    Ok(())
}

/// Read a labeled dataset; every row is validated like a request payload.
pub fn read_csv<P: AsRef<Path>>(path: P) -> Result<Vec<LabeledTransaction>, TrainingError> {
    let mut reader = csv::Reader::from_path(path.as_ref())?;
    reader
        .deserialize::<DatasetRow>()
        .enumerate()
        .map(|(i, row)| row?.into_labeled(i))
        .collect()
}
