//! Transaction data structures and boundary validation

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Number of fields in the original feature space.
pub const N_FIELDS: usize = 11;

/// Payment channel (the single categorical field)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    #[serde(rename = "CARD")]
    Card,
    #[serde(rename = "PIX")]
    Pix,
}

impl Channel {
    /// Every channel, in sorted category order (the one-hot column order).
    pub const ALL: [Channel; 2] = [Channel::Card, Channel::Pix];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Card => "CARD",
            Channel::Pix => "PIX",
        }
    }

    /// Categorical code used when the channel travels inside a numeric row.
    pub fn code(&self) -> f64 {
        match self {
            Channel::Card => 0.0,
            Channel::Pix => 1.0,
        }
    }

    /// Inverse of [`Channel::code`]; `None` for codes outside the vocabulary.
    pub fn from_code(code: f64) -> Option<Self> {
        match code.round() as i64 {
            0 => Some(Channel::Card),
            1 => Some(Channel::Pix),
            _ => None,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "CARD" => Some(Channel::Card),
            "PIX" => Some(Channel::Pix),
            _ => None,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one field of the original feature space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionField {
    Amount,
    Channel,
    Hour,
    IsNewDevice,
    DeviceTrustScore,
    DaysSinceLastTx,
    TxVelocity1h,
    MerchantRiskScore,
    CustomerAge,
    HasChargebackHistory,
    CountryRiskScore,
}

impl TransactionField {
    /// Canonical column order of the original feature space.
    pub const ALL: [TransactionField; N_FIELDS] = [
        TransactionField::Amount,
        TransactionField::Channel,
        TransactionField::Hour,
        TransactionField::IsNewDevice,
        TransactionField::DeviceTrustScore,
        TransactionField::DaysSinceLastTx,
        TransactionField::TxVelocity1h,
        TransactionField::MerchantRiskScore,
        TransactionField::CustomerAge,
        TransactionField::HasChargebackHistory,
        TransactionField::CountryRiskScore,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionField::Amount => "amount",
            TransactionField::Channel => "channel",
            TransactionField::Hour => "hour",
            TransactionField::IsNewDevice => "is_new_device",
            TransactionField::DeviceTrustScore => "device_trust_score",
            TransactionField::DaysSinceLastTx => "days_since_last_tx",
            TransactionField::TxVelocity1h => "tx_velocity_1h",
            TransactionField::MerchantRiskScore => "merchant_risk_score",
            TransactionField::CustomerAge => "customer_age",
            TransactionField::HasChargebackHistory => "has_chargeback_history",
            TransactionField::CountryRiskScore => "country_risk_score",
        }
    }

    /// Column position in the original feature space.
    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn is_categorical(&self) -> bool {
        matches!(self, TransactionField::Channel)
    }

    /// Numeric fields in canonical order.
    pub fn numeric() -> impl Iterator<Item = TransactionField> {
        Self::ALL.into_iter().filter(|f| !f.is_categorical())
    }
}

impl fmt::Display for TransactionField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw transaction as submitted by a caller, before validation.
///
/// Integer fields are wide on purpose so that negative or oversized values
/// reach validation instead of failing deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionPayload {
    pub amount: f64,
    pub channel: String,
    #[serde(deserialize_with = "integral")]
    pub hour: i64,
    #[serde(deserialize_with = "integral")]
    pub is_new_device: i64,
    pub device_trust_score: f64,
    pub days_since_last_tx: f64,
    #[serde(deserialize_with = "integral")]
    pub tx_velocity_1h: i64,
    pub merchant_risk_score: f64,
    #[serde(deserialize_with = "integral")]
    pub customer_age: i64,
    #[serde(deserialize_with = "integral")]
    pub has_chargeback_history: i64,
    pub country_risk_score: f64,
}

/// Integer field that also accepts a whole-valued float such as `1.0`.
fn integral<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    struct IntegralVisitor;

    impl Visitor<'_> for IntegralVisitor {
        type Value = i64;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("an integer")
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<i64, E> {
            Ok(v)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<i64, E> {
            i64::try_from(v).map_err(|_| E::invalid_value(de::Unexpected::Unsigned(v), &self))
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<i64, E> {
            if v.is_finite() && v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
                Ok(v as i64)
            } else {
                Err(E::invalid_value(de::Unexpected::Float(v), &self))
            }
        }
    }

    deserializer.deserialize_any(IntegralVisitor)
}

/// One rejected field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Every field that failed validation, in canonical field order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<FieldError>);

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect();
        f.write_str(&parts.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

/// A validated transaction.
///
/// Only obtainable through `TryFrom<TransactionPayload>` (or deserialization,
/// which goes through the same check), so every field is within its bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TransactionPayload")]
pub struct Transaction {
    pub amount: f64,
    pub channel: Channel,
    pub hour: u8,
    pub is_new_device: u8,
    pub device_trust_score: f64,
    pub days_since_last_tx: f64,
    pub tx_velocity_1h: u32,
    pub merchant_risk_score: f64,
    pub customer_age: u8,
    pub has_chargeback_history: u8,
    pub country_risk_score: f64,
}

struct Checker {
    errors: Vec<FieldError>,
}

impl Checker {
    fn float_min(&mut self, field: TransactionField, value: f64, min: f64) -> f64 {
        if !value.is_finite() {
            self.errors
                .push(FieldError::new(field.as_str(), "must be a finite number"));
        } else if value < min {
            self.errors.push(FieldError::new(
                field.as_str(),
                format!("must be greater than or equal to {}", min),
            ));
        }
        value
    }

    fn float_range(&mut self, field: TransactionField, value: f64, min: f64, max: f64) -> f64 {
        if !value.is_finite() {
            self.errors
                .push(FieldError::new(field.as_str(), "must be a finite number"));
        } else if value < min || value > max {
            self.errors.push(FieldError::new(
                field.as_str(),
                format!("must be between {} and {}", min, max),
            ));
        }
        value
    }

    fn int_range(&mut self, field: TransactionField, value: i64, min: i64, max: i64) -> i64 {
        if value < min || value > max {
            self.errors.push(FieldError::new(
                field.as_str(),
                format!("must be between {} and {}", min, max),
            ));
            return min;
        }
        value
    }
}

impl TryFrom<TransactionPayload> for Transaction {
    type Error = ValidationErrors;

    fn try_from(p: TransactionPayload) -> Result<Self, Self::Error> {
        use TransactionField as F;
        let mut check = Checker { errors: Vec::new() };

        let amount = check.float_min(F::Amount, p.amount, 0.0);
        let channel = Channel::parse(&p.channel);
        if channel.is_none() {
            check.errors.push(FieldError::new(
                F::Channel.as_str(),
                format!("must be one of 'PIX', 'CARD' (got '{}')", p.channel),
            ));
        }
        let hour = check.int_range(F::Hour, p.hour, 0, 23);
        let is_new_device = check.int_range(F::IsNewDevice, p.is_new_device, 0, 1);
        let device_trust_score = check.float_range(F::DeviceTrustScore, p.device_trust_score, 0.0, 1.0);
        let days_since_last_tx = check.float_min(F::DaysSinceLastTx, p.days_since_last_tx, 0.0);
        let tx_velocity_1h = check.int_range(F::TxVelocity1h, p.tx_velocity_1h, 0, u32::MAX as i64);
        let merchant_risk_score =
            check.float_range(F::MerchantRiskScore, p.merchant_risk_score, 0.0, 1.0);
        let customer_age = check.int_range(F::CustomerAge, p.customer_age, 18, 120);
        let has_chargeback_history =
            check.int_range(F::HasChargebackHistory, p.has_chargeback_history, 0, 1);
        let country_risk_score =
            check.float_range(F::CountryRiskScore, p.country_risk_score, 0.0, 1.0);

        match channel {
            Some(channel) if check.errors.is_empty() => Ok(Self {
                amount,
                channel,
                hour: hour as u8,
                is_new_device: is_new_device as u8,
                device_trust_score,
                days_since_last_tx,
                tx_velocity_1h: tx_velocity_1h as u32,
                merchant_risk_score,
                customer_age: customer_age as u8,
                has_chargeback_history: has_chargeback_history as u8,
                country_risk_score,
            }),
            _ => Err(ValidationErrors(check.errors)),
        }
    }
}

impl From<&Transaction> for TransactionPayload {
    fn from(tx: &Transaction) -> Self {
        Self {
            amount: tx.amount,
            channel: tx.channel.as_str().to_string(),
            hour: tx.hour as i64,
            is_new_device: tx.is_new_device as i64,
            device_trust_score: tx.device_trust_score,
            days_since_last_tx: tx.days_since_last_tx,
            tx_velocity_1h: tx.tx_velocity_1h as i64,
            merchant_risk_score: tx.merchant_risk_score,
            customer_age: tx.customer_age as i64,
            has_chargeback_history: tx.has_chargeback_history as i64,
            country_risk_score: tx.country_risk_score,
        }
    }
}

impl From<Transaction> for TransactionPayload {
    fn from(tx: Transaction) -> Self {
        Self::from(&tx)
    }
}

impl Transaction {
    /// Numeric value of a field; `channel` yields its categorical code.
    pub fn numeric_value(&self, field: TransactionField) -> f64 {
        match field {
            TransactionField::Amount => self.amount,
            TransactionField::Channel => self.channel.code(),
            TransactionField::Hour => self.hour as f64,
            TransactionField::IsNewDevice => self.is_new_device as f64,
            TransactionField::DeviceTrustScore => self.device_trust_score,
            TransactionField::DaysSinceLastTx => self.days_since_last_tx,
            TransactionField::TxVelocity1h => self.tx_velocity_1h as f64,
            TransactionField::MerchantRiskScore => self.merchant_risk_score,
            TransactionField::CustomerAge => self.customer_age as f64,
            TransactionField::HasChargebackHistory => self.has_chargeback_history as f64,
            TransactionField::CountryRiskScore => self.country_risk_score,
        }
    }

    /// Field value as it appeared in the JSON payload.
    pub fn field_value(&self, field: TransactionField) -> Value {
        match field {
            TransactionField::Channel => Value::from(self.channel.as_str()),
            TransactionField::Amount
            | TransactionField::DeviceTrustScore
            | TransactionField::DaysSinceLastTx
            | TransactionField::MerchantRiskScore
            | TransactionField::CountryRiskScore => Value::from(self.numeric_value(field)),
            TransactionField::Hour
            | TransactionField::IsNewDevice
            | TransactionField::TxVelocity1h
            | TransactionField::CustomerAge
            | TransactionField::HasChargebackHistory => {
                Value::from(self.numeric_value(field) as i64)
            }
        }
    }

    /// Row in the original feature space, in [`TransactionField::ALL`] order.
    pub fn to_row(&self) -> Vec<f64> {
        TransactionField::ALL
            .iter()
            .map(|&f| self.numeric_value(f))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> TransactionPayload {
        TransactionPayload {
            amount: 1299.9,
            channel: "PIX".to_string(),
            hour: 1,
            is_new_device: 1,
            device_trust_score: 0.23,
            days_since_last_tx: 0.5,
            tx_velocity_1h: 7,
            merchant_risk_score: 0.88,
            customer_age: 28,
            has_chargeback_history: 1,
            country_risk_score: 0.67,
        }
    }

    #[test]
    fn test_valid_payload() {
        let tx = Transaction::try_from(payload()).unwrap();
        assert_eq!(tx.channel, Channel::Pix);
        assert_eq!(tx.customer_age, 28);
        assert_eq!(tx.to_row().len(), N_FIELDS);
        assert_eq!(tx.to_row()[1], 1.0);
    }

    #[test]
    fn test_rejects_out_of_bounds_age() {
        let mut p = payload();
        p.customer_age = 10;
        let err = Transaction::try_from(p).unwrap_err();
        assert_eq!(err.0.len(), 1);
        assert_eq!(err.0[0].field, "customer_age");
    }

    #[test]
    fn test_rejects_unknown_channel_and_collects_all_fields() {
        let mut p = payload();
        p.channel = "BOLETO".to_string();
        p.hour = 24;
        p.device_trust_score = 1.5;
        let err = Transaction::try_from(p).unwrap_err();
        let fields: Vec<&str> = err.0.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["channel", "hour", "device_trust_score"]);
    }

    #[test]
    fn test_rejects_non_finite_amount() {
        let mut p = payload();
        p.amount = f64::NAN;
        assert!(Transaction::try_from(p).is_err());
    }

    #[test]
    fn test_deserialize_goes_through_validation() {
        let json = r#"{"amount": 10.0, "channel": "CARD", "hour": 3, "is_new_device": 0,
            "device_trust_score": 0.5, "days_since_last_tx": 1.0, "tx_velocity_1h": 0,
            "merchant_risk_score": 0.1, "customer_age": 200, "has_chargeback_history": 0,
            "country_risk_score": 0.2}"#;
        assert!(serde_json::from_str::<Transaction>(json).is_err());
    }

    #[test]
    fn test_integer_fields_accept_whole_floats() {
        let json = r#"{"amount": 10.0, "channel": "CARD", "hour": 3.0, "is_new_device": 1,
            "device_trust_score": 0.5, "days_since_last_tx": 1.0, "tx_velocity_1h": 2.0,
            "merchant_risk_score": 0.1, "customer_age": 41.0, "has_chargeback_history": 0,
            "country_risk_score": 0.2}"#;
        let tx: Transaction = serde_json::from_str(json).unwrap();
        assert_eq!(tx.hour, 3);
        assert_eq!(tx.tx_velocity_1h, 2);
        assert_eq!(tx.customer_age, 41);

        let fractional = json.replace("\"hour\": 3.0", "\"hour\": 3.5");
        assert!(serde_json::from_str::<TransactionPayload>(&fractional).is_err());
        let text = json.replace("\"hour\": 3.0", "\"hour\": \"3\"");
        assert!(serde_json::from_str::<TransactionPayload>(&text).is_err());
    }

    #[test]
    fn test_field_value_keeps_json_types() {
        let tx = Transaction::try_from(payload()).unwrap();
        assert_eq!(tx.field_value(TransactionField::Channel), Value::from("PIX"));
        assert_eq!(tx.field_value(TransactionField::Hour), Value::from(1));
        assert_eq!(tx.field_value(TransactionField::Amount), Value::from(1299.9));
    }

    #[test]
    fn test_field_index_matches_canonical_order() {
        assert_eq!(TransactionField::Channel.index(), 1);
        assert_eq!(TransactionField::CountryRiskScore.index(), 10);
        assert_eq!(TransactionField::numeric().count(), 10);
    }
}
