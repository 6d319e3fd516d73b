pub mod consumer;
pub mod dlq;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use uuid::Uuid;

use crate::model::{Transaction, TransactionType, UnknownTransactionType};

/// Wire form of one ingest record. Field-level shape (UUID, RFC-3339 instant)
/// is enforced by decoding; the value-level rules live in [`Validator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionEnvelope {
    pub user_id: Uuid,
    pub transaction_type: String,
    pub amount: i64,
    pub transaction_date: DateTime<Utc>,
}

impl TryFrom<TransactionEnvelope> for Transaction {
    type Error = UnknownTransactionType;

    fn try_from(envelope: TransactionEnvelope) -> Result<Self, Self::Error> {
        Ok(Transaction {
            // The store assigns the real id on insert.
            id: Uuid::nil(),
            user_id: envelope.user_id,
            transaction_type: envelope.transaction_type.parse::<TransactionType>()?,
            amount: envelope.amount,
            transaction_time: envelope.transaction_date,
        })
    }
}

/// A record that could not be processed. Carries the original bytes verbatim
/// so the dead-letter topic stays inspectable by humans and replay tooling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedEntry {
    pub key: String,
    #[serde(serialize_with = "as_base64", deserialize_with = "from_base64")]
    pub value: Vec<u8>,
    pub reason: String,
}

fn as_base64<S: Serializer>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&BASE64.encode(value))
}

fn from_base64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let encoded = String::deserialize(deserializer)?;
    BASE64
        .decode(encoded.as_bytes())
        .map_err(serde::de::Error::custom)
}

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("max retries is zero")]
    ZeroMaxRetries,

    #[error("max records fetched is zero")]
    ZeroMaxRecords,

    #[error("bad field: empty DLQ topic")]
    EmptyDlqTopic,

    #[error(transparent)]
    Kafka(#[from] rdkafka::error::KafkaError),
}

/// Value-level schema checks on decoded envelopes.
pub trait Validator: Send + Sync {
    fn validate(&self, envelope: &TransactionEnvelope) -> Result<(), ValidationError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("transaction_type must be one of bet, win; got {0:?}")]
    UnknownType(String),

    #[error("amount must be greater than zero; got {0}")]
    NonPositiveAmount(i64),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaValidator;

impl Validator for SchemaValidator {
    fn validate(&self, envelope: &TransactionEnvelope) -> Result<(), ValidationError> {
        if envelope.transaction_type.parse::<TransactionType>().is_err() {
            return Err(ValidationError::UnknownType(
                envelope.transaction_type.clone(),
            ));
        }

        if envelope.amount <= 0 {
            return Err(ValidationError::NonPositiveAmount(envelope.amount));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(transaction_type: &str, amount: i64) -> TransactionEnvelope {
        TransactionEnvelope {
            user_id: Uuid::parse_str("11111111-1111-1111-1111-111111110001").unwrap(),
            transaction_type: transaction_type.to_string(),
            amount,
            transaction_date: "2025-01-01T00:00:00Z".parse().unwrap(),
        }
    }

    #[test]
    fn validator_accepts_well_formed_envelopes() {
        assert!(SchemaValidator.validate(&envelope("bet", 100)).is_ok());
        assert!(SchemaValidator.validate(&envelope("win", 1)).is_ok());
    }

    #[test]
    fn validator_rejects_unknown_types() {
        let err = SchemaValidator
            .validate(&envelope("deposit", 100))
            .unwrap_err();
        assert!(matches!(err, ValidationError::UnknownType(_)));
    }

    #[test]
    fn validator_rejects_non_positive_amounts() {
        for amount in [0, -5] {
            let err = SchemaValidator.validate(&envelope("bet", amount)).unwrap_err();
            assert!(matches!(err, ValidationError::NonPositiveAmount(_)));
        }
    }

    #[test]
    fn envelope_decode_encode_round_trips() {
        let raw = r#"{"user_id":"11111111-1111-1111-1111-111111110001","transaction_type":"bet","amount":100,"transaction_date":"2025-01-01T00:00:00Z"}"#;

        let decoded: TransactionEnvelope = serde_json::from_str(raw).unwrap();
        let encoded = serde_json::to_string(&decoded).unwrap();
        let again: TransactionEnvelope = serde_json::from_str(&encoded).unwrap();

        assert_eq!(decoded, again);
    }

    #[test]
    fn envelope_decode_requires_all_fields() {
        for raw in [
            r#"{"transaction_type":"bet","amount":100,"transaction_date":"2025-01-01T00:00:00Z"}"#,
            r#"{"user_id":"11111111-1111-1111-1111-111111110001","amount":100,"transaction_date":"2025-01-01T00:00:00Z"}"#,
            r#"{"user_id":"11111111-1111-1111-1111-111111110001","transaction_type":"bet","transaction_date":"2025-01-01T00:00:00Z"}"#,
            r#"{"user_id":"11111111-1111-1111-1111-111111110001","transaction_type":"bet","amount":100}"#,
            r#"{"user_id":"not-a-uuid","transaction_type":"bet","amount":100,"transaction_date":"2025-01-01T00:00:00Z"}"#,
            r#"{"user_id":"11111111-1111-1111-1111-111111110001","transaction_type":"bet","amount":100,"transaction_date":"yesterday"}"#,
        ] {
            assert!(
                serde_json::from_str::<TransactionEnvelope>(raw).is_err(),
                "decoded {raw}"
            );
        }
    }

    #[test]
    fn converted_transaction_keeps_the_envelope_fields() {
        let transaction = Transaction::try_from(envelope("win", 250)).unwrap();

        assert_eq!(transaction.id, Uuid::nil());
        assert_eq!(transaction.transaction_type, TransactionType::Win);
        assert_eq!(transaction.amount, 250);
        assert_eq!(
            transaction.transaction_time,
            "2025-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap()
        );
    }

    #[test]
    fn failed_entry_serializes_value_as_base64() {
        let entry = FailedEntry {
            key: "record-1".to_string(),
            value: b"{bad".to_vec(),
            reason: "expected value at line 1".to_string(),
        };

        let encoded = serde_json::to_value(&entry).unwrap();
        assert_eq!(encoded["key"], "record-1");
        assert_eq!(encoded["value"], "e2JhZA==");
        assert_eq!(encoded["reason"], "expected value at line 1");

        let decoded: FailedEntry = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, entry);
    }
}
