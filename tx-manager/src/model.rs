use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Assigned by the store on insert; nil until then.
    pub id: Uuid,
    pub user_id: Uuid,
    pub transaction_type: TransactionType,
    pub amount: i64,
    pub transaction_time: DateTime<Utc>,
}

impl Transaction {
    /// Idempotency key over the semantic fields. The timestamp is rendered in
    /// UTC at second precision, so the same event hashes identically no
    /// matter which producer timezone it arrived from.
    pub fn hash(&self) -> String {
        let data = format!(
            "{}{}{}{}",
            self.user_id,
            self.transaction_type,
            self.amount,
            self.transaction_time.to_rfc3339_opts(SecondsFormat::Secs, true),
        );

        hex::encode(Sha256::digest(data.as_bytes()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Bet,
    Win,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Bet => "bet",
            TransactionType::Win => "win",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = UnknownTransactionType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bet" => Ok(TransactionType::Bet),
            "win" => Ok(TransactionType::Win),
            other => Err(UnknownTransactionType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown transaction type: {0}")]
pub struct UnknownTransactionType(pub String);

/// Optional AND-composed query constraints; the empty filter matches
/// everything.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TransactionFilter {
    pub user_id: Option<Uuid>,
    pub transaction_type: Option<TransactionType>,
}
