use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub transaction_type: TransactionType,
    pub amount: i64,
    /// Unix seconds, UTC.
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
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

    /// Unknown strings are not an error at this layer; the caller decides
    /// whether that means "no filter".
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "bet" => Some(TransactionType::Bet),
            "win" => Some(TransactionType::Win),
            _ => None,
        }
    }
}

/// Filter shape accepted by the REST surface, with the exported field names
/// of the public contract: `{"UserID": "...", "Type": "bet"}`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TransactionFilter {
    #[serde(rename = "UserID", default)]
    pub user_id: String,
    #[serde(rename = "Type", default)]
    pub transaction_type: String,
}
