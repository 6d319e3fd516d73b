use actix_web::http::StatusCode;
use actix_web::{get, web, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::client::TxManager;
use crate::entities::{Transaction, TransactionFilter};
use crate::error::{status_and_message, GatewayError};

const DEFAULT_LIMIT: i64 = 10;
const DEFAULT_OFFSET: i64 = 0;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    limit: Option<String>,
    offset: Option<String>,
    #[serde(rename = "orderBy")]
    order_by: Option<String>,
    filters: Option<String>,
}

#[derive(Debug, Serialize)]
struct TransactionResponse {
    id: Uuid,
    user_id: Uuid,
    amount: i64,
    #[serde(rename = "type")]
    transaction_type: String,
    date: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct TransactionsResponse {
    transactions: Vec<TransactionResponse>,
    total: i64,
}

#[tracing::instrument(name = "Getting transaction for /transactions/{id} request", skip(client))]
#[get("/api/v1/transactions/{id}")]
pub async fn get_transaction_by_id(
    client: web::Data<dyn TxManager>,
    path: web::Path<String>,
) -> impl Responder {
    let id = path.into_inner();

    let parsed_id = match Uuid::parse_str(&id) {
        Ok(parsed) => parsed,
        Err(_) => return json_error(StatusCode::BAD_REQUEST, "invalid id parameter"),
    };

    match client.get_transaction_by_id(parsed_id).await {
        Ok(transaction) => HttpResponse::Ok().json(transaction_to_response(&transaction)),
        Err(e) => error_response(&e),
    }
}

#[tracing::instrument(name = "Getting transactions for /transactions request", skip(client))]
#[get("/api/v1/transactions")]
pub async fn get_transactions(
    client: web::Data<dyn TxManager>,
    query: web::Query<ListQuery>,
) -> impl Responder {
    let query = query.into_inner();

    let limit = int_with_default(query.limit.as_deref(), DEFAULT_LIMIT);
    let offset = int_with_default(query.offset.as_deref(), DEFAULT_OFFSET);
    let order_by = query.order_by.unwrap_or_default();

    let filters = match parse_filters(query.filters.as_deref()) {
        Ok(filters) => filters,
        Err(_) => return json_error(StatusCode::BAD_REQUEST, "invalid filters parameter"),
    };

    match client
        .get_transactions(filters, order_by, limit, offset)
        .await
    {
        Ok((transactions, total)) => HttpResponse::Ok().json(TransactionsResponse {
            transactions: transactions.iter().map(transaction_to_response).collect(),
            total,
        }),
        Err(e) => error_response(&e),
    }
}

fn error_response(err: &GatewayError) -> HttpResponse {
    let (status, message) = status_and_message(err);
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(error = ?err, "request to the transaction manager failed");
    }

    json_error(status, &message)
}

fn json_error(status: StatusCode, message: &str) -> HttpResponse {
    HttpResponse::build(status).json(serde_json::json!({ "error": message }))
}

/// Absent and unparsable values both fall back to the default.
fn int_with_default(raw: Option<&str>, default: i64) -> i64 {
    raw.and_then(|raw| raw.parse().ok()).unwrap_or(default)
}

fn parse_filters(raw: Option<&str>) -> Result<TransactionFilter, serde_json::Error> {
    match raw {
        None | Some("") => Ok(TransactionFilter::default()),
        Some(raw) => serde_json::from_str(raw),
    }
}

fn transaction_to_response(transaction: &Transaction) -> TransactionResponse {
    TransactionResponse {
        id: transaction.id,
        user_id: transaction.user_id,
        amount: transaction.amount,
        transaction_type: transaction.transaction_type.as_str().to_string(),
        date: DateTime::from_timestamp(transaction.timestamp, 0).unwrap_or_default(),
    }
}
