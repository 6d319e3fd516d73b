use std::time::Duration;

use async_trait::async_trait;
use tonic::transport::{Channel, Endpoint};
use tonic::{Code, Status};
use uuid::Uuid;

use crate::configuration::ClientSettings;
use crate::entities::{Transaction, TransactionFilter, TransactionType};
use crate::error::GatewayError;
use crate::proto;
use crate::proto::transaction_manager_client::TransactionManagerClient;

const MAX_ATTEMPTS: u32 = 10;
const PER_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(1);
const BACKOFF_STEP: Duration = Duration::from_millis(500);

/// Capability set the HTTP handlers need from the transaction manager; tests
/// substitute a fake behind the same trait object.
#[async_trait]
pub trait TxManager: Send + Sync + 'static {
    async fn get_transaction_by_id(&self, id: Uuid) -> Result<Transaction, GatewayError>;

    async fn get_transactions(
        &self,
        filter: TransactionFilter,
        order_by: String,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Transaction>, i64), GatewayError>;
}

#[derive(Debug, Clone)]
pub struct TxManagerClient {
    inner: TransactionManagerClient<Channel>,
}

impl TxManagerClient {
    /// The channel connects lazily; startup only fails on a malformed host.
    pub fn connect(settings: &ClientSettings) -> Result<Self, tonic::transport::Error> {
        let channel = Endpoint::from_shared(format!("http://{}", settings.host))?.connect_lazy();

        Ok(Self {
            inner: TransactionManagerClient::new(channel),
        })
    }
}

#[async_trait]
impl TxManager for TxManagerClient {
    async fn get_transaction_by_id(&self, id: Uuid) -> Result<Transaction, GatewayError> {
        let response = retry_unary(|| {
            let mut client = self.inner.clone();
            let request = proto::GetTransactionByIdRequest { id: id.to_string() };
            async move {
                client
                    .get_transaction_by_id(request)
                    .await
                    .map(|r| r.into_inner())
            }
        })
        .await
        .map_err(map_status)?;

        let transaction = response
            .transaction
            .ok_or_else(|| GatewayError::BadResponse("transaction is empty".to_string()))?;

        transaction_from_proto(transaction)
    }

    async fn get_transactions(
        &self,
        filter: TransactionFilter,
        order_by: String,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Transaction>, i64), GatewayError> {
        let filters = filters_to_proto(&filter);

        let response = retry_unary(|| {
            let mut client = self.inner.clone();
            let request = proto::GetTransactionByFiltersRequest {
                filters: Some(filters.clone()),
                order_by: order_by.clone(),
                limit,
                offset,
            };
            async move {
                client
                    .get_transaction_by_filters(request)
                    .await
                    .map(|r| r.into_inner())
            }
        })
        .await
        .map_err(map_status)?;

        let total = response.total;
        let transactions = response
            .transactions
            .into_iter()
            .map(transaction_from_proto)
            .collect::<Result<Vec<_>, _>>()?;

        Ok((transactions, total))
    }
}

/// Unary retry policy: up to [`MAX_ATTEMPTS`] attempts, retrying only on
/// Unavailable, each attempt bounded by [`PER_ATTEMPT_TIMEOUT`], with linear
/// [`BACKOFF_STEP`] backoff between attempts.
async fn retry_unary<T, F, Fut>(mut call: F) -> Result<T, Status>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, Status>>,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        match tokio::time::timeout(PER_ATTEMPT_TIMEOUT, call()).await {
            Ok(Ok(response)) => return Ok(response),
            Ok(Err(status)) => {
                if status.code() != Code::Unavailable || attempt >= MAX_ATTEMPTS {
                    return Err(status);
                }

                tokio::time::sleep(BACKOFF_STEP * attempt).await;
            }
            Err(_) => return Err(Status::deadline_exceeded("per-attempt timeout elapsed")),
        }
    }
}

fn map_status(status: Status) -> GatewayError {
    match status.code() {
        Code::NotFound => GatewayError::NotFound(status.message().to_string()),
        Code::InvalidArgument => GatewayError::BadField(status.message().to_string()),
        _ => GatewayError::Upstream(status),
    }
}

fn filters_to_proto(filter: &TransactionFilter) -> proto::Filters {
    // An empty or unknown type string means "no type filter" on the wire.
    let transaction_type =
        TransactionType::parse(&filter.transaction_type).map(|t| wire_type(t) as i32);

    proto::Filters {
        user_id: (!filter.user_id.is_empty()).then(|| filter.user_id.clone()),
        r#type: transaction_type,
    }
}

fn wire_type(transaction_type: TransactionType) -> proto::TransactionType {
    match transaction_type {
        TransactionType::Bet => proto::TransactionType::Bet,
        TransactionType::Win => proto::TransactionType::Win,
    }
}

fn transaction_from_proto(transaction: proto::Transaction) -> Result<Transaction, GatewayError> {
    let id = Uuid::parse_str(&transaction.id)
        .map_err(|e| GatewayError::BadResponse(format!("invalid transaction id: {e}")))?;
    let user_id = Uuid::parse_str(&transaction.user_id)
        .map_err(|e| GatewayError::BadResponse(format!("invalid user id: {e}")))?;

    let transaction_type = match proto::TransactionType::try_from(transaction.r#type) {
        Ok(proto::TransactionType::Bet) => TransactionType::Bet,
        Ok(proto::TransactionType::Win) => TransactionType::Win,
        Err(_) => {
            return Err(GatewayError::BadResponse(format!(
                "unknown transaction type: {}",
                transaction.r#type
            )))
        }
    };

    Ok(Transaction {
        id,
        user_id,
        transaction_type,
        amount: transaction.amount,
        timestamp: transaction.timestamp,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn retry_gives_up_after_max_attempts_on_unavailable() {
        let attempts = AtomicU32::new(0);

        let result: Result<(), Status> = retry_unary(|| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(Status::unavailable("broker down")) }
        })
        .await;

        assert_eq!(result.unwrap_err().code(), Code::Unavailable);
        assert_eq!(attempts.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_recovers_when_the_upstream_comes_back() {
        let attempts = AtomicU32::new(0);

        let result = retry_unary(|| {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if attempt < 4 {
                    Err(Status::unavailable("still down"))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 4);
    }

    #[tokio::test]
    async fn retry_does_not_retry_other_codes() {
        let attempts = AtomicU32::new(0);

        let result: Result<(), Status> = retry_unary(|| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(Status::not_found("missing")) }
        })
        .await;

        assert_eq!(result.unwrap_err().code(), Code::NotFound);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_bounds_each_attempt_with_a_timeout() {
        let result: Result<(), Status> =
            retry_unary(|| std::future::pending::<Result<(), Status>>()).await;

        assert_eq!(result.unwrap_err().code(), Code::DeadlineExceeded);
    }

    #[test]
    fn statuses_map_to_the_gateway_taxonomy() {
        assert!(matches!(
            map_status(Status::not_found("x")),
            GatewayError::NotFound(_)
        ));
        assert!(matches!(
            map_status(Status::invalid_argument("x")),
            GatewayError::BadField(_)
        ));
        assert!(matches!(
            map_status(Status::internal("x")),
            GatewayError::Upstream(_)
        ));
    }

    #[test]
    fn empty_and_unknown_filter_types_travel_as_no_filter() {
        for raw in ["", "deposit", "BET"] {
            let filters = filters_to_proto(&TransactionFilter {
                user_id: String::new(),
                transaction_type: raw.to_string(),
            });

            assert_eq!(filters.r#type, None, "filter {raw:?}");
            assert_eq!(filters.user_id, None);
        }
    }

    #[test]
    fn known_filter_fields_are_forwarded() {
        let filters = filters_to_proto(&TransactionFilter {
            user_id: "11111111-1111-1111-1111-111111110001".to_string(),
            transaction_type: "win".to_string(),
        });

        assert_eq!(
            filters.user_id.as_deref(),
            Some("11111111-1111-1111-1111-111111110001")
        );
        assert_eq!(filters.r#type, Some(proto::TransactionType::Win as i32));
    }

    #[test]
    fn proto_transactions_with_bad_ids_are_rejected() {
        let transaction = proto::Transaction {
            id: "nope".to_string(),
            user_id: "11111111-1111-1111-1111-111111110001".to_string(),
            r#type: proto::TransactionType::Bet as i32,
            amount: 100,
            timestamp: 0,
        };

        assert!(matches!(
            transaction_from_proto(transaction),
            Err(GatewayError::BadResponse(_))
        ));
    }
}
