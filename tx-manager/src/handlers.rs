use std::backtrace::Backtrace;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures::FutureExt;
use tonic::{Request, Response, Status};
use uuid::Uuid;

use crate::error::{ServiceError, StoreError};
use crate::model::{Transaction, TransactionFilter, TransactionType};
use crate::proto;
use crate::proto::transaction_manager_server::TransactionManager;
use crate::service::{Repository, Service};

/// Capability set the RPC surface needs from the domain layer.
#[async_trait]
pub trait TransactionService: Send + Sync + 'static {
    async fn get_by_id(&self, id: Uuid) -> Result<Transaction, ServiceError>;

    async fn get_all(
        &self,
        filters: TransactionFilter,
        order_by: &str,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Transaction>, i64), ServiceError>;
}

#[async_trait]
impl<R> TransactionService for Service<R>
where
    R: Repository + 'static,
{
    async fn get_by_id(&self, id: Uuid) -> Result<Transaction, ServiceError> {
        Service::get_by_id(self, id).await
    }

    async fn get_all(
        &self,
        filters: TransactionFilter,
        order_by: &str,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Transaction>, i64), ServiceError> {
        Service::get_all(self, filters, order_by, limit, offset).await
    }
}

pub struct Handler<S> {
    tx_svc: S,
}

impl<S> Handler<S> {
    pub fn new(tx_svc: S) -> Self {
        Self { tx_svc }
    }
}

#[tonic::async_trait]
impl<S: TransactionService> TransactionManager for Handler<S> {
    #[tracing::instrument(name = "GetTransactionByID", skip(self, request))]
    async fn get_transaction_by_id(
        &self,
        request: Request<proto::GetTransactionByIdRequest>,
    ) -> Result<Response<proto::GetTransactionByIdResponse>, Status> {
        recover("GetTransactionByID", async {
            let request = request.into_inner();

            let id = Uuid::parse_str(&request.id).map_err(|e| {
                Status::invalid_argument(format!("failed to parse transaction id: {e}"))
            })?;

            let transaction = self.tx_svc.get_by_id(id).await.map_err(into_status)?;

            Ok(Response::new(proto::GetTransactionByIdResponse {
                transaction: Some(transaction_to_proto(&transaction)),
            }))
        })
        .await
    }

    #[tracing::instrument(name = "GetTransactionByFilters", skip(self, request))]
    async fn get_transaction_by_filters(
        &self,
        request: Request<proto::GetTransactionByFiltersRequest>,
    ) -> Result<Response<proto::GetTransactionByFiltersResponse>, Status> {
        recover("GetTransactionByFilters", async {
            let request = request.into_inner();

            let filters = filters_from_proto(request.filters.as_ref())
                .map_err(|e| Status::invalid_argument(format!("failed to parse user id: {e}")))?;

            if request.limit < 1 || request.offset < 0 {
                return Err(Status::invalid_argument("invalid offset or limit"));
            }

            let (transactions, total) = self
                .tx_svc
                .get_all(filters, &request.order_by, request.limit, request.offset)
                .await
                .map_err(into_status)?;

            Ok(Response::new(proto::GetTransactionByFiltersResponse {
                transactions: transactions.iter().map(transaction_to_proto).collect(),
                total,
            }))
        })
        .await
    }
}

/// Recovery boundary around a unary handler body: a panic becomes a redacted
/// Internal status while the payload and stack stay in the server logs.
async fn recover<T, F>(method: &'static str, handler: F) -> Result<Response<T>, Status>
where
    F: std::future::Future<Output = Result<Response<T>, Status>>,
{
    match AssertUnwindSafe(handler).catch_unwind().await {
        Ok(response) => response,
        Err(panic) => {
            tracing::error!(
                method,
                panic = panic_message(&panic),
                backtrace = %Backtrace::force_capture(),
                "recovered from panic in handler"
            );
            Err(Status::internal(""))
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

/// Maps the domain taxonomy to transport codes. Only NotFound and BadField
/// carry their messages to the client; everything else is redacted and logged
/// here instead.
fn into_status(err: ServiceError) -> Status {
    match &err {
        ServiceError::NotFound => Status::not_found(err.to_string()),
        ServiceError::BadField(_) => Status::invalid_argument(err.to_string()),
        ServiceError::Store {
            source: StoreError::Unavailable(_),
            ..
        } => {
            tracing::error!(error = ?err, "storage unavailable");
            Status::unavailable("")
        }
        ServiceError::Store { .. } => {
            tracing::error!(error = ?err, "internal error in handler");
            Status::internal("")
        }
    }
}

fn transaction_to_proto(transaction: &Transaction) -> proto::Transaction {
    proto::Transaction {
        id: transaction.id.to_string(),
        user_id: transaction.user_id.to_string(),
        r#type: proto::TransactionType::from(transaction.transaction_type) as i32,
        amount: transaction.amount,
        timestamp: transaction.transaction_time.timestamp(),
    }
}

fn filters_from_proto(filters: Option<&proto::Filters>) -> Result<TransactionFilter, uuid::Error> {
    let Some(filters) = filters else {
        return Ok(TransactionFilter::default());
    };

    let user_id = match filters.user_id.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(Uuid::parse_str(raw)?),
    };

    // Unknown wire enum values mean "no type filter", never an error.
    let transaction_type = filters
        .r#type
        .and_then(|raw| proto::TransactionType::try_from(raw).ok())
        .map(TransactionType::from);

    Ok(TransactionFilter {
        user_id,
        transaction_type,
    })
}

impl From<TransactionType> for proto::TransactionType {
    fn from(value: TransactionType) -> Self {
        match value {
            TransactionType::Bet => proto::TransactionType::Bet,
            TransactionType::Win => proto::TransactionType::Win,
        }
    }
}

impl From<proto::TransactionType> for TransactionType {
    fn from(value: proto::TransactionType) -> Self {
        match value {
            proto::TransactionType::Bet => TransactionType::Bet,
            proto::TransactionType::Win => TransactionType::Win,
        }
    }
}
