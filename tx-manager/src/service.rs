use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{ServiceError, StoreError};
use crate::model::{Transaction, TransactionFilter};

#[async_trait]
pub trait Repository: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Transaction>, StoreError>;

    async fn get_all(
        &self,
        filters: TransactionFilter,
        order_by: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Transaction>, StoreError>;

    async fn add(&self, transactions: Vec<Transaction>) -> Result<(), StoreError>;
}

/// Policy layer between the transport edges and the store: translates absence
/// into a typed error and keeps the error taxonomy in one place.
#[derive(Debug, Clone)]
pub struct Service<R> {
    repo: R,
}

impl<R: Repository> Service<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Transaction, ServiceError> {
        let transaction = self
            .repo
            .get_by_id(id)
            .await
            .map_err(|e| ServiceError::from_store("failed to get transaction by ID", e))?;

        transaction.ok_or(ServiceError::NotFound)
    }

    pub async fn get_all(
        &self,
        filters: TransactionFilter,
        order_by: &str,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Transaction>, i64), ServiceError> {
        let transactions = self
            .repo
            .get_all(filters, order_by, limit, offset)
            .await
            .map_err(|e| ServiceError::from_store("failed to get transactions by filters", e))?;

        // The total is the page size; there is no separate COUNT round trip.
        let total = transactions.len() as i64;

        Ok((transactions, total))
    }

    pub async fn create(&self, transactions: Vec<Transaction>) -> Result<(), ServiceError> {
        if transactions.is_empty() {
            return Ok(());
        }

        self.repo
            .add(transactions)
            .await
            .map_err(|e| ServiceError::from_store("failed to insert transactions", e))
    }
}
