use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::Instrument;
use uuid::Uuid;

use crate::configuration::DatabaseSettings;
use crate::error::StoreError;
use crate::model::{Transaction, TransactionFilter, UnknownTransactionType};
use crate::service::Repository;

/// Column names clients may order by, mapped to the physical column. Only
/// these two strings are ever interpolated into SQL; all values travel as
/// bound parameters.
const ORDER_BY_COLUMNS: [(&str, &str); 4] = [
    ("user_id", "user_id"),
    ("amount", "amount"),
    ("transaction_type", "transaction_type"),
    ("timestamp", "transaction_time"),
];

#[derive(Debug, Clone)]
pub struct TransactionRepository {
    pool: PgPool,
}

impl TransactionRepository {
    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(settings: &DatabaseSettings) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .connect(&settings.connection_string())
            .await?;

        Ok(Self::with_pool(pool))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl Repository for TransactionRepository {
    async fn add(&self, transactions: Vec<Transaction>) -> Result<(), StoreError> {
        if transactions.is_empty() {
            return Ok(());
        }

        // One multi-row statement per batch; duplicates are dropped on the
        // unique hash instead of failing the whole insert.
        let mut query = QueryBuilder::new(
            "INSERT INTO transactions (user_id, transaction_type, amount, transaction_time, t_hash) ",
        );
        query.push_values(&transactions, |mut row, transaction| {
            row.push_bind(transaction.user_id)
                .push_bind(transaction.transaction_type.as_str())
                .push_bind(transaction.amount)
                .push_bind(transaction.transaction_time)
                .push_bind(transaction.hash());
        });
        query.push(" ON CONFLICT (t_hash) DO NOTHING");

        let query_span = tracing::info_span!(
            "Inserting transactions batch",
            batch_size = transactions.len()
        );
        query
            .build()
            .execute(&self.pool)
            .instrument(query_span)
            .await?;

        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Transaction>, StoreError> {
        let query_span = tracing::info_span!("Fetching transaction by id");

        let row = sqlx::query_as::<_, TransactionRow>(
            "SELECT id, user_id, transaction_type, amount, transaction_time \
             FROM transactions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .instrument(query_span)
        .await?;

        row.map(Transaction::try_from).transpose()
    }

    async fn get_all(
        &self,
        filters: TransactionFilter,
        order_by: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Transaction>, StoreError> {
        let mut query = build_get_all_query(&filters, order_by, limit, offset)?;

        let query_span = tracing::info_span!("Fetching transactions by filters");
        let rows = query
            .build_query_as::<TransactionRow>()
            .fetch_all(&self.pool)
            .instrument(query_span)
            .await?;

        rows.into_iter().map(Transaction::try_from).collect()
    }
}

fn build_get_all_query(
    filters: &TransactionFilter,
    order_by: &str,
    limit: i64,
    offset: i64,
) -> Result<QueryBuilder<'static, Postgres>, StoreError> {
    let mut query = QueryBuilder::new(
        "SELECT id, user_id, transaction_type, amount, transaction_time FROM transactions",
    );

    if let Some(user_id) = filters.user_id {
        query.push(" WHERE user_id = ").push_bind(user_id);
    }
    if let Some(transaction_type) = filters.transaction_type {
        query.push(if filters.user_id.is_some() {
            " AND "
        } else {
            " WHERE "
        });
        query
            .push("transaction_type = ")
            .push_bind(transaction_type.as_str());
    }

    if let Some((column, direction)) = parse_order_by(order_by)? {
        query.push(" ORDER BY ").push(column);
        if let Some(direction) = direction {
            query.push(" ").push(direction);
        }
    }

    query
        .push(" LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    Ok(query)
}

fn parse_order_by(
    raw: &str,
) -> Result<Option<(&'static str, Option<&'static str>)>, StoreError> {
    if raw.is_empty() {
        return Ok(None);
    }

    let mut parts = raw.split(' ');
    let requested = parts.next().unwrap_or(raw);

    let column = ORDER_BY_COLUMNS
        .iter()
        .find(|(name, _)| *name == requested)
        .map(|(_, column)| *column)
        .ok_or_else(|| StoreError::BadField(format!("invalid orderBy: {raw}")))?;

    let direction = match parts.next() {
        None => None,
        Some("asc") => Some("ASC"),
        Some("desc") => Some("DESC"),
        Some(_) => return Err(StoreError::BadField(format!("invalid orderBy: {raw}"))),
    };

    if parts.next().is_some() {
        return Err(StoreError::BadField(format!("invalid orderBy: {raw}")));
    }

    Ok(Some((column, direction)))
}

#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    user_id: Uuid,
    transaction_type: String,
    amount: i64,
    transaction_time: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = StoreError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        // The CHECK constraint keeps unknown types out of the table; hitting
        // this branch means the row was written by something else entirely.
        let transaction_type = row.transaction_type.parse().map_err(
            |e: UnknownTransactionType| StoreError::Database(sqlx::Error::Decode(Box::new(e))),
        )?;

        Ok(Transaction {
            id: row.id,
            user_id: row.user_id,
            transaction_type,
            amount: row.amount,
            transaction_time: row.transaction_time,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::model::TransactionType;

    use super::*;

    #[test]
    fn get_all_query_without_filters_binds_only_pagination() {
        let query = build_get_all_query(&TransactionFilter::default(), "", 10, 0).unwrap();

        assert_eq!(
            query.into_sql(),
            "SELECT id, user_id, transaction_type, amount, transaction_time \
             FROM transactions LIMIT $1 OFFSET $2"
        );
    }

    #[test]
    fn get_all_query_composes_filters_with_and() {
        let filters = TransactionFilter {
            user_id: Some(Uuid::nil()),
            transaction_type: Some(TransactionType::Bet),
        };

        let query = build_get_all_query(&filters, "", 10, 0).unwrap();

        assert_eq!(
            query.into_sql(),
            "SELECT id, user_id, transaction_type, amount, transaction_time \
             FROM transactions WHERE user_id = $1 AND transaction_type = $2 \
             LIMIT $3 OFFSET $4"
        );
    }

    #[test]
    fn get_all_query_orders_by_allow_listed_column() {
        let query =
            build_get_all_query(&TransactionFilter::default(), "amount desc", 10, 0).unwrap();

        assert_eq!(
            query.into_sql(),
            "SELECT id, user_id, transaction_type, amount, transaction_time \
             FROM transactions ORDER BY amount DESC LIMIT $1 OFFSET $2"
        );
    }

    #[test]
    fn get_all_query_maps_timestamp_to_the_time_column() {
        let query =
            build_get_all_query(&TransactionFilter::default(), "timestamp asc", 10, 0).unwrap();

        assert!(query.into_sql().contains("ORDER BY transaction_time ASC"));
    }

    #[test]
    fn order_by_accepts_bare_column() {
        assert_eq!(parse_order_by("amount").unwrap(), Some(("amount", None)));
    }

    #[test]
    fn order_by_rejects_unknown_columns() {
        for raw in ["id", "t_hash", "amount; DROP TABLE transactions", "DROP TABLE"] {
            let err = parse_order_by(raw).unwrap_err();
            assert!(matches!(err, StoreError::BadField(_)), "accepted {raw:?}");
        }
    }

    #[test]
    fn order_by_rejects_unknown_directions() {
        let err = parse_order_by("amount sideways").unwrap_err();
        assert!(matches!(err, StoreError::BadField(_)));
    }

    #[test]
    fn order_by_rejects_trailing_tokens() {
        let err = parse_order_by("amount desc extra").unwrap_err();
        assert!(matches!(err, StoreError::BadField(_)));
    }

    #[test]
    fn empty_order_by_means_unordered() {
        assert_eq!(parse_order_by("").unwrap(), None);
    }
}
