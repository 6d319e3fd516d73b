use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("bad field: {0}")]
    BadField(String),

    #[error("database unavailable")]
    Unavailable(#[source] sqlx::Error),

    #[error("database failure")]
    Database(#[source] sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            // Connection-level failures are worth a client retry; everything
            // else is a genuine server-side fault.
            sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                StoreError::Unavailable(err)
            }
            _ => StoreError::Database(err),
        }
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("transaction with such id was not found")]
    NotFound,

    #[error("bad field: {0}")]
    BadField(String),

    #[error("{context}")]
    Store {
        context: &'static str,
        #[source]
        source: StoreError,
    },
}

impl ServiceError {
    pub(crate) fn from_store(context: &'static str, err: StoreError) -> Self {
        match err {
            // Field validation failures keep their identity through the
            // service layer so the RPC edge can surface them verbatim.
            StoreError::BadField(msg) => ServiceError::BadField(msg),
            other => ServiceError::Store {
                context,
                source: other,
            },
        }
    }
}
