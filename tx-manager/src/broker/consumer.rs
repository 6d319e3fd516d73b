use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::{ClientConfig, Offset, TopicPartitionList};
use tokio::sync::watch;
use tokio::time::{sleep, timeout};

use crate::broker::{BrokerError, FailedEntry, TransactionEnvelope, Validator};
use crate::configuration::BrokerSettings;
use crate::error::ServiceError;
use crate::model::Transaction;
use crate::service::{Repository, Service};

/// How long to keep draining already-buffered records once the first record
/// of a batch has arrived.
const BATCH_DRAIN_TIMEOUT: Duration = Duration::from_millis(50);

const RETRY_JITTER_MS: u64 = 500;

#[async_trait]
pub trait TransactionSaver: Send + Sync {
    async fn create(&self, transactions: Vec<Transaction>) -> Result<(), ServiceError>;
}

#[async_trait]
impl<R: Repository> TransactionSaver for Service<R> {
    async fn create(&self, transactions: Vec<Transaction>) -> Result<(), ServiceError> {
        Service::create(self, transactions).await
    }
}

#[async_trait]
pub trait DlqProducer: Send + Sync {
    async fn produce(&self, entries: Vec<FailedEntry>);
}

pub struct Client<S, P, V> {
    consumer: StreamConsumer,
    tx_saver: S,
    dlq_producer: P,
    validator: V,

    max_records_poll: usize,
    max_retry_save_attempts: u32,
}

/// One fetched record, detached from the broker client so batches can outlive
/// the poll call.
#[derive(Debug, Clone)]
struct FetchedRecord {
    key: String,
    payload: Vec<u8>,
    topic: String,
    partition: i32,
    offset: i64,
}

impl<S, P, V> Client<S, P, V>
where
    S: TransactionSaver,
    P: DlqProducer,
    V: Validator,
{
    pub fn new(
        settings: &BrokerSettings,
        tx_saver: S,
        validator: V,
        dlq_producer: P,
    ) -> Result<Self, BrokerError> {
        if settings.consumer.max_retries == 0 {
            return Err(BrokerError::ZeroMaxRetries);
        }
        if settings.consumer.max_records_fetched == 0 {
            return Err(BrokerError::ZeroMaxRecords);
        }

        let consumer: StreamConsumer = ClientConfig::new()
            .set(
                "bootstrap.servers",
                format!("{}:{}", settings.host, settings.port),
            )
            .set("group.id", &settings.consumer.group)
            .set("enable.auto.commit", "false")
            .create()?;

        consumer.subscribe(&[settings.consumer.topic.as_str()])?;

        Ok(Self {
            consumer,
            tx_saver,
            dlq_producer,
            validator,
            max_records_poll: settings.consumer.max_records_fetched,
            max_retry_save_attempts: settings.consumer.max_retries,
        })
    }

    /// Runs until the shutdown signal fires. Poison records are dead-lettered
    /// and committed; only broker-level faults surface as loop errors.
    pub async fn consume(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    tracing::info!("shutdown signal received, closing consumer");
                    return;
                }
                result = self.consume_batch() => match result {
                    Ok(failed_entries) if !failed_entries.is_empty() => {
                        self.dlq_producer.produce(failed_entries).await;
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!(error = %e, "consume failed"),
                },
            }
        }
    }

    async fn consume_batch(&self) -> Result<Vec<FailedEntry>, BrokerError> {
        let records = self.poll_batch().await?;
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let (transactions, failed_entries) = partition_records(&self.validator, &records);

        if let Err(e) = self.save_with_retry(transactions).await {
            // Offsets are still committed below: a batch the store will not
            // take after every retry must not wedge the partition.
            tracing::error!(error = ?e, "failed to insert transactions in the database");
        }

        self.commit(&records)?;

        Ok(failed_entries)
    }

    async fn poll_batch(&self) -> Result<Vec<FetchedRecord>, BrokerError> {
        let mut records = Vec::with_capacity(self.max_records_poll);

        let first = self.consumer.recv().await?;
        records.push(detach(&first));
        drop(first);

        while records.len() < self.max_records_poll {
            match timeout(BATCH_DRAIN_TIMEOUT, self.consumer.recv()).await {
                Ok(Ok(message)) => records.push(detach(&message)),
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => break,
            }
        }

        Ok(records)
    }

    async fn save_with_retry(&self, transactions: Vec<Transaction>) -> Result<(), ServiceError> {
        retry_with_backoff(self.max_retry_save_attempts, || {
            self.tx_saver.create(transactions.clone())
        })
        .await
    }

    fn commit(&self, records: &[FetchedRecord]) -> Result<(), BrokerError> {
        let mut next_offsets: HashMap<(&str, i32), i64> = HashMap::new();
        for record in records {
            let next = record.offset + 1;
            next_offsets
                .entry((record.topic.as_str(), record.partition))
                .and_modify(|current| *current = (*current).max(next))
                .or_insert(next);
        }

        let mut assignment = TopicPartitionList::new();
        for ((topic, partition), offset) in next_offsets {
            assignment.add_partition_offset(topic, partition, Offset::Offset(offset))?;
        }

        self.consumer.commit(&assignment, CommitMode::Sync)?;

        Ok(())
    }
}

/// Jittered linear backoff: attempt `i` sleeps `i * 1s + U[0, 500ms)` before
/// attempt `i + 1`; the first attempt runs immediately and exactly
/// `max_attempts` attempts are made.
async fn retry_with_backoff<F, Fut>(max_attempts: u32, mut operation: F) -> Result<(), ServiceError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<(), ServiceError>>,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        let err = match operation().await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        if attempt >= max_attempts {
            return Err(err);
        }

        let backoff = Duration::from_secs(u64::from(attempt));
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..RETRY_JITTER_MS));
        sleep(backoff + jitter).await;
    }
}

/// Splits a fetch into convertible transactions and dead-letter candidates.
/// Decode and validation failures never stop the rest of the batch.
fn partition_records<V: Validator>(
    validator: &V,
    records: &[FetchedRecord],
) -> (Vec<Transaction>, Vec<FailedEntry>) {
    let mut transactions = Vec::with_capacity(records.len());
    let mut failed_entries = Vec::new();

    for record in records {
        let envelope: TransactionEnvelope = match serde_json::from_slice(&record.payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                failed_entries.push(failed_entry(record, e));
                continue;
            }
        };

        if let Err(e) = validator.validate(&envelope) {
            failed_entries.push(failed_entry(record, e));
            continue;
        }

        match Transaction::try_from(envelope) {
            Ok(transaction) => transactions.push(transaction),
            Err(e) => failed_entries.push(failed_entry(record, e)),
        }
    }

    (transactions, failed_entries)
}

fn failed_entry(record: &FetchedRecord, reason: impl std::fmt::Display) -> FailedEntry {
    FailedEntry {
        key: record.key.clone(),
        value: record.payload.clone(),
        reason: reason.to_string(),
    }
}

fn detach(message: &BorrowedMessage<'_>) -> FetchedRecord {
    FetchedRecord {
        key: String::from_utf8_lossy(message.key().unwrap_or_default()).into_owned(),
        payload: message.payload().unwrap_or_default().to_vec(),
        topic: message.topic().to_string(),
        partition: message.partition(),
        offset: message.offset(),
    }
}
