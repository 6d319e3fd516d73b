use async_trait::async_trait;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::ClientConfig;

use crate::broker::consumer::DlqProducer;
use crate::broker::{BrokerError, FailedEntry};
use crate::configuration::BrokerSettings;

/// Publishes rejected records to the dead-letter topic. Delivery is
/// best-effort: entries are enqueued into the producer and their delivery
/// results are only ever logged.
pub struct DlqClient {
    producer: FutureProducer,
    topic: String,
}

impl DlqClient {
    pub fn new(settings: &BrokerSettings) -> Result<Self, BrokerError> {
        if settings.producer.topic.is_empty() {
            return Err(BrokerError::EmptyDlqTopic);
        }

        let producer: FutureProducer = ClientConfig::new()
            .set(
                "bootstrap.servers",
                format!("{}:{}", settings.host, settings.port),
            )
            .create()?;

        Ok(Self {
            producer,
            topic: settings.producer.topic.clone(),
        })
    }
}

#[async_trait]
impl DlqProducer for DlqClient {
    async fn produce(&self, entries: Vec<FailedEntry>) {
        for entry in entries {
            let payload = match serde_json::to_vec(&entry) {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::error!(error = %e, key = %entry.key, "failed to serialize DLQ entry");
                    continue;
                }
            };

            let record = FutureRecord::to(&self.topic)
                .key(&entry.key)
                .payload(&payload);

            match self.producer.send_result(record) {
                Ok(delivery) => {
                    let key = entry.key;
                    tokio::spawn(async move {
                        match delivery.await {
                            Ok(Ok(_)) => {}
                            Ok(Err((e, _))) => {
                                tracing::error!(error = %e, key = %key, "DLQ delivery failed");
                            }
                            Err(_) => {
                                tracing::warn!(key = %key, "DLQ delivery result was dropped");
                            }
                        }
                    });
                }
                Err((e, _)) => {
                    tracing::error!(error = %e, key = %entry.key, "failed to enqueue DLQ entry");
                }
            }
        }
    }
}
