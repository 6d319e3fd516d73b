use config::{Config, ConfigError, Environment};
use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct Settings {
    pub broker: BrokerSettings,
    pub database: DatabaseSettings,
    pub grpc: GrpcSettings,
}

#[derive(Debug, Clone)]
pub struct BrokerSettings {
    pub host: String,
    pub port: u16,
    pub consumer: ConsumerSettings,
    pub producer: ProducerSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConsumerSettings {
    pub topic: String,
    pub group: String,
    pub max_records_fetched: usize,
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProducerSettings {
    pub topic: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub name: String,
    pub ssl_mode: String,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            self.username, self.password, self.host, self.port, self.name, self.ssl_mode
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GrpcSettings {
    pub port: u16,
}

// Broker host/port live directly under the BROKER_ prefix, next to the
// BROKER_CONSUMER_/BROKER_PRODUCER_ subsections which are parsed separately.
#[derive(Debug, Deserialize)]
struct BrokerEndpoint {
    host: String,
    port: u16,
}

pub fn get_configuration() -> Result<Settings, ConfigError> {
    let endpoint: BrokerEndpoint = Config::builder()
        .set_default("port", 9092)?
        .add_source(Environment::with_prefix("BROKER").try_parsing(true))
        .build()?
        .try_deserialize()?;

    let consumer: ConsumerSettings = Config::builder()
        .add_source(Environment::with_prefix("BROKER_CONSUMER").try_parsing(true))
        .build()?
        .try_deserialize()?;

    let producer: ProducerSettings = Config::builder()
        .add_source(Environment::with_prefix("BROKER_PRODUCER").try_parsing(true))
        .build()?
        .try_deserialize()?;

    let database: DatabaseSettings = Config::builder()
        .set_default("port", 5432)?
        .set_default("ssl_mode", "disable")?
        .add_source(Environment::with_prefix("DATABASE").try_parsing(true))
        .build()?
        .try_deserialize()?;

    let grpc: GrpcSettings = Config::builder()
        .add_source(Environment::with_prefix("GRPC").try_parsing(true))
        .build()?
        .try_deserialize()?;

    Ok(Settings {
        broker: BrokerSettings {
            host: endpoint.host,
            port: endpoint.port,
            consumer,
            producer,
        },
        database,
        grpc,
    })
}
