use config::{Config, ConfigError, Environment};
use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct Settings {
    pub client: ClientSettings,
    pub http: HttpSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientSettings {
    /// host:port of the transaction manager gRPC endpoint.
    pub host: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpSettings {
    pub port: u16,
}

pub fn get_configuration() -> Result<Settings, ConfigError> {
    let client: ClientSettings = Config::builder()
        .add_source(Environment::with_prefix("TX_MANAGER").try_parsing(true))
        .build()?
        .try_deserialize()?;

    let http: HttpSettings = Config::builder()
        .add_source(Environment::with_prefix("HTTP").try_parsing(true))
        .build()?
        .try_deserialize()?;

    Ok(Settings { client, http })
}
