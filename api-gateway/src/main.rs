use std::net::TcpListener;
use std::sync::Arc;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use api_gateway::client::TxManagerClient;
use api_gateway::configuration::get_configuration;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "api_gateway=info,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let configuration = get_configuration().expect("Failed to read configuration.");

    let client = TxManagerClient::connect(&configuration.client)
        .expect("Failed to create transaction manager client.");

    let address = format!("0.0.0.0:{}", configuration.http.port);
    let listener = TcpListener::bind(address)?;

    let server = api_gateway::run(listener, Arc::new(client))?;
    server.await
}
