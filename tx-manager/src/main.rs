use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::subscriber::set_global_default;
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_log::LogTracer;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

use tx_manager::broker::consumer;
use tx_manager::broker::dlq::DlqClient;
use tx_manager::broker::SchemaValidator;
use tx_manager::configuration::get_configuration;
use tx_manager::handlers::Handler;
use tx_manager::proto::transaction_manager_server::TransactionManagerServer;
use tx_manager::repository::TransactionRepository;
use tx_manager::service::Service;

#[tokio::main]
async fn main() {
    init_telemetry();

    let configuration = get_configuration().expect("Failed to read configuration.");

    let repository = TransactionRepository::connect(&configuration.database)
        .await
        .expect("Failed to connect to the database.");
    let tx_svc = Service::new(repository.clone());

    let dlq_producer =
        DlqClient::new(&configuration.broker).expect("Failed to initialize DLQ producer.");
    let broker = consumer::Client::new(
        &configuration.broker,
        tx_svc.clone(),
        SchemaValidator,
        dlq_producer,
    )
    .expect("Failed to initialize broker consumer.");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_termination().await;
        let _ = shutdown_tx.send(true);
    });

    let consumer_task = tokio::spawn(broker.consume(shutdown_rx.clone()));

    let address = format!("0.0.0.0:{}", configuration.grpc.port)
        .parse()
        .expect("Failed to parse gRPC address.");

    let mut server_shutdown = shutdown_rx;
    tonic::transport::Server::builder()
        .add_service(TransactionManagerServer::new(Handler::new(tx_svc)))
        .serve_with_shutdown(address, async move {
            let _ = server_shutdown.changed().await;
        })
        .await
        .expect("gRPC server failed.");

    if let Err(e) = consumer_task.await {
        tracing::error!(error = %e, "consumer task aborted");
    }

    repository.close().await;
}

async fn wait_for_termination() {
    let mut sigterm = signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler.");

    tokio::select! {
        _ = sigterm.recv() => {}
        _ = tokio::signal::ctrl_c() => {}
    }
}

/// Bunyan-formatted JSON spans on stdout. The ingest loop and query spans
/// ("Inserting transactions batch", "Fetching transactions by filters") carry
/// their fields through the JSON storage layer; librdkafka is muted to warn
/// because its log bridge is chatty at info.
fn init_telemetry() {
    LogTracer::init().expect("Failed to set logger.");

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,librdkafka=warn,rdkafka=warn"));

    let subscriber = Registry::default()
        .with(env_filter)
        .with(JsonStorageLayer)
        .with(BunyanFormattingLayer::new("tx-manager".into(), std::io::stdout));

    set_global_default(subscriber).expect("Failed to set subscriber");
}
