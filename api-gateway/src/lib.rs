use std::net::TcpListener;
use std::sync::Arc;

use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};

pub mod client;
pub mod configuration;
pub mod entities;
pub mod error;
pub mod middleware;
pub mod routes;

pub mod proto {
    tonic::include_proto!("tx_manager");
}

use client::TxManager;

pub fn run(listener: TcpListener, client: Arc<dyn TxManager>) -> Result<Server, std::io::Error> {
    let client = web::Data::from(client);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(middleware::Recovery)
            .app_data(client.clone())
            .service(routes::get_transaction_by_id)
            .service(routes::get_transactions)
            .service(routes::healthcheck)
    })
    .listen(listener)?
    .run();

    Ok(server)
}
