pub mod broker;
pub mod configuration;
pub mod error;
pub mod handlers;
pub mod model;
pub mod repository;
pub mod service;

pub mod proto {
    tonic::include_proto!("tx_manager");
}
