mod transactions;

use actix_web::{get, HttpResponse, Responder};

pub use transactions::{get_transaction_by_id, get_transactions};

#[get("/ping")]
pub async fn healthcheck() -> impl Responder {
    HttpResponse::Ok().finish()
}
