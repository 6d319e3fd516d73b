use std::future::{ready, Ready};
use std::panic::AssertUnwindSafe;
use std::rc::Rc;

use actix_web::body::{BoxBody, MessageBody};
use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::{Error, HttpResponse};
use futures::future::LocalBoxFuture;
use futures::FutureExt;

/// Converts handler panics into plain 500 responses instead of dropped
/// connections; the panic payload only ever reaches the server logs.
pub struct Recovery;

impl<S, B> Transform<S, ServiceRequest> for Recovery
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Transform = RecoveryMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RecoveryMiddleware {
            service: Rc::new(service),
        }))
    }
}

pub struct RecoveryMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for RecoveryMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);

        Box::pin(async move {
            let (request, payload) = req.into_parts();
            let req = ServiceRequest::from_parts(request.clone(), payload);

            match AssertUnwindSafe(service.call(req)).catch_unwind().await {
                Ok(response) => response.map(ServiceResponse::map_into_boxed_body),
                Err(panic) => {
                    tracing::error!(
                        panic = panic_message(&panic),
                        path = %request.path(),
                        "recovered from panic in handler"
                    );

                    let response = HttpResponse::InternalServerError()
                        .json(serde_json::json!({ "error": "internal server error" }));

                    Ok(ServiceResponse::new(request, response))
                }
            }
        })
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
