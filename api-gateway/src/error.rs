use actix_web::http::StatusCode;
use thiserror::Error;
use tonic::Status;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad field: {0}")]
    BadField(String),

    #[error("upstream call failed: {0}")]
    Upstream(#[source] Status),

    #[error("malformed upstream response: {0}")]
    BadResponse(String),
}

/// HTTP mapping for the error taxonomy. Anything that is not NotFound or
/// BadField turns into a 500 with an empty message; the cause only ever goes
/// to the server logs.
pub fn status_and_message(err: &GatewayError) -> (StatusCode, String) {
    match err {
        GatewayError::NotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        GatewayError::BadField(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, String::new()),
    }
}

#[cfg(test)]
mod tests {
    use tonic::Code;

    use super::*;

    #[test]
    fn not_found_maps_to_404_with_its_message() {
        let (status, message) = status_and_message(&GatewayError::NotFound("gone".into()));

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(message, "not found: gone");
    }

    #[test]
    fn bad_field_maps_to_400_with_its_message() {
        let (status, message) = status_and_message(&GatewayError::BadField("limit".into()));

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(message, "bad field: limit");
    }

    #[test]
    fn everything_else_maps_to_500_with_no_detail() {
        let upstream = GatewayError::Upstream(Status::new(Code::Internal, "secret detail"));
        let (status, message) = status_and_message(&upstream);

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(message.is_empty());

        let bad = GatewayError::BadResponse("broken".into());
        let (status, message) = status_and_message(&bad);

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(message.is_empty());
    }
}
