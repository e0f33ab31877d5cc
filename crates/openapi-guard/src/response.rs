//! JSON response writing
//!
//! Serialisation is best-effort: if the body cannot be encoded the failure is
//! logged and the response goes out with an empty body and the intended
//! status, rather than turning into a 500.

use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::Response,
};
use serde::Serialize;

use crate::classify::{ErrorBody, ErrorReply};

/// Content type sent with every error body
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Serialise `body` and build a response with the given status
pub fn write_json<T: Serialize + ?Sized>(status: StatusCode, body: &T) -> Response {
    let bytes = match serde_json::to_vec(body) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(status = %status, error = %e, "Failed to serialize response body");
            Vec::new()
        }
    };

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(JSON_CONTENT_TYPE),
    );
    response
}

/// Strategy writing an error reply to the wire
pub trait ErrorWriter: Send + Sync {
    fn write(&self, reply: &ErrorReply) -> Response;
}

/// Default writer: JSON body, `application/json; charset=utf-8`
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonErrorWriter;

impl ErrorWriter for JsonErrorWriter {
    fn write(&self, reply: &ErrorReply) -> Response {
        match &reply.body {
            ErrorBody::Validation(body) => write_json(reply.status, body),
            ErrorBody::Message(body) => write_json(reply.status, body),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::MessageResponse;
    use crate::extract::FieldError;
    use serde::ser::Error as _;

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: serde::Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(S::Error::custom("refusing to serialize"))
        }
    }

    #[tokio::test]
    async fn test_write_json_sets_status_and_content_type() {
        let response = write_json(StatusCode::UNAUTHORIZED, &MessageResponse::new("denied"));
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json; charset=utf-8"
        );
        assert_eq!(body_string(response).await, r#"{"message":"denied"}"#);
    }

    #[tokio::test]
    async fn test_serialization_failure_sends_empty_body() {
        let response = write_json(StatusCode::BAD_REQUEST, &Unserializable);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            JSON_CONTENT_TYPE
        );
        assert_eq!(body_string(response).await, "");
    }

    #[tokio::test]
    async fn test_json_error_writer_validation_body() {
        let reply = ErrorReply::validation(vec![FieldError::new("name", "missing")]);
        let response = JsonErrorWriter.write(&reply);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_string(response).await,
            r#"{"message":"validation error","errors":[{"field":"name","error":"missing"}]}"#
        );
    }
}
