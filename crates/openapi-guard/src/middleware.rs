//! axum middleware running request validation before handlers
//!
//! The body is buffered (bounded by `max_body_bytes`), validated, and then
//! handed to the next service unchanged. Rejected requests never reach the
//! handler: routing failures become 404/405 and validation failures go
//! through the configured [`MultiErrorHandler`] and [`ErrorWriter`].

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::classify::{ErrorReply, FieldErrorClassifier, MultiErrorHandler};
use crate::document::OpenApiDocument;
use crate::error::Result;
use crate::failure::{MultiError, ValidationFailure};
use crate::response::{ErrorWriter, JsonErrorWriter};
use crate::router::RouteError;
use crate::security::{Authenticator, CredentialAuthenticator};
use crate::validate::{Rejection, RequestInput, RequestValidator};

/// Default request body limit (1 MiB)
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Pluggable pieces of the guard
#[derive(Clone)]
pub struct GuardOptions {
    pub multi_error_handler: Arc<dyn MultiErrorHandler>,
    pub error_writer: Arc<dyn ErrorWriter>,
    pub authenticator: Arc<dyn Authenticator>,
    pub max_body_bytes: usize,
}

impl Default for GuardOptions {
    fn default() -> Self {
        Self {
            multi_error_handler: Arc::new(FieldErrorClassifier),
            error_writer: Arc::new(JsonErrorWriter),
            authenticator: Arc::new(CredentialAuthenticator::new()),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl GuardOptions {
    pub fn with_authenticator(mut self, authenticator: impl Authenticator + 'static) -> Self {
        self.authenticator = Arc::new(authenticator);
        self
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }
}

/// Middleware state: the compiled validator plus its options
///
/// Install with `axum::middleware::from_fn_with_state(guard, validate_request)`.
#[derive(Clone)]
pub struct RequestGuard {
    validator: Arc<RequestValidator>,
    options: GuardOptions,
}

impl RequestGuard {
    pub fn new(validator: RequestValidator, options: GuardOptions) -> Self {
        Self {
            validator: Arc::new(validator),
            options,
        }
    }

    /// Compile `document` and wrap it with `options`
    pub fn from_document(document: &OpenApiDocument, options: GuardOptions) -> Result<Self> {
        Ok(Self::new(RequestValidator::new(document)?, options))
    }

    pub fn validator(&self) -> &RequestValidator {
        &self.validator
    }

    pub fn options(&self) -> &GuardOptions {
        &self.options
    }

    /// Turn a failed validation into the response sent to the client
    pub fn reject(&self, error: &MultiError) -> Response {
        let reply = self.options.multi_error_handler.handle(error);
        self.options.error_writer.write(&reply)
    }

    fn reject_route(&self, error: RouteError) -> Response {
        let status = match error {
            RouteError::NotFound => StatusCode::NOT_FOUND,
            RouteError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
        };
        self.options
            .error_writer
            .write(&ErrorReply::message(status, error.to_string()))
    }
}

/// Validate the request against the OpenAPI document, then call `next`
pub async fn validate_request(
    State(guard): State<RequestGuard>,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();

    let bytes = match to_bytes(body, guard.options.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::debug!(
                method = %parts.method,
                path = %parts.uri.path(),
                error = %e,
                "Failed to read request body"
            );
            let mut failures = MultiError::new();
            failures.push(ValidationFailure::Other(format!(
                "failed to read request body: {}",
                e
            )));
            return guard.reject(&failures);
        }
    };

    let input = RequestInput {
        method: &parts.method,
        uri: &parts.uri,
        headers: &parts.headers,
        body: &bytes,
    };

    match guard
        .validator
        .validate(&input, guard.options.authenticator.as_ref())
    {
        Ok(()) => next.run(Request::from_parts(parts, Body::from(bytes))).await,
        Err(Rejection::Route(error)) => {
            tracing::debug!(
                method = %parts.method,
                path = %parts.uri.path(),
                error = %error,
                "No matching operation"
            );
            guard.reject_route(error)
        }
        Err(Rejection::Invalid(failures)) => {
            tracing::debug!(
                method = %parts.method,
                path = %parts.uri.path(),
                causes = failures.len(),
                error = %failures,
                "Request rejected"
            );
            guard.reject(&failures)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{ErrorBody, MessageResponse};
    use axum::{
        body::to_bytes,
        http::{header, Request as HttpRequest},
        middleware::from_fn_with_state,
        routing::post,
        Router,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    const DOC: &str = r#"
openapi: 3.0.3
info: {title: Guarded, version: '1'}
paths:
  /items:
    post:
      security:
        - bearerAuth: []
      requestBody:
        required: true
        content:
          application/json:
            schema:
              type: object
              required: [name]
              properties:
                name: {type: string}
      responses:
        '204': {description: ok}
components:
  securitySchemes:
    bearerAuth: {type: http, scheme: bearer}
"#;

    fn app(options: GuardOptions) -> Router {
        let doc = OpenApiDocument::from_yaml_str(DOC).unwrap();
        let guard = RequestGuard::from_document(&doc, options).unwrap();
        Router::new()
            .route(
                "/items",
                post(|body: String| async move {
                    assert!(body.contains("name"));
                    StatusCode::NO_CONTENT
                }),
            )
            .layer(from_fn_with_state(guard, validate_request))
    }

    fn request(method: &str, uri: &str, auth: bool, body: &'static str) -> HttpRequest<Body> {
        let mut builder = HttpRequest::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if auth {
            builder = builder.header(header::AUTHORIZATION, "Bearer token");
        }
        builder.body(Body::from(body)).unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_valid_request_reaches_handler_with_body() {
        let response = app(GuardOptions::default())
            .oneshot(request("POST", "/items", true, r#"{"name":"x"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_schema_failure_is_field_error() {
        let response = app(GuardOptions::default())
            .oneshot(request("POST", "/items", true, "{}"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json; charset=utf-8"
        );
        let body = json_body(response).await;
        assert_eq!(body["message"], "validation error");
        assert_eq!(body["errors"][0]["field"], "name");
    }

    #[tokio::test]
    async fn test_missing_auth_is_unauthorized() {
        let response = app(GuardOptions::default())
            .oneshot(request("POST", "/items", false, r#"{"name":"x"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = json_body(response).await;
        assert_eq!(
            body["message"],
            "security requirements failed: authorization header is missing"
        );
    }

    #[tokio::test]
    async fn test_unauthorized_message_joins_every_cause() {
        let response = app(GuardOptions::default())
            .oneshot(request("POST", "/items", false, "{}"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = json_body(response).await;
        assert!(body.get("errors").is_none());
        assert_eq!(
            body["message"],
            "request body has an error: doesn't match schema: \"name\" is a required property (at /name) \
             | security requirements failed: authorization header is missing"
        );
    }

    #[tokio::test]
    async fn test_route_failures() {
        let response = app(GuardOptions::default())
            .oneshot(request("POST", "/nowhere", true, "{}"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            json_body(response).await["message"],
            "no matching operation was found"
        );

        let response = app(GuardOptions::default())
            .oneshot(request("GET", "/items", true, ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_body_limit() {
        let options = GuardOptions::default().with_max_body_bytes(4);
        let response = app(options)
            .oneshot(request("POST", "/items", true, r#"{"name":"toolong"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["message"]
            .as_str()
            .unwrap()
            .starts_with("failed to read request body"));
    }

    struct TeapotHandler;

    impl MultiErrorHandler for TeapotHandler {
        fn handle(&self, error: &MultiError) -> ErrorReply {
            ErrorReply {
                status: StatusCode::IM_A_TEAPOT,
                body: ErrorBody::Message(MessageResponse::new(format!("{} causes", error.len()))),
            }
        }
    }

    #[tokio::test]
    async fn test_custom_handler_is_used() {
        let options = GuardOptions {
            multi_error_handler: Arc::new(TeapotHandler),
            ..GuardOptions::default()
        };
        let response = app(options)
            .oneshot(request("POST", "/items", false, "{}"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
        assert_eq!(json_body(response).await["message"], "2 causes");
    }

    #[tokio::test]
    async fn test_token_allow_list() {
        let options =
            GuardOptions::default().with_authenticator(CredentialAuthenticator::with_tokens(["other"]));
        let response = app(options)
            .oneshot(request("POST", "/items", true, r#"{"name":"x"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            json_body(response).await["message"],
            "security requirements failed: invalid bearer token"
        );
    }
}
