//! OpenAPI 3.0 request validation for axum services.
//!
//! Requests are checked against the operation they route to in an OpenAPI
//! document before any handler runs. Failures are classified into
//! client-facing JSON replies; schema violations become a list of
//! field-level errors.
//!
//! # Response shapes
//!
//! ```text
//! 401  {"message": "security requirements failed: ..."}
//! 400  {"message": "validation error", "errors": [{"field": "items[1].name", "error": "..."}]}
//! 400  {"message": "request body has an error: ..."}
//! ```
//!
//! # Usage
//!
//! 1. Load the document with `OpenApiDocument::from_path` (or `from_yaml_str`).
//! 2. Build a `RequestGuard` from it with `GuardOptions`.
//! 3. Install `validate_request` via `axum::middleware::from_fn_with_state`.

pub mod classify;
pub mod document;
pub mod error;
pub mod extract;
pub mod failure;
pub mod middleware;
pub mod path;
pub mod response;
pub mod router;
pub mod schema;
pub mod security;
pub mod validate;

pub use classify::{
    classify, ErrorBody, ErrorReply, FieldErrorClassifier, MessageResponse, MultiErrorHandler,
    ValidationErrorResponse, VALIDATION_ERROR_MESSAGE,
};
pub use document::OpenApiDocument;
pub use error::{GuardError, Result};
pub use extract::{extract_field_errors, FieldError};
pub use failure::{
    MultiError, RequestError, RequestErrorSource, RequestLocation, SchemaError,
    SecurityRequirementsError, ValidationFailure,
};
pub use middleware::{validate_request, GuardOptions, RequestGuard, DEFAULT_MAX_BODY_BYTES};
pub use path::to_field_path;
pub use response::{write_json, ErrorWriter, JsonErrorWriter, JSON_CONTENT_TYPE};
pub use router::RouteError;
pub use security::{Authenticator, AuthenticationInput, CredentialAuthenticator, SchemeKind};
pub use validate::{OperationSummary, Rejection, RequestInput, RequestValidator};
