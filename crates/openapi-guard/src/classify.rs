//! Error classification
//!
//! Decides the status code and body shape for a failed request. The checks
//! run in a fixed order:
//!
//! 1. any security cause                      -> 401, message only
//! 2. first request error wrapping schema errors -> 400, per-field errors
//! 3. anything else                           -> 400, message only

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::extract::{extract_field_errors, FieldError};
use crate::failure::{MultiError, ValidationFailure};

/// Fixed message used for schema validation failures
pub const VALIDATION_ERROR_MESSAGE: &str = "validation error";

/// Message-only error body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Body returned when schema validation produced field-level detail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrorResponse {
    pub message: String,
    pub errors: Vec<FieldError>,
}

impl ValidationErrorResponse {
    pub fn new(errors: Vec<FieldError>) -> Self {
        Self {
            message: VALIDATION_ERROR_MESSAGE.to_string(),
            errors,
        }
    }
}

/// Either of the two error body shapes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorBody {
    Validation(ValidationErrorResponse),
    Message(MessageResponse),
}

/// Classification outcome: status plus body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReply {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ErrorReply {
    pub fn message(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody::Message(MessageResponse::new(message)),
        }
    }

    pub fn validation(errors: Vec<FieldError>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorBody::Validation(ValidationErrorResponse::new(errors)),
        }
    }
}

/// Strategy turning an aggregate validation failure into a reply
pub trait MultiErrorHandler: Send + Sync {
    fn handle(&self, error: &MultiError) -> ErrorReply;
}

/// Default classifier producing field-level validation errors
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldErrorClassifier;

impl MultiErrorHandler for FieldErrorClassifier {
    fn handle(&self, error: &MultiError) -> ErrorReply {
        classify(error)
    }
}

/// Classify an aggregate failure. Pure; the same input always yields the
/// same reply.
pub fn classify(error: &MultiError) -> ErrorReply {
    let causes = error.causes();

    if causes
        .iter()
        .any(|cause| matches!(cause, ValidationFailure::Security(_)))
    {
        return ErrorReply::message(StatusCode::UNAUTHORIZED, error.to_string());
    }

    let request_error = causes.iter().find_map(|cause| match cause {
        ValidationFailure::Request(e) => Some(e),
        _ => None,
    });

    match request_error.and_then(|e| e.schema_errors()) {
        Some(schema_errors) => ErrorReply::validation(extract_field_errors(schema_errors.causes())),
        None => ErrorReply::message(StatusCode::BAD_REQUEST, error.to_string()),
    }
}
