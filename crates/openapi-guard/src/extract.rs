//! Field error extraction
//!
//! Flattens the schema-level causes of an aggregate into the `(field, error)`
//! pairs that API consumers see. Causes of any other kind are skipped, not
//! reported.

use serde::{Deserialize, Serialize};

use crate::failure::ValidationFailure;
use crate::path::to_field_path;

/// One field-level validation error as returned to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Dotted/bracketed path to the offending field, e.g. `items[2].name`
    pub field: String,
    /// Reason reported by the schema validator
    pub error: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            error: error.into(),
        }
    }
}

/// Convert every schema cause into a [`FieldError`], preserving order
pub fn extract_field_errors(causes: &[ValidationFailure]) -> Vec<FieldError> {
    causes
        .iter()
        .filter_map(|cause| match cause {
            ValidationFailure::Schema(e) => Some(FieldError {
                field: to_field_path(&e.segments),
                error: e.reason.clone(),
            }),
            _ => None,
        })
        .collect()
}
