//! Error types for loading and compiling OpenAPI documents
//!
//! These errors surface at startup. Per-request validation failures are not
//! errors in this sense; they live in [`crate::failure`].

use thiserror::Error;

/// Main error type for document loading and validator compilation
#[derive(Error, Debug)]
pub enum GuardError {
    /// Document could not be read from disk
    #[error("File error: {0}")]
    FileError(String),

    /// Document could not be parsed as OpenAPI 3.0
    #[error("Parse error: {0}")]
    ParseError(String),

    /// A schema in the document could not be compiled
    #[error("Schema error at {location}: {reason}")]
    SchemaError { location: String, reason: String },

    /// The document uses a construct the validator cannot handle
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl GuardError {
    /// Create a schema compilation error
    pub fn schema_error(location: impl Into<String>, reason: impl Into<String>) -> Self {
        GuardError::SchemaError {
            location: location.into(),
            reason: reason.into(),
        }
    }

    /// Create an unsupported-construct error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        GuardError::Unsupported(msg.into())
    }
}

impl From<std::io::Error> for GuardError {
    fn from(err: std::io::Error) -> Self {
        GuardError::FileError(err.to_string())
    }
}

impl From<serde_json::Error> for GuardError {
    fn from(err: serde_json::Error) -> Self {
        GuardError::ParseError(format!("JSON error: {}", err))
    }
}

impl From<serde_yaml::Error> for GuardError {
    fn from(err: serde_yaml::Error) -> Self {
        GuardError::ParseError(format!("YAML error: {}", err))
    }
}

/// Result type alias for guard operations
pub type Result<T> = std::result::Result<T, GuardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GuardError::schema_error("POST /content body", "invalid type");
        assert_eq!(
            err.to_string(),
            "Schema error at POST /content body: invalid type"
        );
    }

    #[test]
    fn test_from_yaml_error() {
        let yaml_err = serde_yaml::from_str::<serde_json::Value>("a: [").unwrap_err();
        let err: GuardError = yaml_err.into();
        assert!(matches!(err, GuardError::ParseError(_)));
        assert!(err.to_string().starts_with("Parse error: YAML error"));
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: GuardError = io.into();
        assert!(matches!(err, GuardError::FileError(_)));
    }
}
