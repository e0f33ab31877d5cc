//! Validation failure model
//!
//! One request can violate several rules at once, so the validator reports a
//! [`MultiError`]: an ordered list of [`ValidationFailure`] causes. Each cause
//! is a tagged variant, which lets the classifier dispatch with a `match`
//! instead of probing for concrete error types.

use std::fmt;

/// Ordered aggregate of validation failures
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiError(pub Vec<ValidationFailure>);

impl MultiError {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, failure: impl Into<ValidationFailure>) {
        self.0.push(failure.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn causes(&self) -> &[ValidationFailure] {
        &self.0
    }

    /// Returns `Ok(())` when nothing was collected
    pub fn into_result(self) -> Result<(), MultiError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, cause) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            write!(f, "{}", cause)?;
        }
        Ok(())
    }
}

impl std::error::Error for MultiError {}

impl From<Vec<ValidationFailure>> for MultiError {
    fn from(causes: Vec<ValidationFailure>) -> Self {
        Self(causes)
    }
}

/// A single validation failure cause
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationFailure {
    /// No security requirement alternative was satisfied
    Security(SecurityRequirementsError),
    /// A parameter or the request body failed validation
    Request(RequestError),
    /// A leaf JSON Schema violation
    Schema(SchemaError),
    /// Anything else (unreadable body, internal inconsistencies)
    Other(String),
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationFailure::Security(e) => write!(f, "{}", e),
            ValidationFailure::Request(e) => write!(f, "{}", e),
            ValidationFailure::Schema(e) => write!(f, "{}", e),
            ValidationFailure::Other(msg) => f.write_str(msg),
        }
    }
}

impl From<SecurityRequirementsError> for ValidationFailure {
    fn from(err: SecurityRequirementsError) -> Self {
        ValidationFailure::Security(err)
    }
}

impl From<RequestError> for ValidationFailure {
    fn from(err: RequestError) -> Self {
        ValidationFailure::Request(err)
    }
}

impl From<SchemaError> for ValidationFailure {
    fn from(err: SchemaError) -> Self {
        ValidationFailure::Schema(err)
    }
}

/// Leaf schema violation: where in the instance, and why
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaError {
    /// Decoded JSON Pointer tokens locating the offending value
    pub segments: Vec<String>,
    /// Human-readable reason from the schema validator
    pub reason: String,
}

impl SchemaError {
    pub fn new(segments: Vec<String>, reason: impl Into<String>) -> Self {
        Self {
            segments,
            reason: reason.into(),
        }
    }

    /// Build from an RFC 6901 pointer string such as `/items/0/name`
    pub fn from_pointer(pointer: &str, reason: impl Into<String>) -> Self {
        Self::new(pointer_segments(pointer), reason)
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            f.write_str(&self.reason)
        } else {
            write!(f, "{} (at /{})", self.reason, self.segments.join("/"))
        }
    }
}

/// Split an RFC 6901 JSON Pointer into unescaped reference tokens
pub fn pointer_segments(pointer: &str) -> Vec<String> {
    if pointer.is_empty() {
        return Vec::new();
    }
    pointer
        .strip_prefix('/')
        .unwrap_or(pointer)
        .split('/')
        .map(|token| token.replace("~1", "/").replace("~0", "~"))
        .collect()
}

/// Where a request error was detected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestLocation {
    Body,
    Parameter { name: String, location: String },
}

/// What caused a request error, if anything beyond its reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestErrorSource {
    /// The value did not match its schema
    Schema(MultiError),
    /// The value could not be decoded
    Decode(String),
}

impl fmt::Display for RequestErrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestErrorSource::Schema(me) => write!(f, "{}", me),
            RequestErrorSource::Decode(msg) => f.write_str(msg),
        }
    }
}

/// Failure attached to one parameter or to the request body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestError {
    pub location: RequestLocation,
    pub reason: String,
    pub source: Option<RequestErrorSource>,
}

impl RequestError {
    pub fn body(reason: impl Into<String>) -> Self {
        Self {
            location: RequestLocation::Body,
            reason: reason.into(),
            source: None,
        }
    }

    pub fn parameter(
        name: impl Into<String>,
        location: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            location: RequestLocation::Parameter {
                name: name.into(),
                location: location.into(),
            },
            reason: reason.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: RequestErrorSource) -> Self {
        self.source = Some(source);
        self
    }

    /// The wrapped schema aggregate, when this error came from schema checks
    pub fn schema_errors(&self) -> Option<&MultiError> {
        match &self.source {
            Some(RequestErrorSource::Schema(me)) => Some(me),
            _ => None,
        }
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match &self.source {
            Some(source) => {
                let source = source.to_string();
                if self.reason.is_empty() || self.reason == source {
                    source
                } else {
                    format!("{}: {}", self.reason, source)
                }
            }
            None => self.reason.clone(),
        };
        match &self.location {
            RequestLocation::Body => write!(f, "request body has an error: {}", reason),
            RequestLocation::Parameter { name, location } => {
                write!(f, "parameter {:?} in {} has an error: {}", name, location, reason)
            }
        }
    }
}

/// None of the operation's security requirement alternatives was satisfied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityRequirementsError {
    /// One message per failed alternative, in declaration order
    pub errors: Vec<String>,
}

impl SecurityRequirementsError {
    pub fn new(errors: Vec<String>) -> Self {
        Self { errors }
    }
}

impl fmt::Display for SecurityRequirementsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "security requirements failed: {}", self.errors.join(" | "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointer_segments() {
        assert!(pointer_segments("").is_empty());
        assert_eq!(pointer_segments("/items/2/name"), vec!["items", "2", "name"]);
        assert_eq!(pointer_segments("/a~1b/c~0d"), vec!["a/b", "c~d"]);
        assert_eq!(pointer_segments("/"), vec![""]);
    }

    #[test]
    fn test_request_error_display_body() {
        let err = RequestError::body("failed to decode request body")
            .with_source(RequestErrorSource::Decode("EOF while parsing".to_string()));
        assert_eq!(
            err.to_string(),
            "request body has an error: failed to decode request body: EOF while parsing"
        );
    }

    #[test]
    fn test_request_error_display_parameter() {
        let err = RequestError::parameter("limit", "query", "value is required but missing");
        assert_eq!(
            err.to_string(),
            "parameter \"limit\" in query has an error: value is required but missing"
        );
    }

    #[test]
    fn test_request_error_empty_reason_uses_source() {
        let err = RequestError::body("")
            .with_source(RequestErrorSource::Decode("bad input".to_string()));
        assert_eq!(err.to_string(), "request body has an error: bad input");
    }

    #[test]
    fn test_multi_error_display_joins_causes() {
        let me = MultiError(vec![
            ValidationFailure::Other("first".to_string()),
            SecurityRequirementsError::new(vec!["authorization header is missing".to_string()])
                .into(),
        ]);
        assert_eq!(
            me.to_string(),
            "first | security requirements failed: authorization header is missing"
        );
    }

    #[test]
    fn test_schema_errors_accessor() {
        let inner = MultiError(vec![SchemaError::from_pointer("/name", "missing").into()]);
        let err = RequestError::body("doesn't match schema")
            .with_source(RequestErrorSource::Schema(inner.clone()));
        assert_eq!(err.schema_errors(), Some(&inner));
        assert!(RequestError::body("x").schema_errors().is_none());
    }

    #[test]
    fn test_into_result() {
        assert!(MultiError::new().into_result().is_ok());
        let mut me = MultiError::new();
        me.push(ValidationFailure::Other("x".to_string()));
        assert_eq!(me.into_result().unwrap_err().len(), 1);
    }
}
