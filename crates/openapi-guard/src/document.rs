//! OpenAPI document loading
//!
//! Documents are parsed with `openapiv3` (OpenAPI 3.0.x). `servers` is
//! cleared on load so that routing only ever looks at the request path.

use openapiv3::OpenAPI;
use std::path::Path;

use crate::error::Result;

/// A parsed OpenAPI document
#[derive(Debug, Clone)]
pub struct OpenApiDocument {
    api: OpenAPI,
}

impl OpenApiDocument {
    /// Parse a YAML document
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let api: OpenAPI = serde_yaml::from_str(content)?;
        Ok(Self::from_api(api))
    }

    /// Parse a JSON document
    pub fn from_json_str(content: &str) -> Result<Self> {
        let api: OpenAPI = serde_json::from_str(content)?;
        Ok(Self::from_api(api))
    }

    /// Load a document from disk. `.json` files are parsed as JSON,
    /// everything else as YAML.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        tracing::debug!(path = %path.display(), json = is_json, "Loading OpenAPI document");

        if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_yaml_str(&content)
        }
    }

    /// Wrap an already-parsed document
    pub fn from_api(mut api: OpenAPI) -> Self {
        api.servers.clear();
        Self { api }
    }

    pub fn api(&self) -> &OpenAPI {
        &self.api
    }

    pub fn title(&self) -> &str {
        &self.api.info.title
    }

    pub fn version(&self) -> &str {
        &self.api.info.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GuardError;
    use std::io::Write;

    const MINIMAL_YAML: &str = r#"
openapi: 3.0.3
info:
  title: Minimal
  version: 1.2.3
servers:
  - url: https://api.example.com/v1
paths:
  /ping:
    get:
      responses:
        '200':
          description: ok
"#;

    #[test]
    fn test_from_yaml_clears_servers() {
        let doc = OpenApiDocument::from_yaml_str(MINIMAL_YAML).unwrap();
        assert_eq!(doc.title(), "Minimal");
        assert_eq!(doc.version(), "1.2.3");
        assert!(doc.api().servers.is_empty());
    }

    #[test]
    fn test_from_json() {
        let json = r#"{
            "openapi": "3.0.3",
            "info": {"title": "J", "version": "0.1.0"},
            "paths": {}
        }"#;
        let doc = OpenApiDocument::from_json_str(json).unwrap();
        assert_eq!(doc.title(), "J");
    }

    #[test]
    fn test_invalid_yaml_is_parse_error() {
        let err = OpenApiDocument::from_yaml_str("openapi: [").unwrap_err();
        assert!(matches!(err, GuardError::ParseError(_)));
    }

    #[test]
    fn test_from_path_by_extension() {
        let mut yaml = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        yaml.write_all(MINIMAL_YAML.as_bytes()).unwrap();
        let doc = OpenApiDocument::from_path(yaml.path()).unwrap();
        assert_eq!(doc.title(), "Minimal");

        let mut json = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        json.write_all(br#"{"openapi":"3.0.3","info":{"title":"FromJson","version":"1"},"paths":{}}"#)
            .unwrap();
        let doc = OpenApiDocument::from_path(json.path()).unwrap();
        assert_eq!(doc.title(), "FromJson");
    }

    #[test]
    fn test_missing_file_is_file_error() {
        let err = OpenApiDocument::from_path("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, GuardError::FileError(_)));
    }
}
