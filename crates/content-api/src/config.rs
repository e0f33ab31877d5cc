//! Command line and environment configuration

use clap::{Args, Parser, Subcommand, ValueEnum};
use openapi_guard::{CredentialAuthenticator, GuardOptions, OpenApiDocument, DEFAULT_MAX_BODY_BYTES};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// OpenAPI document compiled into the binary, used when `--spec` is absent
pub const BUNDLED_SPEC: &str = include_str!("../api/openapi.yaml");

#[derive(Parser, Debug)]
#[command(name = "content-api")]
#[command(about = "Content API - OpenAPI-validated content ingestion")]
#[command(version)]
pub struct Cli {
    /// Log output format
    #[arg(long, global = true, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP server
    Serve(ServeArgs),

    /// Load and compile an OpenAPI document, then print its operations
    Check {
        /// Path to the OpenAPI document (JSON/YAML)
        #[arg(short, long, env = "OPENAPI_SPEC")]
        spec: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Host to bind to
    #[arg(long, default_value = "0.0.0.0", env = "HOST")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "8080", env = "PORT")]
    pub port: u16,

    /// Path to the OpenAPI document (JSON/YAML); the bundled one is used if unset
    #[arg(short, long, env = "OPENAPI_SPEC")]
    pub spec: Option<PathBuf>,

    /// Maximum request body size in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_BODY_BYTES, env = "MAX_BODY_BYTES")]
    pub max_body_bytes: usize,

    /// Accepted bearer tokens / API keys; any non-empty credential passes if none are given
    #[arg(long = "api-token", env = "API_TOKENS", value_delimiter = ',')]
    pub api_tokens: Vec<String>,
}

impl ServeArgs {
    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }

    pub fn guard_options(&self) -> GuardOptions {
        GuardOptions::default()
            .with_authenticator(CredentialAuthenticator::with_tokens(self.api_tokens.clone()))
            .with_max_body_bytes(self.max_body_bytes)
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Load the document at `spec`, or the bundled one
pub fn load_document(spec: Option<&Path>) -> openapi_guard::Result<OpenApiDocument> {
    match spec {
        Some(path) => OpenApiDocument::from_path(path),
        None => OpenApiDocument::from_yaml_str(BUNDLED_SPEC),
    }
}
