//! Content API
//!
//! Small HTTP service whose requests are validated against a bundled OpenAPI
//! document by `openapi-guard` before reaching any handler.
//!
//! # Routes
//! - POST /content - Submit new content (bearer auth)
//! - GET /health - Health check

pub mod config;
pub mod handler;
pub mod telemetry;

pub use config::{load_document, Cli, Commands, LogFormat, ServeArgs, BUNDLED_SPEC};
pub use handler::create_router;
