//! Security requirement evaluation
//!
//! An operation's security is a list of alternatives; each alternative names
//! one or more schemes that must all pass. The request is authorised when any
//! alternative passes, and an empty list means anonymous access.
//!
//! Whether a credential is *good* is decided by an [`Authenticator`]. The
//! default [`CredentialAuthenticator`] checks presence, and optionally an
//! allow-list of tokens.

use axum::http::{header, HeaderMap};
use cookie::Cookie;
use openapiv3::{APIKeyLocation, SecurityScheme};
use std::collections::HashSet;
use std::fmt;

use crate::failure::SecurityRequirementsError;

/// Where an API key is carried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiKeyIn {
    Header,
    Query,
    Cookie,
}

impl fmt::Display for ApiKeyIn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiKeyIn::Header => f.write_str("header"),
            ApiKeyIn::Query => f.write_str("query"),
            ApiKeyIn::Cookie => f.write_str("cookie"),
        }
    }
}

/// Security scheme reduced to what request checks need
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemeKind {
    ApiKey { name: String, location: ApiKeyIn },
    Http { scheme: String },
    OAuth2,
    OpenIdConnect,
}

impl From<&SecurityScheme> for SchemeKind {
    fn from(scheme: &SecurityScheme) -> Self {
        match scheme {
            SecurityScheme::APIKey { location, name, .. } => SchemeKind::ApiKey {
                name: name.clone(),
                location: match location {
                    APIKeyLocation::Query => ApiKeyIn::Query,
                    APIKeyLocation::Header => ApiKeyIn::Header,
                    APIKeyLocation::Cookie => ApiKeyIn::Cookie,
                },
            },
            SecurityScheme::HTTP { scheme, .. } => SchemeKind::Http {
                scheme: scheme.to_ascii_lowercase(),
            },
            SecurityScheme::OAuth2 { .. } => SchemeKind::OAuth2,
            SecurityScheme::OpenIDConnect { .. } => SchemeKind::OpenIdConnect,
        }
    }
}

/// One scheme reference inside a requirement alternative
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemeRequirement {
    pub name: String,
    pub kind: SchemeKind,
    pub scopes: Vec<String>,
}

/// All schemes of one alternative must pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityRequirement {
    pub schemes: Vec<SchemeRequirement>,
}

/// Request data an authenticator can inspect
#[derive(Debug, Clone, Copy)]
pub struct AuthenticationInput<'a> {
    pub scheme_name: &'a str,
    pub scheme: &'a SchemeKind,
    pub scopes: &'a [String],
    pub headers: &'a HeaderMap,
    pub query: &'a [(String, String)],
    pub cookies: &'a [(String, String)],
}

/// Strategy deciding whether a request satisfies a single security scheme
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, input: &AuthenticationInput<'_>) -> Result<(), String>;
}

/// Presence-based authenticator with an optional token allow-list
///
/// Bearer tokens and API keys are checked against `allowed_tokens` when it is
/// non-empty; otherwise any non-empty credential passes.
#[derive(Debug, Clone, Default)]
pub struct CredentialAuthenticator {
    allowed_tokens: HashSet<String>,
}

impl CredentialAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_tokens: tokens
                .into_iter()
                .map(Into::into)
                .filter(|t: &String| !t.is_empty())
                .collect(),
        }
    }

    fn token_allowed(&self, token: &str) -> bool {
        self.allowed_tokens.is_empty() || self.allowed_tokens.contains(token)
    }
}

impl Authenticator for CredentialAuthenticator {
    fn authenticate(&self, input: &AuthenticationInput<'_>) -> Result<(), String> {
        match input.scheme {
            SchemeKind::Http { scheme } if scheme == "bearer" => {
                let value = authorization(input.headers)
                    .ok_or_else(|| "authorization header is missing".to_string())?;
                let token = strip_scheme(value, "bearer")
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| "authorization header is not bearer".to_string())?;
                if self.token_allowed(token) {
                    Ok(())
                } else {
                    Err("invalid bearer token".to_string())
                }
            }
            SchemeKind::Http { scheme } if scheme == "basic" => {
                let value = authorization(input.headers)
                    .ok_or_else(|| "authorization header is missing".to_string())?;
                strip_scheme(value, "basic")
                    .filter(|t| !t.is_empty())
                    .map(|_| ())
                    .ok_or_else(|| "authorization header is not basic".to_string())
            }
            SchemeKind::Http { .. } | SchemeKind::OAuth2 | SchemeKind::OpenIdConnect => {
                authorization(input.headers)
                    .map(|_| ())
                    .ok_or_else(|| "authorization header is missing".to_string())
            }
            SchemeKind::ApiKey { name, location } => {
                let value = match location {
                    ApiKeyIn::Header => input
                        .headers
                        .get(name.as_str())
                        .and_then(|v| v.to_str().ok()),
                    ApiKeyIn::Query => lookup(input.query, name),
                    ApiKeyIn::Cookie => lookup(input.cookies, name),
                }
                .filter(|v| !v.is_empty())
                .ok_or_else(|| format!("api key {:?} is missing from {}", name, location))?;
                if self.token_allowed(value) {
                    Ok(())
                } else {
                    Err("invalid api key".to_string())
                }
            }
        }
    }
}

/// Evaluate requirement alternatives. Empty `requirements` means no security;
/// an alternative with no schemes means anonymous access is allowed.
pub fn check_security(
    requirements: &[SecurityRequirement],
    authenticator: &dyn Authenticator,
    headers: &HeaderMap,
    query: &[(String, String)],
    cookies: &[(String, String)],
) -> Result<(), SecurityRequirementsError> {
    if requirements.is_empty() {
        return Ok(());
    }

    let mut errors = Vec::new();
    for requirement in requirements {
        let outcome = requirement.schemes.iter().try_for_each(|scheme| {
            authenticator.authenticate(&AuthenticationInput {
                scheme_name: &scheme.name,
                scheme: &scheme.kind,
                scopes: &scheme.scopes,
                headers,
                query,
                cookies,
            })
        });
        match outcome {
            Ok(()) => return Ok(()),
            Err(e) => errors.push(e),
        }
    }

    Err(SecurityRequirementsError::new(errors))
}

/// Parse every `Cookie` header into name/value pairs. Values are
/// percent-decoded and stripped of surrounding quotes; malformed pairs are
/// skipped.
pub fn parse_cookies(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(Cookie::split_parse_encoded)
        .filter_map(|cookie| cookie.ok())
        .map(|cookie| (cookie.name().to_string(), cookie.value_trimmed().to_string()))
        .collect()
}

fn authorization(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
}

fn strip_scheme<'a>(value: &'a str, scheme: &str) -> Option<&'a str> {
    let (prefix, rest) = value.trim().split_once(' ')?;
    prefix
        .eq_ignore_ascii_case(scheme)
        .then(|| rest.trim())
}

fn lookup<'a>(pairs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}
