//! Path-template router: `(method, path) -> operation`.
//!
//! Templates use OpenAPI syntax (`/content/{id}`), which `matchit` accepts
//! as-is. A `{param}` segment matches exactly one non-empty path segment and
//! static segments take priority, so `/content/latest` beats `/content/{id}`.
//! The most specific template owns the path: if it lacks the method the
//! result is `MethodNotAllowed`, even when a less specific template has it.

use axum::http::Method;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug)]
struct Route<T> {
    template: String,
    methods: HashMap<Method, T>,
}

/// Routing failure, reported before any validation runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteError {
    NotFound,
    MethodNotAllowed,
}

impl fmt::Display for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteError::NotFound => f.write_str("no matching operation was found"),
            RouteError::MethodNotAllowed => f.write_str("method not allowed"),
        }
    }
}

impl std::error::Error for RouteError {}

/// A successful route match. Path parameter values are still percent-encoded.
#[derive(Debug)]
pub struct RouteMatch<'a, T> {
    pub template: &'a str,
    pub value: &'a T,
    pub path_params: Vec<(String, String)>,
}

/// Maps (method, path template) -> T
pub struct RouteTable<T> {
    matcher: matchit::Router<usize>,
    routes: Vec<Route<T>>,
}

impl<T: fmt::Debug> fmt::Debug for RouteTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteTable")
            .field("routes", &self.routes)
            .finish_non_exhaustive()
    }
}

impl<T> RouteTable<T> {
    pub fn new() -> Self {
        Self {
            matcher: matchit::Router::new(),
            routes: Vec::new(),
        }
    }

    /// Register `value` for `method` on `template`. Fails when the template
    /// conflicts with one already registered (e.g. `/a/{id}` vs `/a/{name}`).
    pub fn add(
        &mut self,
        method: Method,
        template: &str,
        value: T,
    ) -> Result<(), matchit::InsertError> {
        let template = normalize(template);
        if let Some(route) = self.routes.iter_mut().find(|r| r.template == template) {
            route.methods.insert(method, value);
            return Ok(());
        }

        self.matcher.insert(template, self.routes.len())?;
        let mut methods = HashMap::new();
        methods.insert(method, value);
        self.routes.push(Route {
            template: template.to_string(),
            methods,
        });
        Ok(())
    }

    pub fn find(&self, method: &Method, path: &str) -> Result<RouteMatch<'_, T>, RouteError> {
        let matched = self
            .matcher
            .at(normalize(path))
            .map_err(|_| RouteError::NotFound)?;
        let route = self.routes.get(*matched.value).ok_or(RouteError::NotFound)?;
        let value = route
            .methods
            .get(method)
            .ok_or(RouteError::MethodNotAllowed)?;

        Ok(RouteMatch {
            template: &route.template,
            value,
            path_params: matched
                .params
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
        })
    }

    /// Iterate `(template, method, value)` in registration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Method, &T)> {
        self.routes.iter().flat_map(|route| {
            route
                .methods
                .iter()
                .map(move |(method, value)| (route.template.as_str(), method, value))
        })
    }

    pub fn len(&self) -> usize {
        self.routes.iter().map(|r| r.methods.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for RouteTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Trailing slashes are not significant
fn normalize(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}
