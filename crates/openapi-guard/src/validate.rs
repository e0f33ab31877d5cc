//! Request validation against a compiled OpenAPI document
//!
//! [`RequestValidator::new`] walks every path item and operation once,
//! compiling parameter and body schemas and resolving security schemes.
//! [`RequestValidator::validate`] then checks a request without touching
//! the document again. Every failure is collected into one [`MultiError`]
//! instead of stopping at the first problem.

use axum::extract::Query;
use axum::http::{header, HeaderMap, Method, Uri};
use openapiv3::{
    Components, Operation, Parameter, ParameterSchemaOrContent, PathItem, ReferenceOr,
    RequestBody,
};
use percent_encoding::percent_decode_str;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

use crate::document::OpenApiDocument;
use crate::error::{GuardError, Result};
use crate::failure::{MultiError, RequestError, RequestErrorSource, ValidationFailure};
use crate::router::{RouteError, RouteTable};
use crate::schema::{CompiledSchema, SchemaCompiler};
use crate::security::{
    check_security, parse_cookies, Authenticator, SchemeKind, SchemeRequirement,
    SecurityRequirement,
};

const PARAMETER_REF_PREFIX: &str = "#/components/parameters/";
const REQUEST_BODY_REF_PREFIX: &str = "#/components/requestBodies/";
const SECURITY_SCHEME_REF_PREFIX: &str = "#/components/securitySchemes/";

const MISSING_VALUE: &str = "value is required but missing";
const SCHEMA_MISMATCH: &str = "doesn't match schema";

/// Parameter location
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamIn {
    Path,
    Query,
    Header,
    Cookie,
}

impl fmt::Display for ParamIn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamIn::Path => f.write_str("path"),
            ParamIn::Query => f.write_str("query"),
            ParamIn::Header => f.write_str("header"),
            ParamIn::Cookie => f.write_str("cookie"),
        }
    }
}

#[derive(Debug)]
struct CompiledParameter {
    name: String,
    location: ParamIn,
    required: bool,
    schema: Option<CompiledSchema>,
    /// Declared through `content` rather than `schema`: the raw value is JSON
    json_encoded: bool,
}

#[derive(Debug)]
struct CompiledMediaType {
    media_type: String,
    schema: Option<CompiledSchema>,
}

#[derive(Debug)]
struct CompiledBody {
    required: bool,
    content: Vec<CompiledMediaType>,
}

impl CompiledBody {
    fn find(&self, content_type: &str) -> Option<&CompiledMediaType> {
        self.content
            .iter()
            .find(|m| m.media_type == content_type)
            .or_else(|| {
                self.content
                    .iter()
                    .find(|m| media_type_matches(&m.media_type, content_type))
            })
    }
}

/// One operation, ready for request checks
#[derive(Debug)]
struct CompiledOperation {
    operation_id: Option<String>,
    parameters: Vec<CompiledParameter>,
    body: Option<CompiledBody>,
    security: Vec<SecurityRequirement>,
}

impl CompiledOperation {
    fn is_secured(&self) -> bool {
        !self.security.is_empty() && self.security.iter().all(|r| !r.schemes.is_empty())
    }
}

/// Operation overview, as printed by tooling
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationSummary {
    pub method: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    pub parameters: Vec<String>,
    pub request_body: Vec<String>,
    pub secured: bool,
}

/// The parts of a request the validator looks at
#[derive(Debug, Clone, Copy)]
pub struct RequestInput<'a> {
    pub method: &'a Method,
    pub uri: &'a Uri,
    pub headers: &'a HeaderMap,
    pub body: &'a [u8],
}

/// Why a request was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// No operation matches; validation did not run
    Route(RouteError),
    /// The request matched an operation but failed its checks
    Invalid(MultiError),
}

/// Compiled request validator for one OpenAPI document
#[derive(Debug)]
pub struct RequestValidator {
    routes: RouteTable<CompiledOperation>,
}

impl RequestValidator {
    pub fn new(document: &OpenApiDocument) -> Result<Self> {
        let api = document.api();
        let components = api.components.as_ref();
        let compiler = SchemaCompiler::new(components)?;
        let mut routes = RouteTable::new();

        for (template, item) in api.paths.paths.iter() {
            let item = match item {
                ReferenceOr::Item(item) => item,
                ReferenceOr::Reference { reference } => {
                    return Err(GuardError::unsupported(format!(
                        "path item reference {} for {}",
                        reference, template
                    )));
                }
            };

            for (method, operation) in operations(item) {
                let location = format!("{} {}", method, template);
                let compiled = compile_operation(
                    &compiler,
                    components,
                    api.security.as_ref(),
                    item,
                    operation,
                    &location,
                )?;
                tracing::debug!(
                    operation = %location,
                    parameters = compiled.parameters.len(),
                    has_body = compiled.body.is_some(),
                    secured = compiled.is_secured(),
                    "Compiled operation"
                );
                routes.add(method, template, compiled).map_err(|e| {
                    GuardError::unsupported(format!("{}: {}", location, e))
                })?;
            }
        }

        Ok(Self { routes })
    }

    /// Number of compiled operations
    pub fn operation_count(&self) -> usize {
        self.routes.len()
    }

    /// Summaries of every operation, sorted by path then method
    pub fn operations(&self) -> Vec<OperationSummary> {
        let mut out: Vec<OperationSummary> = self
            .routes
            .iter()
            .map(|(template, method, op)| OperationSummary {
                method: method.to_string(),
                path: template.to_string(),
                operation_id: op.operation_id.clone(),
                parameters: op
                    .parameters
                    .iter()
                    .map(|p| format!("{} ({})", p.name, p.location))
                    .collect(),
                request_body: op
                    .body
                    .as_ref()
                    .map(|b| b.content.iter().map(|m| m.media_type.clone()).collect())
                    .unwrap_or_default(),
                secured: op.is_secured(),
            })
            .collect();
        out.sort_by(|a, b| (&a.path, &a.method).cmp(&(&b.path, &b.method)));
        out
    }

    /// Validate one request, collecting every failure
    pub fn validate(
        &self,
        input: &RequestInput<'_>,
        authenticator: &dyn Authenticator,
    ) -> std::result::Result<(), Rejection> {
        let matched = self
            .routes
            .find(input.method, input.uri.path())
            .map_err(Rejection::Route)?;
        let operation = matched.value;
        let mut failures = MultiError::new();

        let query = match Query::<Vec<(String, String)>>::try_from_uri(input.uri) {
            Ok(Query(pairs)) => pairs,
            Err(e) => {
                failures.push(ValidationFailure::Other(format!(
                    "failed to parse query string: {}",
                    e
                )));
                Vec::new()
            }
        };
        let cookies = parse_cookies(input.headers);

        let mut path_params = Vec::with_capacity(matched.path_params.len());
        let mut undecodable = Vec::new();
        for (name, raw) in &matched.path_params {
            match percent_decode_str(raw).decode_utf8() {
                Ok(value) => path_params.push((name.clone(), value.into_owned())),
                Err(e) => {
                    undecodable.push(name.as_str());
                    failures.push(
                        RequestError::parameter(name, "path", "failed to decode parameter")
                            .with_source(RequestErrorSource::Decode(format!(
                                "value {:?} is not valid percent-encoded UTF-8: {}",
                                raw, e
                            ))),
                    );
                }
            }
        }

        for parameter in &operation.parameters {
            if parameter.location == ParamIn::Path && undecodable.contains(&parameter.name.as_str()) {
                continue;
            }
            let raw = match parameter.location {
                ParamIn::Path => values_for(&path_params, &parameter.name),
                ParamIn::Query => values_for(&query, &parameter.name),
                ParamIn::Cookie => values_for(&cookies, &parameter.name),
                ParamIn::Header => input
                    .headers
                    .get_all(parameter.name.as_str())
                    .iter()
                    .filter_map(|v| v.to_str().ok())
                    .collect(),
            };
            if let Some(failure) = validate_parameter(parameter, &raw) {
                failures.push(failure);
            }
        }

        if let Some(body) = &operation.body {
            if let Some(failure) = validate_body(body, input.headers, input.body) {
                failures.push(failure);
            }
        }

        if let Err(e) = check_security(
            &operation.security,
            authenticator,
            input.headers,
            &query,
            &cookies,
        ) {
            failures.push(e);
        }

        failures.into_result().map_err(Rejection::Invalid)
    }
}

fn operations(item: &PathItem) -> Vec<(Method, &Operation)> {
    [
        (Method::GET, &item.get),
        (Method::PUT, &item.put),
        (Method::POST, &item.post),
        (Method::DELETE, &item.delete),
        (Method::OPTIONS, &item.options),
        (Method::HEAD, &item.head),
        (Method::PATCH, &item.patch),
        (Method::TRACE, &item.trace),
    ]
    .into_iter()
    .filter_map(|(method, op)| op.as_ref().map(|op| (method, op)))
    .collect()
}

fn compile_operation(
    compiler: &SchemaCompiler,
    components: Option<&Components>,
    global_security: Option<&Vec<openapiv3::SecurityRequirement>>,
    item: &PathItem,
    operation: &Operation,
    location: &str,
) -> Result<CompiledOperation> {
    // Operation-level parameters override path-level ones with the same (name, in)
    let mut parameters: Vec<CompiledParameter> = Vec::new();
    for param in item.parameters.iter().chain(operation.parameters.iter()) {
        let param = resolve(
            param,
            PARAMETER_REF_PREFIX,
            |name| components.and_then(|c| c.parameters.get(name)),
            location,
        )?;
        let compiled = compile_parameter(compiler, param, location)?;
        match parameters
            .iter_mut()
            .find(|p| p.name == compiled.name && p.location == compiled.location)
        {
            Some(existing) => *existing = compiled,
            None => parameters.push(compiled),
        }
    }

    let body = operation
        .request_body
        .as_ref()
        .map(|body| {
            let body = resolve(
                body,
                REQUEST_BODY_REF_PREFIX,
                |name| components.and_then(|c| c.request_bodies.get(name)),
                location,
            )?;
            compile_body(compiler, body, location)
        })
        .transpose()?;

    let security = operation
        .security
        .as_ref()
        .or(global_security)
        .map(|reqs| compile_security(reqs, components, location))
        .transpose()?
        .unwrap_or_default();

    Ok(CompiledOperation {
        operation_id: operation.operation_id.clone(),
        parameters,
        body,
        security,
    })
}

fn compile_parameter(
    compiler: &SchemaCompiler,
    param: &Parameter,
    location: &str,
) -> Result<CompiledParameter> {
    let (data, param_in) = match param {
        Parameter::Query { parameter_data, .. } => (parameter_data, ParamIn::Query),
        Parameter::Header { parameter_data, .. } => (parameter_data, ParamIn::Header),
        Parameter::Path { parameter_data, .. } => (parameter_data, ParamIn::Path),
        Parameter::Cookie { parameter_data, .. } => (parameter_data, ParamIn::Cookie),
    };
    let label = format!("{} parameter {:?}", location, data.name);

    let (schema, json_encoded) = match &data.format {
        ParameterSchemaOrContent::Schema(schema) => (Some(compiler.compile(schema, &label)?), false),
        ParameterSchemaOrContent::Content(content) => {
            let schema = content
                .values()
                .next()
                .and_then(|media| media.schema.as_ref())
                .map(|schema| compiler.compile(schema, &label))
                .transpose()?;
            (schema, true)
        }
    };

    Ok(CompiledParameter {
        name: data.name.clone(),
        location: param_in,
        // Path parameters are always required
        required: data.required || param_in == ParamIn::Path,
        schema,
        json_encoded,
    })
}

fn compile_body(
    compiler: &SchemaCompiler,
    body: &RequestBody,
    location: &str,
) -> Result<CompiledBody> {
    let content = body
        .content
        .iter()
        .map(|(media_type, media)| {
            let label = format!("{} body {}", location, media_type);
            Ok(CompiledMediaType {
                media_type: normalize_media_type(media_type),
                schema: media
                    .schema
                    .as_ref()
                    .map(|schema| compiler.compile(schema, &label))
                    .transpose()?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CompiledBody {
        required: body.required,
        content,
    })
}

fn compile_security(
    requirements: &[openapiv3::SecurityRequirement],
    components: Option<&Components>,
    location: &str,
) -> Result<Vec<SecurityRequirement>> {
    requirements
        .iter()
        .map(|requirement| {
            let schemes = requirement
                .iter()
                .map(|(name, scopes)| {
                    let scheme = components
                        .and_then(|c| c.security_schemes.get(name))
                        .ok_or_else(|| {
                            GuardError::unsupported(format!(
                                "{}: security scheme {:?} is not defined",
                                location, name
                            ))
                        })?;
                    let scheme = resolve(
                        scheme,
                        SECURITY_SCHEME_REF_PREFIX,
                        |n| components.and_then(|c| c.security_schemes.get(n)),
                        location,
                    )?;
                    Ok(SchemeRequirement {
                        name: name.clone(),
                        kind: SchemeKind::from(scheme),
                        scopes: scopes.clone(),
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(SecurityRequirement { schemes })
        })
        .collect()
}

/// Follow a `$ref` chain through one component table
fn resolve<'a, T>(
    item: &'a ReferenceOr<T>,
    prefix: &str,
    lookup: impl Fn(&str) -> Option<&'a ReferenceOr<T>>,
    location: &str,
) -> Result<&'a T> {
    let mut current = item;
    for _ in 0..16 {
        match current {
            ReferenceOr::Item(value) => return Ok(value),
            ReferenceOr::Reference { reference } => {
                let name = reference.strip_prefix(prefix).ok_or_else(|| {
                    GuardError::unsupported(format!(
                        "{}: unsupported reference {}",
                        location, reference
                    ))
                })?;
                current = lookup(name).ok_or_else(|| {
                    GuardError::unsupported(format!(
                        "{}: unresolved reference {}",
                        location, reference
                    ))
                })?;
            }
        }
    }
    Err(GuardError::unsupported(format!(
        "{}: reference chain too deep",
        location
    )))
}

fn values_for<'a>(pairs: &'a [(String, String)], name: &str) -> Vec<&'a str> {
    pairs
        .iter()
        .filter(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
        .collect()
}

fn validate_parameter(param: &CompiledParameter, raw: &[&str]) -> Option<ValidationFailure> {
    let location = param.location.to_string();
    let Some(first) = raw.first() else {
        return param.required.then(|| {
            RequestError::parameter(&param.name, &location, MISSING_VALUE).into()
        });
    };

    let schema = param.schema.as_ref()?;

    let value = if param.json_encoded {
        serde_json::from_str::<Value>(first).map_err(|e| e.to_string())
    } else if schema.value_type() == Some("array") {
        let items: Vec<&str> = if raw.len() > 1 {
            raw.to_vec()
        } else {
            first.split(',').collect()
        };
        items
            .into_iter()
            .map(|item| coerce(item, schema.item_type()))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(Value::Array)
    } else {
        coerce(first, schema.value_type())
    };

    let value = match value {
        Ok(value) => value,
        Err(e) => {
            return Some(
                RequestError::parameter(&param.name, &location, "failed to decode parameter")
                    .with_source(RequestErrorSource::Decode(e))
                    .into(),
            );
        }
    };

    let errors = schema.validate(&value);
    if errors.is_empty() {
        return None;
    }

    // Field paths for parameter violations start at the parameter name
    let causes = errors
        .into_iter()
        .map(|mut e| {
            e.segments.insert(0, param.name.clone());
            ValidationFailure::Schema(e)
        })
        .collect::<Vec<_>>();
    Some(
        RequestError::parameter(&param.name, &location, SCHEMA_MISMATCH)
            .with_source(RequestErrorSource::Schema(MultiError(causes)))
            .into(),
    )
}

fn coerce(raw: &str, value_type: Option<&str>) -> std::result::Result<Value, String> {
    match value_type {
        Some("integer") => raw
            .parse::<i64>()
            .map(Value::from)
            .map_err(|e| format!("value {:?} is not an integer: {}", raw, e)),
        Some("number") => raw
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| format!("value {:?} is not a number", raw)),
        Some("boolean") => raw
            .parse::<bool>()
            .map(Value::Bool)
            .map_err(|_| format!("value {:?} is not a boolean", raw)),
        _ => Ok(Value::String(raw.to_string())),
    }
}

fn validate_body(body: &CompiledBody, headers: &HeaderMap, bytes: &[u8]) -> Option<ValidationFailure> {
    if bytes.is_empty() {
        return body
            .required
            .then(|| RequestError::body(MISSING_VALUE).into());
    }

    let Some(content_type) = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(normalize_media_type)
    else {
        return Some(RequestError::body("header Content-Type is missing").into());
    };

    let Some(media) = body.find(&content_type) else {
        return Some(
            RequestError::body(format!(
                "header Content-Type has unexpected value: {:?}",
                content_type
            ))
            .into(),
        );
    };

    if !is_json(&content_type) {
        return None;
    }

    let value: Value = match serde_json::from_slice(bytes) {
        Ok(value) => value,
        Err(e) => {
            return Some(
                RequestError::body("failed to decode request body")
                    .with_source(RequestErrorSource::Decode(e.to_string()))
                    .into(),
            );
        }
    };

    let schema = media.schema.as_ref()?;
    let errors = schema.validate(&value);
    if errors.is_empty() {
        return None;
    }

    let causes = errors
        .into_iter()
        .map(ValidationFailure::from)
        .collect::<Vec<_>>();
    Some(
        RequestError::body(SCHEMA_MISMATCH)
            .with_source(RequestErrorSource::Schema(MultiError(causes)))
            .into(),
    )
}

fn normalize_media_type(value: &str) -> String {
    value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn is_json(media_type: &str) -> bool {
    media_type == "application/json" || media_type.ends_with("+json")
}

/// `declared` may be a range such as `application/*` or `*/*`
fn media_type_matches(declared: &str, actual: &str) -> bool {
    if declared == "*/*" {
        return true;
    }
    match (declared.split_once('/'), actual.split_once('/')) {
        (Some((d_type, "*")), Some((a_type, _))) => d_type == a_type,
        _ => declared == actual,
    }
}
