//! JSON Schema compilation for OpenAPI schema objects
//!
//! OpenAPI 3.0 schema objects are serialised back to JSON and compiled with
//! the `jsonschema` crate (Draft 4 is the closest dialect). Every compiled
//! schema carries a copy of `components.schemas` under a `components` key so
//! that `#/components/schemas/...` references resolve against it.
//!
//! Draft 4 has no `nullable`, so `nullable: true` is rewritten before
//! compiling: `type: T` becomes `type: [T, "null"]`, an `enum` gains `null`,
//! and a schema without `type` is wrapped in `anyOf` with `{"type": "null"}`.

use jsonschema::error::ValidationErrorKind;
use jsonschema::{Draft, Validator};
use openapiv3::{Components, ReferenceOr, Schema};
use serde_json::{json, Map, Value};

use crate::error::{GuardError, Result};
use crate::failure::{pointer_segments, SchemaError};

const SCHEMA_REF_PREFIX: &str = "#/components/schemas/";

/// A compiled schema plus the primitive type hints needed to coerce
/// string-encoded parameter values
pub struct CompiledSchema {
    validator: Validator,
    value_type: Option<String>,
    item_type: Option<String>,
}

impl std::fmt::Debug for CompiledSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledSchema")
            .field("value_type", &self.value_type)
            .field("item_type", &self.item_type)
            .finish_non_exhaustive()
    }
}

impl CompiledSchema {
    /// Declared `type`, if any (after following a top-level `$ref`)
    pub fn value_type(&self) -> Option<&str> {
        self.value_type.as_deref()
    }

    /// Declared `items.type` for array schemas
    pub fn item_type(&self) -> Option<&str> {
        self.item_type.as_deref()
    }

    /// Validate an instance, returning every violation in evaluation order
    pub fn validate(&self, instance: &Value) -> Vec<SchemaError> {
        self.validator
            .iter_errors(instance)
            .map(|error| {
                let mut segments = pointer_segments(&error.instance_path.to_string());
                // Point at the missing property itself, not at its parent object
                if let ValidationErrorKind::Required { property } = &error.kind {
                    if let Some(name) = property.as_str() {
                        segments.push(name.to_string());
                    }
                }
                SchemaError::new(segments, error.to_string())
            })
            .collect()
    }
}

/// Compiles schema objects from one document
pub struct SchemaCompiler {
    components: Value,
}

impl SchemaCompiler {
    pub fn new(components: Option<&Components>) -> Result<Self> {
        let schemas = match components {
            Some(c) => {
                let mut schemas = serde_json::to_value(&c.schemas)?;
                apply_nullable(&mut schemas);
                schemas
            }
            None => Value::Object(Map::new()),
        };
        let mut wrapper = Map::new();
        wrapper.insert("schemas".to_string(), schemas);
        Ok(Self {
            components: Value::Object(wrapper),
        })
    }

    /// Compile a schema (inline or `$ref`). `location` only labels errors.
    pub fn compile(&self, schema: &ReferenceOr<Schema>, location: &str) -> Result<CompiledSchema> {
        let mut value = serde_json::to_value(schema)?;
        apply_nullable(&mut value);
        let resolved = self.resolve_top_level(&value, location)?;
        let value_type = type_of(&resolved);
        let item_type = resolved
            .get("items")
            .map(|items| self.resolve_top_level(items, location))
            .transpose()?
            .and_then(|items| type_of(&items));

        if let Value::Object(map) = &mut value {
            map.entry("components")
                .or_insert_with(|| self.components.clone());
        }

        let validator = jsonschema::options()
            .with_draft(Draft::Draft4)
            .build(&value)
            .map_err(|e| GuardError::schema_error(location, e.to_string()))?;

        Ok(CompiledSchema {
            validator,
            value_type,
            item_type,
        })
    }

    /// Follow `$ref` chains into `components.schemas` for type inspection
    fn resolve_top_level(&self, value: &Value, location: &str) -> Result<Value> {
        let mut current = value.clone();
        for _ in 0..16 {
            let Some(reference) = current.get("$ref").and_then(Value::as_str) else {
                return Ok(current);
            };
            let name = reference.strip_prefix(SCHEMA_REF_PREFIX).ok_or_else(|| {
                GuardError::unsupported(format!("{}: external reference {}", location, reference))
            })?;
            current = self
                .components
                .get("schemas")
                .and_then(|schemas| schemas.get(name))
                .cloned()
                .ok_or_else(|| {
                    GuardError::unsupported(format!(
                        "{}: unresolved reference {}",
                        location, reference
                    ))
                })?;
        }
        Err(GuardError::unsupported(format!(
            "{}: reference chain too deep",
            location
        )))
    }
}

fn type_of(value: &Value) -> Option<String> {
    match value.get("type")? {
        Value::String(ty) => Some(ty.clone()),
        Value::Array(types) => types
            .iter()
            .filter_map(Value::as_str)
            .find(|ty| *ty != "null")
            .map(str::to_string),
        _ => None,
    }
}

/// Rewrite every `nullable: true` schema so that it accepts `null`
fn apply_nullable(value: &mut Value) {
    match value {
        Value::Array(items) => items.iter_mut().for_each(apply_nullable),
        Value::Object(map) => {
            map.values_mut().for_each(apply_nullable);

            // A `properties` entry named `nullable` holds a schema, not `true`
            if map.get("nullable") != Some(&Value::Bool(true)) {
                return;
            }
            map.remove("nullable");

            if let Some(Value::Array(variants)) = map.get_mut("enum") {
                if !variants.contains(&Value::Null) {
                    variants.push(Value::Null);
                }
            }

            match map.get_mut("type") {
                Some(Value::String(ty)) => {
                    let ty = std::mem::take(ty);
                    map.insert("type".to_string(), json!([ty, "null"]));
                }
                Some(_) => {}
                None => {
                    let inner = Value::Object(std::mem::take(map));
                    map.insert("anyOf".to_string(), json!([{"type": "null"}, inner]));
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compiler_with(schemas: Value) -> SchemaCompiler {
        let components: Components =
            serde_json::from_value(json!({ "schemas": schemas })).unwrap();
        SchemaCompiler::new(Some(&components)).unwrap()
    }

    fn schema(value: Value) -> ReferenceOr<Schema> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_required_property_points_at_property() {
        let compiler = compiler_with(json!({}));
        let compiled = compiler
            .compile(
                &schema(json!({
                    "type": "object",
                    "required": ["name"],
                    "properties": {"name": {"type": "string"}}
                })),
                "test",
            )
            .unwrap();

        let errors = compiled.validate(&json!({}));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].segments, vec!["name".to_string()]);
        assert!(errors[0].reason.contains("name"));
    }

    #[test]
    fn test_nested_array_path() {
        let compiler = compiler_with(json!({}));
        let compiled = compiler
            .compile(
                &schema(json!({
                    "type": "object",
                    "properties": {
                        "items": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {"name": {"type": "string"}}
                            }
                        }
                    }
                })),
                "test",
            )
            .unwrap();

        let errors = compiled.validate(&json!({"items": [{"name": "a"}, {"name": 7}]}));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].segments, vec!["items", "1", "name"]);
    }

    #[test]
    fn test_component_reference_resolves() {
        let compiler = compiler_with(json!({
            "Item": {
                "type": "object",
                "required": ["id"],
                "properties": {"id": {"type": "integer"}}
            }
        }));
        let compiled = compiler
            .compile(&schema(json!({"$ref": "#/components/schemas/Item"})), "test")
            .unwrap();

        assert_eq!(compiled.value_type(), Some("object"));
        assert!(compiled.validate(&json!({"id": 1})).is_empty());
        assert_eq!(compiled.validate(&json!({})).len(), 1);
    }

    #[test]
    fn test_type_hints_for_arrays() {
        let compiler = compiler_with(json!({}));
        let compiled = compiler
            .compile(
                &schema(json!({"type": "array", "items": {"type": "integer"}})),
                "test",
            )
            .unwrap();
        assert_eq!(compiled.value_type(), Some("array"));
        assert_eq!(compiled.item_type(), Some("integer"));
    }

    #[test]
    fn test_nullable_accepts_null() {
        let compiler = compiler_with(json!({
            "Tag": {"type": "object", "nullable": true, "properties": {"id": {"type": "integer"}}}
        }));
        let compiled = compiler
            .compile(
                &schema(json!({
                    "type": "object",
                    "properties": {
                        "note": {"type": "string", "nullable": true},
                        "kind": {"type": "string", "enum": ["a", "b"], "nullable": true},
                        "tag": {"$ref": "#/components/schemas/Tag"},
                        "plain": {"type": "string"}
                    }
                })),
                "test",
            )
            .unwrap();

        assert!(compiled
            .validate(&json!({"note": null, "kind": null, "tag": null}))
            .is_empty());
        assert!(compiled.validate(&json!({"note": "x", "kind": "a"})).is_empty());
        assert_eq!(compiled.validate(&json!({"kind": "c"})).len(), 1);

        let errors = compiled.validate(&json!({"plain": null}));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].segments, vec!["plain".to_string()]);
    }

    #[test]
    fn test_nullable_keeps_type_hint() {
        let compiler = compiler_with(json!({}));
        let compiled = compiler
            .compile(&schema(json!({"type": "integer", "nullable": true})), "test")
            .unwrap();
        assert_eq!(compiled.value_type(), Some("integer"));
    }

    #[test]
    fn test_unresolved_reference_is_unsupported() {
        let compiler = compiler_with(json!({}));
        let err = compiler
            .compile(&schema(json!({"$ref": "#/components/schemas/Missing"})), "here")
            .unwrap_err();
        assert!(matches!(err, GuardError::Unsupported(_)));
    }
}
