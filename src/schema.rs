//! Schema adapter around the JSON Schema validator.
//!
//! Validators are expensive to compile, so every schema is compiled once
//! when the route table is built and shared across requests via `Arc`.
//! Validation failures are mapped into [`ValidationIssue`] records with
//! the shapes callers expect from schema libraries (`invalid_type` with
//! expected/received, `Required`, `too_small`/`too_big`, ...).
//!
//! Query-string and path-segment values always arrive as strings. When the
//! validator library does not coerce string instances to declared primitive
//! types on its own (probed once at load time), [`coerce_scalar`] and
//! [`coerce_query_values`] convert them ahead of validation, driven by the
//! leaf's declared type. Body values are never coerced; JSON already typed
//! them.

use crate::error::ValidationIssue;
use jsonschema::error::{TypeKind, ValidationError, ValidationErrorKind};
use jsonschema::paths::PathChunk;
use jsonschema::JSONSchema;
use once_cell::sync::Lazy;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;

/// Whether the validator library accepts string instances against
/// non-string primitive schemas. Probed once; the coercion helpers become
/// pass-throughs when the library handles it natively.
static NATIVE_STRING_COERCION: Lazy<bool> = Lazy::new(|| {
    let probe = json!({ "type": "integer" });
    match JSONSchema::compile(&probe) {
        Ok(schema) => schema.is_valid(&Value::String("9".to_string())),
        Err(_) => false,
    }
});

/// A JSON Schema compiled for repeated validation.
#[derive(Clone)]
pub struct Schema {
    raw: Value,
    compiled: Arc<JSONSchema>,
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema").field("raw", &self.raw).finish()
    }
}

impl Schema {
    pub fn compile(raw: Value) -> anyhow::Result<Self> {
        let compiled = match JSONSchema::compile(&raw) {
            Ok(compiled) => compiled,
            Err(err) => anyhow::bail!("schema failed to compile: {err}"),
        };
        Ok(Schema {
            raw,
            compiled: Arc::new(compiled),
        })
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// True when the schema describes a JSON object (`type: object` or an
    /// explicit `properties` map).
    pub fn is_object_schema(&self) -> bool {
        self.raw.get("type").and_then(Value::as_str) == Some("object")
            || self.raw.get("properties").is_some()
    }

    /// Declared sub-schema of a top-level property, if any.
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.raw.get("properties")?.get(name)
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.property(name).is_some()
    }

    pub fn is_valid(&self, instance: &Value) -> bool {
        self.compiled.is_valid(instance)
    }

    pub fn validate(&self, instance: &Value) -> Result<(), Vec<ValidationIssue>> {
        match self.compiled.validate(instance) {
            Ok(()) => Ok(()),
            Err(errors) => Err(errors.map(|e| issue_from_error(&e)).collect()),
        }
    }
}

/// Map one validator error to the issue record callers see in 400 bodies.
fn issue_from_error(error: &ValidationError<'_>) -> ValidationIssue {
    let mut path: Vec<Value> = error
        .instance_path
        .iter()
        .filter_map(|chunk| match chunk {
            PathChunk::Property(name) => Some(Value::String(name.to_string())),
            PathChunk::Index(idx) => Some(Value::from(*idx as u64)),
            _ => None,
        })
        .collect();

    match &error.kind {
        ValidationErrorKind::Type { kind } => {
            let expected = type_kind_name(kind);
            let received = json_type_name(&*error.instance).to_string();
            ValidationIssue {
                code: "invalid_type".into(),
                path,
                message: format!("Expected {expected}, received {received}"),
                expected: Some(expected),
                received: Some(received),
            }
        }
        ValidationErrorKind::Required { property } => {
            path.push(property.clone());
            ValidationIssue {
                code: "invalid_type".into(),
                path,
                message: "Required".into(),
                expected: None,
                received: Some("undefined".into()),
            }
        }
        ValidationErrorKind::Minimum { .. }
        | ValidationErrorKind::MinLength { .. }
        | ValidationErrorKind::MinItems { .. }
        | ValidationErrorKind::ExclusiveMinimum { .. } => ValidationIssue {
            code: "too_small".into(),
            path,
            message: error.to_string(),
            expected: None,
            received: None,
        },
        ValidationErrorKind::Maximum { .. }
        | ValidationErrorKind::MaxLength { .. }
        | ValidationErrorKind::MaxItems { .. }
        | ValidationErrorKind::ExclusiveMaximum { .. } => ValidationIssue {
            code: "too_big".into(),
            path,
            message: error.to_string(),
            expected: None,
            received: None,
        },
        ValidationErrorKind::Enum { .. } => ValidationIssue {
            code: "invalid_enum_value".into(),
            path,
            message: error.to_string(),
            expected: None,
            received: None,
        },
        ValidationErrorKind::AdditionalProperties { .. } => ValidationIssue {
            code: "unrecognized_keys".into(),
            path,
            message: error.to_string(),
            expected: None,
            received: None,
        },
        _ => ValidationIssue {
            code: "custom".into(),
            path,
            message: error.to_string(),
            expected: None,
            received: None,
        },
    }
}

fn type_kind_name(kind: &TypeKind) -> String {
    match kind {
        TypeKind::Single(ty) => ty.to_string(),
        TypeKind::Multiple(types) => {
            let names: Vec<String> = (*types).into_iter().map(|t| t.to_string()).collect();
            names.join(", ")
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Coerce a query/path string toward the leaf's declared primitive type.
///
/// Only `integer`, `number` and `boolean` leaves convert; anything else
/// (including `string` and structured types) keeps the raw string. A value
/// that does not parse also keeps the raw string so that validation reports
/// the mismatch instead of this function guessing.
pub fn coerce_scalar(raw: &str, declared: Option<&Value>) -> Value {
    if *NATIVE_STRING_COERCION {
        return Value::String(raw.to_string());
    }
    let declared_type = declared
        .and_then(|schema| schema.get("type"))
        .and_then(Value::as_str);
    match declared_type {
        Some("integer") => raw
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(raw.to_string())),
        Some("number") => raw
            .parse::<f64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(raw.to_string())),
        Some("boolean") => raw
            .parse::<bool>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(raw.to_string())),
        _ => Value::String(raw.to_string()),
    }
}

/// Shape query occurrences of one key: a single occurrence stays a scalar,
/// several become an ordered array coerced per the leaf's `items` type.
pub fn coerce_query_values(values: &[String], declared: Option<&Value>) -> Value {
    if values.len() == 1 {
        return coerce_scalar(&values[0], declared);
    }
    let items = declared.and_then(|schema| schema.get("items"));
    Value::Array(values.iter().map(|v| coerce_scalar(v, items)).collect())
}
