//! Request data validation for Parapet.
//!
//! Compiles [`SchemaDescriptor`]s into JSON Schema validators and checks
//! request data against them. String-only sources (headers, path captures,
//! query strings, form fields) are coerced by the declared property type
//! before validation. Every failing field is reported, not just the first.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

use parapet_spec::{Schema, SchemaDescriptor};

/// Title of the documented 422 response body.
pub const VALIDATION_ERROR_TITLE: &str = "ValidationErrorResponses";

/// Errors raised while preparing a validator.
#[derive(Debug, Error)]
pub enum ValidatorError {
    #[error("E3001: schema '{title}' does not compile: {reason}")]
    InvalidSchema { title: String, reason: String },
}

/// One failing field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    /// Location of the field, outermost first.
    pub loc: Vec<String>,
    pub msg: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ctx: Option<Value>,
}

impl FieldError {
    pub fn new(loc: Vec<String>, msg: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            loc,
            msg: msg.into(),
            kind: kind.into(),
            ctx: None,
        }
    }

    pub fn with_ctx(mut self, ctx: Value) -> Self {
        self.ctx = Some(ctx);
        self
    }
}

/// Every field that failed validation, in report order.
#[derive(Debug, Clone, PartialEq, Default, Error)]
#[error("{} field(s) failed validation", .errors.len())]
pub struct ValidationErrors {
    errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: FieldError) {
        self.errors.push(error);
    }

    pub fn extend(&mut self, other: ValidationErrors) {
        self.errors.extend(other.errors);
    }

    /// Prefix every location with the name of the request source.
    pub fn located(mut self, source: &str) -> Self {
        for error in &mut self.errors {
            error.loc.insert(0, source.to_string());
        }
        self
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// The 422 body.
    pub fn into_response(self) -> ValidationErrorResponse {
        ValidationErrorResponse {
            results: self.errors,
        }
    }
}

impl From<FieldError> for ValidationErrors {
    fn from(error: FieldError) -> Self {
        Self {
            errors: vec![error],
        }
    }
}

/// Body of a 422 response: `{"results": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationErrorResponse {
    pub results: Vec<FieldError>,
}

impl Schema for ValidationErrorResponse {
    fn describe() -> SchemaDescriptor {
        SchemaDescriptor::titled(VALIDATION_ERROR_TITLE)
            .description("Validation errors")
            .field(
                "results",
                json!({
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "loc": {"type": "array", "items": {"type": "string"}},
                            "msg": {"type": "string"},
                            "type": {"type": "string"},
                            "ctx": {"type": "object"}
                        },
                        "required": ["loc", "msg", "type"]
                    }
                }),
                true,
            )
    }
}

/// Schema of the default 422 response every documented operation carries.
pub fn validation_error_schema() -> SchemaDescriptor {
    ValidationErrorResponse::describe()
}

/// Compile a JSON schema with format validation enabled.
fn compile_schema_with_formats(schema: &Value) -> Result<jsonschema::Validator, String> {
    jsonschema::options()
        .should_validate_formats(true)
        .build(schema)
        .map_err(|e| e.to_string())
}

/// A compiled validator for one schema.
pub struct SchemaValidator {
    title: String,
    schema: Value,
    properties: Vec<(String, Value)>,
    compiled: jsonschema::Validator,
}

impl fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaValidator")
            .field("title", &self.title)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl SchemaValidator {
    /// Compile the descriptor's canonical JSON schema once.
    pub fn new(descriptor: &SchemaDescriptor) -> Result<Self, ValidatorError> {
        let title = descriptor.title().unwrap_or_default().to_string();
        let schema = descriptor.to_json_schema();
        let compiled = compile_schema_with_formats(&schema)
            .map_err(|reason| ValidatorError::InvalidSchema {
                title: title.clone(),
                reason,
            })?;

        Ok(Self {
            title,
            schema,
            properties: descriptor.properties().to_vec(),
            compiled,
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// Validate a JSON document, returning it unchanged when it conforms.
    pub fn validate(&self, instance: Value) -> Result<Value, ValidationErrors> {
        let errors: Vec<FieldError> = self
            .compiled
            .iter_errors(&instance)
            .map(|e| self.field_error(&e))
            .collect();

        if errors.is_empty() {
            Ok(instance)
        } else {
            tracing::debug!(schema = %self.title, count = errors.len(), "validation failed");
            Err(ValidationErrors { errors })
        }
    }

    /// Validate string pairs from a query string, path captures or form.
    ///
    /// Only declared properties are kept. The first value of a repeated
    /// name wins unless the property is an array.
    pub fn validate_strings<I, K, V>(&self, pairs: I) -> Result<Value, ValidationErrors>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.validate(self.coerce_pairs(pairs, |property, name| property == name))
    }

    /// Like [`validate_strings`](Self::validate_strings), but names match
    /// case-insensitively and `_` in a property name matches `-`.
    pub fn validate_headers<I, K, V>(&self, pairs: I) -> Result<Value, ValidationErrors>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.validate(self.coerce_pairs(pairs, header_matches))
    }

    fn coerce_pairs<I, K, V>(&self, pairs: I, matches: impl Fn(&str, &str) -> bool) -> Value
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut out = Map::new();

        for (name, raw) in pairs {
            let (name, raw) = (name.as_ref(), raw.as_ref());
            let Some((property, declared)) = self
                .properties
                .iter()
                .find(|(property, _)| matches(property, name))
            else {
                continue;
            };

            if declared_type(declared) == Some("array") {
                let item = declared.get("items").cloned().unwrap_or(Value::Null);
                let entry = out
                    .entry(property.clone())
                    .or_insert_with(|| Value::Array(Vec::new()));
                if let Value::Array(items) = entry {
                    items.push(coerce(raw, &item));
                }
            } else if !out.contains_key(property) {
                out.insert(property.clone(), coerce(raw, declared));
            }
        }

        Value::Object(out)
    }

    fn field_error(&self, error: &jsonschema::ValidationError<'_>) -> FieldError {
        let schema_path = error.schema_path.to_string();
        let keyword = schema_path.rsplit('/').next().unwrap_or_default();
        let mut loc = pointer_segments(&error.instance_path.to_string());

        let keyword_value = self.schema.pointer(&schema_path).cloned();

        let (kind, ctx) = match (&error.kind, keyword) {
            (jsonschema::error::ValidationErrorKind::Required { property, .. }, _) => {
                loc.push(match property {
                    Value::String(name) => name.clone(),
                    other => other.to_string(),
                });
                ("value_error.missing".to_string(), None)
            }
            (_, "type") => {
                let expected = match &keyword_value {
                    Some(Value::String(t)) => t.clone(),
                    _ => "value".to_string(),
                };
                (format!("type_error.{expected}"), None)
            }
            (_, keyword) => (
                format!("value_error.{keyword}"),
                keyword_value.map(|v| json!({ keyword: v })),
            ),
        };

        FieldError {
            loc,
            msg: error.to_string(),
            kind,
            ctx,
        }
    }
}

fn header_matches(property: &str, header: &str) -> bool {
    property.eq_ignore_ascii_case(header)
        || property.replace('_', "-").eq_ignore_ascii_case(header)
}

fn declared_type(schema: &Value) -> Option<&str> {
    schema.get("type").and_then(Value::as_str)
}

/// Coerce a raw string by the property's declared type.
///
/// Values that do not parse stay strings so the type error is reported.
fn coerce(raw: &str, schema: &Value) -> Value {
    let fallback = || Value::String(raw.to_string());
    match declared_type(schema) {
        Some("integer") => raw
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| fallback()),
        Some("number") => raw
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(fallback),
        Some("boolean") => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Value::Bool(true),
            "false" | "0" | "no" | "off" => Value::Bool(false),
            _ => fallback(),
        },
        _ => fallback(),
    }
}

/// Split a JSON pointer into unescaped segments.
fn pointer_segments(pointer: &str) -> Vec<String> {
    pointer
        .split('/')
        .skip(1)
        .map(|s| s.replace("~1", "/").replace("~0", "~"))
        .collect()
}

/// Decode an `application/x-www-form-urlencoded` query string.
pub fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .trim_start_matches('?')
        .split('&')
        .filter(|s| !s.is_empty())
        .map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next().unwrap_or_default();
            let value = parts.next().unwrap_or("");
            (urlencoding_decode(key), urlencoding_decode(value))
        })
        .collect()
}

/// Decode an `application/x-www-form-urlencoded` body.
pub fn parse_urlencoded(body: &[u8]) -> Vec<(String, String)> {
    parse_query(&String::from_utf8_lossy(body))
}

/// URL decoding (`%XX` escapes and `+`), lossy on invalid UTF-8.
fn urlencoding_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    None => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }

    String::from_utf8_lossy(&out).into_owned()
}

/// Validation for self-describing data types.
pub trait Validate: Schema + Serialize + DeserializeOwned {
    /// Validate raw input and build the typed value.
    fn validate_raw(raw: Value) -> Result<Self, ValidationErrors> {
        let validator = SchemaValidator::new(&Self::describe()).map_err(|e| {
            ValidationErrors::from(FieldError::new(Vec::new(), e.to_string(), "value_error.schema"))
        })?;
        let canonical = validator.validate(raw)?;
        serde_json::from_value(canonical).map_err(|e| {
            ValidationErrors::from(FieldError::new(
                Vec::new(),
                e.to_string(),
                "value_error.deserialize",
            ))
        })
    }

    /// The canonical JSON form of the value.
    fn to_canonical(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl<T> Validate for T where T: Schema + Serialize + DeserializeOwned {}
