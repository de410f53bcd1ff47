use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Name of the security scheme installed by the first auth annotation.
pub const BEARER_AUTH: &str = "bearerAuth";

/// Description used when a schema carries none.
pub const NO_DESCRIPTION: &str = "No description";

/// The published OpenAPI document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecDocument {
    /// The OpenAPI version string (e.g. "3.0.2").
    pub openapi: String,
    pub info: Info,
    /// Normalized URL -> lowercased method -> operation.
    pub paths: BTreeMap<String, BTreeMap<String, Operation>>,
    pub components: Components,
    /// Document-wide tags, deduplicated by name.
    pub tags: Vec<Tag>,
}

impl SpecDocument {
    /// The document as a JSON value with null fields omitted.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn operation(&self, path: &str, method: &str) -> Option<&Operation> {
        self.paths.get(path)?.get(&method.to_lowercase())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Info {
    pub title: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalDocs {
    pub description: String,
    pub url: String,
}

/// A tag that groups operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_docs: Option<ExternalDocs>,
}

impl Tag {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            external_docs: None,
        }
    }

    pub fn with_external_docs(
        mut self,
        description: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        self.external_docs = Some(ExternalDocs {
            description: description.into(),
            url: url.into(),
        });
        self
    }
}

/// Where a bound request field comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    Header,
    Path,
    Query,
}

impl std::fmt::Display for ParameterLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParameterLocation::Header => write!(f, "header"),
            ParameterLocation::Path => write!(f, "path"),
            ParameterLocation::Query => write!(f, "query"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "in")]
    pub location: ParameterLocation,
    pub required: bool,
    pub schema: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaRef {
    #[serde(rename = "$ref")]
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaType {
    pub schema: SchemaRef,
}

impl MediaType {
    pub fn reference(reference: impl Into<String>) -> Self {
        Self {
            schema: SchemaRef {
                reference: reference.into(),
            },
        }
    }
}

/// Build a content map pointing every media type at the same schema.
pub fn content_for(content_types: &[&str], reference: &str) -> BTreeMap<String, MediaType> {
    content_types
        .iter()
        .map(|ct| (ct.to_string(), MediaType::reference(reference)))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub content: BTreeMap<String, MediaType>,
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub content: BTreeMap<String, MediaType>,
}

/// One (path, method) operation, built up by successive annotations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Vec<Parameter>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_body: Option<RequestBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub responses: Option<BTreeMap<String, Response>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security: Option<Vec<BTreeMap<String, Vec<String>>>>,
}

impl Operation {
    /// Fold `other` into `self`.
    ///
    /// Parameters append, responses merge by status code, tags append
    /// when absent; body, security and the text fields are replaced when
    /// `other` carries them.
    pub fn merge(&mut self, other: Operation) {
        if let Some(params) = other.parameters {
            self.parameters.get_or_insert_with(Vec::new).extend(params);
        }
        if let Some(body) = other.request_body {
            self.request_body = Some(body);
        }
        if let Some(responses) = other.responses {
            self.responses
                .get_or_insert_with(BTreeMap::new)
                .extend(responses);
        }
        if let Some(tags) = other.tags {
            for tag in tags {
                self.add_tag(&tag);
            }
        }
        if other.security.is_some() {
            self.security = other.security;
        }
        if other.summary.is_some() {
            self.summary = other.summary;
        }
        if other.description.is_some() {
            self.description = other.description;
        }
        if other.operation_id.is_some() {
            self.operation_id = other.operation_id;
        }
    }

    pub(crate) fn add_tag(&mut self, name: &str) {
        let tags = self.tags.get_or_insert_with(Vec::new);
        if !tags.iter().any(|t| t == name) {
            tags.push(name.to_string());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityScheme {
    #[serde(rename = "type")]
    pub scheme_type: String,
    pub scheme: String,
    pub bearer_format: String,
}

impl SecurityScheme {
    /// `{type: http, scheme: bearer, bearerFormat: JWT}`.
    pub fn bearer_jwt() -> Self {
        Self {
            scheme_type: "http".into(),
            scheme: "bearer".into(),
            bearer_format: "JWT".into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Components {
    pub schemas: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_schemes: Option<BTreeMap<String, SecurityScheme>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn param(name: &str) -> Parameter {
        Parameter {
            name: name.into(),
            location: ParameterLocation::Query,
            required: false,
            schema: json!({"type": "string"}),
            description: None,
        }
    }

    fn response(reference: &str) -> Response {
        Response {
            description: None,
            content: content_for(&["application/json"], reference),
        }
    }

    #[test]
    fn merge_appends_parameters() {
        let mut op = Operation {
            parameters: Some(vec![param("a")]),
            ..Default::default()
        };
        op.merge(Operation {
            parameters: Some(vec![param("b")]),
            ..Default::default()
        });
        let names: Vec<_> = op
            .parameters
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn merge_replaces_only_matching_response_codes() {
        let mut op = Operation::default();
        op.merge(Operation {
            responses: Some(BTreeMap::from([
                ("200".to_string(), response("#/a")),
                ("422".to_string(), response("#/v")),
            ])),
            ..Default::default()
        });
        op.merge(Operation {
            responses: Some(BTreeMap::from([("200".to_string(), response("#/b"))])),
            ..Default::default()
        });
        let responses = op.responses.unwrap();
        assert_eq!(responses.len(), 2);
        assert_eq!(
            responses["200"].content["application/json"].schema.reference,
            "#/b"
        );
    }

    #[test]
    fn merge_keeps_fields_the_other_side_lacks() {
        let mut op = Operation {
            summary: Some("keep me".into()),
            ..Default::default()
        };
        op.merge(Operation {
            tags: Some(vec!["x".into(), "x".into()]),
            ..Default::default()
        });
        assert_eq!(op.summary.as_deref(), Some("keep me"));
        assert_eq!(op.tags, Some(vec!["x".to_string()]));
    }

    #[test]
    fn serialization_omits_nulls_and_uses_openapi_keys() {
        let op = Operation {
            parameters: Some(vec![Parameter {
                location: ParameterLocation::Path,
                ..param("id")
            }]),
            ..Default::default()
        };
        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(
            value,
            json!({
                "parameters": [
                    {"name": "id", "in": "path", "required": false, "schema": {"type": "string"}}
                ]
            })
        );
    }

    #[test]
    fn bearer_scheme_shape() {
        let value = serde_json::to_value(SecurityScheme::bearer_jwt()).unwrap();
        assert_eq!(
            value,
            json!({"type": "http", "scheme": "bearer", "bearerFormat": "JWT"})
        );
    }
}
