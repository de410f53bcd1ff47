//! The endpoint registry.
//!
//! Accumulates partial operation descriptions keyed by
//! (logical endpoint name, method name) until the resolution pass binds
//! them to physical routes.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use crate::error::SpecError;
use crate::model::{
    content_for, Components, Operation, Parameter, ParameterLocation, RequestBody, Response,
    SecurityScheme, Tag, BEARER_AUTH, NO_DESCRIPTION,
};
use crate::schema::SchemaDescriptor;

/// Identifies one operation accumulator before URL resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointKey {
    endpoint: String,
    method: String,
}

impl EndpointKey {
    /// The method name is stored lowercased.
    pub fn new(endpoint: impl Into<String>, method: impl AsRef<str>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: method.as_ref().to_lowercase(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn method(&self) -> &str {
        &self.method
    }
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.endpoint, self.method)
    }
}

/// Binds a logical endpoint name to a router namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlueprintRemap {
    pub endpoint: String,
    pub blueprint: String,
}

impl BlueprintRemap {
    /// `{blueprint}.{endpoint}`, the identifier the router uses.
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.blueprint, self.endpoint)
    }
}

/// Derive a logical endpoint name from a qualified handler name.
///
/// Any Rust module path is dropped, then the part before the first `.` is
/// lowercased: `app::views::ItemView` and `ItemView.get` both give `itemview`.
pub fn derive_endpoint_name(qualified: &str) -> String {
    let last = qualified.rsplit("::").next().unwrap_or(qualified);
    let head = last.split('.').next().unwrap_or(last);
    // Generic arguments are not part of the name.
    let head = head.split('<').next().unwrap_or(head);
    head.to_lowercase()
}

#[derive(Debug, Clone)]
struct Accumulator {
    key: EndpointKey,
    operation: Operation,
}

/// Mutable accumulator for endpoint annotations.
///
/// All registration is expected to finish before [`Registry::resolve`]
/// runs; the registry performs no locking of its own.
///
/// [`Registry::resolve`]: crate::registry::Registry::resolve
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: Vec<Accumulator>,
    components: Components,
    tags: Vec<Tag>,
    remaps: Vec<BlueprintRemap>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one parameter per schema property at `location`.
    ///
    /// Parameters accumulate: repeated calls append in registration order.
    pub fn register_parameters(
        &mut self,
        location: ParameterLocation,
        schema: &SchemaDescriptor,
        key: &EndpointKey,
        tag: Option<&Tag>,
    ) -> Result<(), SpecError> {
        self.store_component(schema, key)?;

        let parameters: Vec<Parameter> = schema
            .properties()
            .iter()
            .map(|(name, property)| Parameter {
                name: name.clone(),
                location,
                required: schema.is_required(name),
                schema: property.clone(),
                description: property
                    .get("description")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            })
            .collect();

        tracing::debug!(
            endpoint = key.endpoint(),
            method = key.method(),
            %location,
            count = parameters.len(),
            "registered parameters"
        );

        self.inject(
            key,
            Operation {
                parameters: Some(parameters),
                ..Default::default()
            },
        );
        if let Some(tag) = tag {
            self.register_tag(key, tag);
        }
        Ok(())
    }

    /// Register the request body. A later body for the same key replaces
    /// the earlier one.
    pub fn register_body(
        &mut self,
        schema: &SchemaDescriptor,
        key: &EndpointKey,
        content_types: &[&str],
        tag: Option<&Tag>,
    ) -> Result<(), SpecError> {
        let reference = self.store_component(schema, key)?;

        let body = RequestBody {
            description: Some(describe(schema)),
            content: content_for(content_types, &reference),
            required: true,
        };

        if self
            .operation(key)
            .is_some_and(|op| op.request_body.is_some())
        {
            tracing::debug!(
                endpoint = key.endpoint(),
                method = key.method(),
                "request body replaced by a later registration"
            );
        }

        self.inject(
            key,
            Operation {
                request_body: Some(body),
                ..Default::default()
            },
        );
        if let Some(tag) = tag {
            self.register_tag(key, tag);
        }
        Ok(())
    }

    /// Register a response for `code`. Other codes are left untouched.
    pub fn register_response(
        &mut self,
        code: u16,
        schema: &SchemaDescriptor,
        key: &EndpointKey,
        content_types: &[&str],
    ) -> Result<(), SpecError> {
        let reference = self.store_component(schema, key)?;

        let response = Response {
            description: Some(describe(schema)),
            content: content_for(content_types, &reference),
        };

        self.inject(
            key,
            Operation {
                responses: Some(BTreeMap::from([(code.to_string(), response)])),
                ..Default::default()
            },
        );
        Ok(())
    }

    /// Mark the operation as requiring a bearer token.
    ///
    /// The first call anywhere installs the shared `bearerAuth` scheme.
    pub fn register_auth(&mut self, key: &EndpointKey) {
        let schemes = self
            .components
            .security_schemes
            .get_or_insert_with(BTreeMap::new);
        if !schemes.contains_key(BEARER_AUTH) {
            schemes.insert(BEARER_AUTH.to_string(), SecurityScheme::bearer_jwt());
        }

        self.inject(
            key,
            Operation {
                security: Some(vec![BTreeMap::from([(
                    BEARER_AUTH.to_string(),
                    Vec::new(),
                )])]),
                ..Default::default()
            },
        );
    }

    /// Store a named schema. The last write for a title wins.
    pub fn register_component(&mut self, schema: &SchemaDescriptor) -> Result<String, SpecError> {
        let title = schema.title().ok_or_else(|| SpecError::MissingTitle {
            context: "component".into(),
        })?;
        self.insert_component(title, schema.to_json_schema());
        Ok(format!("{}{}", crate::schema::COMPONENT_REF_PREFIX, title))
    }

    /// Attach a tag. The document keeps the first tag seen for each name.
    pub fn register_tag(&mut self, key: &EndpointKey, tag: &Tag) {
        if !self.tags.iter().any(|t| t.name == tag.name) {
            self.tags.push(tag.clone());
        }
        self.entry(key).add_tag(&tag.name);
    }

    pub fn register_summary(&mut self, key: &EndpointKey, summary: impl Into<String>) {
        self.entry(key).summary = Some(summary.into());
    }

    pub fn register_description(&mut self, key: &EndpointKey, description: impl Into<String>) {
        self.entry(key).description = Some(description.into());
    }

    pub fn register_operation_id(&mut self, key: &EndpointKey, operation_id: impl Into<String>) {
        self.entry(key).operation_id = Some(operation_id.into());
    }

    /// Make sure an accumulator exists for `key`.
    pub fn touch(&mut self, key: &EndpointKey) {
        self.entry(key);
    }

    /// Record that `endpoint` is served from inside `blueprint`.
    ///
    /// When an endpoint is remapped more than once the first record wins.
    pub fn record_blueprint(&mut self, endpoint: impl Into<String>, blueprint: impl Into<String>) {
        let remap = BlueprintRemap {
            endpoint: endpoint.into(),
            blueprint: blueprint.into(),
        };
        if !self.remaps.contains(&remap) {
            self.remaps.push(remap);
        }
    }

    pub fn operation(&self, key: &EndpointKey) -> Option<&Operation> {
        self.entries
            .iter()
            .find(|e| &e.key == key)
            .map(|e| &e.operation)
    }

    /// Accumulators in registration order.
    pub fn operations(&self) -> impl Iterator<Item = (&EndpointKey, &Operation)> {
        self.entries.iter().map(|e| (&e.key, &e.operation))
    }

    pub fn components(&self) -> &Components {
        &self.components
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn remaps(&self) -> &[BlueprintRemap] {
        &self.remaps
    }

    /// The name an endpoint is known by in the routing table.
    pub fn qualified_name(&self, endpoint: &str) -> String {
        self.remaps
            .iter()
            .find(|r| r.endpoint == endpoint)
            .map(BlueprintRemap::qualified)
            .unwrap_or_else(|| endpoint.to_string())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn store_component(
        &mut self,
        schema: &SchemaDescriptor,
        key: &EndpointKey,
    ) -> Result<String, SpecError> {
        let title = schema.title().ok_or_else(|| SpecError::MissingTitle {
            context: format!("endpoint {}", key),
        })?;
        self.insert_component(title, schema.to_json_schema());
        Ok(format!("{}{}", crate::schema::COMPONENT_REF_PREFIX, title))
    }

    fn insert_component(&mut self, title: &str, schema: Value) {
        if let Some(previous) = self.components.schemas.insert(title.to_string(), schema) {
            if Some(&previous) != self.components.schemas.get(title) {
                tracing::debug!(title, "component schema overwritten");
            }
        }
    }

    fn inject(&mut self, key: &EndpointKey, partial: Operation) {
        self.entry(key).merge(partial);
    }

    fn entry(&mut self, key: &EndpointKey) -> &mut Operation {
        let index = match self.entries.iter().position(|e| &e.key == key) {
            Some(index) => index,
            None => {
                self.entries.push(Accumulator {
                    key: key.clone(),
                    operation: Operation::default(),
                });
                self.entries.len() - 1
            }
        };
        &mut self.entries[index].operation
    }
}

fn describe(schema: &SchemaDescriptor) -> String {
    schema
        .description_text()
        .unwrap_or(NO_DESCRIPTION)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key() -> EndpointKey {
        EndpointKey::new("items", "GET")
    }

    fn path_schema() -> SchemaDescriptor {
        SchemaDescriptor::titled("ItemPath").field("id", json!({"type": "integer"}), true)
    }

    fn query_schema() -> SchemaDescriptor {
        SchemaDescriptor::titled("ItemQuery")
            .field("page", json!({"type": "integer"}), false)
            .field("size", json!({"type": "integer"}), false)
    }

    fn model(title: &str) -> SchemaDescriptor {
        SchemaDescriptor::titled(title).field("name", json!({"type": "string"}), true)
    }

    #[test]
    fn method_names_are_lowercased() {
        assert_eq!(EndpointKey::new("items", "GET").method(), "get");
    }

    #[test]
    fn endpoint_names_derive_from_qualified_names() {
        assert_eq!(derive_endpoint_name("ItemView.get"), "itemview");
        assert_eq!(derive_endpoint_name("app::views::ItemView"), "itemview");
        assert_eq!(derive_endpoint_name("app::Wrapper<u8>"), "wrapper");
        assert_eq!(derive_endpoint_name("items"), "items");
    }

    #[test]
    fn parameters_accumulate_in_registration_order() {
        let mut registry = Registry::new();
        registry
            .register_parameters(ParameterLocation::Path, &path_schema(), &key(), None)
            .unwrap();
        registry
            .register_parameters(ParameterLocation::Query, &query_schema(), &key(), None)
            .unwrap();

        let params = registry
            .operation(&key())
            .and_then(|op| op.parameters.clone())
            .unwrap();
        let summary: Vec<_> = params
            .iter()
            .map(|p| (p.name.as_str(), p.location, p.required))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("id", ParameterLocation::Path, true),
                ("page", ParameterLocation::Query, false),
                ("size", ParameterLocation::Query, false),
            ]
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn body_is_last_writer_wins() {
        let mut registry = Registry::new();
        registry
            .register_body(&model("First"), &key(), &["application/json"], None)
            .unwrap();
        registry
            .register_body(&model("Second"), &key(), &["application/xml"], None)
            .unwrap();

        let body = registry
            .operation(&key())
            .and_then(|op| op.request_body.clone())
            .unwrap();
        assert_eq!(body.content.len(), 1);
        assert_eq!(
            body.content["application/xml"].schema.reference,
            "#/components/schemas/Second"
        );
        assert!(body.required);
        assert_eq!(body.description.as_deref(), Some("No description"));
    }

    #[test]
    fn responses_accumulate_by_status_code() {
        let mut registry = Registry::new();
        let json = ["application/json"];
        registry
            .register_response(200, &model("Item"), &key(), &json)
            .unwrap();
        registry
            .register_response(422, &model("Errors"), &key(), &json)
            .unwrap();
        registry
            .register_response(200, &model("Other"), &key(), &json)
            .unwrap();

        let responses = registry
            .operation(&key())
            .and_then(|op| op.responses.clone())
            .unwrap();
        assert_eq!(responses.len(), 2);
        assert_eq!(
            responses["200"].content["application/json"].schema.reference,
            "#/components/schemas/Other"
        );
        assert_eq!(
            responses["422"].content["application/json"].schema.reference,
            "#/components/schemas/Errors"
        );
    }

    #[test]
    fn tags_are_deduplicated_across_endpoints() {
        let mut registry = Registry::new();
        let tag = Tag::new("items", "Item operations");
        let other = EndpointKey::new("catalog", "get");
        registry
            .register_parameters(ParameterLocation::Path, &path_schema(), &key(), Some(&tag))
            .unwrap();
        registry
            .register_body(&model("Item"), &other, &["application/json"], Some(&tag))
            .unwrap();
        registry.register_tag(&key(), &Tag::new("items", "ignored duplicate"));

        assert_eq!(registry.tags().len(), 1);
        assert_eq!(registry.tags()[0].description, "Item operations");
        for k in [key(), other] {
            assert_eq!(
                registry.operation(&k).and_then(|op| op.tags.clone()),
                Some(vec!["items".to_string()])
            );
        }
    }

    #[test]
    fn auth_installs_one_security_scheme() {
        let mut registry = Registry::new();
        registry.register_auth(&key());
        registry.register_auth(&EndpointKey::new("orders", "post"));
        registry.register_auth(&key());

        let schemes = registry.components().security_schemes.clone().unwrap();
        assert_eq!(schemes.len(), 1);
        assert!(schemes.contains_key("bearerAuth"));

        let security = registry
            .operation(&key())
            .and_then(|op| op.security.clone())
            .unwrap();
        assert_eq!(
            security,
            vec![BTreeMap::from([("bearerAuth".to_string(), Vec::<String>::new())])]
        );
    }

    #[test]
    fn shared_schema_is_stored_once() {
        let mut registry = Registry::new();
        let json = ["application/json"];
        registry
            .register_response(200, &model("Item"), &key(), &json)
            .unwrap();
        registry
            .register_body(&model("Item"), &EndpointKey::new("items", "post"), &json, None)
            .unwrap();
        assert_eq!(registry.components().schemas.len(), 1);
        assert!(registry.components().schemas.contains_key("Item"));
    }

    #[test]
    fn parameter_schemas_are_registered_as_components() {
        let mut registry = Registry::new();
        registry
            .register_parameters(ParameterLocation::Path, &path_schema(), &key(), None)
            .unwrap();
        assert!(registry.components().schemas.contains_key("ItemPath"));
    }

    #[test]
    fn untitled_schema_is_rejected() {
        let mut registry = Registry::new();
        let anonymous = SchemaDescriptor::anonymous().field("x", json!({"type": "string"}), true);
        let err = registry
            .register_body(&anonymous, &key(), &["application/json"], None)
            .unwrap_err();
        assert!(matches!(err, SpecError::MissingTitle { .. }));
        assert!(registry.is_empty());

        // The registry stays usable.
        registry
            .register_body(&model("Item"), &key(), &["application/json"], None)
            .unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn component_registration_overwrites_by_title() {
        let mut registry = Registry::new();
        registry.register_component(&model("Item")).unwrap();
        let replacement =
            SchemaDescriptor::titled("Item").field("sku", json!({"type": "string"}), true);
        let reference = registry.register_component(&replacement).unwrap();
        assert_eq!(reference, "#/components/schemas/Item");
        assert!(registry.components().schemas["Item"]["properties"]
            .get("sku")
            .is_some());
        assert!(registry.components().schemas["Item"]["properties"]
            .get("name")
            .is_none());
    }

    #[test]
    fn blueprint_remaps_are_recorded_once() {
        let mut registry = Registry::new();
        registry.record_blueprint("widget", "shop");
        registry.record_blueprint("widget", "shop");
        assert_eq!(registry.remaps().len(), 1);
        assert_eq!(registry.remaps()[0].qualified(), "shop.widget");
    }

    #[test]
    fn text_fields_are_set_on_the_accumulator() {
        let mut registry = Registry::new();
        registry.register_summary(&key(), "Fetch one item");
        registry.register_description(&key(), "Longer text");
        registry.register_operation_id(&key(), "getItem");
        let op = registry.operation(&key()).unwrap();
        assert_eq!(op.summary.as_deref(), Some("Fetch one item"));
        assert_eq!(op.description.as_deref(), Some("Longer text"));
        assert_eq!(op.operation_id.as_deref(), Some("getItem"));
    }
}
