//! The route resolution pass.
//!
//! Binds registry accumulators (keyed by logical endpoint name) to the
//! host router's physical URL templates and materializes the document.

use std::collections::BTreeMap;

use crate::error::SpecError;
use crate::model::{Info, Operation, SpecDocument};
use crate::path::normalize_rule;
use crate::registry::Registry;

/// One entry of the host router's table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlRoute {
    /// Raw template, e.g. `/users/<int:id>`.
    pub rule: String,
    /// Qualified endpoint identifier, e.g. `shop.widget`.
    pub endpoint: String,
    /// Internal routes are exempt from the unmatched-route check.
    pub documented: bool,
}

impl UrlRoute {
    pub fn new(rule: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            endpoint: endpoint.into(),
            documented: true,
        }
    }

    /// A framework-internal route that never appears in the document.
    pub fn internal(rule: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            documented: false,
            ..Self::new(rule, endpoint)
        }
    }
}

/// Something that can list its URL routes.
pub trait RouteTable {
    fn url_routes(&self) -> Vec<UrlRoute>;
}

impl RouteTable for [UrlRoute] {
    fn url_routes(&self) -> Vec<UrlRoute> {
        self.to_vec()
    }
}

impl RouteTable for Vec<UrlRoute> {
    fn url_routes(&self) -> Vec<UrlRoute> {
        self.clone()
    }
}

/// Document-level metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentInfo {
    pub openapi: String,
    pub title: String,
    pub version: String,
}

impl Registry {
    /// Materialize the document for `routes`.
    ///
    /// The registry is not mutated, so resolving twice yields identical
    /// documents.
    pub fn resolve(
        &self,
        routes: &dyn RouteTable,
        info: &DocumentInfo,
    ) -> Result<SpecDocument, SpecError> {
        let routes = routes.url_routes();

        // Remaps apply to a snapshot of the keys, before any matching.
        let entries: Vec<(String, &str, &Operation)> = self
            .operations()
            .map(|(key, op)| (self.qualified_name(key.endpoint()), key.method(), op))
            .collect();

        let mut matched = vec![false; entries.len()];
        let mut paths: BTreeMap<String, BTreeMap<String, Operation>> = BTreeMap::new();

        for route in &routes {
            let mut url: Option<String> = None;

            for (index, (name, method, op)) in entries.iter().enumerate() {
                if name != &route.endpoint {
                    continue;
                }
                let path = match url.take() {
                    Some(path) => path,
                    None => normalize_rule(&route.rule)?,
                };
                url = Some(path.clone());
                matched[index] = true;

                let methods = paths.entry(path.clone()).or_default();
                match methods.get_mut(*method) {
                    Some(existing) => {
                        tracing::warn!(
                            path = %path,
                            method = *method,
                            endpoint = %route.endpoint,
                            "two operations resolve to the same path and method; merging in registration order"
                        );
                        existing.merge((*op).clone());
                    }
                    None => {
                        methods.insert(method.to_string(), (*op).clone());
                    }
                }
            }

            if url.is_none() && route.documented {
                return Err(SpecError::UnmatchedRoute {
                    rule: route.rule.clone(),
                    endpoint: route.endpoint.clone(),
                });
            }
        }

        if let Some(index) = matched.iter().position(|m| !m) {
            let (name, method, _) = &entries[index];
            return Err(SpecError::UnresolvedEndpoint {
                endpoint: name.clone(),
                method: method.to_string(),
            });
        }

        let operations: usize = paths.values().map(BTreeMap::len).sum();
        tracing::debug!(
            paths = paths.len(),
            operations,
            components = self.components().schemas.len(),
            "spec document resolved"
        );

        Ok(SpecDocument {
            openapi: info.openapi.clone(),
            info: Info {
                title: info.title.clone(),
                version: info.version.clone(),
            },
            paths,
            components: self.components().clone(),
            tags: self.tags().to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ParameterLocation, Tag};
    use crate::registry::EndpointKey;
    use crate::schema::SchemaDescriptor;
    use serde_json::json;

    const JSON: &[&str] = &["application/json"];

    fn info() -> DocumentInfo {
        DocumentInfo {
            openapi: "3.0.2".into(),
            title: "Flask RESTAPI".into(),
            version: "0.1.0".into(),
        }
    }

    fn item_path() -> SchemaDescriptor {
        SchemaDescriptor::titled("ItemPath").field("id", json!({"type": "integer"}), true)
    }

    fn item_query() -> SchemaDescriptor {
        SchemaDescriptor::titled("ItemQuery")
            .field("page", json!({"type": "integer"}), false)
            .field("size", json!({"type": "integer"}), false)
    }

    fn item() -> SchemaDescriptor {
        SchemaDescriptor::titled("Item")
            .field("id", json!({"type": "integer"}), true)
            .field("name", json!({"type": "string"}), true)
    }

    fn items_registry() -> Registry {
        let mut registry = Registry::new();
        let key = EndpointKey::new("items", "get");
        registry
            .register_parameters(ParameterLocation::Path, &item_path(), &key, None)
            .unwrap();
        registry
            .register_parameters(ParameterLocation::Query, &item_query(), &key, None)
            .unwrap();
        registry.register_response(200, &item(), &key, JSON).unwrap();
        registry
    }

    #[test]
    fn items_endpoint_resolves_to_normalized_path() {
        let registry = items_registry();
        let routes = vec![UrlRoute::new("/items/<int:id>", "items")];
        let doc = registry.resolve(&routes, &info()).unwrap();

        assert_eq!(doc.paths.len(), 1);
        let op = doc.operation("/items/{id}", "GET").unwrap();
        let params: Vec<_> = op
            .parameters
            .as_ref()
            .unwrap()
            .iter()
            .map(|p| (p.name.as_str(), p.location.to_string(), p.required))
            .collect();
        assert_eq!(
            params,
            vec![
                ("id", "path".to_string(), true),
                ("page", "query".to_string(), false),
                ("size", "query".to_string(), false),
            ]
        );
        let responses = op.responses.as_ref().unwrap();
        assert_eq!(
            responses["200"].content["application/json"].schema.reference,
            "#/components/schemas/Item"
        );
        assert!(doc.components.schemas.contains_key("Item"));
        assert_eq!(doc.openapi, "3.0.2");
        assert_eq!(doc.info.title, "Flask RESTAPI");
    }

    #[test]
    fn blueprint_remap_matches_qualified_endpoint() {
        let mut registry = Registry::new();
        let key = EndpointKey::new("widget", "post");
        registry.register_body(&item(), &key, JSON, None).unwrap();
        registry.record_blueprint("widget", "shop");

        let routes = vec![UrlRoute::new("/shop/widgets", "shop.widget")];
        let doc = registry.resolve(&routes, &info()).unwrap();
        assert!(doc.operation("/shop/widgets", "post").is_some());

        // The registry keeps the logical name.
        assert!(registry.operation(&key).is_some());
    }

    #[test]
    fn first_remap_wins() {
        let mut registry = Registry::new();
        registry.touch(&EndpointKey::new("widget", "get"));
        registry.record_blueprint("widget", "shop");
        registry.record_blueprint("widget", "store");

        let routes = vec![UrlRoute::new("/shop/widgets", "shop.widget")];
        assert!(registry.resolve(&routes, &info()).is_ok());
    }

    #[test]
    fn resolving_twice_is_byte_identical() {
        let mut registry = items_registry();
        registry.record_blueprint("items", "shop");
        let routes = vec![UrlRoute::new("/shop/items/<int:id>", "shop.items")];

        let first = registry.resolve(&routes, &info()).unwrap().to_json().unwrap();
        let second = registry.resolve(&routes, &info()).unwrap().to_json().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn annotated_endpoint_without_route_fails() {
        let registry = items_registry();
        let routes: Vec<UrlRoute> = Vec::new();
        let err = registry.resolve(&routes, &info()).unwrap_err();
        assert_eq!(
            err,
            SpecError::UnresolvedEndpoint {
                endpoint: "items".into(),
                method: "get".into(),
            }
        );
    }

    #[test]
    fn documented_route_without_annotations_fails() {
        let registry = items_registry();
        let routes = vec![
            UrlRoute::new("/items/<int:id>", "items"),
            UrlRoute::new("/orphans", "orphans"),
        ];
        let err = registry.resolve(&routes, &info()).unwrap_err();
        assert!(matches!(
            err,
            SpecError::UnmatchedRoute { ref endpoint, .. } if endpoint == "orphans"
        ));
    }

    #[test]
    fn internal_routes_are_exempt() {
        let registry = items_registry();
        let routes = vec![
            UrlRoute::new("/items/<int:id>", "items"),
            UrlRoute::internal("/api/spec.json", "openapi.spec"),
            UrlRoute::internal("/static/<path:filename>", "static"),
        ];
        let doc = registry.resolve(&routes, &info()).unwrap();
        assert_eq!(doc.paths.len(), 1);
    }

    #[test]
    fn malformed_template_fails() {
        let registry = items_registry();
        let routes = vec![UrlRoute::new("/items/<int:id", "items")];
        let err = registry.resolve(&routes, &info()).unwrap_err();
        assert!(matches!(err, SpecError::MalformedRule { .. }));
    }

    #[test]
    fn document_tags_are_deduplicated() {
        let mut registry = Registry::new();
        let tag = Tag::new("items", "Item operations");
        let get = EndpointKey::new("items", "get");
        let post = EndpointKey::new("items", "post");
        registry
            .register_parameters(ParameterLocation::Path, &item_path(), &get, Some(&tag))
            .unwrap();
        registry.register_body(&item(), &post, JSON, Some(&tag)).unwrap();

        let routes = vec![UrlRoute::new("/items/<int:id>", "items")];
        let doc = registry.resolve(&routes, &info()).unwrap();
        assert_eq!(doc.tags.len(), 1);
        let value = doc.to_value();
        assert_eq!(value["paths"]["/items/{id}"]["get"]["tags"], json!(["items"]));
        assert_eq!(value["paths"]["/items/{id}"]["post"]["tags"], json!(["items"]));
    }

    #[test]
    fn auth_is_published_once() {
        let mut registry = Registry::new();
        registry.register_auth(&EndpointKey::new("a", "get"));
        registry.register_auth(&EndpointKey::new("b", "get"));
        let routes = vec![UrlRoute::new("/a", "a"), UrlRoute::new("/b", "b")];
        let value = registry.resolve(&routes, &info()).unwrap().to_value();
        assert_eq!(
            value["components"]["securitySchemes"],
            json!({"bearerAuth": {"type": "http", "scheme": "bearer", "bearerFormat": "JWT"}})
        );
        assert_eq!(value["paths"]["/a"]["get"]["security"], json!([{"bearerAuth": []}]));
    }

    #[test]
    fn colliding_operations_merge_in_registration_order() {
        let mut registry = Registry::new();
        let first = EndpointKey::new("first", "get");
        let second = EndpointKey::new("second", "get");
        registry.register_summary(&first, "from first");
        registry.register_response(200, &item(), &first, JSON).unwrap();
        registry.register_summary(&second, "from second");

        let routes = vec![
            UrlRoute::new("/things", "first"),
            UrlRoute::new("/things", "second"),
        ];
        let doc = registry.resolve(&routes, &info()).unwrap();
        let op = doc.operation("/things", "get").unwrap();
        assert_eq!(op.summary.as_deref(), Some("from second"));
        // Fields the later operation lacks survive.
        assert!(op.responses.as_ref().unwrap().contains_key("200"));
    }

    #[test]
    fn null_fields_are_omitted() {
        let mut registry = Registry::new();
        registry.touch(&EndpointKey::new("ping", "get"));
        let routes = vec![UrlRoute::new("/ping", "ping")];
        let value = registry.resolve(&routes, &info()).unwrap().to_value();
        assert_eq!(value["paths"]["/ping"]["get"], json!({}));
        assert!(value["components"].get("securitySchemes").is_none());
    }
}
