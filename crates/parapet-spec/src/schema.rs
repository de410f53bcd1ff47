//! Structural descriptions of user data types.

use std::collections::BTreeSet;

use serde_json::{json, Map, Value};

/// Prefix for component schema references.
pub const COMPONENT_REF_PREFIX: &str = "#/components/schemas/";

/// A data type that can describe its own shape.
///
/// Implementations must be pure: calling [`Schema::describe`] twice yields
/// structurally equal descriptors.
pub trait Schema {
    fn describe() -> SchemaDescriptor;
}

/// The structural description of one data type.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SchemaDescriptor {
    title: Option<String>,
    description: Option<String>,
    properties: Vec<(String, Value)>,
    required: BTreeSet<String>,
}

impl SchemaDescriptor {
    /// A descriptor that can be stored as a named component.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    /// A descriptor without a title. The registry refuses these.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Append a property. Properties keep insertion order.
    ///
    /// Redefining a field replaces both its schema and its requiredness.
    pub fn field(mut self, name: impl Into<String>, schema: Value, required: bool) -> Self {
        let name = name.into();
        if required {
            self.required.insert(name.clone());
        } else {
            self.required.remove(&name);
        }
        self.properties.retain(|(existing, _)| existing != &name);
        self.properties.push((name, schema));
        self
    }

    /// Adapt an existing JSON Schema object.
    ///
    /// Properties are taken in the order the object yields them.
    pub fn from_json_schema(schema: &Value) -> Self {
        let title = schema
            .get("title")
            .and_then(Value::as_str)
            .map(str::to_string);
        let description = schema
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string);
        let properties = schema
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| props.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        let required = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|names| {
                names
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            title,
            description,
            properties,
            required,
        }
    }

    /// The component title, if one is set and non-empty.
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref().filter(|t| !t.is_empty())
    }

    pub fn description_text(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn properties(&self) -> &[(String, Value)] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, schema)| schema)
    }

    pub fn required(&self) -> &BTreeSet<String> {
        &self.required
    }

    pub fn is_required(&self, name: &str) -> bool {
        self.required.contains(name)
    }

    /// `#/components/schemas/{title}`, if titled.
    pub fn reference(&self) -> Option<String> {
        self.title().map(|t| format!("{COMPONENT_REF_PREFIX}{t}"))
    }

    /// The canonical JSON Schema object stored in the component table.
    pub fn to_json_schema(&self) -> Value {
        let mut obj = Map::new();
        if let Some(title) = self.title() {
            obj.insert("title".into(), Value::String(title.to_string()));
        }
        if let Some(description) = &self.description {
            obj.insert("description".into(), Value::String(description.clone()));
        }
        obj.insert("type".into(), json!("object"));

        let properties: Map<String, Value> = self.properties.iter().cloned().collect();
        obj.insert("properties".into(), Value::Object(properties));

        if !self.required.is_empty() {
            let required: Vec<Value> = self
                .properties
                .iter()
                .filter(|(name, _)| self.required.contains(name))
                .map(|(name, _)| Value::String(name.clone()))
                .collect();
            obj.insert("required".into(), Value::Array(required));
        }

        Value::Object(obj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> SchemaDescriptor {
        SchemaDescriptor::titled("Item")
            .field("id", json!({"type": "integer"}), true)
            .field("name", json!({"type": "string"}), false)
    }

    #[test]
    fn fields_keep_insertion_order() {
        let names: Vec<_> = item().properties().iter().map(|(n, _)| n.clone()).collect();
        assert_eq!(names, vec!["id", "name"]);
    }

    #[test]
    fn redefining_a_field_replaces_it() {
        let d = item().field("id", json!({"type": "string"}), true);
        assert_eq!(d.properties().len(), 2);
        assert_eq!(d.property("id"), Some(&json!({"type": "string"})));
    }

    #[test]
    fn json_schema_round_trip_keeps_shape() {
        let original = item().description("A thing");
        let adapted = SchemaDescriptor::from_json_schema(&original.to_json_schema());
        assert_eq!(adapted.title(), Some("Item"));
        assert_eq!(adapted.description_text(), Some("A thing"));
        assert!(adapted.is_required("id"));
        assert!(!adapted.is_required("name"));
        assert_eq!(adapted.properties().len(), 2);
    }

    #[test]
    fn redefined_field_can_become_optional() {
        let descriptor = SchemaDescriptor::titled("Item")
            .field("id", json!({"type": "integer"}), true)
            .field("id", json!({"type": "string"}), false);
        assert!(!descriptor.is_required("id"));
        assert!(descriptor.to_json_schema().get("required").is_none());
    }

    #[test]
    fn canonical_schema_omits_empty_required() {
        let d = SchemaDescriptor::titled("Empty").field("x", json!({"type": "string"}), false);
        let schema = d.to_json_schema();
        assert!(schema.get("required").is_none());
        assert_eq!(schema["type"], "object");
    }

    #[test]
    fn empty_title_counts_as_missing() {
        assert_eq!(SchemaDescriptor::titled("").title(), None);
        assert_eq!(SchemaDescriptor::anonymous().reference(), None);
        assert_eq!(
            item().reference().as_deref(),
            Some("#/components/schemas/Item")
        );
    }
}
