//! Namespaced groups of routes.

use crate::operation::Operation;

/// A named collection of operations mounted under a common URL prefix.
///
/// Registering a blueprint records a remap for each of its endpoints, so an
/// operation defined as `widget` is matched against the routing identifier
/// `shop.widget`.
#[derive(Debug, Clone)]
pub struct Blueprint {
    name: String,
    url_prefix: String,
    pub(crate) routes: Vec<(String, Operation)>,
}

impl Blueprint {
    pub fn new(name: impl Into<String>, url_prefix: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url_prefix: url_prefix.into(),
            routes: Vec::new(),
        }
    }

    /// Serve `operation` at `rule`, relative to the prefix.
    pub fn route(mut self, rule: impl Into<String>, operation: Operation) -> Self {
        self.routes.push((rule.into(), operation));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url_prefix(&self) -> &str {
        &self.url_prefix
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
