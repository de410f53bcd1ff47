//! The application façade.
//!
//! [`Api`] owns the document registry, the route table handed to the
//! resolution pass, the token codec and the error translator. Operations are
//! defined through [`Api::operation`], mounted with [`Api::route`] or a
//! [`Blueprint`], and turned into an axum [`Router`] by [`Api::into_router`].

use std::collections::{BTreeMap, BTreeSet};

use axum::{
    extract::{rejection::RawPathParamsRejection, RawPathParams, Request},
    http::Method,
    routing::{MethodFilter, MethodRouter},
    Router,
};
use tower_http::trace::TraceLayer;

use parapet_spec::{
    derive_endpoint_name, join_rule, normalize_path, normalize_rule, rewrite_rule, Registry,
    SpecDocument, UrlRoute,
};
use parapet_telemetry::log_spec_resolved;

use crate::blueprint::Blueprint;
use crate::config::ApiConfig;
use crate::docs::{docs_route, spec_route};
use crate::error::{ApiError, ErrorTranslator};
use crate::operation::{Operation, OperationBuilder};
use crate::pipeline::Runtime;
use crate::token::TokenCodec;

const SPEC_ENDPOINT: &str = "parapet.spec";
const DOCS_ENDPOINT: &str = "parapet.docs";

/// An annotated HTTP API.
pub struct Api {
    config: ApiConfig,
    registry: Registry,
    routes: Vec<UrlRoute>,
    tokens: TokenCodec,
    errors: ErrorTranslator,
    /// Router path -> operations served there.
    operations: BTreeMap<String, Vec<(MethodFilter, Operation)>>,
    /// Router path -> undocumented handlers, which own their path.
    raw: BTreeMap<String, MethodRouter>,
    mounted: BTreeSet<(String, String)>,
    /// Route shape (placeholders blanked) -> the router path that owns it.
    shapes: BTreeMap<String, String>,
    /// Router paths of the spec and docs endpoints.
    reserved: BTreeSet<String>,
    document: Option<SpecDocument>,
}

impl Api {
    /// Create an empty API.
    ///
    /// `spec_url` and `swagger_ui_url` are normalized to absolute paths and
    /// must differ.
    pub fn new(mut config: ApiConfig) -> Result<Self, ApiError> {
        let tokens = TokenCodec::from_config(&config)?;
        config.spec_url = normalize_path(&config.spec_url);
        config.swagger_ui_url = normalize_path(&config.swagger_ui_url);

        let mut api = Self {
            config,
            registry: Registry::new(),
            routes: Vec::new(),
            tokens,
            errors: ErrorTranslator,
            operations: BTreeMap::new(),
            raw: BTreeMap::new(),
            mounted: BTreeSet::new(),
            shapes: BTreeMap::new(),
            reserved: BTreeSet::new(),
            document: None,
        };
        for url in [api.config.spec_url.clone(), api.config.swagger_ui_url.clone()] {
            let path = router_path(&url)?;
            api.claim(&url, &path, "GET")?;
            api.reserved.insert(path);
        }
        Ok(api)
    }

    /// Start defining the operation for `endpoint` and `method`.
    pub fn operation(&mut self, endpoint: &str, method: Method) -> OperationBuilder<'_> {
        OperationBuilder::new(&mut self.registry, endpoint, method)
    }

    /// Like [`Api::operation`], with the endpoint named after `T`.
    ///
    /// `shop::views::ItemView` becomes `itemview`.
    pub fn resource<T: ?Sized>(&mut self, method: Method) -> OperationBuilder<'_> {
        let endpoint = derive_endpoint_name(std::any::type_name::<T>());
        OperationBuilder::new(&mut self.registry, &endpoint, method)
    }

    /// Serve `operation` at `rule` (e.g. `/items/<int:id>`).
    pub fn route(&mut self, rule: &str, operation: Operation) -> Result<&mut Self, ApiError> {
        let rule = normalize_path(rule);
        let route = UrlRoute::new(rule.clone(), operation.endpoint());
        self.mount(&rule, operation, route)?;
        Ok(self)
    }

    /// Serve a plain axum handler that is left out of the document.
    pub fn route_undocumented(
        &mut self,
        rule: &str,
        handler: MethodRouter,
    ) -> Result<&mut Self, ApiError> {
        let rule = normalize_path(rule);
        let path = router_path(&rule)?;
        self.claim(&rule, &path, "*")?;
        if self.operations.contains_key(&path) || self.raw.contains_key(&path) {
            return Err(ApiError::DuplicateRoute {
                path: normalize_rule(&rule)?,
                method: "*".to_string(),
            });
        }
        self.raw.insert(path.clone(), handler);
        self.push_route(UrlRoute::internal(rule, format!("undocumented:{path}")));
        Ok(self)
    }

    /// Mount every route of `blueprint` under its prefix.
    pub fn register_blueprint(&mut self, blueprint: Blueprint) -> Result<&mut Self, ApiError> {
        tracing::debug!(
            blueprint = blueprint.name(),
            prefix = blueprint.url_prefix(),
            routes = blueprint.len(),
            "registering blueprint"
        );
        for (rule, operation) in &blueprint.routes {
            self.registry
                .record_blueprint(operation.endpoint(), blueprint.name());
            let rule = join_rule(blueprint.url_prefix(), rule);
            let route = UrlRoute::new(
                rule.clone(),
                format!("{}.{}", blueprint.name(), operation.endpoint()),
            );
            self.mount(&rule, operation.clone(), route)?;
        }
        Ok(self)
    }

    /// Record that `endpoint` is routed as `{blueprint}.{endpoint}`.
    pub fn bp_map(&mut self, blueprint: &str, endpoint: &str) -> &mut Self {
        self.registry.record_blueprint(endpoint, blueprint);
        self
    }

    pub fn tokens(&self) -> &TokenCodec {
        &self.tokens
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Run the resolution pass.
    ///
    /// Can be called any number of times; without new definitions in between
    /// the result is identical.
    pub fn resolve(&mut self) -> Result<&SpecDocument, ApiError> {
        let document = self.build_document()?;
        Ok(&*self.document.insert(document))
    }

    /// The last resolved document.
    pub fn document(&self) -> Option<&SpecDocument> {
        self.document.as_ref()
    }

    /// Resolve the document and build the router.
    ///
    /// Fails instead of serving an incomplete document.
    pub fn into_router(self) -> Result<Router, ApiError> {
        let document = self.build_document()?;

        let runtime = Runtime {
            max_body_size: self.config.max_body_size,
            errors: self.errors,
        };

        let mut router = Router::new()
            .route(&router_path(&self.config.spec_url)?, spec_route(&document)?)
            .route(
                &router_path(&self.config.swagger_ui_url)?,
                docs_route(&self.config.spec_url, &self.config.api_title),
            );

        for (path, operations) in self.operations {
            let mut method_router = MethodRouter::new();
            for (filter, operation) in operations {
                let runtime = runtime.clone();
                let pipeline = operation.pipeline.clone();
                method_router = method_router.on(
                    filter,
                    move |captures: Result<RawPathParams, RawPathParamsRejection>,
                          request: Request| async move {
                        let path = captures
                            .map(|params| {
                                params
                                    .iter()
                                    .map(|(k, v)| (k.to_string(), v.to_string()))
                                    .collect()
                            })
                            .unwrap_or_default();
                        pipeline.run(&runtime, path, request).await
                    },
                );
            }
            router = router.route(&path, method_router);
        }

        for (path, handler) in self.raw {
            router = router.route(&path, handler);
        }

        Ok(router.layer(TraceLayer::new_for_http()))
    }

    fn build_document(&self) -> Result<SpecDocument, ApiError> {
        let mut routes = self.routes.clone();
        routes.push(UrlRoute::internal(&self.config.spec_url, SPEC_ENDPOINT));
        routes.push(UrlRoute::internal(&self.config.swagger_ui_url, DOCS_ENDPOINT));

        let document = self
            .registry
            .resolve(&routes, &self.config.document_info())?;
        log_spec_resolved!(
            title = %document.info.title,
            paths = document.paths.len(),
            schemas = document.components.schemas.len(),
            "OpenAPI document resolved"
        );
        Ok(document)
    }

    fn mount(&mut self, rule: &str, operation: Operation, route: UrlRoute) -> Result<(), ApiError> {
        let path = router_path(rule)?;
        let method = operation.method().clone();
        let filter = MethodFilter::try_from(method.clone())
            .map_err(|_| ApiError::UnsupportedMethod(method.to_string()))?;
        self.claim(rule, &path, method.as_str())?;

        if self.raw.contains_key(&path)
            || !self.mounted.insert((path.clone(), method.to_string()))
        {
            return Err(ApiError::DuplicateRoute {
                path: normalize_rule(rule)?,
                method: method.to_string(),
            });
        }

        tracing::debug!(
            rule,
            method = %method,
            endpoint = operation.endpoint(),
            "route mounted"
        );
        self.operations
            .entry(path)
            .or_default()
            .push((filter, operation));
        self.push_route(route);
        Ok(())
    }

    /// Reserve `path` for `rule`.
    ///
    /// axum refuses two routes that differ only by placeholder names, and
    /// the spec and docs endpoints own their paths outright.
    fn claim(&mut self, rule: &str, path: &str, method: &str) -> Result<(), ApiError> {
        if self.reserved.contains(path) {
            return Err(ApiError::DuplicateRoute {
                path: normalize_rule(rule)?,
                method: method.to_string(),
            });
        }
        let shape = route_shape(rule)?;
        match self.shapes.get(&shape) {
            Some(existing) if existing != path => Err(ApiError::ConflictingRoute {
                path: normalize_rule(rule)?,
                existing: existing.clone(),
            }),
            Some(_) => Ok(()),
            None => {
                self.shapes.insert(shape, path.to_string());
                Ok(())
            }
        }
    }

    /// One table entry per rule and endpoint, however many methods share it.
    fn push_route(&mut self, route: UrlRoute) {
        if !self.routes.contains(&route) {
            self.routes.push(route);
        }
    }
}

impl std::fmt::Debug for Api {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Api")
            .field("title", &self.config.api_title)
            .field("routes", &self.routes.len())
            .field("operations", &self.registry.len())
            .finish_non_exhaustive()
    }
}

/// Convert a route template to axum's syntax.
///
/// `path` converters match the rest of the URL.
fn router_path(rule: &str) -> Result<String, ApiError> {
    Ok(rewrite_rule(rule, |converter, name| match converter {
        Some("path") => format!("{{*{name}}}"),
        _ => format!("{{{name}}}"),
    })?)
}

/// A rule with every placeholder blanked, so `/a/<int:id>` and `/a/<name>`
/// compare equal.
fn route_shape(rule: &str) -> Result<String, ApiError> {
    Ok(rewrite_rule(rule, |_, _| "{}".to_string())?)
}
