//! Operation definitions.
//!
//! An [`OperationBuilder`] records every annotation into the document
//! registry as soon as it is called, and appends the matching request-time
//! step. [`OperationBuilder::handle`] closes the definition.

use std::future::Future;
use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use futures_util::future::BoxFuture;
use serde::Serialize;

use parapet_spec::{EndpointKey, ParameterLocation, Registry, Schema, SchemaDescriptor, Tag};
use parapet_validator::{validation_error_schema, SchemaValidator};

use crate::error::{ApiError, ApiException};
use crate::params::Parameters;
use crate::pipeline::{HandlerFn, HandlerOutput, Pipeline, Source, Step};
use crate::reply::Reply;

const JSON: &[&str] = &["application/json"];
const MULTIPART: &[&str] = &["multipart/form-data"];

/// A finished operation, ready to be mounted on a route.
#[derive(Clone)]
pub struct Operation {
    pub(crate) key: EndpointKey,
    pub(crate) method: Method,
    pub(crate) pipeline: Arc<Pipeline>,
}

impl Operation {
    /// The logical endpoint name.
    pub fn endpoint(&self) -> &str {
        self.key.endpoint()
    }

    pub fn method(&self) -> &Method {
        &self.method
    }
}

impl std::fmt::Debug for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operation")
            .field("endpoint", &self.key.endpoint())
            .field("method", &self.method)
            .field("steps", &self.pipeline.steps.len())
            .finish()
    }
}

/// Builder returned by [`Api::operation`](crate::Api::operation).
///
/// The first failing annotation is kept and reported by `handle`.
pub struct OperationBuilder<'a> {
    registry: &'a mut Registry,
    key: EndpointKey,
    method: Method,
    steps: Vec<Step>,
    status: Option<StatusCode>,
    headers: Vec<(HeaderName, HeaderValue)>,
    error: Option<ApiError>,
}

impl<'a> OperationBuilder<'a> {
    pub(crate) fn new(registry: &'a mut Registry, endpoint: &str, method: Method) -> Self {
        let key = EndpointKey::new(endpoint, method.as_str());
        registry.touch(&key);
        Self {
            registry,
            key,
            method,
            steps: Vec::new(),
            status: None,
            headers: Vec::new(),
            error: None,
        }
    }

    /// Validate request headers against `S`.
    pub fn header<S: Schema>(self) -> Self {
        self.parameters::<S>(ParameterLocation::Header, Source::Header)
    }

    /// Validate path captures against `S`.
    pub fn path<S: Schema>(self) -> Self {
        self.parameters::<S>(ParameterLocation::Path, Source::Path)
    }

    /// Validate the query string against `S`.
    pub fn query<S: Schema>(self) -> Self {
        self.parameters::<S>(ParameterLocation::Query, Source::Query)
    }

    /// Validate a JSON body against `S`.
    pub fn body<S: Schema>(self) -> Self {
        self.body_as::<S>(JSON)
    }

    pub fn body_as<S: Schema>(self, content_types: &[&str]) -> Self {
        self.payload::<S>(content_types, Source::Body)
    }

    /// Validate a multipart form against `S`.
    pub fn form<S: Schema>(self) -> Self {
        self.form_as::<S>(MULTIPART)
    }

    pub fn form_as<S: Schema>(self, content_types: &[&str]) -> Self {
        self.payload::<S>(content_types, Source::Form)
    }

    /// Require a bearer token and bind it to [`Parameters::auth`].
    pub fn auth(mut self) -> Self {
        self.registry.register_auth(&self.key);
        self.steps.push(Step::Auth);
        self
    }

    /// Document a JSON response and the default 422.
    pub fn response<S: Schema>(self, code: u16) -> Self {
        self.response_with::<S>(code, JSON, true)
    }

    /// Document a response.
    ///
    /// The first documented code becomes the success status.
    pub fn response_with<S: Schema>(
        mut self,
        code: u16,
        content_types: &[&str],
        default_validation_error: bool,
    ) -> Self {
        let status = match StatusCode::from_u16(code) {
            Ok(status) => status,
            Err(_) => return self.fail(ApiError::InvalidStatus(code)),
        };
        let result = self
            .registry
            .register_response(code, &S::describe(), &self.key, content_types)
            .and_then(|()| {
                if default_validation_error {
                    self.registry.register_response(
                        422,
                        &validation_error_schema(),
                        &self.key,
                        content_types,
                    )
                } else {
                    Ok(())
                }
            });
        if let Err(e) = result {
            return self.fail(e.into());
        }
        self.status.get_or_insert(status);
        self
    }

    /// Add a header to every successful response.
    pub fn response_header(mut self, name: &str, value: &str) -> Self {
        let parsed = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| e.to_string())
            .and_then(|n| {
                HeaderValue::from_str(value)
                    .map(|v| (n, v))
                    .map_err(|e| e.to_string())
            });
        match parsed {
            Ok(header) => {
                self.headers.push(header);
                self
            }
            Err(reason) => self.fail(ApiError::InvalidHeader {
                name: name.to_string(),
                reason,
            }),
        }
    }

    pub fn tag(mut self, tag: Tag) -> Self {
        self.registry.register_tag(&self.key, &tag);
        self
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.registry.register_summary(&self.key, summary);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.registry.register_description(&self.key, description);
        self
    }

    pub fn operation_id(mut self, operation_id: impl Into<String>) -> Self {
        self.registry.register_operation_id(&self.key, operation_id);
        self
    }

    /// Attach the handler and finish the definition.
    pub fn handle<F, Fut, R>(self, handler: F) -> Result<Operation, ApiError>
    where
        F: Fn(Parameters) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, ApiException>> + Send + 'static,
        R: Serialize + Send + 'static,
    {
        self.handle_reply(move |params| {
            let fut = handler(params);
            async move { fut.await.map(Reply::new) }
        })
    }

    /// Like [`handle`](Self::handle), for handlers that set response headers.
    ///
    /// Headers in the [`Reply`] are applied after `response_header` entries.
    pub fn handle_reply<F, Fut, R>(self, handler: F) -> Result<Operation, ApiError>
    where
        F: Fn(Parameters) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Reply<R>, ApiException>> + Send + 'static,
        R: Serialize + Send + 'static,
    {
        if let Some(error) = self.error {
            return Err(error);
        }

        let handler: HandlerFn = Arc::new(
            move |params: Parameters| -> BoxFuture<'static, Result<HandlerOutput, ApiException>> {
                let fut = handler(params);
                Box::pin(async move {
                    let reply = fut.await?;
                    let value = serde_json::to_value(reply.body).map_err(|e| {
                        ApiException::internal(format!("response does not serialize: {e}"))
                    })?;
                    Ok((value, reply.headers))
                })
            },
        );

        tracing::debug!(
            endpoint = self.key.endpoint(),
            method = %self.method,
            steps = self.steps.len(),
            "operation defined"
        );

        Ok(Operation {
            pipeline: Arc::new(Pipeline {
                endpoint: self.key.endpoint().to_string(),
                steps: self.steps,
                status: self.status.unwrap_or(StatusCode::OK),
                headers: self.headers,
                handler,
            }),
            key: self.key,
            method: self.method,
        })
    }

    fn parameters<S: Schema>(mut self, location: ParameterLocation, source: Source) -> Self {
        let descriptor = S::describe();
        if let Err(e) = self
            .registry
            .register_parameters(location, &descriptor, &self.key, None)
        {
            return self.fail(e.into());
        }
        self.validated(&descriptor, source)
    }

    fn payload<S: Schema>(mut self, content_types: &[&str], source: Source) -> Self {
        let descriptor = S::describe();
        if let Err(e) = self
            .registry
            .register_body(&descriptor, &self.key, content_types, None)
        {
            return self.fail(e.into());
        }
        self.validated(&descriptor, source)
    }

    fn validated(mut self, descriptor: &SchemaDescriptor, source: Source) -> Self {
        match SchemaValidator::new(descriptor) {
            Ok(validator) => {
                self.steps.push(Step::Validate {
                    source,
                    validator: Arc::new(validator),
                });
                self
            }
            Err(e) => self.fail(e.into()),
        }
    }

    fn fail(mut self, error: ApiError) -> Self {
        if self.error.is_none() {
            tracing::warn!(endpoint = self.key.endpoint(), error = %error, "annotation failed");
            self.error = Some(error);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct ItemPath;

    impl Schema for ItemPath {
        fn describe() -> SchemaDescriptor {
            SchemaDescriptor::titled("ItemPath").field("id", json!({"type": "integer"}), true)
        }
    }

    struct Item;

    impl Schema for Item {
        fn describe() -> SchemaDescriptor {
            SchemaDescriptor::titled("Item").field("name", json!({"type": "string"}), true)
        }
    }

    struct Untitled;

    impl Schema for Untitled {
        fn describe() -> SchemaDescriptor {
            SchemaDescriptor::anonymous().field("x", json!({"type": "string"}), true)
        }
    }

    async fn ok(_: Parameters) -> Result<serde_json::Value, ApiException> {
        Ok(json!({}))
    }

    #[test]
    fn annotations_register_at_definition_time() {
        let mut registry = Registry::new();
        let op = OperationBuilder::new(&mut registry, "items", Method::GET)
            .path::<ItemPath>()
            .response::<Item>(201)
            .summary("Fetch")
            .handle(ok)
            .unwrap();

        assert_eq!(op.pipeline.status, StatusCode::CREATED);
        let key = EndpointKey::new("items", "get");
        let spec_op = registry.operation(&key).unwrap();
        let responses = spec_op.responses.as_ref().unwrap();
        assert!(responses.contains_key("201"));
        assert!(responses.contains_key("422"));
        assert_eq!(spec_op.summary.as_deref(), Some("Fetch"));
        assert!(registry.components().schemas.contains_key("ValidationErrorResponses"));
    }

    #[test]
    fn default_validation_error_can_be_skipped() {
        let mut registry = Registry::new();
        OperationBuilder::new(&mut registry, "items", Method::GET)
            .response_with::<Item>(200, &["application/json"], false)
            .handle(ok)
            .unwrap();
        let key = EndpointKey::new("items", "get");
        let responses = registry.operation(&key).unwrap().responses.clone().unwrap();
        assert_eq!(responses.len(), 1);
    }

    #[test]
    fn untitled_schema_fails_the_definition() {
        let mut registry = Registry::new();
        let err = OperationBuilder::new(&mut registry, "items", Method::POST)
            .body::<Untitled>()
            .response::<Item>(200)
            .handle(ok)
            .unwrap_err();
        assert!(matches!(err, ApiError::Spec(parapet_spec::SpecError::MissingTitle { .. })));
    }

    #[test]
    fn bad_response_header_fails_the_definition() {
        let mut registry = Registry::new();
        let err = OperationBuilder::new(&mut registry, "items", Method::GET)
            .response_header("bad header", "x")
            .handle(ok)
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidHeader { .. }));
    }

    #[test]
    fn auth_marks_the_operation() {
        let mut registry = Registry::new();
        OperationBuilder::new(&mut registry, "me", Method::GET)
            .auth()
            .handle(ok)
            .unwrap();
        let key = EndpointKey::new("me", "get");
        assert!(registry.operation(&key).unwrap().security.is_some());
    }
}
