//! Application exceptions and startup errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use parapet_spec::SpecError;
use parapet_telemetry::{log_api_exception, log_validation_failure};
use parapet_validator::{ValidationErrors, ValidatorError};

use crate::token::TokenError;

/// An error a handler returns to produce a non-2xx response.
///
/// Serialized as `{"http_code", "description", "error_code", "error_name"}`.
/// `error_code` defaults to `http_code` and `error_name` to `""`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{http_code}: {description}")]
pub struct ApiException {
    pub http_code: u16,
    pub description: String,
    pub error_code: Option<u16>,
    pub error_name: Option<String>,
}

#[derive(Serialize)]
struct ExceptionBody<'a> {
    http_code: u16,
    description: &'a str,
    error_code: u16,
    error_name: &'a str,
}

impl ApiException {
    pub fn new(http_code: u16, description: impl Into<String>) -> Self {
        Self {
            http_code,
            description: description.into(),
            error_code: None,
            error_name: None,
        }
    }

    pub fn with_error_code(mut self, code: u16) -> Self {
        self.error_code = Some(code);
        self
    }

    pub fn with_error_name(mut self, name: impl Into<String>) -> Self {
        self.error_name = Some(name.into());
        self
    }

    pub fn bad_request(description: impl Into<String>) -> Self {
        Self::new(400, description)
    }

    pub fn unauthorized(description: impl Into<String>) -> Self {
        Self::new(401, description)
    }

    pub fn forbidden(description: impl Into<String>) -> Self {
        Self::new(403, description)
    }

    pub fn not_found(description: impl Into<String>) -> Self {
        Self::new(404, description)
    }

    pub fn payload_too_large(limit: usize) -> Self {
        Self::new(413, format!("request body exceeds {limit} bytes"))
            .with_error_name("payload_too_large")
    }

    pub fn internal(description: impl Into<String>) -> Self {
        Self::new(500, description)
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.http_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// The JSON body with defaults applied.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self.body()).unwrap_or(serde_json::Value::Null)
    }

    fn body(&self) -> ExceptionBody<'_> {
        ExceptionBody {
            http_code: self.http_code,
            description: &self.description,
            error_code: self.error_code.unwrap_or(self.http_code),
            error_name: self.error_name.as_deref().unwrap_or_default(),
        }
    }
}

impl IntoResponse for ApiException {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

/// Errors raised while defining or assembling an API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Spec(#[from] SpecError),

    #[error(transparent)]
    Validator(#[from] ValidatorError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("route '{path}' is already mounted for {method}")]
    DuplicateRoute { path: String, method: String },

    #[error("route '{path}' differs from '{existing}' only by placeholder names")]
    ConflictingRoute { path: String, existing: String },

    #[error("method {0} cannot be routed")]
    UnsupportedMethod(String),

    #[error("invalid response header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("invalid status code {0}")]
    InvalidStatus(u16),

    #[error("failed to serialize the document: {0}")]
    Document(#[from] serde_json::Error),

}

/// Turns request-time failures into responses, logging each one.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorTranslator;

impl ErrorTranslator {
    /// 422 with `{"results": [...]}`.
    pub fn validation(&self, endpoint: &str, errors: ValidationErrors) -> Response {
        log_validation_failure!(endpoint, count = errors.len(), "request failed validation");
        (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(errors.into_response()),
        )
            .into_response()
    }

    pub fn exception(&self, endpoint: &str, exception: ApiException) -> Response {
        log_api_exception!(
            endpoint,
            http_code = exception.http_code,
            description = %exception.description,
            "handler raised an exception"
        );
        exception.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn exception_defaults_error_code_and_name() {
        let exc = ApiException::not_found("no such item");
        assert_eq!(
            exc.to_json(),
            json!({
                "http_code": 404,
                "description": "no such item",
                "error_code": 404,
                "error_name": ""
            })
        );
    }

    #[test]
    fn exception_keeps_explicit_code_and_name() {
        let exc = ApiException::new(409, "taken")
            .with_error_code(40901)
            .with_error_name("duplicate_sku");
        let body = exc.to_json();
        assert_eq!(body["error_code"], 40901);
        assert_eq!(body["error_name"], "duplicate_sku");
    }

    #[test]
    fn exception_response_uses_http_code() {
        let response = ApiException::new(418, "teapot").into_response();
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
    }

    #[test]
    fn out_of_range_code_falls_back_to_500() {
        assert_eq!(
            ApiException::new(42, "odd").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn translator_validation_is_422() {
        let mut errors = ValidationErrors::new();
        errors.push(parapet_validator::FieldError::new(
            vec!["query".into(), "page".into()],
            "bad",
            "type_error.integer",
        ));
        let response = ErrorTranslator.validation("items", errors);
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
