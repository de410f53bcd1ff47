//! Request-time execution of an operation.
//!
//! Each declared source is extracted, validated and bound into
//! [`Parameters`] in declaration order. Failures from every step are
//! collected into one 422 response before the handler is reached.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::{to_bytes, Body},
    extract::{FromRequest, Multipart, Request},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use futures_util::future::BoxFuture;
use serde_json::Value;

use parapet_telemetry::log_request_completed;
use parapet_validator::{
    parse_query, parse_urlencoded, FieldError, SchemaValidator, ValidationErrors,
};

use crate::error::{ApiException, ErrorTranslator};
use crate::params::{bearer_token, Parameters, UploadedFile};

/// A handler's serialized body and the headers it set.
pub(crate) type HandlerOutput = (Value, HeaderMap);

/// A type-erased request handler.
pub(crate) type HandlerFn = Arc<
    dyn Fn(Parameters) -> BoxFuture<'static, Result<HandlerOutput, ApiException>> + Send + Sync,
>;

/// Where a validated value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Source {
    Header,
    Path,
    Query,
    Body,
    Form,
}

impl Source {
    fn name(self) -> &'static str {
        match self {
            Source::Header => "header",
            Source::Path => "path",
            Source::Query => "query",
            Source::Body => "body",
            Source::Form => "form",
        }
    }
}

pub(crate) enum Step {
    Validate {
        source: Source,
        validator: Arc<SchemaValidator>,
    },
    Auth,
}

/// Settings shared by every pipeline of one router.
#[derive(Debug, Clone)]
pub(crate) struct Runtime {
    pub(crate) max_body_size: usize,
    pub(crate) errors: ErrorTranslator,
}

pub(crate) struct Pipeline {
    pub(crate) endpoint: String,
    pub(crate) steps: Vec<Step>,
    pub(crate) status: StatusCode,
    pub(crate) headers: Vec<(HeaderName, HeaderValue)>,
    pub(crate) handler: HandlerFn,
}

enum Rejection {
    Invalid(ValidationErrors),
    Exception(ApiException),
}

/// A request body decoded once and shared by the body and form steps.
enum Payload {
    Json(Value),
    Fields {
        pairs: Vec<(String, String)>,
        files: Vec<UploadedFile>,
    },
    Malformed(FieldError),
}

impl Pipeline {
    pub(crate) async fn run(
        &self,
        runtime: &Runtime,
        path: Vec<(String, String)>,
        request: Request,
    ) -> Response {
        let started = Instant::now();

        let response = match self.bind(runtime, path, request).await {
            Ok(params) => match (self.handler)(params).await {
                Ok((value, headers)) => self.respond(value, headers),
                Err(exception) => runtime.errors.exception(&self.endpoint, exception),
            },
            Err(Rejection::Invalid(errors)) => runtime.errors.validation(&self.endpoint, errors),
            Err(Rejection::Exception(exception)) => {
                runtime.errors.exception(&self.endpoint, exception)
            }
        };

        log_request_completed!(
            endpoint = %self.endpoint,
            status = response.status().as_u16(),
            duration_ms = started.elapsed().as_millis() as u64,
            "request completed"
        );
        response
    }

    fn reads_body(&self) -> bool {
        self.steps.iter().any(|step| {
            matches!(
                step,
                Step::Validate {
                    source: Source::Body | Source::Form,
                    ..
                }
            )
        })
    }

    async fn bind(
        &self,
        runtime: &Runtime,
        path: Vec<(String, String)>,
        request: Request,
    ) -> Result<Parameters, Rejection> {
        let (parts, body) = request.into_parts();

        let body = if self.reads_body() {
            to_bytes(body, runtime.max_body_size)
                .await
                .map_err(|_| {
                    Rejection::Exception(ApiException::payload_too_large(runtime.max_body_size))
                })?
        } else {
            Bytes::new()
        };
        let content_type = parts
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let mut params = Parameters::default();
        let mut errors = ValidationErrors::new();
        let mut payload: Option<Payload> = None;

        for step in &self.steps {
            let (source, validator) = match step {
                Step::Auth => {
                    params.auth = parts
                        .headers
                        .get(header::AUTHORIZATION)
                        .and_then(|v| v.to_str().ok())
                        .map(bearer_token);
                    continue;
                }
                Step::Validate { source, validator } => (*source, validator),
            };

            let result = match source {
                Source::Header => validator.validate_headers(header_pairs(&parts.headers)),
                Source::Path => validator.validate_strings(path.iter().cloned()),
                Source::Query => {
                    validator.validate_strings(parse_query(parts.uri.query().unwrap_or_default()))
                }
                Source::Body | Source::Form => {
                    if payload.is_none() {
                        payload = Some(
                            decode_payload(content_type.as_deref(), body.clone())
                                .await
                                .map_err(Rejection::Exception)?,
                        );
                    }
                    match &payload {
                        Some(Payload::Json(value)) => validator.validate(value.clone()),
                        Some(Payload::Fields { pairs, files }) => {
                            if source == Source::Form {
                                params.files = files.clone();
                            }
                            validator.validate_strings(pairs.iter().cloned())
                        }
                        Some(Payload::Malformed(error)) => Err(error.clone().into()),
                        None => Err(ValidationErrors::new()),
                    }
                }
            };

            match result {
                Ok(value) => *slot(&mut params, source) = Some(value),
                Err(e) => errors.extend(e.located(source.name())),
            }
        }

        if errors.is_empty() {
            Ok(params)
        } else {
            Err(Rejection::Invalid(errors))
        }
    }

    fn respond(&self, value: Value, headers: HeaderMap) -> Response {
        let mut response = if value.is_null() && self.status == StatusCode::NO_CONTENT {
            self.status.into_response()
        } else {
            (self.status, Json(value)).into_response()
        };
        for (name, value) in &self.headers {
            response.headers_mut().insert(name.clone(), value.clone());
        }
        for name in headers.keys() {
            response.headers_mut().remove(name);
        }
        for (name, value) in &headers {
            response.headers_mut().append(name.clone(), value.clone());
        }
        response
    }
}

fn slot(params: &mut Parameters, source: Source) -> &mut Option<Value> {
    match source {
        Source::Header => &mut params.header,
        Source::Path => &mut params.path,
        Source::Query => &mut params.query,
        Source::Body => &mut params.body,
        Source::Form => &mut params.form,
    }
}

fn header_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            Some((name.as_str().to_string(), value.to_str().ok()?.to_string()))
        })
        .collect()
}

async fn decode_payload(content_type: Option<&str>, body: Bytes) -> Result<Payload, ApiException> {
    let media_type = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .unwrap_or_default();

    match media_type.as_str() {
        "multipart/form-data" => {
            let (pairs, files) = parse_multipart(content_type.unwrap_or_default(), body).await?;
            Ok(Payload::Fields { pairs, files })
        }
        "application/x-www-form-urlencoded" => Ok(Payload::Fields {
            pairs: parse_urlencoded(&body),
            files: Vec::new(),
        }),
        _ if body.is_empty() => Ok(Payload::Malformed(FieldError::new(
            Vec::new(),
            "request body is required",
            "value_error.missing",
        ))),
        _ => Ok(match serde_json::from_slice(&body) {
            Ok(value) => Payload::Json(value),
            Err(e) => Payload::Malformed(FieldError::new(
                Vec::new(),
                format!("invalid JSON: {e}"),
                "value_error.jsondecode",
            )),
        }),
    }
}

/// Split a multipart body into text fields and files.
///
/// File parts are also exposed as base64 text fields so the form schema
/// can validate them.
async fn parse_multipart(
    content_type: &str,
    body: Bytes,
) -> Result<(Vec<(String, String)>, Vec<UploadedFile>), ApiException> {
    let request = http::Request::builder()
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(body))
        .map_err(|e| ApiException::bad_request(e.to_string()))?;
    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|e| ApiException::bad_request(e.body_text()))?;

    let mut pairs = Vec::new();
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiException::bad_request(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let part_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiException::bad_request(e.body_text()))?;

        if file_name.is_some() {
            pairs.push((name.clone(), STANDARD.encode(&data)));
            files.push(UploadedFile {
                field: name,
                file_name,
                content_type: part_type,
                data,
            });
        } else {
            pairs.push((name, String::from_utf8_lossy(&data).into_owned()));
        }
    }

    Ok((pairs, files))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn urlencoded_payload_decodes_pairs() {
        let payload = decode_payload(
            Some("application/x-www-form-urlencoded; charset=utf-8"),
            Bytes::from_static(b"name=Desk+Lamp&qty=2"),
        )
        .await
        .unwrap();
        match payload {
            Payload::Fields { pairs, files } => {
                assert_eq!(pairs[0], ("name".to_string(), "Desk Lamp".to_string()));
                assert!(files.is_empty());
            }
            _ => panic!("expected fields"),
        }
    }

    #[tokio::test]
    async fn empty_json_body_is_missing() {
        let payload = decode_payload(Some("application/json"), Bytes::new())
            .await
            .unwrap();
        assert!(matches!(payload, Payload::Malformed(ref e) if e.kind == "value_error.missing"));
    }

    #[tokio::test]
    async fn invalid_json_is_reported_as_field_error() {
        let payload = decode_payload(None, Bytes::from_static(b"{oops"))
            .await
            .unwrap();
        assert!(matches!(payload, Payload::Malformed(ref e) if e.kind == "value_error.jsondecode"));
    }

    #[tokio::test]
    async fn multipart_files_become_base64_fields() {
        let body = concat!(
            "--XBOUNDARY\r\n",
            "Content-Disposition: form-data; name=\"title\"\r\n\r\n",
            "holiday\r\n",
            "--XBOUNDARY\r\n",
            "Content-Disposition: form-data; name=\"photo\"; filename=\"a.txt\"\r\n",
            "Content-Type: text/plain\r\n\r\n",
            "hi\r\n",
            "--XBOUNDARY--\r\n"
        );
        let (pairs, files) = parse_multipart(
            "multipart/form-data; boundary=XBOUNDARY",
            Bytes::from_static(body.as_bytes()),
        )
        .await
        .unwrap();

        assert_eq!(pairs[0], ("title".to_string(), "holiday".to_string()));
        assert_eq!(pairs[1], ("photo".to_string(), "aGk=".to_string()));
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file_name.as_deref(), Some("a.txt"));
        assert_eq!(files[0].data, Bytes::from_static(b"hi"));
    }
}
