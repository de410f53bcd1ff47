//! Validated request data handed to handlers.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ApiException;

/// A file part of a multipart form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// Form field name.
    pub field: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Everything the pipeline bound for one request.
///
/// A source is `None` unless the operation declared it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    pub path: Option<Value>,
    pub query: Option<Value>,
    pub header: Option<Value>,
    pub body: Option<Value>,
    /// Form fields; file parts appear as base64 strings.
    pub form: Option<Value>,
    /// Bearer token with any `Bearer ` prefix removed.
    pub auth: Option<String>,
    pub files: Vec<UploadedFile>,
}

impl Parameters {
    pub fn path_as<T: DeserializeOwned>(&self) -> Result<T, ApiException> {
        typed(&self.path, "path")
    }

    pub fn query_as<T: DeserializeOwned>(&self) -> Result<T, ApiException> {
        typed(&self.query, "query")
    }

    pub fn header_as<T: DeserializeOwned>(&self) -> Result<T, ApiException> {
        typed(&self.header, "header")
    }

    pub fn body_as<T: DeserializeOwned>(&self) -> Result<T, ApiException> {
        typed(&self.body, "body")
    }

    pub fn form_as<T: DeserializeOwned>(&self) -> Result<T, ApiException> {
        typed(&self.form, "form")
    }

    /// The first uploaded file for `field`.
    pub fn file(&self, field: &str) -> Option<&UploadedFile> {
        self.files.iter().find(|f| f.field == field)
    }

    /// The token, or 401 when the request carried none.
    pub fn require_auth(&self) -> Result<&str, ApiException> {
        self.auth
            .as_deref()
            .ok_or_else(|| ApiException::unauthorized("missing Authorization header"))
    }
}

fn typed<T: DeserializeOwned>(value: &Option<Value>, source: &str) -> Result<T, ApiException> {
    let value = value
        .as_ref()
        .ok_or_else(|| ApiException::internal(format!("{source} data was not declared")))?;
    serde_json::from_value(value.clone())
        .map_err(|e| {
            ApiException::internal(format!("{source} data does not fit the handler type: {e}"))
        })
}

/// Extract the token from an `Authorization` header value.
pub(crate) fn bearer_token(header: &str) -> String {
    header
        .strip_prefix("Bearer ")
        .unwrap_or(header)
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct ItemPath {
        id: i64,
    }

    #[test]
    fn typed_accessors_deserialize_bound_values() {
        let params = Parameters {
            path: Some(json!({"id": 7})),
            ..Default::default()
        };
        assert_eq!(params.path_as::<ItemPath>().unwrap(), ItemPath { id: 7 });
    }

    #[test]
    fn undeclared_source_is_an_internal_error() {
        let err = Parameters::default().query_as::<ItemPath>().unwrap_err();
        assert_eq!(err.http_code, 500);
    }

    #[test]
    fn bearer_prefix_is_stripped() {
        assert_eq!(bearer_token("Bearer abc"), "abc");
        assert_eq!(bearer_token("abc"), "abc");
    }

    #[test]
    fn files_are_found_by_field() {
        let params = Parameters {
            files: vec![UploadedFile {
                field: "avatar".into(),
                file_name: Some("me.png".into()),
                content_type: Some("image/png".into()),
                data: Bytes::from_static(b"\x89PNG"),
            }],
            ..Default::default()
        };
        assert_eq!(
            params.file("avatar").and_then(|f| f.file_name.as_deref()),
            Some("me.png")
        );
        assert!(params.file("other").is_none());
    }

    #[test]
    fn missing_auth_is_401() {
        assert_eq!(Parameters::default().require_auth().unwrap_err().http_code, 401);
    }
}
