//! The published document and interactive reference endpoints.

use axum::{
    http::header,
    response::Html,
    routing::{get, MethodRouter},
};
use bytes::Bytes;
use scalar_api_reference::scalar_html_default;

use parapet_spec::SpecDocument;

use crate::error::ApiError;

/// Serves the resolved document.
///
/// The document is serialized once, so every request returns the same bytes.
pub(crate) fn spec_route(document: &SpecDocument) -> Result<MethodRouter, ApiError> {
    let body = Bytes::from(document.to_json()?);
    Ok(get(move || async move {
        ([(header::CONTENT_TYPE, "application/json")], body)
    }))
}

/// Serves the API reference page, which loads the document from `spec_url`.
pub(crate) fn docs_route(spec_url: &str, title: &str) -> MethodRouter {
    let page = docs_page(spec_url, title);
    get(move || async move { page })
}

fn docs_page(spec_url: &str, title: &str) -> Html<String> {
    let config = serde_json::json!({
        "spec": {
            "url": spec_url
        },
        "metaData": {
            "title": title
        },
        "hideDownloadButton": false
    });

    Html(scalar_html_default(&config))
}
