//! Handler results that carry their own response headers.

use axum::http::{HeaderMap, HeaderName, HeaderValue};

use crate::error::ApiException;

/// A response body plus headers computed by the handler.
///
/// Returned from handlers mounted with
/// [`OperationBuilder::handle_reply`](crate::OperationBuilder::handle_reply).
/// Its headers are applied after the operation's `response_header` entries
/// and win on a name clash.
#[derive(Debug, Clone)]
pub struct Reply<R> {
    pub body: R,
    pub headers: HeaderMap,
}

impl<R> Reply<R> {
    pub fn new(body: R) -> Self {
        Self {
            body,
            headers: HeaderMap::new(),
        }
    }

    /// Add a header, failing with a 500 if the name or value is invalid.
    pub fn header<K, V>(mut self, name: K, value: V) -> Result<Self, ApiException>
    where
        K: TryInto<HeaderName>,
        K::Error: std::fmt::Display,
        V: TryInto<HeaderValue>,
        V::Error: std::fmt::Display,
    {
        let name = name
            .try_into()
            .map_err(|e| ApiException::internal(format!("invalid response header name: {e}")))?;
        let value = value
            .try_into()
            .map_err(|e| ApiException::internal(format!("invalid value for {name}: {e}")))?;
        self.headers.insert(name, value);
        Ok(self)
    }
}
