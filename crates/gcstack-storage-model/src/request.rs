//! The request abstraction consumed by the simulator core.
//!
//! The HTTP layer in front of the simulator is out of scope; it hands the
//! core a [`StorageRequest`] carrying the already-extracted headers, query
//! parameters, and raw body. Tests build requests with the `with_*`
//! combinators.

use std::collections::HashMap;

use bytes::Bytes;
use http::HeaderMap;
use http::header::HeaderName;

use crate::error::{StorageError, StorageResult};

/// A storage API request: headers, query parameters, and a raw body.
#[derive(Debug, Clone, Default)]
pub struct StorageRequest {
    /// Request headers.
    pub headers: HeaderMap,
    /// Query parameters, already URL-decoded.
    pub query: HashMap<String, String>,
    /// The raw request body.
    pub body: Bytes,
}

impl StorageRequest {
    /// Create a new, empty request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header. Invalid names or values are silently dropped; the HTTP
    /// layer never produces them.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (name.parse::<HeaderName>(), value.parse()) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Add a query parameter.
    #[must_use]
    pub fn with_query(mut self, name: &str, value: &str) -> Self {
        self.query.insert(name.to_owned(), value.to_owned());
        self
    }

    /// Set the request body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Look up a header value as a string. Non-UTF-8 values read as absent.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Look up a query parameter.
    #[must_use]
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// Parse a query parameter as an `i64`.
    ///
    /// Returns `Ok(None)` when the parameter is absent and `BadRequest` when
    /// it is present but not an integer.
    pub fn query_i64(&self, name: &str) -> StorageResult<Option<i64>> {
        match self.query(name) {
            None => Ok(None),
            Some(raw) => raw.parse::<i64>().map(Some).map_err(|_| {
                StorageError::bad_request(format!("invalid integer value for {name}: {raw}"))
            }),
        }
    }

    /// Parse the body as JSON.
    pub fn json_body(&self) -> StorageResult<serde_json::Value> {
        serde_json::from_slice(&self.body)
            .map_err(|e| StorageError::bad_request(format!("malformed JSON body: {e}")))
    }

    /// Parse the body as JSON, treating an empty body as an empty object.
    pub fn json_body_or_default(&self) -> StorageResult<serde_json::Value> {
        if self.body.is_empty() {
            return Ok(serde_json::Value::Object(serde_json::Map::new()));
        }
        self.json_body()
    }
}
