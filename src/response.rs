//! Responses as stored in a cache or received from the network.

use bytes::Bytes;

/// A complete HTTP response with its body buffered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Final URL the response was produced for.
    pub url: String,
    /// HTTP status code.
    pub status: u16,
    /// Response headers in received order.
    pub headers: Vec<(String, String)>,
    /// Response body.
    pub body: Bytes,
}

impl Response {
    /// Creates a response with no headers.
    #[must_use]
    pub fn new(url: impl Into<String>, status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            url: url.into(),
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Appends a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Returns true for a 2xx status.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Returns true if the cache accepts this response for pre-caching.
    ///
    /// Partial content is never stored.
    #[must_use]
    pub const fn is_cacheable(&self) -> bool {
        self.is_ok() && self.status != 206
    }

    /// Returns the first header value with the given name (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Body length in bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.body.len() as u64
    }

    /// Returns true if the body is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_range() {
        assert!(Response::new("u", 200, "").is_ok());
        assert!(Response::new("u", 204, "").is_ok());
        assert!(!Response::new("u", 304, "").is_ok());
        assert!(!Response::new("u", 404, "").is_ok());
    }

    #[test]
    fn partial_content_is_not_cacheable() {
        assert!(Response::new("u", 200, "").is_cacheable());
        assert!(!Response::new("u", 206, "").is_cacheable());
        assert!(!Response::new("u", 500, "").is_cacheable());
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let resp = Response::new("u", 200, "").with_header("Content-Type", "text/html");
        assert_eq!(resp.header("content-type"), Some("text/html"));
        assert_eq!(resp.header("etag"), None);
    }

    #[test]
    fn body_length() {
        let resp = Response::new("u", 200, "hello");
        assert_eq!(resp.len(), 5);
        assert!(!resp.is_empty());
    }
}
