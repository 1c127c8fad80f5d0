//! Intercepted requests and the key they are matched by.

use std::fmt;

use bytes::Bytes;
use reqwest::Method;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::{Error, Result};

/// An outgoing request intercepted by the worker.
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method.
    pub method: Method,
    /// Absolute request URL.
    pub url: Url,
    /// Request headers, forwarded to the network on a miss.
    pub headers: HeaderMap,
    /// Request body. Never part of the match key.
    pub body: Bytes,
}

impl Request {
    /// Creates a request with no headers and an empty body.
    #[must_use]
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Creates a `GET` request for `url`.
    #[must_use]
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Parses `url` and creates a `GET` request for it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if `url` is not an absolute URL.
    pub fn get_str(url: &str) -> Result<Self> {
        Ok(Self::get(parse_url(url)?))
    }

    /// Sets the headers.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns the key this request is matched against the cache with.
    #[must_use]
    pub fn key(&self) -> RequestKey {
        RequestKey::new(&self.method, &self.url)
    }
}

/// Cache matching key: method plus URL with the fragment removed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestKey {
    /// Upper-case method name.
    pub method: String,
    /// Absolute URL without fragment.
    pub url: String,
}

impl RequestKey {
    /// Builds the key for a method and URL.
    #[must_use]
    pub fn new(method: &Method, url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self {
            method: method.as_str().to_ascii_uppercase(),
            url: url.into(),
        }
    }

    /// Returns true if entries stored under this key can ever be matched.
    ///
    /// Default matching only considers `GET` requests.
    #[must_use]
    pub fn is_matchable(&self) -> bool {
        self.method == Method::GET.as_str()
    }

    /// Hex-encoded SHA-256 of the key, used to name on-disk entries.
    #[must_use]
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.method.as_bytes());
        hasher.update(b" ");
        hasher.update(self.url.as_bytes());
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// Parses an absolute URL, mapping failures to [`Error::InvalidUrl`].
pub(crate) fn parse_url(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|source| Error::InvalidUrl {
        url: url.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn key_strips_fragment() {
        let a = RequestKey::new(&Method::GET, &url("http://host/index.html#top"));
        let b = RequestKey::new(&Method::GET, &url("http://host/index.html"));
        assert_eq!(a, b);
        assert_eq!(a.url, "http://host/index.html");
    }

    #[test]
    fn key_keeps_query() {
        let a = RequestKey::new(&Method::GET, &url("http://host/data.json?v=1"));
        let b = RequestKey::new(&Method::GET, &url("http://host/data.json"));
        assert_ne!(a, b);
    }

    #[test]
    fn key_distinguishes_method() {
        let get = RequestKey::new(&Method::GET, &url("http://host/a"));
        let post = RequestKey::new(&Method::POST, &url("http://host/a"));
        assert_ne!(get, post);
        assert!(get.is_matchable());
        assert!(!post.is_matchable());
    }

    #[test]
    fn key_ignores_body_and_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("accept", "text/html".parse().unwrap());
        let plain = Request::get(url("http://host/a"));
        let dressed = Request::get(url("http://host/a"))
            .with_headers(headers)
            .with_body("payload");
        assert_eq!(plain.key(), dressed.key());
    }

    #[test]
    fn key_display() {
        let key = RequestKey::new(&Method::GET, &url("http://host/a"));
        assert_eq!(key.to_string(), "GET http://host/a");
    }

    #[test]
    fn digest_is_stable_hex() {
        let key = RequestKey::new(&Method::GET, &url("http://host/index.html"));
        let digest = key.digest();
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(digest, key.clone().digest());
    }

    #[test]
    fn get_str_rejects_relative_url() {
        assert!(matches!(
            Request::get_str("index.html"),
            Err(Error::InvalidUrl { .. })
        ));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn fragment_never_changes_key(path in "[a-z]{1,12}", frag in "[a-z0-9]{0,12}") {
                let base = url(&format!("http://host/{path}"));
                let with_frag = url(&format!("http://host/{path}#{frag}"));
                prop_assert_eq!(
                    RequestKey::new(&Method::GET, &base),
                    RequestKey::new(&Method::GET, &with_frag)
                );
            }

            #[test]
            fn distinct_paths_have_distinct_digests(a in "[a-z]{1,12}", b in "[a-z]{1,12}") {
                prop_assume!(a != b);
                let ka = RequestKey::new(&Method::GET, &url(&format!("http://host/{a}")));
                let kb = RequestKey::new(&Method::GET, &url(&format!("http://host/{b}")));
                prop_assert_ne!(ka.digest(), kb.digest());
            }
        }
    }
}
