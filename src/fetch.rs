//! Network access for cache misses and pre-caching.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HOST, HeaderMap, HeaderName};

use crate::config::HttpConfig;
use crate::error::Result;
use crate::request::Request;
use crate::response::Response;

/// Headers that describe a single connection and are never forwarded.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Returns true if `name` must not be copied between connections.
#[must_use]
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// Performs live network requests.
///
/// Non-2xx statuses are ordinary responses; only transport failures are
/// errors.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Sends `request` and buffers the full response.
    async fn fetch(&self, request: &Request) -> Result<Response>;
}

/// [`Fetcher`] backed by a `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Builds a fetcher with a client configured from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn new(config: &HttpConfig) -> Result<Self> {
        Ok(Self::with_client(build_http_client(config)?))
    }

    /// Wraps an existing client.
    #[must_use]
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

/// Builds a configured HTTP client.
fn build_http_client(config: &HttpConfig) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .pool_idle_timeout(Duration::from_secs(60))
        .pool_max_idle_per_host(8)
        .tcp_keepalive(Duration::from_secs(30))
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent(config.user_agent.clone())
        .build()
}

/// Copies forwardable request headers.
fn forward_headers(headers: &HeaderMap) -> HeaderMap {
    headers
        .iter()
        .filter(|(name, _)| **name != HOST && !is_hop_by_hop(name.as_str()))
        .map(|(name, value)| (HeaderName::clone(name), value.clone()))
        .collect()
}

/// Copies end-to-end response headers. Values that are not UTF-8 cannot be
/// stored verbatim and are dropped.
fn response_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
        .filter_map(|(name, value)| match std::str::from_utf8(value.as_bytes()) {
            Ok(value) => Some((name.as_str().to_string(), value.to_string())),
            Err(_) => {
                log::warn!("Dropping non-UTF-8 response header {name}");
                None
            }
        })
        .collect()
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        log::debug!("Network fetch: {} {}", request.method, request.url);
        let response = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(forward_headers(&request.headers))
            .body(request.body.clone())
            .send()
            .await?;

        let url = response.url().to_string();
        let status = response.status().as_u16();
        let headers = response_headers(response.headers());
        let body = response.bytes().await?;

        Ok(Response {
            url,
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hop_by_hop_detection() {
        assert!(is_hop_by_hop("Connection"));
        assert!(is_hop_by_hop("transfer-encoding"));
        assert!(!is_hop_by_hop("content-type"));
    }

    #[test]
    fn forward_headers_drops_host_and_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("host", "proxy:8080".parse().unwrap());
        headers.insert("connection", "keep-alive".parse().unwrap());
        headers.insert("accept", "text/html".parse().unwrap());

        let forwarded = forward_headers(&headers);
        assert_eq!(forwarded.len(), 1);
        assert_eq!(forwarded["accept"], "text/html");
    }

    #[test]
    fn response_headers_drop_non_utf8_values() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", "text/html".parse().unwrap());
        headers.insert("x-raw", reqwest::header::HeaderValue::from_bytes(b"caf\xe9").unwrap());
        headers.insert(
            "x-name",
            reqwest::header::HeaderValue::from_bytes("café".as_bytes()).unwrap(),
        );
        headers.insert("connection", "close".parse().unwrap());

        let mut kept = response_headers(&headers);
        kept.sort();
        assert_eq!(
            kept,
            vec![
                ("content-type".to_string(), "text/html".to_string()),
                ("x-name".to_string(), "café".to_string()),
            ]
        );
    }

    #[test]
    fn builds_from_default_config() {
        assert!(HttpFetcher::new(&HttpConfig::default()).is_ok());
    }

    #[cfg(feature = "server")]
    mod live {
        use super::*;
        use axum::Router;
        use axum::http::StatusCode;
        use axum::routing::get;

        async fn spawn_origin() -> String {
            let app = Router::new()
                .route("/index.html", get(|| async { "<h1>mkr1010</h1>" }))
                .route(
                    "/missing",
                    get(|| async { (StatusCode::NOT_FOUND, "nope") }),
                );
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });
            format!("http://{addr}")
        }

        #[tokio::test]
        async fn fetches_body_and_status() {
            let origin = spawn_origin().await;
            let fetcher = HttpFetcher::new(&HttpConfig::default()).unwrap();

            let ok = fetcher
                .fetch(&Request::get_str(&format!("{origin}/index.html")).unwrap())
                .await
                .unwrap();
            assert_eq!(ok.status, 200);
            assert_eq!(ok.body, "<h1>mkr1010</h1>");
            assert!(ok.header("content-type").is_some());

            let missing = fetcher
                .fetch(&Request::get_str(&format!("{origin}/missing")).unwrap())
                .await
                .unwrap();
            assert_eq!(missing.status, 404);
            assert!(!missing.is_ok());
        }

        #[tokio::test]
        async fn connection_failure_is_an_error() {
            // Bind then drop to get a port nothing listens on.
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            let addr = listener.local_addr().unwrap();
            drop(listener);

            let fetcher = HttpFetcher::new(&HttpConfig::default()).unwrap();
            let result = fetcher
                .fetch(&Request::get_str(&format!("http://{addr}/api/data.json")).unwrap())
                .await;
            assert!(matches!(result, Err(crate::Error::Http(_))));
        }
    }
}
