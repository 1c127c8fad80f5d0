//! HTTP proxy that plays the hosting runtime for a [`Worker`].
//!
//! Every request that reaches the proxy is resolved against the worker's
//! origin and dispatched as a fetch event. Whatever the worker returns is
//! written back verbatim; worker errors become `502 Bad Gateway` (or `503`
//! while the worker is not active) with the error text as body.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::State;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response as HttpResponse};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{Error, Result};
use crate::fetch::is_hop_by_hop;
use crate::lifecycle::WorkerHost;
use crate::request::Request;
use crate::response::Response;
use crate::worker::Worker;

/// Largest request body the proxy buffers.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

struct AppState<W: Worker> {
    host: Arc<WorkerHost<W>>,
    origin: Url,
}

impl<W: Worker> Clone for AppState<W> {
    fn clone(&self) -> Self {
        Self {
            host: Arc::clone(&self.host),
            origin: self.origin.clone(),
        }
    }
}

/// Places the request's path and query under the origin.
///
/// The path is appended to the origin's own path, never joined, so the
/// result always stays on the origin's host.
fn origin_url(origin: &Url, uri: &axum::http::Uri) -> Url {
    let mut url = origin.clone();
    let path = format!("{}{}", origin.path().trim_end_matches('/'), uri.path());
    url.set_path(&path);
    url.set_query(uri.query());
    url.set_fragment(None);
    url
}

/// Builds the intercepted request for an incoming proxy request.
async fn to_worker_request(
    origin: &Url,
    request: axum::extract::Request,
) -> std::result::Result<Request, HttpResponse> {
    let (parts, body) = request.into_parts();
    let url = origin_url(origin, &parts.uri);
    let body = to_bytes(body, MAX_BODY_BYTES).await.map_err(|e| {
        (StatusCode::PAYLOAD_TOO_LARGE, format!("Request body rejected: {e}")).into_response()
    })?;
    Ok(Request::new(parts.method, url)
        .with_headers(parts.headers)
        .with_body(body))
}

/// Converts a worker response into an HTTP response.
fn to_http_response(response: Response) -> HttpResponse {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut http = HttpResponse::new(Body::from(response.body));
    *http.status_mut() = status;
    let headers = http.headers_mut();
    for (name, value) in response.headers {
        if is_hop_by_hop(&name) {
            continue;
        }
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => log::warn!("Dropping unrepresentable header {name}"),
        }
    }
    http
}

fn error_response(error: &Error) -> HttpResponse {
    let status = match error {
        Error::NotActive(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_GATEWAY,
    };
    (status, error.to_string()).into_response()
}

async fn intercept<W: Worker + 'static>(
    State(state): State<AppState<W>>,
    request: axum::extract::Request,
) -> HttpResponse {
    let request = match to_worker_request(&state.origin, request).await {
        Ok(request) => request,
        Err(rejection) => return rejection,
    };
    match state.host.fetch(&request).await {
        Ok(outcome) => {
            log::debug!(
                "{} {} -> {} ({})",
                request.method,
                request.url,
                outcome.response().status,
                if outcome.is_cache_hit() { "cache" } else { "network" }
            );
            to_http_response(outcome.into_response())
        }
        Err(e) => {
            log::warn!("{} {} failed: {e}", request.method, request.url);
            error_response(&e)
        }
    }
}

/// Builds the proxy router. Every path is intercepted.
pub fn router<W: Worker + 'static>(host: Arc<WorkerHost<W>>, origin: Url) -> Router {
    Router::new()
        .fallback(intercept::<W>)
        .with_state(AppState { host, origin })
}

/// Serves the proxy on an already bound listener until `shutdown` fires.
///
/// # Errors
///
/// Returns an error if the server fails while accepting connections.
pub async fn serve<W: Worker + 'static>(
    listener: TcpListener,
    host: Arc<WorkerHost<W>>,
    origin: Url,
    shutdown: CancellationToken,
) -> Result<()> {
    let app = router(host, origin);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

/// Binds `addr` and serves the proxy until `shutdown` fires.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn run_server<W: Worker + 'static>(
    addr: &str,
    host: Arc<WorkerHost<W>>,
    origin: Url,
    shutdown: CancellationToken,
) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    let local: SocketAddr = listener.local_addr()?;
    log::info!("Proxy listening on http://{local} for {origin}");
    serve(listener, host, origin, shutdown).await?;
    log::info!("Proxy stopped");
    Ok(())
}
