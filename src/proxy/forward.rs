// src/proxy/forward.rs

//! Reverse proxying to the supervised server.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::TryStreamExt;
use thiserror::Error;
use tokio_util::io::StreamReader;
use tracing::{debug, warn};

use crate::inject::{InjectingReader, RELOAD_SCRIPT};

use super::ProxyState;

/// Largest request body buffered before forwarding.
const MAX_REQUEST_BODY: usize = 64 * 1024 * 1024;

/// Read size for rewritten HTML bodies.
const INJECT_CHUNK: usize = 8 * 1024;

static HOP_BY_HOP: [HeaderName; 7] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("reading request body: {0}")]
    Body(#[from] axum::Error),

    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),
}

pub(crate) async fn forward(State(state): State<Arc<ProxyState>>, req: Request) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();

    match proxy_request(&state, req).await {
        Ok(response) => response,
        Err(err) => {
            warn!(%method, %uri, error = %err, "proxy error");
            (StatusCode::BAD_GATEWAY, err.to_string()).into_response()
        }
    }
}

async fn proxy_request(state: &ProxyState, req: Request) -> Result<Response, ProxyError> {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let (parts, body) = req.into_parts();

    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = format!("{}{}", state.base_url, path);

    let mut headers = parts.headers;
    strip_hop_by_hop(&mut headers);
    if state.live_reload {
        // Compressed HTML cannot be rewritten.
        headers.remove(header::ACCEPT_ENCODING);
    }
    if let Some(ip) = peer {
        append_forwarded_for(&mut headers, &ip.to_string());
    }

    let body = axum::body::to_bytes(body, MAX_REQUEST_BODY).await?;

    debug!(method = %parts.method, %url, "forwarding request");
    let upstream = state
        .client
        .request(parts.method, url)
        .headers(headers)
        .body(body)
        .send()
        .await?;

    let status = upstream.status();
    let mut headers = upstream.headers().clone();
    strip_hop_by_hop(&mut headers);

    let body = if state.live_reload && is_html(&headers) {
        // Length changes once the script is in.
        headers.remove(header::CONTENT_LENGTH);
        let bytes = upstream.bytes_stream().map_err(io::Error::other);
        let reader = InjectingReader::new(StreamReader::new(Box::pin(bytes)), RELOAD_SCRIPT);
        Body::from_stream(reader.into_chunks(INJECT_CHUNK))
    } else {
        Body::from_stream(upstream.bytes_stream())
    };

    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

/// Whether a response is an HTML page the reload script belongs in.
pub fn is_html(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("text/html"))
}

/// Remove connection-scoped headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
    headers.remove("keep-alive");
}

fn append_forwarded_for(headers: &mut HeaderMap, ip: &str) {
    let value = match headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        Some(prior) => format!("{prior}, {ip}"),
        None => ip.to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert("x-forwarded-for", value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_detection_ignores_charset() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        );
        assert!(is_html(&headers));

        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/css"));
        assert!(!is_html(&headers));
        assert!(!is_html(&HeaderMap::new()));
    }

    #[test]
    fn strips_standard_and_connection_named_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive, x-secret"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert("x-secret", HeaderValue::from_static("1"));
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));

        strip_hop_by_hop(&mut headers);

        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key(header::CONTENT_TYPE));
    }

    #[test]
    fn forwarded_for_is_appended() {
        let mut headers = HeaderMap::new();
        append_forwarded_for(&mut headers, "10.0.0.1");
        append_forwarded_for(&mut headers, "127.0.0.1");
        assert_eq!(headers["x-forwarded-for"], "10.0.0.1, 127.0.0.1");
    }
}
