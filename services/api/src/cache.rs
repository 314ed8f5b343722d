//! Response cache for the read endpoints, keyed by request URI.

use std::time::Duration;

use axum::body::{to_bytes, Body, Bytes};
use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use moka::future::Cache;
use tracing::{debug, error};

pub const CACHE_HEADER: &str = "x-cache";
const MAX_ENTRIES: u64 = 10_000;

#[derive(Clone)]
struct CachedResponse {
    content_type: Option<HeaderValue>,
    body: Bytes,
}

#[derive(Clone)]
pub struct ResponseCache {
    inner: Cache<String, CachedResponse>,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(MAX_ENTRIES)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }
}

fn with_cache_header(mut response: Response, value: &'static str) -> Response {
    response
        .headers_mut()
        .insert(CACHE_HEADER, HeaderValue::from_static(value));
    response
}

/// Serves repeated GETs from the cache. Only `200 OK` responses are stored.
pub async fn cache_responses(
    State(cache): State<ResponseCache>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() != Method::GET {
        return next.run(request).await;
    }

    let key = request.uri().to_string();
    if let Some(hit) = cache.inner.get(&key).await {
        debug!(uri = %key, "cache hit");
        let mut response = Body::from(hit.body).into_response();
        if let Some(content_type) = hit.content_type {
            response
                .headers_mut()
                .insert(header::CONTENT_TYPE, content_type);
        }
        return with_cache_header(response, "hit");
    }

    let response = next.run(request).await;
    if response.status() != StatusCode::OK {
        return response;
    }

    let (parts, body) = response.into_parts();
    let body = match to_bytes(body, usize::MAX).await {
        Ok(body) => body,
        Err(e) => {
            error!(uri = %key, error = %e, "cannot buffer response body");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    cache
        .inner
        .insert(
            key,
            CachedResponse {
                content_type: parts.headers.get(header::CONTENT_TYPE).cloned(),
                body: body.clone(),
            },
        )
        .await;

    with_cache_header(Response::from_parts(parts, Body::from(body)), "miss")
}
