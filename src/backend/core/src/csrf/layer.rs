//! Tower layer running the CSRF guard in front of a service.
//!
//! # Usage
//!
//! ```rust,ignore
//! use axum::{routing::{get, post}, Router};
//! use tollgate_core::csrf::{CsrfConfig, CsrfLayer};
//!
//! let layer = CsrfLayer::new(CsrfConfig::builder().context_key("csrf").build())?;
//! let app = Router::new()
//!     .route("/", get(index))
//!     .route("/update", post(update))
//!     .layer(layer);
//! ```
//!
//! Added with `Router::layer`, the guard runs after routing so `param:`
//! lookups see the matched path parameters.

use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
};
use cookie::Cookie;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::error;

use super::config::CsrfConfig;
use super::context::Locals;
use super::error::CsrfError;
use super::extractor::TokenSource;
use super::guard::{CsrfGuard, MethodClass, Verdict};
use super::request::{buffer_form, path_params, InboundRequest};

// ═══════════════════════════════════════════════════════════════════════════════
// Layer
// ═══════════════════════════════════════════════════════════════════════════════

/// CSRF protection layer.
#[derive(Debug, Clone)]
pub struct CsrfLayer {
    guard: Arc<CsrfGuard>,
}

impl CsrfLayer {
    /// Validate `config` and build the layer.
    pub fn new(config: CsrfConfig) -> Result<Self, CsrfError> {
        Ok(Self::from_guard(Arc::new(CsrfGuard::new(config)?)))
    }

    /// Share an existing guard, e.g. across several routers.
    pub fn from_guard(guard: Arc<CsrfGuard>) -> Self {
        Self { guard }
    }

    pub fn guard(&self) -> &Arc<CsrfGuard> {
        &self.guard
    }
}

impl<S> Layer<S> for CsrfLayer {
    type Service = CsrfService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CsrfService {
            inner,
            guard: self.guard.clone(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Service
// ═══════════════════════════════════════════════════════════════════════════════

/// CSRF protection service.
#[derive(Debug, Clone)]
pub struct CsrfService<S> {
    inner: S,
    guard: Arc<CsrfGuard>,
}

impl<S> Service<Request> for CsrfService<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let guard = self.guard.clone();
        // The polled service goes into the future; the fresh clone stays behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            if guard.should_skip(&request) {
                return inner.call(request).await;
            }

            let class = MethodClass::of(request.method());
            let (mut parts, body) = request.into_parts();

            let params = if class == MethodClass::Verify
                && guard.extractor().source() == TokenSource::Param
            {
                path_params(&mut parts).await
            } else {
                HashMap::new()
            };

            let (form, body) = if class == MethodClass::Verify && guard.extractor().needs_body() {
                match buffer_form(&parts.headers, body, guard.form_limit()).await {
                    Ok((fields, bytes)) => (fields, Body::from(bytes)),
                    Err(err) => {
                        guard.record_rejection(&err);
                        return Ok(rejection_response(err, None));
                    }
                }
            } else {
                (HashMap::new(), body)
            };

            let verdict = {
                let view = InboundRequest::from_parts(&parts)
                    .with_params(params)
                    .with_form(form);
                guard.evaluate(&parts.method, &view).await
            };

            let verdict = match verdict {
                Verdict::Rejected {
                    error,
                    expire_cookie,
                } => return Ok(rejection_response(error, expire_cookie)),
                other => other,
            };

            if let (Some(key), Some(token)) = (guard.context_key(), verdict.token()) {
                let mut locals = parts.extensions.remove::<Locals>().unwrap_or_default();
                locals.insert(key, token.as_str());
                parts.extensions.insert(locals);
            }

            let mut response = inner.call(Request::from_parts(parts, body)).await?;

            if let Verdict::Issued { cookie, .. } = verdict {
                append_cookie(response.headers_mut(), &cookie);
            }
            add_vary_cookie(response.headers_mut());

            Ok(response)
        })
    }
}

fn rejection_response(error: CsrfError, expire_cookie: Option<Cookie<'static>>) -> Response {
    let mut response = error.into_response();
    if let Some(cookie) = expire_cookie {
        append_cookie(response.headers_mut(), &cookie);
    }
    add_vary_cookie(response.headers_mut());
    response
}

fn append_cookie(headers: &mut HeaderMap, cookie: &Cookie<'static>) {
    match HeaderValue::from_str(&cookie.to_string()) {
        Ok(value) => {
            headers.append(header::SET_COOKIE, value);
        }
        Err(err) => {
            error!(cookie = cookie.name(), error = %err, "CSRF cookie is not a valid header value");
        }
    }
}

/// Add `Cookie` to the `Vary` header unless it is already covered.
pub fn add_vary_cookie(headers: &mut HeaderMap) {
    let existing: Vec<String> = headers
        .get_all(header::VARY)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|field| field.trim().to_string())
        .filter(|field| !field.is_empty())
        .collect();

    if existing
        .iter()
        .any(|field| field == "*" || field.eq_ignore_ascii_case("cookie"))
    {
        return;
    }

    let merged = existing
        .into_iter()
        .chain(std::iter::once("Cookie".to_string()))
        .collect::<Vec<_>>()
        .join(", ");

    if let Ok(value) = HeaderValue::from_str(&merged) {
        headers.insert(header::VARY, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Method, StatusCode};
    use std::convert::Infallible;
    use tower::ServiceExt;

    /// Answers 200 only if `poll_ready` ran on this very instance.
    #[derive(Default)]
    struct ReadyTracker {
        ready: bool,
    }

    impl Clone for ReadyTracker {
        fn clone(&self) -> Self {
            Self { ready: false }
        }
    }

    impl Service<Request> for ReadyTracker {
        type Response = Response;
        type Error = Infallible;
        type Future = std::future::Ready<Result<Response, Infallible>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            self.ready = true;
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _request: Request) -> Self::Future {
            let status = if self.ready {
                StatusCode::OK
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            std::future::ready(Ok(status.into_response()))
        }
    }

    #[tokio::test]
    async fn test_inner_is_called_on_the_polled_instance() {
        let layer = CsrfLayer::new(CsrfConfig::default()).unwrap();
        let service = layer.layer(ReadyTracker::default());

        let request = axum::http::Request::builder()
            .method(Method::HEAD)
            .uri("/")
            .body(Body::empty())
            .unwrap();
        let response = service.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_vary_added_when_absent() {
        let mut headers = HeaderMap::new();
        add_vary_cookie(&mut headers);
        assert_eq!(headers.get(header::VARY).unwrap(), "Cookie");
    }

    #[test]
    fn test_vary_merges_existing_values() {
        let mut headers = HeaderMap::new();
        headers.append(header::VARY, HeaderValue::from_static("Accept-Encoding"));
        headers.append(header::VARY, HeaderValue::from_static("Origin"));

        add_vary_cookie(&mut headers);

        let values: Vec<_> = headers.get_all(header::VARY).iter().collect();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0], "Accept-Encoding, Origin, Cookie");
    }

    #[test]
    fn test_vary_not_duplicated() {
        let mut headers = HeaderMap::new();
        headers.insert(header::VARY, HeaderValue::from_static("accept, cookie"));

        add_vary_cookie(&mut headers);

        assert_eq!(headers.get(header::VARY).unwrap(), "accept, cookie");
    }

    #[test]
    fn test_vary_wildcard_left_alone() {
        let mut headers = HeaderMap::new();
        headers.insert(header::VARY, HeaderValue::from_static("*"));

        add_vary_cookie(&mut headers);

        assert_eq!(headers.get(header::VARY).unwrap(), "*");
    }
}
