//! Per-request CSRF decision logic.
//!
//! [`CsrfGuard`] holds the validated configuration and decides, for a given
//! method and request view, whether to issue a token, verify one, or let the
//! request through. It does not touch responses; [`super::CsrfLayer`] turns
//! the resulting [`Verdict`] into HTTP.

use axum::extract::Request;
use axum::http::Method;
use cookie::Cookie;
use metrics::counter;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::config::CsrfConfig;
use super::cookie::{expires_at, CookieSpec};
use super::error::CsrfError;
use super::extractor::{Extractor, RequestSource};
use super::skipper::Skipper;
use super::store::{MemoryStore, TokenStore};
use super::token::{Token, TokenGenerator};

// ═══════════════════════════════════════════════════════════════════════════════
// Method Classification
// ═══════════════════════════════════════════════════════════════════════════════

/// What the guard does for a request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodClass {
    /// GET: make sure the client holds a token
    Issue,
    /// POST, PUT, PATCH, DELETE: require a valid echoed token
    Verify,
    /// Everything else
    Pass,
}

impl MethodClass {
    pub fn of(method: &Method) -> Self {
        match *method {
            Method::GET => Self::Issue,
            Method::POST | Method::PUT | Method::PATCH | Method::DELETE => Self::Verify,
            _ => Self::Pass,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Verdict
// ═══════════════════════════════════════════════════════════════════════════════

/// Outcome of evaluating one request.
#[derive(Debug)]
pub enum Verdict {
    /// Safe request; `cookie` must be attached to the response.
    Issued { token: Token, cookie: Cookie<'static> },
    /// Unsafe request carrying a live token.
    Verified { token: Token },
    /// Method is neither issued for nor verified.
    Passthrough,
    /// The request must not reach the handler.
    Rejected {
        error: CsrfError,
        expire_cookie: Option<Cookie<'static>>,
    },
}

impl Verdict {
    /// Token resolved for this request, if any.
    pub fn token(&self) -> Option<&Token> {
        match self {
            Self::Issued { token, .. } | Self::Verified { token } => Some(token),
            Self::Passthrough | Self::Rejected { .. } => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Guard
// ═══════════════════════════════════════════════════════════════════════════════

/// Validated CSRF configuration plus the issue and verify state machine.
pub struct CsrfGuard {
    extractor: Extractor,
    cookie: CookieSpec,
    expiration: Duration,
    context_key: Option<String>,
    generator: Arc<dyn TokenGenerator>,
    store: Arc<dyn TokenStore>,
    next: Option<Arc<dyn Skipper>>,
    form_limit: usize,
}

impl std::fmt::Debug for CsrfGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsrfGuard")
            .field("extractor", &self.extractor)
            .field("cookie", &self.cookie)
            .field("expiration", &self.expiration)
            .field("context_key", &self.context_key)
            .field("store", &self.store.name())
            .finish_non_exhaustive()
    }
}

impl CsrfGuard {
    /// Validate `config` and build a guard.
    ///
    /// Fails when `key_lookup` is malformed, names an invalid header, or
    /// points a cookie extractor at the CSRF cookie itself, and when
    /// `expiration` is too large to date a cookie or a store deadline.
    pub fn new(config: CsrfConfig) -> Result<Self, CsrfError> {
        let extractor = Extractor::from_key_lookup(&config.key_lookup, &config.cookie.name)?;

        if expires_at(config.expiration).is_none()
            || Instant::now().checked_add(config.expiration).is_none()
        {
            return Err(CsrfError::InvalidExpiration(config.expiration));
        }
        let store = config
            .storage
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));

        info!(
            source = %extractor.source(),
            key = extractor.key(),
            cookie = %config.cookie.name,
            expiration_secs = config.expiration.as_secs(),
            store = store.name(),
            "CSRF protection configured"
        );

        Ok(Self {
            extractor,
            cookie: config.cookie,
            expiration: config.expiration,
            context_key: config.context_key,
            generator: config.token_generator,
            store,
            next: config.next,
            form_limit: config.form_limit,
        })
    }

    pub fn extractor(&self) -> &Extractor {
        &self.extractor
    }

    pub fn cookie(&self) -> &CookieSpec {
        &self.cookie
    }

    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    pub fn context_key(&self) -> Option<&str> {
        self.context_key.as_deref()
    }

    pub fn form_limit(&self) -> usize {
        self.form_limit
    }

    /// Whether the bypass predicate exempts this request.
    pub fn should_skip(&self, request: &Request) -> bool {
        self.next.as_ref().is_some_and(|next| next.skip(request))
    }

    /// Decide what happens to a request with `method`, read through `request`.
    pub async fn evaluate<R>(&self, method: &Method, request: &R) -> Verdict
    where
        R: RequestSource + Sync + ?Sized,
    {
        match MethodClass::of(method) {
            MethodClass::Issue => self.issue(request).await,
            MethodClass::Verify => self.verify(request).await,
            MethodClass::Pass => Verdict::Passthrough,
        }
    }

    async fn issue<R>(&self, request: &R) -> Verdict
    where
        R: RequestSource + Sync + ?Sized,
    {
        let existing = request
            .cookie(&self.cookie.name)
            .filter(|value| !value.is_empty());

        let token = match existing {
            Some(value) => Token::new(value),
            None => {
                let token = Token::new(self.generator.generate());
                if let Err(err) = self.store.set(token.as_str(), self.expiration).await {
                    return self.reject(CsrfError::Store(err), None);
                }
                counter!("csrf_tokens_issued_total").increment(1);
                debug!(store = self.store.name(), "Issued new CSRF token");
                token
            }
        };

        let cookie = self.cookie.issue(token.as_str(), self.expiration);
        Verdict::Issued { token, cookie }
    }

    async fn verify<R>(&self, request: &R) -> Verdict
    where
        R: RequestSource + Sync + ?Sized,
    {
        let token = match self.extractor.extract(request) {
            Ok(token) => token,
            Err(err) => return self.reject(err, None),
        };

        match self.store.contains(token.as_str()).await {
            Ok(true) => {
                counter!("csrf_verifications_total", "result" => "success").increment(1);
                debug!(source = %self.extractor.source(), "CSRF token verified");
                Verdict::Verified { token }
            }
            Ok(false) => {
                if let Err(err) = self.store.delete(token.as_str()).await {
                    error!(
                        store = self.store.name(),
                        error = %err,
                        "Failed to delete rejected CSRF token"
                    );
                }
                self.reject(CsrfError::InvalidToken, Some(self.cookie.expire()))
            }
            Err(err) => self.reject(CsrfError::Store(err), None),
        }
    }

    /// Record a rejection and wrap it as a verdict.
    fn reject(&self, error: CsrfError, expire_cookie: Option<Cookie<'static>>) -> Verdict {
        self.record_rejection(&error);
        Verdict::Rejected {
            error,
            expire_cookie,
        }
    }

    /// Count and log a rejection.
    pub fn record_rejection(&self, error: &CsrfError) {
        counter!("csrf_rejections_total", "reason" => error.reason()).increment(1);

        if let CsrfError::MissingToken(location) = error {
            counter!("csrf_verifications_total", "result" => "failure").increment(1);
            debug!(location = %location, "CSRF token missing");
        } else if error.is_rejection() {
            counter!("csrf_verifications_total", "result" => "failure").increment(1);
            warn!(
                reason = error.reason(),
                source = %self.extractor.source(),
                error = %error,
                "CSRF verification failed"
            );
        } else if let CsrfError::Store(inner) = error {
            inner.log();
        } else {
            error!(error = %error, "CSRF protection failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderName;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeRequest {
        headers: HashMap<HeaderName, String>,
        cookies: HashMap<String, String>,
    }

    impl RequestSource for FakeRequest {
        fn header(&self, name: &HeaderName) -> Option<&str> {
            self.headers.get(name).map(String::as_str)
        }
        fn query(&self, _key: &str) -> Option<&str> {
            None
        }
        fn param(&self, _key: &str) -> Option<&str> {
            None
        }
        fn form(&self, _key: &str) -> Option<&str> {
            None
        }
        fn cookie(&self, name: &str) -> Option<String> {
            self.cookies.get(name).cloned()
        }
    }

    fn guard_with(store: Arc<MemoryStore>) -> CsrfGuard {
        CsrfGuard::new(CsrfConfig::builder().storage(store).build()).unwrap()
    }

    fn with_header(token: &str) -> FakeRequest {
        let mut request = FakeRequest::default();
        request
            .headers
            .insert(HeaderName::from_static("x-csrf-token"), token.to_string());
        request
    }

    #[test]
    fn test_out_of_range_expiration_fails_at_construction() {
        for expiration in [Duration::from_secs(20_000 * 365 * 24 * 3600), Duration::MAX] {
            let result = CsrfGuard::new(CsrfConfig::builder().expiration(expiration).build());
            assert!(matches!(result, Err(CsrfError::InvalidExpiration(_))));
        }
    }

    #[tokio::test]
    async fn test_long_expiration_within_range_issues() {
        let guard = CsrfGuard::new(
            CsrfConfig::builder()
                .expiration(Duration::from_secs(50 * 365 * 24 * 3600))
                .build(),
        )
        .unwrap();

        let verdict = guard
            .evaluate(&Method::GET, &FakeRequest::default())
            .await;

        match verdict {
            Verdict::Issued { cookie, .. } => assert!(cookie.expires_datetime().is_some()),
            other => panic!("expected issuance, got {:?}", other),
        }
    }

    #[test]
    fn test_method_classification() {
        assert_eq!(MethodClass::of(&Method::GET), MethodClass::Issue);
        for method in [Method::POST, Method::PUT, Method::PATCH, Method::DELETE] {
            assert_eq!(MethodClass::of(&method), MethodClass::Verify);
        }
        for method in [Method::HEAD, Method::OPTIONS, Method::TRACE] {
            assert_eq!(MethodClass::of(&method), MethodClass::Pass);
        }
    }

    #[tokio::test]
    async fn test_issue_generates_and_stores() {
        let store = Arc::new(MemoryStore::new());
        let guard = guard_with(store.clone());

        let verdict = guard.evaluate(&Method::GET, &FakeRequest::default()).await;
        let Verdict::Issued { token, cookie } = verdict else {
            panic!("expected issuance");
        };

        assert_eq!(cookie.value(), token.as_str());
        assert!(store.contains(token.as_str()).await.unwrap());
    }

    #[tokio::test]
    async fn test_issue_reuses_cookie_without_store() {
        let store = Arc::new(MemoryStore::new());
        let guard = guard_with(store.clone());
        let mut request = FakeRequest::default();
        request.cookies.insert("csrf_".into(), "existing".into());

        let verdict = guard.evaluate(&Method::GET, &request).await;

        assert_eq!(verdict.token().map(Token::as_str), Some("existing"));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_verify_accepts_stored_token_repeatedly() {
        let store = Arc::new(MemoryStore::new());
        store.set("good", Duration::from_secs(60)).await.unwrap();
        let guard = guard_with(store.clone());

        for _ in 0..2 {
            let verdict = guard.evaluate(&Method::POST, &with_header("good")).await;
            assert!(matches!(verdict, Verdict::Verified { .. }));
        }
        assert!(store.contains("good").await.unwrap());
    }

    #[tokio::test]
    async fn test_verify_rejects_unknown_token_and_expires_cookie() {
        let guard = guard_with(Arc::new(MemoryStore::new()));

        let verdict = guard.evaluate(&Method::DELETE, &with_header("forged")).await;
        let Verdict::Rejected { error, expire_cookie } = verdict else {
            panic!("expected rejection");
        };

        assert!(matches!(error, CsrfError::InvalidToken));
        let cookie = expire_cookie.unwrap();
        assert_eq!(cookie.name(), "csrf_");
        assert_eq!(cookie.value(), "");
    }

    #[tokio::test]
    async fn test_verify_missing_token_sets_no_cookie() {
        let guard = guard_with(Arc::new(MemoryStore::new()));

        let verdict = guard.evaluate(&Method::PATCH, &FakeRequest::default()).await;

        assert!(matches!(
            verdict,
            Verdict::Rejected {
                error: CsrfError::MissingToken(_),
                expire_cookie: None
            }
        ));
    }

    #[tokio::test]
    async fn test_other_methods_pass_through() {
        let store = Arc::new(MemoryStore::new());
        let guard = guard_with(store.clone());

        let verdict = guard.evaluate(&Method::OPTIONS, &FakeRequest::default()).await;

        assert!(matches!(verdict, Verdict::Passthrough));
        assert!(store.is_empty());
    }

    #[test]
    fn test_new_rejects_cookie_collision() {
        let config = CsrfConfig::builder().key_lookup("cookie:csrf_").build();
        assert!(matches!(
            CsrfGuard::new(config),
            Err(CsrfError::CookieKeyCollision { .. })
        ));
    }
}
