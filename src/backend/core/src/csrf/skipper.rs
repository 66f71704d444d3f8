//! Bypass predicates evaluated before any CSRF processing.

use axum::extract::Request;

/// Decides whether a request skips CSRF handling entirely.
///
/// Skipped requests get no cookie, no `Vary` header and no locals entry.
pub trait Skipper: Send + Sync {
    fn skip(&self, request: &Request) -> bool;
}

impl<F> Skipper for F
where
    F: Fn(&Request) -> bool + Send + Sync,
{
    fn skip(&self, request: &Request) -> bool {
        self(request)
    }
}

/// Skips requests whose path starts with any configured prefix.
#[derive(Debug, Clone, Default)]
pub struct PathPrefixSkipper {
    prefixes: Vec<String>,
}

impl PathPrefixSkipper {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }
}

impl Skipper for PathPrefixSkipper {
    fn skip(&self, request: &Request) -> bool {
        let path = request.uri().path();
        self.prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }
}
