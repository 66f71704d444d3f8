//! Request-scoped values shared with downstream handlers.

use axum::{extract::FromRequestParts, http::request::Parts};
use std::collections::HashMap;
use std::convert::Infallible;

/// String map stored in the request extensions.
///
/// When a context key is configured, the CSRF layer stores the resolved token
/// here so handlers can embed it in forms or pages.
///
/// ```rust,ignore
/// async fn form(locals: Locals) -> String {
///     locals.get("csrf").unwrap_or_default().to_string()
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Locals(HashMap<String, String>);

impl Locals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Locals
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<Locals>().cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[tokio::test]
    async fn test_extract_from_extensions() {
        let mut locals = Locals::new();
        locals.insert("csrf", "token-value");

        let (mut parts, _) = Request::builder()
            .extension(locals)
            .body(())
            .unwrap()
            .into_parts();

        let extracted = Locals::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(extracted.get("csrf"), Some("token-value"));
    }

    #[tokio::test]
    async fn test_missing_extension_yields_empty() {
        let (mut parts, _) = Request::builder().body(()).unwrap().into_parts();
        let extracted = Locals::from_request_parts(&mut parts, &()).await.unwrap();
        assert!(extracted.is_empty());
    }
}
