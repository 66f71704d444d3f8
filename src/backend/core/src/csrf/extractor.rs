//! Token extraction from the configured request location.
//!
//! The location is selected once from a `"<source>:<key>"` lookup string,
//! for example `header:X-Csrf-Token` or `form:_csrf`. Extraction itself only
//! needs a [`RequestSource`], so it has no dependency on the HTTP stack and
//! can be exercised with plain maps in tests.

use axum::http::HeaderName;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use super::error::CsrfError;
use super::token::Token;

// ═══════════════════════════════════════════════════════════════════════════════
// Request View
// ═══════════════════════════════════════════════════════════════════════════════

/// Read-only lookups an extractor may perform against an inbound request.
pub trait RequestSource {
    /// Value of a request header, if present and valid UTF-8.
    fn header(&self, name: &HeaderName) -> Option<&str>;

    /// Value of a query string parameter.
    fn query(&self, key: &str) -> Option<&str>;

    /// Value of a matched route path parameter.
    fn param(&self, key: &str) -> Option<&str>;

    /// Value of a form body field.
    fn form(&self, key: &str) -> Option<&str>;

    /// Value of a request cookie.
    fn cookie(&self, name: &str) -> Option<String>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// Token Source
// ═══════════════════════════════════════════════════════════════════════════════

/// Where in the request a token is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenSource {
    Header,
    Query,
    Param,
    Form,
    Cookie,
}

impl TokenSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Header => "header",
            Self::Query => "query",
            Self::Param => "param",
            Self::Form => "form",
            Self::Cookie => "cookie",
        }
    }
}

impl fmt::Display for TokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Extractor
// ═══════════════════════════════════════════════════════════════════════════════

/// A fixed `(source, key)` pair, built once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extractor {
    Header(HeaderName),
    Query(String),
    Param(String),
    Form(String),
    Cookie(String),
}

impl Extractor {
    /// Parse a `"<source>:<key>"` lookup.
    ///
    /// An unrecognized source keyword falls back to a header extractor keyed
    /// by `key`. A cookie extractor may not read `cookie_name`, the cookie
    /// the token is issued in.
    pub fn from_key_lookup(lookup: &str, cookie_name: &str) -> Result<Self, CsrfError> {
        let parts: Vec<&str> = lookup.split(':').collect();
        let [source, key] = parts.as_slice() else {
            return Err(CsrfError::InvalidKeyLookup(lookup.to_string()));
        };
        if key.is_empty() {
            return Err(CsrfError::InvalidKeyLookup(lookup.to_string()));
        }

        let extractor = match *source {
            "header" => Self::header(key)?,
            "query" => Self::Query(key.to_string()),
            "param" => Self::Param(key.to_string()),
            "form" => Self::Form(key.to_string()),
            "cookie" => {
                if *key == cookie_name {
                    return Err(CsrfError::CookieKeyCollision {
                        key: key.to_string(),
                    });
                }
                Self::Cookie(key.to_string())
            }
            other => {
                warn!(
                    source = other,
                    key = *key,
                    "Unknown CSRF token source, falling back to header extraction"
                );
                Self::header(key)?
            }
        };

        Ok(extractor)
    }

    fn header(key: &str) -> Result<Self, CsrfError> {
        HeaderName::from_bytes(key.as_bytes())
            .map(Self::Header)
            .map_err(|_| CsrfError::InvalidHeaderName(key.to_string()))
    }

    /// Location this extractor reads from.
    pub fn source(&self) -> TokenSource {
        match self {
            Self::Header(_) => TokenSource::Header,
            Self::Query(_) => TokenSource::Query,
            Self::Param(_) => TokenSource::Param,
            Self::Form(_) => TokenSource::Form,
            Self::Cookie(_) => TokenSource::Cookie,
        }
    }

    /// Key within the location, header names in canonical lowercase form.
    pub fn key(&self) -> &str {
        match self {
            Self::Header(name) => name.as_str(),
            Self::Query(key) | Self::Param(key) | Self::Form(key) | Self::Cookie(key) => key,
        }
    }

    /// Whether extraction needs the request body.
    pub fn needs_body(&self) -> bool {
        matches!(self, Self::Form(_))
    }

    /// Pull the submitted token out of `request`. Empty values count as missing.
    pub fn extract<R: RequestSource + ?Sized>(&self, request: &R) -> Result<Token, CsrfError> {
        let value = match self {
            Self::Header(name) => request.header(name).map(str::to_owned),
            Self::Query(key) => request.query(key).map(str::to_owned),
            Self::Param(key) => request.param(key).map(str::to_owned),
            Self::Form(key) => request.form(key).map(str::to_owned),
            Self::Cookie(name) => request.cookie(name),
        };

        match value {
            Some(token) if !token.is_empty() => Ok(Token::new(token)),
            _ => Err(CsrfError::MissingToken(self.source())),
        }
    }
}
