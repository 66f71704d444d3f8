//! Cookie policy for issued and expired CSRF cookies.

use cookie::time::{Duration as TimeDuration, OffsetDateTime};
use cookie::{Cookie, SameSite};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default CSRF cookie name.
pub const DEFAULT_COOKIE_NAME: &str = "csrf_";

/// `SameSite` attribute of the CSRF cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSitePolicy {
    #[default]
    Strict,
    Lax,
    None,
}

impl SameSitePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "Strict",
            Self::Lax => "Lax",
            Self::None => "None",
        }
    }
}

impl From<SameSitePolicy> for SameSite {
    fn from(policy: SameSitePolicy) -> Self {
        match policy {
            SameSitePolicy::Strict => SameSite::Strict,
            SameSitePolicy::Lax => SameSite::Lax,
            SameSitePolicy::None => SameSite::None,
        }
    }
}

/// Attributes shared by every cookie the layer emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieSpec {
    pub name: String,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: SameSitePolicy,
}

impl Default for CookieSpec {
    fn default() -> Self {
        Self {
            name: DEFAULT_COOKIE_NAME.to_string(),
            domain: None,
            path: None,
            secure: false,
            http_only: false,
            same_site: SameSitePolicy::Strict,
        }
    }
}

/// Expiry instant of a cookie issued now, if the calendar can represent it.
pub fn expires_at(expiration: Duration) -> Option<OffsetDateTime> {
    let expiration = TimeDuration::try_from(expiration).ok()?;
    OffsetDateTime::now_utc().checked_add(expiration)
}

impl CookieSpec {
    /// Cookie carrying `token`, expiring `expiration` from now.
    ///
    /// An unrepresentable expiry yields a session cookie.
    pub fn issue(&self, token: &str, expiration: Duration) -> Cookie<'static> {
        self.render(token.to_owned(), expires_at(expiration))
    }

    /// Empty cookie dated one minute in the past, telling the client to drop it.
    pub fn expire(&self) -> Cookie<'static> {
        self.render(
            String::new(),
            Some(OffsetDateTime::now_utc() - Duration::from_secs(60)),
        )
    }

    fn render(&self, value: String, expires: Option<OffsetDateTime>) -> Cookie<'static> {
        let mut builder = Cookie::build((self.name.clone(), value))
            .expires(expires)
            .secure(self.secure)
            .http_only(self.http_only)
            .same_site(self.same_site.into());

        if let Some(domain) = &self.domain {
            builder = builder.domain(domain.clone());
        }
        if let Some(path) = &self.path {
            builder = builder.path(path.clone());
        }

        builder.build()
    }
}
