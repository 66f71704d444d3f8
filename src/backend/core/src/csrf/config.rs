//! Runtime configuration for the CSRF layer.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::cookie::{CookieSpec, SameSitePolicy};
use super::skipper::{PathPrefixSkipper, Skipper};
use super::store::TokenStore;
use super::token::{RandomTokenGenerator, TokenGenerator};
use crate::config::CsrfSettings;

/// Default token location.
pub const DEFAULT_KEY_LOOKUP: &str = "header:X-Csrf-Token";

/// Default lifetime of an issued token and its cookie.
pub const DEFAULT_EXPIRATION: Duration = Duration::from_secs(60 * 60);

/// Default maximum form body size buffered for `form:` extraction.
pub const DEFAULT_FORM_LIMIT: usize = 1024 * 1024;

/// CSRF layer configuration.
///
/// Unset `storage` means a fresh [`super::MemoryStore`] is created when the
/// guard is built.
#[derive(Clone)]
pub struct CsrfConfig {
    /// Token location as `"<source>:<key>"`
    pub key_lookup: String,

    /// Attributes of the token cookie
    pub cookie: CookieSpec,

    /// Token and cookie lifetime
    pub expiration: Duration,

    /// Locals key the resolved token is exposed under
    pub context_key: Option<String>,

    pub token_generator: Arc<dyn TokenGenerator>,

    pub storage: Option<Arc<dyn TokenStore>>,

    /// Bypass predicate
    pub next: Option<Arc<dyn Skipper>>,

    /// Maximum buffered form body size in bytes
    pub form_limit: usize,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            key_lookup: DEFAULT_KEY_LOOKUP.to_string(),
            cookie: CookieSpec::default(),
            expiration: DEFAULT_EXPIRATION,
            context_key: None,
            token_generator: Arc::new(RandomTokenGenerator::default()),
            storage: None,
            next: None,
            form_limit: DEFAULT_FORM_LIMIT,
        }
    }
}

impl fmt::Debug for CsrfConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CsrfConfig")
            .field("key_lookup", &self.key_lookup)
            .field("cookie", &self.cookie)
            .field("expiration", &self.expiration)
            .field("context_key", &self.context_key)
            .field("storage", &self.storage.as_ref().map(|s| s.name()))
            .field("next", &self.next.is_some())
            .field("form_limit", &self.form_limit)
            .finish_non_exhaustive()
    }
}

impl CsrfConfig {
    pub fn builder() -> CsrfConfigBuilder {
        CsrfConfigBuilder::default()
    }

    /// Build a configuration from loaded settings.
    ///
    /// Exempt paths become a [`PathPrefixSkipper`]. The store is left unset;
    /// attach one with [`CsrfConfigBuilder::storage`] or by assigning `storage`.
    pub fn from_settings(settings: &CsrfSettings) -> Self {
        let next: Option<Arc<dyn Skipper>> = if settings.exempt_paths.is_empty() {
            None
        } else {
            Some(Arc::new(PathPrefixSkipper::new(settings.exempt_paths.iter().cloned())))
        };

        Self {
            key_lookup: settings.key_lookup.clone(),
            cookie: CookieSpec {
                name: settings.cookie_name.clone(),
                domain: settings.cookie_domain.clone(),
                path: settings.cookie_path.clone(),
                secure: settings.cookie_secure,
                http_only: settings.cookie_http_only,
                same_site: settings.cookie_same_site,
            },
            expiration: settings.expiration,
            context_key: settings.context_key.clone(),
            token_generator: Arc::new(RandomTokenGenerator::default()),
            storage: None,
            next,
            form_limit: settings.form_limit,
        }
    }
}

/// Builder for CSRF configuration.
#[derive(Debug, Default)]
pub struct CsrfConfigBuilder {
    config: CsrfConfig,
}

impl CsrfConfigBuilder {
    pub fn key_lookup(mut self, lookup: impl Into<String>) -> Self {
        self.config.key_lookup = lookup.into();
        self
    }

    pub fn cookie_name(mut self, name: impl Into<String>) -> Self {
        self.config.cookie.name = name.into();
        self
    }

    pub fn cookie_domain(mut self, domain: impl Into<String>) -> Self {
        self.config.cookie.domain = Some(domain.into());
        self
    }

    pub fn cookie_path(mut self, path: impl Into<String>) -> Self {
        self.config.cookie.path = Some(path.into());
        self
    }

    pub fn cookie_secure(mut self, secure: bool) -> Self {
        self.config.cookie.secure = secure;
        self
    }

    pub fn cookie_http_only(mut self, http_only: bool) -> Self {
        self.config.cookie.http_only = http_only;
        self
    }

    pub fn cookie_same_site(mut self, same_site: SameSitePolicy) -> Self {
        self.config.cookie.same_site = same_site;
        self
    }

    pub fn expiration(mut self, expiration: Duration) -> Self {
        self.config.expiration = expiration;
        self
    }

    pub fn context_key(mut self, key: impl Into<String>) -> Self {
        self.config.context_key = Some(key.into());
        self
    }

    pub fn token_generator(mut self, generator: impl TokenGenerator + 'static) -> Self {
        self.config.token_generator = Arc::new(generator);
        self
    }

    pub fn storage(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.config.storage = Some(store);
        self
    }

    pub fn next(mut self, skipper: impl Skipper + 'static) -> Self {
        self.config.next = Some(Arc::new(skipper));
        self
    }

    pub fn form_limit(mut self, limit: usize) -> Self {
        self.config.form_limit = limit;
        self
    }

    pub fn build(self) -> CsrfConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CsrfConfig::default();

        assert_eq!(config.key_lookup, "header:X-Csrf-Token");
        assert_eq!(config.cookie.name, "csrf_");
        assert_eq!(config.cookie.same_site, SameSitePolicy::Strict);
        assert_eq!(config.expiration, Duration::from_secs(3600));
        assert!(config.cookie.domain.is_none());
        assert!(config.cookie.path.is_none());
        assert!(!config.cookie.secure);
        assert!(!config.cookie.http_only);
        assert!(config.storage.is_none());
        assert!(config.next.is_none());
    }

    #[test]
    fn test_builder() {
        let config = CsrfConfig::builder()
            .key_lookup("form:_csrf")
            .cookie_name("xsrf")
            .cookie_path("/")
            .cookie_secure(true)
            .cookie_same_site(SameSitePolicy::Lax)
            .expiration(Duration::from_secs(120))
            .context_key("csrf")
            .token_generator(|| "fixed".to_string())
            .form_limit(4096)
            .build();

        assert_eq!(config.key_lookup, "form:_csrf");
        assert_eq!(config.cookie.name, "xsrf");
        assert_eq!(config.cookie.path.as_deref(), Some("/"));
        assert!(config.cookie.secure);
        assert_eq!(config.cookie.same_site, SameSitePolicy::Lax);
        assert_eq!(config.expiration, Duration::from_secs(120));
        assert_eq!(config.context_key.as_deref(), Some("csrf"));
        assert_eq!(config.token_generator.generate(), "fixed");
        assert_eq!(config.form_limit, 4096);
    }

    #[test]
    fn test_from_settings_maps_exempt_paths() {
        let settings = CsrfSettings {
            key_lookup: "query:csrf_token".into(),
            exempt_paths: vec!["/health".into()],
            ..Default::default()
        };
        let config = CsrfConfig::from_settings(&settings);

        assert_eq!(config.key_lookup, "query:csrf_token");
        assert!(config.next.is_some());
        assert!(CsrfConfig::from_settings(&CsrfSettings::default()).next.is_none());
    }

    #[test]
    fn test_debug_omits_generator() {
        let rendered = format!("{:?}", CsrfConfig::default());
        assert!(rendered.contains("key_lookup"));
        assert!(!rendered.contains("token_generator"));
    }
}
