//! Configuration management.
//!
//! Settings are layered: an optional file, then environment variables
//! prefixed with `TOLLGATE` using `__` as the nesting separator, e.g.
//! `TOLLGATE__CSRF__KEY_LOOKUP=query:csrf_token`.

use serde::Deserialize;
use std::time::Duration;

use crate::csrf::{
    SameSitePolicy, DEFAULT_COOKIE_NAME, DEFAULT_EXPIRATION, DEFAULT_FORM_LIMIT,
    DEFAULT_KEY_LOOKUP,
};
use crate::csrf::redis_store::DEFAULT_KEY_PREFIX;
use crate::csrf::store::DEFAULT_GC_INTERVAL;
use crate::error::Result;
use crate::telemetry::TelemetryConfig;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "TOLLGATE";

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    /// CSRF layer settings
    #[serde(default)]
    pub csrf: CsrfSettings,

    /// Token store backend
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Serializable CSRF settings, mapped onto [`crate::csrf::CsrfConfig`].
#[derive(Debug, Clone, Deserialize)]
pub struct CsrfSettings {
    /// Token location as `"<source>:<key>"`
    #[serde(default = "default_key_lookup")]
    pub key_lookup: String,

    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    #[serde(default)]
    pub cookie_domain: Option<String>,

    #[serde(default)]
    pub cookie_path: Option<String>,

    #[serde(default)]
    pub cookie_secure: bool,

    #[serde(default)]
    pub cookie_http_only: bool,

    #[serde(default)]
    pub cookie_same_site: SameSitePolicy,

    /// Token lifetime, e.g. "1h" or "30m"
    #[serde(default = "default_expiration", with = "humantime_serde")]
    pub expiration: Duration,

    /// Locals key the token is exposed under
    #[serde(default)]
    pub context_key: Option<String>,

    /// Path prefixes that bypass CSRF handling
    #[serde(default)]
    pub exempt_paths: Vec<String>,

    /// Maximum buffered form body size in bytes
    #[serde(default = "default_form_limit")]
    pub form_limit: usize,
}

impl Default for CsrfSettings {
    fn default() -> Self {
        Self {
            key_lookup: default_key_lookup(),
            cookie_name: default_cookie_name(),
            cookie_domain: None,
            cookie_path: None,
            cookie_secure: false,
            cookie_http_only: false,
            cookie_same_site: SameSitePolicy::default(),
            expiration: default_expiration(),
            context_key: None,
            exempt_paths: Vec::new(),
            form_limit: default_form_limit(),
        }
    }
}

/// Token store backend selection.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    Memory {
        /// Interval between sweeps of expired tokens
        #[serde(default = "default_gc_interval", with = "humantime_serde")]
        gc_interval: Duration,
    },
    Redis {
        url: String,

        #[serde(default = "default_key_prefix")]
        key_prefix: String,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Memory {
            gc_interval: default_gc_interval(),
        }
    }
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_key_lookup() -> String {
    DEFAULT_KEY_LOOKUP.to_string()
}

fn default_cookie_name() -> String {
    DEFAULT_COOKIE_NAME.to_string()
}

fn default_expiration() -> Duration {
    DEFAULT_EXPIRATION
}

fn default_form_limit() -> usize {
    DEFAULT_FORM_LIMIT
}

fn default_gc_interval() -> Duration {
    DEFAULT_GC_INTERVAL
}

fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Load from a specific file path, with environment overrides.
    pub fn from_file(path: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Socket address string the server binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csrf_settings_defaults() {
        let settings = CsrfSettings::default();
        assert_eq!(settings.key_lookup, "header:X-Csrf-Token");
        assert_eq!(settings.cookie_name, "csrf_");
        assert_eq!(settings.cookie_same_site, SameSitePolicy::Strict);
        assert_eq!(settings.expiration, Duration::from_secs(3600));
    }

    #[test]
    fn test_storage_defaults_to_memory() {
        assert_eq!(
            StorageConfig::default(),
            StorageConfig::Memory {
                gc_interval: Duration::from_secs(10)
            }
        );
    }

    #[test]
    fn test_deserialize_humantime_and_backend() {
        let config: Config = serde_json::from_str(
            r#"{
                "csrf": {
                    "key_lookup": "form:_csrf",
                    "expiration": "30m",
                    "cookie_same_site": "lax"
                },
                "storage": {"backend": "redis", "url": "redis://localhost:6379"}
            }"#,
        )
        .unwrap();

        assert_eq!(config.csrf.key_lookup, "form:_csrf");
        assert_eq!(config.csrf.expiration, Duration::from_secs(1800));
        assert_eq!(config.csrf.cookie_same_site, SameSitePolicy::Lax);
        assert_eq!(
            config.storage,
            StorageConfig::Redis {
                url: "redis://localhost:6379".into(),
                key_prefix: "tollgate:csrf:".into()
            }
        );
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
    }
}
