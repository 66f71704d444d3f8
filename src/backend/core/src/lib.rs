#![allow(clippy::result_large_err)]
//! # Tollgate Core
//!
//! Double-submit cookie CSRF protection for axum and tower services.
//!
//! ## Architecture
//!
//! - **CSRF**: token issuance on `GET`, verification on unsafe methods, cookie policy
//! - **Stores**: in-memory (`DashMap`) and Redis token stores behind one async trait
//! - **Config**: layered file + environment configuration
//! - **Telemetry**: structured logging with redaction and Prometheus metrics
//! - **Errors**: structured error codes with HTTP mapping

pub mod api;
pub mod config;
pub mod csrf;
pub mod error;
pub mod telemetry;

pub use error::{ErrorCode, ErrorSeverity, Result, TollgateError};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{Config, CsrfSettings, StorageConfig};
    pub use crate::csrf::{
        CookieSpec, CsrfConfig, CsrfError, CsrfGuard, CsrfLayer, Extractor, Locals, MemoryStore,
        PathPrefixSkipper, RandomTokenGenerator, RedisStore, SameSitePolicy, Skipper, Token,
        TokenGenerator, TokenSource, TokenStore, UuidTokenGenerator,
    };
    pub use crate::error::{ErrorCode, ErrorSeverity, Result, TollgateError};
    pub use crate::telemetry::{init_telemetry, MetricsRegistry, TelemetryConfig};
}
