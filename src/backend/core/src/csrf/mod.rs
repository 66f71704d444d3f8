//! Double-submit cookie CSRF protection.
//!
//! A token is issued in a cookie on `GET` requests and must be echoed back
//! through a second channel (header, query, path parameter, form field or
//! another cookie) on `POST`, `PUT`, `PATCH` and `DELETE`. Echoed tokens are
//! checked against a [`TokenStore`]; unknown tokens are deleted, their cookie
//! is expired and the request is refused with 403.
//!
//! ## Components
//!
//! - [`Extractor`]: reads the submitted token from the configured location
//! - [`TokenStore`]: [`MemoryStore`] in process, [`RedisStore`] when shared
//! - [`TokenGenerator`]: [`RandomTokenGenerator`] by default
//! - [`CookieSpec`]: attributes of issued and expired cookies
//! - [`CsrfGuard`]: issue and verify state machine
//! - [`CsrfLayer`]: tower integration

pub mod config;
pub mod context;
pub mod cookie;
pub mod error;
pub mod extractor;
pub mod guard;
pub mod layer;
pub mod redis_store;
pub mod request;
pub mod skipper;
pub mod store;
pub mod token;

pub use self::config::{
    CsrfConfig, CsrfConfigBuilder, DEFAULT_EXPIRATION, DEFAULT_FORM_LIMIT, DEFAULT_KEY_LOOKUP,
};
pub use self::context::Locals;
pub use self::cookie::{CookieSpec, SameSitePolicy, DEFAULT_COOKIE_NAME};
pub use self::error::CsrfError;
pub use self::extractor::{Extractor, RequestSource, TokenSource};
pub use self::guard::{CsrfGuard, MethodClass, Verdict};
pub use self::layer::{CsrfLayer, CsrfService};
pub use self::redis_store::RedisStore;
pub use self::request::InboundRequest;
pub use self::skipper::{PathPrefixSkipper, Skipper};
pub use self::store::{MemoryStore, TokenStore};
pub use self::token::{RandomTokenGenerator, Token, TokenGenerator, UuidTokenGenerator};
