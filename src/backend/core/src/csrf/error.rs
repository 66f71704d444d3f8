//! CSRF error types.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::time::Duration;
use thiserror::Error;

use super::extractor::TokenSource;
use crate::error::{ErrorCode, ErrorResponse, TollgateError};

/// Errors raised while configuring or enforcing CSRF protection.
///
/// The first four variants only occur at construction time. The rest are
/// request-time rejections; clients always see the same 403 body for those,
/// the location detail is kept for logs.
#[derive(Debug, Error)]
pub enum CsrfError {
    /// `key_lookup` is not of the form `<source>:<key>`.
    #[error("invalid key lookup '{0}', expected \"<source>:<key>\"")]
    InvalidKeyLookup(String),

    /// A cookie extractor would read the CSRF cookie itself.
    #[error("cookie extractor key '{key}' must differ from the csrf cookie name")]
    CookieKeyCollision { key: String },

    /// Header extractor key is not a valid HTTP header name.
    #[error("invalid header name '{0}'")]
    InvalidHeaderName(String),

    /// Token lifetime cannot be represented as a cookie or store deadline.
    #[error("expiration of {0:?} is out of range")]
    InvalidExpiration(Duration),

    #[error("missing csrf token in {0}")]
    MissingToken(TokenSource),

    #[error("invalid csrf token")]
    InvalidToken,

    #[error("unreadable request body: {0}")]
    UnreadableBody(String),

    #[error("token store failure: {0}")]
    Store(#[from] TollgateError),
}

impl CsrfError {
    /// Short label used for the `reason` metric dimension.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::InvalidKeyLookup(_)
            | Self::CookieKeyCollision { .. }
            | Self::InvalidHeaderName(_)
            | Self::InvalidExpiration(_) => "configuration",
            Self::MissingToken(_) => "missing_token",
            Self::InvalidToken => "invalid_token",
            Self::UnreadableBody(_) => "unreadable_body",
            Self::Store(_) => "store_failure",
        }
    }

    /// Machine-readable code reported to clients.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidKeyLookup(_)
            | Self::CookieKeyCollision { .. }
            | Self::InvalidHeaderName(_)
            | Self::InvalidExpiration(_) => ErrorCode::InvalidConfiguration,
            Self::MissingToken(_) | Self::InvalidToken | Self::UnreadableBody(_) => {
                ErrorCode::Forbidden
            }
            Self::Store(inner) => inner.code(),
        }
    }

    /// HTTP status for this error.
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::InvalidKeyLookup(_)
            | Self::CookieKeyCollision { .. }
            | Self::InvalidHeaderName(_)
            | Self::InvalidExpiration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::MissingToken(_) | Self::InvalidToken | Self::UnreadableBody(_) => {
                StatusCode::FORBIDDEN
            }
            Self::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Whether this is a client rejection rather than a server fault.
    pub fn is_rejection(&self) -> bool {
        self.http_status() == StatusCode::FORBIDDEN
    }
}

impl IntoResponse for CsrfError {
    fn into_response(self) -> Response {
        let status = self.http_status();
        let body = match &self {
            Self::Store(inner) => ErrorResponse::from(inner),
            _ if self.is_rejection() => ErrorResponse::new(self.code(), "Forbidden"),
            _ => ErrorResponse::new(self.code(), "CSRF protection is misconfigured"),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_token_messages_name_location() {
        assert_eq!(
            CsrfError::MissingToken(TokenSource::Header).to_string(),
            "missing csrf token in header"
        );
        assert_eq!(
            CsrfError::MissingToken(TokenSource::Form).to_string(),
            "missing csrf token in form"
        );
    }

    #[test]
    fn test_rejections_are_forbidden() {
        for err in [
            CsrfError::MissingToken(TokenSource::Query),
            CsrfError::InvalidToken,
            CsrfError::UnreadableBody("too large".into()),
        ] {
            assert!(err.is_rejection());
            assert_eq!(err.into_response().status(), StatusCode::FORBIDDEN);
        }
    }

    #[test]
    fn test_store_failure_is_unavailable() {
        let err = CsrfError::from(TollgateError::store("redis", "connection reset"));
        assert!(!err.is_rejection());
        assert_eq!(err.reason(), "store_failure");
        assert_eq!(err.code(), ErrorCode::StoreError);
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_invalid_expiration_is_configuration_error() {
        let err = CsrfError::InvalidExpiration(Duration::MAX);
        assert!(!err.is_rejection());
        assert_eq!(err.reason(), "configuration");
        assert_eq!(err.code(), ErrorCode::InvalidConfiguration);
    }
}
