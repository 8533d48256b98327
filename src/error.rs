use std::fmt;

use thiserror::Error;

use crate::AuthenticationProperties;

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("os rng error: {message}")]
    OsRng { message: String },

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("http status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("invalid response: {message}")]
    InvalidResponse { message: String, body: String },

    #[error("access token was not found in the token response")]
    MissingAccessToken,

    #[error("state protection failed: {message}")]
    StateProtection { message: String },

    #[error("invalid options: {0}")]
    InvalidOptions(String),
}

/// Why an authentication attempt did not produce a signed-in identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// `code` or `state` missing, duplicated, or the state failed to unprotect.
    MalformedRequest,
    /// The correlation id in the state did not match the host's store.
    CsrfMismatch,
    /// The token or user-info call failed, returned non-2xx, or could not be parsed.
    TransportError,
    /// The token endpoint answered without an access token.
    MissingToken,
    /// The `authenticated` hook removed the identity.
    HookRejected,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MalformedRequest => "malformed_request",
            Self::CsrfMismatch => "csrf_mismatch",
            Self::TransportError => "transport_error",
            Self::MissingToken => "missing_token",
            Self::HookRejected => "hook_rejected",
        };
        f.write_str(name)
    }
}

/// Failed ticket: the reason plus whatever properties were recovered from the state.
///
/// `properties` is `None` only when the state could not be read at all, which the
/// return endpoint reports as a server error instead of redirecting.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthFailure {
    pub reason: FailureReason,
    pub properties: Option<AuthenticationProperties>,
}

impl AuthFailure {
    pub fn new(reason: FailureReason, properties: Option<AuthenticationProperties>) -> Self {
        Self { reason, properties }
    }

    pub fn malformed() -> Self {
        Self::new(FailureReason::MalformedRequest, None)
    }
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "authentication failed: {}", self.reason)
    }
}

impl std::error::Error for AuthFailure {}
