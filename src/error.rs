//! Error types for the warden crate.

use crate::request::SanitizedRequest;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Response fields accumulated before a request failed.
///
/// Attached to [`Error::Request`] so a caller can log the partial
/// exchange once, without re-deriving it from scattered state.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ResponseSnapshot {
    pub status: Option<u16>,
    pub status_text: Option<String>,
    pub url: Option<String>,
    pub redirect_urls: Vec<String>,
    pub redirect_count: u32,
}

/// Errors that can occur during HTTP and session operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed URL, unknown data type, or otherwise unusable input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The underlying transport failed before or during the exchange.
    #[error("transport error: {0}")]
    Transport(String),

    /// HTTP protocol violation: bad redirect, redirect limit, unknown
    /// content encoding.
    #[error("HTTP protocol error: {0}")]
    Protocol(String),

    /// The response arrived but failed a caller-supplied validation.
    #[error("response validation failed: {0}")]
    Validation(String),

    /// Session lifecycle violation: handle misuse, shutdown during a
    /// wait, login or logout callback failure.
    #[error("session error: {0}")]
    Session(String),

    /// A queued session request exceeded its wait budget.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// URL parsing error.
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A failure decorated with the sanitized in-flight request and any
    /// response fields accumulated before the failure.
    #[error("{source}")]
    Request {
        source: Box<Error>,
        request: Box<SanitizedRequest>,
        response: Option<Box<ResponseSnapshot>>,
    },
}

impl Error {
    /// Create an invalid-input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Create an HTTP protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Create a response validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a session lifecycle error.
    pub fn session(message: impl Into<String>) -> Self {
        Self::Session(message.into())
    }

    /// Create a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout(message.into())
    }

    /// Attach the sanitized request (and any partial response) to this
    /// error. Already-decorated errors are returned unchanged so the
    /// innermost snapshot wins.
    pub fn with_request(
        self,
        request: SanitizedRequest,
        response: Option<ResponseSnapshot>,
    ) -> Self {
        if matches!(self, Error::Request { .. }) {
            return self;
        }
        Error::Request {
            source: Box::new(self),
            request: Box::new(request),
            response: response.map(Box::new),
        }
    }

    /// The sanitized request attached to this error, if any.
    pub fn request(&self) -> Option<&SanitizedRequest> {
        match self {
            Error::Request { request, .. } => Some(request),
            _ => None,
        }
    }

    /// The partial response attached to this error, if any.
    pub fn response(&self) -> Option<&ResponseSnapshot> {
        match self {
            Error::Request { response, .. } => response.as_deref(),
            _ => None,
        }
    }

    /// The undecorated failure, unwrapping one request decoration.
    pub fn root(&self) -> &Error {
        match self {
            Error::Request { source, .. } => source,
            other => other,
        }
    }
}
